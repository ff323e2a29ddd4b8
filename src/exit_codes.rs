/// Exit codes as defined in README.md.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const OPERATIONAL_FAILURE: i32 = 1;
    pub const CONFLICT: i32 = 2;
    pub const PARTIAL_ROLLBACK: i32 = 3;
}
