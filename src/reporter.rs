use crate::events::Event;

/// Reporter aggregates events and produces human or JSON output.
pub struct Reporter {
    events: Vec<Event>,
    json_mode: bool,
}

impl Reporter {
    pub fn new(json_mode: bool) -> Self {
        Self {
            events: Vec::new(),
            json_mode,
        }
    }

    pub fn record(&mut self, event: Event) {
        if self.json_mode {
            // Emit JSON line to stdout
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{}", line);
            }
        } else {
            println!("{}", human_line(&event));
        }
        self.events.push(event);
    }
}

fn human_line(event: &Event) -> String {
    match event {
        Event::OperationRecorded { id, kind, src, dst } => match dst {
            Some(dst) => format!("recorded {kind} #{id}: {} -> {}", src.display(), dst.display()),
            None => format!("recorded {kind} #{id}: {}", src.display()),
        },
        Event::DeleteStashed { id, src, holding_path } => format!(
            "deleted #{id}: {} (recoverable from {})",
            src.display(),
            holding_path.display()
        ),
        Event::OperationReversed { id, reversal_id } => {
            format!("undone operation #{id} (reversal #{reversal_id})")
        }
        Event::OperationReplayed { id, replay_id } => {
            format!("redone operation #{id} (replay #{replay_id})")
        }
        Event::ConflictDetected { reason } => format!("conflict: {reason}"),
        Event::TransactionRecovered { transaction_id } => {
            format!("marked stale transaction {transaction_id} as failed")
        }
        Event::TransactionRolledBack {
            transaction_id,
            status,
            reversed,
            failed,
        } => {
            if failed.is_empty() {
                format!(
                    "transaction {transaction_id} rolled back ({} operations)",
                    reversed.len()
                )
            } else {
                let ids: Vec<String> = failed.iter().map(|(id, _)| format!("#{id}")).collect();
                format!(
                    "transaction {transaction_id} {status}: {} reversed, failed: {}",
                    reversed.len(),
                    ids.join(", ")
                )
            }
        }
        Event::HistoryExported { path, count } => {
            format!("exported {count} records to {}", path.display())
        }
        Event::CleanupCompleted {
            removed_operations,
            purged_holding_entries,
            reclaimed_holding_bytes,
        } => format!(
            "cleanup: removed {removed_operations} records, purged {purged_holding_entries} held files ({reclaimed_holding_bytes} bytes)"
        ),
    }
}
