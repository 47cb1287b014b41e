//! Execution audit trail.

mod logger;

pub use logger::{AuditLogger, RunRecord};

use tokio::task::JoinHandle;

use crate::events::{EventBus, HarvestEvent};

/// Subscribe `logger` to the event bus: every finished run becomes one JSONL
/// record. Write failures are logged and never surface to the run itself.
pub fn attach(events: &EventBus, logger: AuditLogger) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("audit subscriber lagged, {missed} events not recorded");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            let record = match event {
                HarvestEvent::RunCompleted {
                    run_id,
                    agent,
                    duration_ms,
                } => RunRecord::now(&run_id, &agent, "complete", duration_ms),
                HarvestEvent::RunPartial {
                    run_id,
                    agent,
                    duration_ms,
                    message,
                } => RunRecord::now(&run_id, &agent, "partial", duration_ms).with_detail(message),
                HarvestEvent::RunFailed {
                    run_id,
                    agent,
                    duration_ms,
                    code,
                } => RunRecord::now(&run_id, &agent, "failed", duration_ms).with_detail(code),
                _ => continue,
            };
            if let Err(err) = logger.log(&record) {
                tracing::warn!("audit write failed: {err:#}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn finished_runs_land_in_the_log() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path()).unwrap();
        let path = logger.path().to_path_buf();
        let bus = EventBus::new();
        let handle = attach(&bus, logger);

        bus.emit(HarvestEvent::RunCompleted {
            run_id: "r-1".into(),
            agent: "futuretools".into(),
            duration_ms: 420,
        });
        bus.emit(HarvestEvent::RunPartial {
            run_id: "r-2".into(),
            agent: "betalist".into(),
            duration_ms: 51,
            message: "deadline of 0.1s exceeded".into(),
        });
        // Lifecycle events are not audited.
        bus.emit(HarvestEvent::ServiceStopping);

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.abort();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: RunRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.status, "partial");
        assert!(second.detail.unwrap().contains("deadline"));
    }
}
