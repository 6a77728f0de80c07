//! Cron trigger for the Batch Exporter.
//!
//! Sleeps until the next fire time of the configured expression, runs the
//! exporter, repeats. A failed run is logged and the loop continues.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use adu_dispatch::BatchExporter;
use chrono::Utc;
use cron::Schedule;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Parse a 5- or 6-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        // Standard 5-field cron: prepend seconds field
        let six_field = format!("0 {}", expr);
        Schedule::from_str(&six_field)
    } else {
        Schedule::from_str(expr)
    }
}

/// Run the exporter on every fire time of `schedule` until `shutdown` flips.
pub async fn run_export_loop(
    exporter: Arc<BatchExporter>,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            info!("export scheduler stopped");
            return;
        }
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("export scheduler: cron expression has no future fire time, stopping");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(next = %next, "export scheduler: next batch export");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    info!("export scheduler stopped");
                    return;
                }
                continue;
            }
        }

        match exporter.run().await {
            Ok(report) => info!(
                artifacts = report.artifacts.len(),
                exported = report.exported.len(),
                "export scheduler: batch export complete"
            ),
            Err(e) => error!(error = %e, "export scheduler: batch export failed"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use adu_core::SystemRegistry;
    use adu_dispatch::{MemoryArtifactSink, MemoryStore};
    use adu_template::CsvFormat;

    #[test]
    fn test_parse_cron_six_field() {
        let schedule = parse_cron("0 */5 * * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }

    #[test]
    fn test_parse_cron_five_field_auto_prefix() {
        let schedule = parse_cron("30 2 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "02:30:00");
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn test_default_export_cron_is_midnight() {
        let schedule = parse_cron("0 0 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert!(next > Utc::now());
        assert_eq!(next.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[tokio::test]
    async fn export_loop_stops_on_shutdown() {
        let exporter = Arc::new(BatchExporter::new(
            Arc::new(SystemRegistry::builtin().unwrap()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryArtifactSink::new()),
            CsvFormat::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_export_loop(exporter, parse_cron("0 0 * * *").unwrap(), rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("export loop did not stop")
            .unwrap();
    }
}
