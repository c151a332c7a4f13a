//! Cron job that physically removes trash older than the retention window.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use cron::Schedule;

use crate::application::trash::TrashService;

/// Marker struct for the cron-triggered purge job.
/// Must implement `From<chrono::DateTime<chrono::Utc>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct PurgeTrashJob;

impl From<chrono::DateTime<chrono::Utc>> for PurgeTrashJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

/// Context for the purge job worker.
#[derive(Clone)]
pub struct PurgeTrashContext {
    pub trash: Arc<TrashService>,
}

/// Process one purge pass across every declared entity.
pub async fn process_purge_trash_job(
    _job: PurgeTrashJob,
    ctx: Data<PurgeTrashContext>,
) -> Result<(), apalis::prelude::Error> {
    let results = ctx.trash.purge_all().await;
    for (entity, result) in results {
        if let Err(err) = result {
            tracing::warn!(
                target: "verdura::trash",
                entity = %entity,
                error = %err,
                "Trash purge failed for entity"
            );
        }
    }
    Ok(())
}

/// Parse the configured purge schedule (six-field cron expression).
pub fn parse_purge_schedule(expression: &str) -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_parses() {
        let schedule = parse_purge_schedule("0 15 3 * * *").expect("valid expression");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(2).collect();
        assert_eq!(upcoming.len(), 2);
    }

    #[test]
    fn garbage_schedule_is_rejected() {
        assert!(parse_purge_schedule("every day at dawn").is_err());
    }
}
