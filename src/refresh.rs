//! Scheduled stale-insight refresh.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;
use crate::insights::InsightStore;

/// Parse a cron expression (seconds field included).
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: "CAREER_INSIGHTS_REFRESH_SCHEDULE".into(),
        message: format!("invalid cron: {e}"),
    })
}

/// Next fire time strictly after `after`.
pub fn next_fire(schedule: &cron::Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Sleep until each fire time and run a sweep. Returns only if the schedule
/// has no future fire times.
pub async fn run_refresh_loop(store: Arc<InsightStore>, schedule: cron::Schedule) {
    loop {
        let now = Utc::now();
        let Some(at) = next_fire(&schedule, now) else {
            tracing::warn!("Refresh schedule has no upcoming fire time, stopping");
            return;
        };
        tracing::info!(next_run = %at, "Waiting for next insight refresh");

        let wait = (at - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = store.refresh_stale(Utc::now()).await {
            tracing::error!(error = %e, "Insight refresh sweep failed");
        }
    }
}

/// Spawn the refresh loop as a background task.
pub fn spawn_refresh_ticker(
    store: Arc<InsightStore>,
    schedule: cron::Schedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_refresh_loop(store, schedule))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike, Weekday};

    use super::*;
    use crate::config::DEFAULT_REFRESH_SCHEDULE;

    #[test]
    fn default_schedule_is_weekly_sunday_midnight() {
        let schedule = parse_schedule(DEFAULT_REFRESH_SCHEDULE).unwrap();
        // 2026-01-07 is a Wednesday
        let after = "2026-01-07T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let next = next_fire(&schedule, after).unwrap();

        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!((next.hour(), next.minute(), next.second()), (0, 0, 0));
        assert_eq!(next.date_naive().day(), 11);
    }

    #[test]
    fn invalid_schedule_rejected() {
        let err = parse_schedule("every sunday").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "CAREER_INSIGHTS_REFRESH_SCHEDULE"));
    }
}
