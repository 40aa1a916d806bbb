//! Daily triggers and the recurring run loop.

use crate::config::JobConfig;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A trigger expression that is not of the form `M H * * *`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid schedule '{expr}': {reason}")]
pub struct TriggerParseError {
    pub expr: String,
    pub reason: String,
}

/// Fires once a day at a fixed UTC minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    time: NaiveTime,
}

impl DailyTrigger {
    /// Parse a five-field cron expression restricted to `M H * * *`.
    pub fn parse(expr: &str) -> Result<Self, TriggerParseError> {
        let fail = |reason: &str| TriggerParseError {
            expr: expr.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(fail("expected 5 fields"));
        }
        if fields[2..].iter().any(|f| *f != "*") {
            return Err(fail("only daily schedules (M H * * *) are supported"));
        }

        let minute: u32 = fields[0]
            .parse()
            .map_err(|_| fail("minute must be a number"))?;
        let hour: u32 = fields[1]
            .parse()
            .map_err(|_| fail("hour must be a number"))?;

        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| fail("hour must be 0-23 and minute 0-59"))?;
        Ok(Self { time })
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = Utc.from_utc_datetime(&now.date_naive().and_time(self.time));
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }
}

/// Job names and their triggers.
#[derive(Debug, Clone)]
pub struct Scheduler {
    entries: Vec<(String, DailyTrigger)>,
}

impl Scheduler {
    /// Build from enabled jobs. Fails on the first invalid trigger.
    pub fn new(jobs: &[JobConfig]) -> Result<Self, TriggerParseError> {
        let mut entries = Vec::new();
        for job in jobs.iter().filter(|j| j.enabled) {
            entries.push((job.name.clone(), DailyTrigger::parse(&job.schedule)?));
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest fire time after `now` and every job due at that instant.
    pub fn next_due(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Vec<String>)> {
        let earliest = self
            .entries
            .iter()
            .map(|(_, t)| t.next_after(now))
            .min()?;
        let due = self
            .entries
            .iter()
            .filter(|(_, t)| t.next_after(now) == earliest)
            .map(|(name, _)| name.clone())
            .collect();
        Some((earliest, due))
    }

    /// Sleep until the next trigger, hand the due jobs to `run`, repeat.
    ///
    /// Returns when `cancel` fires. A run already in progress is awaited.
    pub async fn run_until_cancelled<F, Fut>(&self, cancel: CancellationToken, mut run: F)
    where
        F: FnMut(Vec<String>) -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.is_empty() {
            warn!("No enabled jobs to schedule");
            return;
        }

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let now = Utc::now();
            let Some((at, jobs)) = self.next_due(now) else {
                break;
            };
            info!("Next run at {} for {:?}", at.to_rfc3339(), jobs);

            let wait = (at - now).to_std().unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            run(jobs).await;
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_parse_daily() {
        let t = DailyTrigger::parse("0 0 * * *").unwrap();
        assert_eq!(t.time(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());

        let t = DailyTrigger::parse("30 2 * * *").unwrap();
        assert_eq!(t.time(), NaiveTime::from_hms_opt(2, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!(DailyTrigger::parse("*/5 * * * *").is_err());
        assert!(DailyTrigger::parse("0 0 1 * *").is_err());
        assert!(DailyTrigger::parse("0 24 * * *").is_err());
        assert!(DailyTrigger::parse("60 0 * * *").is_err());
        assert!(DailyTrigger::parse("0 0 * *").is_err());

        let err = DailyTrigger::parse("0 0 * * 1").unwrap_err();
        assert!(err.to_string().contains("'0 0 * * 1'"));
    }

    #[test]
    fn test_next_after() {
        let t = DailyTrigger::parse("0 2 * * *").unwrap();
        assert_eq!(t.next_after(at(1, 59, 59)), at(2, 0, 0));
        // Exactly on the trigger rolls to the next day
        assert_eq!(
            t.next_after(at(2, 0, 0)),
            Utc.with_ymd_and_hms(2024, 3, 11, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_due_groups_jobs() {
        let mut a = JobConfig::new("a", "dbo.A", "A");
        let mut b = JobConfig::new("b", "dbo.B", "B");
        let mut c = JobConfig::new("c", "dbo.C", "C");
        a.schedule = "0 3 * * *".into();
        b.schedule = "0 3 * * *".into();
        c.schedule = "0 1 * * *".into();
        let mut disabled = JobConfig::new("d", "dbo.D", "D");
        disabled.schedule = "0 2 * * *".into();
        disabled.enabled = false;

        let scheduler = Scheduler::new(&[a, b, c, disabled]).unwrap();
        let (when, due) = scheduler.next_due(at(1, 30, 0)).unwrap();
        assert_eq!(when, at(3, 0, 0));
        assert_eq!(due, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_cancelled_scheduler_runs_nothing() {
        let scheduler = Scheduler::new(&[JobConfig::new("a", "dbo.A", "A")]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut runs = 0;
        scheduler
            .run_until_cancelled(cancel, |_| {
                runs += 1;
                async {}
            })
            .await;
        assert_eq!(runs, 0);
    }
}
