//! Cron-driven jobs and their serializable status.

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use engine::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cron::CronSchedule;
use crate::error::SchedulerError;

fn default_timezone() -> String {
    "UTC".to_owned()
}

fn default_enabled() -> bool {
    true
}

/// Declarative description of a job, as found in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub workflow: String,
    pub schedule: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub context: Context,
}

/// A named binding of a workflow to a cron schedule.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    name: String,
    workflow: String,
    schedule: CronSchedule,
    timezone: Tz,
    enabled: bool,
    context: Context,
    last_run: Option<DateTime<Tz>>,
    pub(crate) next_run: DateTime<Tz>,
}

impl ScheduledJob {
    /// A UTC job, enabled, with an empty context. The first fire time is
    /// computed from the current clock.
    pub fn new(
        name: impl Into<String>,
        workflow: impl Into<String>,
        schedule: &str,
    ) -> Result<Self, SchedulerError> {
        let schedule: CronSchedule = schedule.parse()?;
        let timezone = Tz::UTC;
        let next_run = next_fire(&schedule, timezone, Utc::now())?;
        Ok(Self {
            name: name.into(),
            workflow: workflow.into(),
            schedule,
            timezone,
            enabled: true,
            context: Context::new(),
            last_run: None,
            next_run,
        })
    }

    pub fn from_config(config: JobConfig) -> Result<Self, SchedulerError> {
        let JobConfig {
            name,
            workflow,
            schedule,
            timezone,
            enabled,
            context,
        } = config;
        Ok(Self::new(name, workflow, &schedule)?
            .with_timezone(&timezone)?
            .with_enabled(enabled)
            .with_context(context))
    }

    /// Evaluate the schedule in an IANA timezone such as `Europe/Berlin`.
    pub fn with_timezone(mut self, timezone: &str) -> Result<Self, SchedulerError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_owned()))?;
        self.timezone = tz;
        self.next_run = next_fire(&self.schedule, tz, Utc::now())?;
        Ok(self)
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn last_run(&self) -> Option<&DateTime<Tz>> {
        self.last_run.as_ref()
    }

    pub fn next_run(&self) -> &DateTime<Tz> {
        &self.next_run
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Enabled and due at `now`.
    pub fn should_run(&self, now: DateTime<Utc>) -> bool {
        self.enabled && now >= self.next_run
    }

    /// Record a finished run and move `next_run` past `now`.
    ///
    /// A schedule with no further fire time disables the job.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now.with_timezone(&self.timezone));
        match next_fire(&self.schedule, self.timezone, now) {
            Ok(next) => self.next_run = next,
            Err(error) => {
                warn!(job = %self.name, %error, "no upcoming fire time, disabling job");
                self.enabled = false;
            }
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            name: self.name.clone(),
            workflow: self.workflow.clone(),
            schedule: self.schedule.expression().to_owned(),
            timezone: self.timezone.name().to_owned(),
            enabled: self.enabled,
            last_run: self.last_run.as_ref().map(fixed),
            next_run: Some(fixed(&self.next_run)),
        }
    }
}

fn next_fire(
    schedule: &CronSchedule,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Tz>, SchedulerError> {
    schedule
        .next_after(&now.with_timezone(&tz))
        .ok_or_else(|| SchedulerError::NeverFires(schedule.expression().to_owned()))
}

fn fixed<T: TimeZone>(at: &DateTime<T>) -> DateTime<FixedOffset> {
    at.with_timezone(&at.offset().fix())
}

/// Point-in-time view of a job, timestamps carrying their UTC offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub workflow: String,
    pub schedule: String,
    pub timezone: String,
    pub enabled: bool,
    pub last_run: Option<DateTime<FixedOffset>>,
    pub next_run: Option<DateTime<FixedOffset>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn new_job_defaults() {
        let job = ScheduledJob::new("minutely", "wf", "* * * * *").unwrap();
        assert!(job.is_enabled());
        assert_eq!(job.timezone(), Tz::UTC);
        assert!(job.context().is_empty());
        assert!(job.last_run().is_none());
        assert!(*job.next_run() > Utc::now());
        assert!(*job.next_run() <= Utc::now() + Duration::minutes(1));
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let err = ScheduledJob::new("bad", "wf", "invalid cron").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let err = ScheduledJob::new("j", "wf", "0 9 * * *")
            .unwrap()
            .with_timezone("Mars/Olympus")
            .unwrap_err();
        assert_eq!(err, SchedulerError::InvalidTimezone("Mars/Olympus".into()));
    }

    #[test]
    fn impossible_schedule_is_rejected_up_front() {
        let err = ScheduledJob::new("feb30", "wf", "0 0 30 2 *").unwrap_err();
        assert_eq!(err, SchedulerError::NeverFires("0 0 30 2 *".into()));
    }

    #[test]
    fn should_run_only_when_enabled_and_due() {
        let mut job = ScheduledJob::new("j", "wf", "* * * * *").unwrap();
        let due = job.next_run().with_timezone(&Utc);
        assert!(!job.should_run(due - Duration::seconds(1)));
        assert!(job.should_run(due));

        job.set_enabled(false);
        assert!(!job.should_run(due + Duration::hours(1)));
    }

    #[test]
    fn every_minute_job_fires_once_per_slot() {
        let mut job = ScheduledJob::new("minutely", "wf", "* * * * *").unwrap();
        assert!(job.last_run().is_none());

        let now = job.next_run().with_timezone(&Utc);
        assert!(job.should_run(now));
        job.mark_completed(now);
        assert!(!job.should_run(now));
    }

    #[test]
    fn disabling_keeps_next_run() {
        let mut job = ScheduledJob::new("j", "wf", "0 * * * *").unwrap();
        let before = *job.next_run();
        job.set_enabled(false);
        assert_eq!(*job.next_run(), before);
        job.set_enabled(true);
        assert!(job.should_run(before.with_timezone(&Utc)));
    }

    #[test]
    fn mark_completed_advances_next_run() {
        let mut job = ScheduledJob::new("j", "wf", "*/5 * * * *").unwrap();
        let previous = *job.next_run();
        let now = previous.with_timezone(&Utc);

        job.mark_completed(now);
        assert_eq!(job.last_run().map(|t| t.with_timezone(&Utc)), Some(now));
        assert!(*job.next_run() > previous);
        assert_eq!(*job.next_run() - previous, Duration::minutes(5));
    }

    #[test]
    fn from_config_applies_defaults() {
        let config: JobConfig = serde_json::from_value(json!({
            "name": "daily_report",
            "workflow": "report",
            "schedule": "0 9 * * *"
        }))
        .unwrap();
        assert_eq!(config.timezone, "UTC");
        assert!(config.enabled);

        let job = ScheduledJob::from_config(config).unwrap();
        assert_eq!(job.workflow(), "report");
        assert_eq!(job.schedule().expression(), "0 9 * * *");
    }

    #[test]
    fn from_config_with_timezone_and_context() {
        let config: JobConfig = serde_json::from_value(json!({
            "name": "berlin",
            "workflow": "wf",
            "schedule": "30 8 * * *",
            "timezone": "Europe/Berlin",
            "enabled": false,
            "context": {"region": "eu"}
        }))
        .unwrap();
        let job = ScheduledJob::from_config(config).unwrap();
        assert_eq!(job.timezone(), chrono_tz::Europe::Berlin);
        assert!(!job.is_enabled());
        assert_eq!(job.context()["region"], "eu");

        let local = job.next_run().naive_local();
        assert_eq!((local.format("%H:%M").to_string()), "08:30");
    }

    #[test]
    fn status_snapshot_serializes_offsets() {
        let mut job = ScheduledJob::new("j", "wf", "0 12 * * *")
            .unwrap()
            .with_timezone("Asia/Tokyo")
            .unwrap();
        job.mark_completed(Utc::now());

        let status = job.status();
        assert_eq!(status.timezone, "Asia/Tokyo");
        assert_eq!(status.schedule, "0 12 * * *");
        assert!(status.last_run.is_some());

        let value = serde_json::to_value(&status).unwrap();
        let next = value["next_run"].as_str().unwrap();
        assert!(next.ends_with("+09:00"), "{next}");
        assert!(next.contains("T12:00:00"), "{next}");
    }
}
