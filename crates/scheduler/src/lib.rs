//! `scheduler` crate — runs registered workflows on cron schedules or at
//! fixed intervals.

pub mod config;
pub mod cron;
pub mod error;
pub mod interval;
pub mod job;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use cron::CronSchedule;
pub use error::SchedulerError;
pub use interval::IntervalScheduler;
pub use job::{JobConfig, JobStatus, ScheduledJob};
pub use scheduler::{JobCallback, WorkflowScheduler};
