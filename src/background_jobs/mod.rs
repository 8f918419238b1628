//! Background job scheduling: periodic compliance passes and retention
//! cleanup, with run history kept in the server store.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule, RunTrigger, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
