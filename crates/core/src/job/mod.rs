//! Job lifecycle: resolve an operation, stage its inputs, run it, deliver it.
//!
//! A [`Job`] moves strictly forward through
//! `Created -> Staged -> Executing -> {Succeeded, Failed}`. Whatever path it
//! takes, every file it staged is released exactly when it reaches a
//! terminal state: on failure immediately, on success once the artifact has
//! been handed to [`JobExecutor::deliver`]. A job dropped half-way releases
//! its files on a background task.
//!
//! # Example
//!
//! ```ignore
//! let mut job = executor.begin("pdf-merge")?;
//! executor.stage(&mut job, "a.pdf", body_a).await?;
//! executor.stage(&mut job, "b.pdf", body_b).await?;
//! let completed = executor.run(job, &params).await?;
//! let delivery = executor.deliver(completed).await?;
//! ```

mod executor;
mod types;

pub use executor::JobExecutor;
pub use types::{
    CompletedJob, Delivery, ExecutorStatus, Job, JobFailure, JobId, JobState, Outcome,
};
