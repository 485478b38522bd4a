//! Staging store for job-owned temporary files.
//!
//! Inbound payloads are streamed into an upload area and produced artifacts
//! are written to an output area. Both are flat directories; every entry is
//! named `<job_id>-<seq>_<name>` so concurrent jobs never contend for a path
//! and no cross-job lock is needed.
//!
//! # Example
//!
//! ```ignore
//! use convertino_core::staging::StagingStore;
//!
//! let store = StagingStore::new(&config.storage);
//! store.ensure_dirs().await?;
//!
//! let input = store.stage_input(&job_id, 0, "photo.png", body_stream).await?;
//! let slot = store.allocate_output(&job_id, 1, "photo.jpeg");
//! // ... engine writes slot.scratch_path() ...
//! let output = slot.commit().await?;
//!
//! store.release(&job_id).await;
//! ```

mod error;
mod store;
mod types;

pub use error::StagingError;
pub use store::{sanitize_file_name, StagingStore};
pub use types::{FileRole, OutputSlot, ReleaseReport, StagedFile};
