//! Local job-application and skill tracker.
//!
//! Jobs and skills live in two collections inside a local SQLite key-value
//! store. Every write is an atomic read-modify-write of the whole collection,
//! so rapid or concurrent saves never lose each other's updates.

pub mod attachment;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod store;

pub use db::{Database, KvBackend, MemoryBackend};
pub use error::{AttachmentError, Result, StorageError};
pub use models::{Attachment, JobRecord, JobStatus, SkillRecord, SkillStatus};
pub use repository::{JobRepository, SkillRepository, Tracker};
