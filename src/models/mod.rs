//! Data models for polacquire.

mod job;
mod policy;
mod session;

pub use job::{Job, JobStatus};
pub use policy::PolicyRecord;
pub use session::{Session, SessionStatus};
