//! Task records, lifecycle status, and the registry holding them.
//!
//! A task is created `Pending` by a submission. Exactly one worker moves it
//! to `Running` and then to `Finished` or `Failed`. Nothing else mutates it.

pub mod record;
pub mod registry;
pub mod status;

pub use record::{TaskRecord, TaskView};
pub use registry::TaskRegistry;
pub use status::TaskStatus;
