pub mod bulk;
pub mod save;
pub mod update;

pub use bulk::{AttemptList, SubmittedList, correlate};
pub use save::SaveExecutor;
pub use update::{SetFields, UpdateExecutor, UpdateTransform};
