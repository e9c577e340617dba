pub mod context;
pub mod doc;
pub mod executor;
pub mod projection;
pub mod response;
pub mod session;
pub mod store;

pub use context::OpContext;
pub use doc::{CrudOperation, DocCtx, DocError, ErrorCode};
pub use response::{WriteFailure, WriteOutcome};
pub use session::DbSession;
