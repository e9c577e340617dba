use derive_more::Display;
use docwrite_core::{
    config::ConfigError,
    db::WriteFailure,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::Configuration => ErrorKind::Config,
            ErrorClass::Conflict => ErrorKind::Write(WriteErrorKind::Conflict),
            ErrorClass::NotFound if err.origin == CoreErrorOrigin::Store => {
                ErrorKind::Store(StoreErrorKind::NotFound)
            }
            ErrorClass::NotFound => ErrorKind::Write(WriteErrorKind::NotFound),
            ErrorClass::Transport => ErrorKind::Store(StoreErrorKind::Unavailable),
            ErrorClass::Unsupported => ErrorKind::Write(WriteErrorKind::Unsupported),
            ErrorClass::Internal | ErrorClass::InvariantViolation => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, err.to_string())
    }
}

// Drops the partial outcome; read `WriteFailure::outcome` before converting.
impl From<WriteFailure> for Error {
    fn from(failure: WriteFailure) -> Self {
        failure.error.into()
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Engine configuration or entity metadata is invalid.
    Config,

    Store(StoreErrorKind),
    Write(WriteErrorKind),

    /// The caller cannot remediate this.
    Internal,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    NotFound,

    /// Connection lost or timed out; the request may be retried.
    Unavailable,
}

///
/// WriteErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum WriteErrorKind {
    /// Target entity is not registered.
    NotFound,

    /// Concurrent or state conflict.
    Conflict,

    /// Valid request the engine refuses to run (result set too large).
    Unsupported,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Executor,
    Merge,
    Query,
    Store,
    Translate,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Executor => Self::Executor,
            CoreErrorOrigin::Merge => Self::Merge,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Translate => Self::Translate,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use docwrite_core::db::WriteOutcome;

    #[test]
    fn transport_failures_are_store_unavailable() {
        let err: Error = InternalError::store_transport("connection reset").into();

        assert_eq!(err.kind, ErrorKind::Store(StoreErrorKind::Unavailable));
        assert_eq!(err.origin, ErrorOrigin::Store);
        assert_eq!(err.message, "connection reset");
    }

    #[test]
    fn unknown_entity_is_a_write_not_found() {
        let err: Error = InternalError::unknown_entity("ghost").into();

        assert_eq!(err.kind, ErrorKind::Write(WriteErrorKind::NotFound));
        assert!(err.message.contains("ghost"));
    }

    #[test]
    fn write_failure_keeps_its_cause() {
        let failure = WriteFailure::new(
            WriteOutcome::default(),
            InternalError::store_not_found("no such collection"),
        );
        let err = Error::from(failure);

        assert_eq!(err.kind, ErrorKind::Store(StoreErrorKind::NotFound));
    }

    #[test]
    fn config_errors_map_to_config_kind() {
        let err = Error::from(ConfigError::UnknownParser("sql".to_string()));

        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.origin, ErrorOrigin::Config);
        assert_eq!(err.to_string(), "unknown metadata parser 'sql'");
    }
}
