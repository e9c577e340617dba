use crate::error::InternalError;
use std::ops::AddAssign;
use thiserror::Error as ThisError;

///
/// WriteOutcome
///
/// matched  : documents considered (input documents, or documents yielded
///            by the cursor)
/// updated  : documents written, inserts included
/// inserted : the insert subset of `updated`
/// failed   : documents carrying at least one error
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WriteOutcome {
    pub matched: usize,
    pub updated: usize,
    pub inserted: usize,
    pub failed: usize,
}

impl WriteOutcome {
    /// Documents neither written nor failed.
    #[must_use]
    pub const fn untouched(&self) -> usize {
        self.matched
            .saturating_sub(self.updated)
            .saturating_sub(self.failed)
    }
}

impl AddAssign for WriteOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.matched += rhs.matched;
        self.updated += rhs.updated;
        self.inserted += rhs.inserted;
        self.failed += rhs.failed;
    }
}

///
/// WriteFailure
///
/// A fatal, non-document-scoped failure. `outcome` still holds the true
/// counts for everything processed before and around the failure.
///

#[derive(Debug, ThisError)]
#[error("{error}")]
pub struct WriteFailure {
    pub outcome: WriteOutcome,
    #[source]
    pub error: InternalError,
}

impl WriteFailure {
    #[must_use]
    pub const fn new(outcome: WriteOutcome, error: InternalError) -> Self {
        Self { outcome, error }
    }
}

impl From<InternalError> for WriteFailure {
    fn from(error: InternalError) -> Self {
        Self::new(WriteOutcome::default(), error)
    }
}
