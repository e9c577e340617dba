//! Side-effect-only extension points around result sets and document writes.

use crate::db::{context::OpContext, doc::DocCtx};
use std::{fmt, sync::Arc};

///
/// InterceptPoint
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InterceptPoint {
    PreUpdateResultSet,
    PostUpdateResultSet,
    PreInsertDoc,
    PostInsertDoc,
    PreUpdateDoc,
    PostUpdateDoc,
    PreUpdateDocValidation,
}

impl fmt::Display for InterceptPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PreUpdateResultSet => "pre_update_result_set",
            Self::PostUpdateResultSet => "post_update_result_set",
            Self::PreInsertDoc => "pre_insert_doc",
            Self::PostInsertDoc => "post_insert_doc",
            Self::PreUpdateDoc => "pre_update_doc",
            Self::PostUpdateDoc => "post_update_doc",
            Self::PreUpdateDocValidation => "pre_update_doc_validation",
        };
        write!(f, "{label}")
    }
}

///
/// Interceptor
///
/// Observes the request at a named point. `doc` is set for per-document
/// points and `None` for result-set points. Interceptors cannot veto or
/// alter the engine's decisions.
///

pub trait Interceptor {
    fn intercept(&self, point: InterceptPoint, op: &OpContext, doc: Option<&DocCtx>);
}

impl<F> Interceptor for F
where
    F: Fn(InterceptPoint, &OpContext, Option<&DocCtx>),
{
    fn intercept(&self, point: InterceptPoint, op: &OpContext, doc: Option<&DocCtx>) {
        self(point, op, doc);
    }
}

///
/// InterceptorRegistry
/// Interceptors keyed by point, dispatched in registration order.
///

#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    entries: Vec<(InterceptPoint, Arc<dyn Interceptor>)>,
}

impl InterceptorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor for one point.
    pub fn register(&mut self, point: InterceptPoint, interceptor: Arc<dyn Interceptor>) {
        self.entries.push((point, interceptor));
    }

    /// Register an interceptor for several points.
    pub fn register_all(
        &mut self,
        points: impl IntoIterator<Item = InterceptPoint>,
        interceptor: &Arc<dyn Interceptor>,
    ) {
        for point in points {
            self.entries.push((point, Arc::clone(interceptor)));
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn dispatch(&self, point: InterceptPoint, op: &OpContext, doc: Option<&DocCtx>) {
        for (_, interceptor) in self.entries.iter().filter(|(p, _)| *p == point) {
            interceptor.intercept(point, op, doc);
        }
    }
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(p, _)| p))
            .finish()
    }
}
