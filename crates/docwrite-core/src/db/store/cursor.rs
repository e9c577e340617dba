use crate::{
    db::store::DocumentCursor,
    error::InternalError,
    obs::sink::{self, MetricsEvent},
    value::Document,
};

///
/// CursorGuard
///
/// Owns an open store cursor and closes it exactly once: on an explicit
/// [`close`](Self::close), or on drop for every other exit path.
///

pub struct CursorGuard<'a> {
    cursor: Box<dyn DocumentCursor + 'a>,
    entity: String,
    yielded: usize,
    closed: bool,
}

impl<'a> CursorGuard<'a> {
    pub fn new(cursor: Box<dyn DocumentCursor + 'a>, entity: &str) -> Self {
        Self {
            cursor,
            entity: entity.to_string(),
            yielded: 0,
            closed: false,
        }
    }

    /// Fetch the next document. A closed guard yields nothing.
    pub fn next_document(&mut self) -> Result<Option<Document>, InternalError> {
        if self.closed {
            return Ok(None);
        }

        let next = self.cursor.next_document()?;
        if next.is_some() {
            self.yielded += 1;
        }

        Ok(next)
    }

    /// Documents handed out so far.
    #[must_use]
    pub const fn yielded(&self) -> usize {
        self.yielded
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cursor.close();

        sink::record(MetricsEvent::CursorClosed {
            entity: &self.entity,
            yielded: self.yielded as u64,
        });
    }

    /// Drain every remaining document.
    pub fn collect_all(&mut self) -> Result<Vec<Document>, InternalError> {
        let mut out = Vec::new();
        while let Some(doc) = self.next_document()? {
            out.push(doc);
        }

        Ok(out)
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
