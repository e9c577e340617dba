use crate::{
    db::store::Query,
    model::EntityIdentity,
    translate::Translator,
    value::{Document, Value},
};

///
/// IdentityTuple
///
/// Identity values of one document, parallel to the entity's identity
/// fields. Absent fields read as null. Two tuples are equal when every
/// position is equal, nulls included.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IdentityTuple(Vec<Value>);

impl IdentityTuple {
    pub fn extract(translator: &dyn Translator, identity: &EntityIdentity, doc: &Document) -> Self {
        Self(
            identity
                .paths()
                .iter()
                .map(|path| {
                    translator
                        .field_value(doc, path)
                        .cloned()
                        .unwrap_or(Value::Null)
                })
                .collect(),
        )
    }

    /// All positions null: the document cannot be looked up by identity.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0.iter().all(Value::is_null)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Equality predicate over every identity field.
    #[must_use]
    pub fn to_query(&self, identity: &EntityIdentity) -> Query {
        Query::And(
            identity
                .paths()
                .iter()
                .zip(&self.0)
                .map(|(path, value)| Query::Eq {
                    field: path.clone(),
                    value: value.clone(),
                })
                .collect(),
        )
    }
}

///
/// DocInfo
///
/// Working record for one document of a save batch.
///
/// doc      : index of the document in the request
/// target   : the client document in storage form
/// stored   : the stored counterpart, once looked up
/// identity : identity values of `target`
///

#[derive(Clone, Debug)]
pub struct DocInfo {
    pub doc: usize,
    pub target: Document,
    pub stored: Option<Document>,
    pub identity: IdentityTuple,
}

impl DocInfo {
    #[must_use]
    pub const fn new(doc: usize, target: Document, identity: IdentityTuple) -> Self {
        Self {
            doc,
            target,
            stored: None,
            identity,
        }
    }
}

/// Build the single disjunctive lookup for a batch, or `None` when no
/// document carries an identity.
pub fn lookup_query<'a>(
    identity: &EntityIdentity,
    tuples: impl IntoIterator<Item = &'a IdentityTuple>,
) -> Option<Query> {
    let terms: Vec<Query> = tuples
        .into_iter()
        .filter(|t| !t.is_absent())
        .map(|t| t.to_query(identity))
        .collect();

    (!terms.is_empty()).then_some(Query::Or(terms))
}

///
/// Attached
/// Stored documents `attach_stored` could not pair one-to-one.
///

#[derive(Debug, Default)]
pub struct Attached {
    /// Stored documents matching no batch entry.
    pub unmatched: usize,

    /// Batch entries matched by more than one stored document. The first
    /// stored document wins.
    pub shadowed: Vec<usize>,
}

/// Pair each looked-up document with the batch entry of equal identity.
pub fn attach_stored(
    translator: &dyn Translator,
    identity: &EntityIdentity,
    infos: &mut [DocInfo],
    found: Vec<Document>,
) -> Attached {
    let mut attached = Attached::default();

    for stored in found {
        let tuple = IdentityTuple::extract(translator, identity, &stored);
        match infos
            .iter_mut()
            .find(|info| !info.identity.is_absent() && info.identity == tuple)
        {
            Some(info) if info.stored.is_some() => {
                if !attached.shadowed.contains(&info.doc) {
                    attached.shadowed.push(info.doc);
                }
            }
            Some(info) => info.stored = Some(stored),
            None => attached.unmatched += 1,
        }
    }

    attached
}

/// Positions in `infos` whose identity collides with another entry.
#[must_use]
pub fn colliding(infos: &[DocInfo]) -> Vec<usize> {
    (0..infos.len())
        .filter(|&i| {
            !infos[i].identity.is_absent()
                && infos
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != i && other.identity == infos[i].identity)
        })
        .collect()
}
