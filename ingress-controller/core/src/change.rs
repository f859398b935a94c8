use ahash::AHashMap as HashMap;

/// The operation the configuration renderer must perform for a resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// Remove the rendered configuration of the resource.
    Delete,
    /// Render (or re-render) the configuration of the resource.
    AddOrUpdate,
}

/// Describes how the rendered configuration must change for a single resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<R> {
    pub op: Op,
    pub resource: R,

    /// Set when the change was caused by the resource failing validation.
    pub error: Option<String>,
}

/// Identifies a resource by its kind, namespace and name (e.g. `Ingress/default/web`).
pub trait KeyWithKind {
    fn key_with_kind(&self) -> String;
}

// === impl Change ===

impl<R> Change<R> {
    pub fn delete(resource: R) -> Self {
        Self {
            op: Op::Delete,
            resource,
            error: None,
        }
    }

    pub fn add_or_update(resource: R) -> Self {
        Self {
            op: Op::AddOrUpdate,
            resource,
            error: None,
        }
    }
}

/// Collapses a batch of changes so that each resource appears at most once.
///
/// The last change recorded for a resource is kept: repeated deletes become one delete, repeated
/// updates become one update, a delete followed by an update becomes the update and an update
/// followed by a delete becomes the delete. Resources keep the order in which they first appear,
/// and every delete is returned before every update so that a host or listener is released before
/// another resource claims it.
pub fn squash<R: KeyWithKind>(changes: Vec<Change<R>>) -> Vec<Change<R>> {
    let keys = changes
        .iter()
        .map(|c| c.resource.key_with_kind())
        .collect::<Vec<_>>();

    let mut last = HashMap::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        last.insert(key.as_str(), i);
    }

    let mut slots = changes.into_iter().map(Some).collect::<Vec<_>>();
    let mut deletes = Vec::new();
    let mut updates = Vec::new();
    for key in &keys {
        let Some(idx) = last.remove(key.as_str()) else {
            continue;
        };
        if let Some(change) = slots[idx].take() {
            match change.op {
                Op::Delete => deletes.push(change),
                Op::AddOrUpdate => updates.push(change),
            }
        }
    }

    deletes.extend(updates);
    deletes
}
