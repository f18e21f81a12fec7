//! Tree-wide archive, restore and delete transitions over the document forest.

use uuid::Uuid;

use crate::store::{DocStoreError, Document, DocumentPatch, DocumentStore};

/// Check that `principal` may act on the document and return it.
///
/// Failure order matches detection order: missing principal, then missing
/// record, then ownership mismatch. Nothing is written on failure.
pub fn authorize<'a>(
    store: &'a DocumentStore,
    id: Uuid,
    principal: &str,
) -> Result<&'a Document, DocStoreError> {
    if principal.is_empty() {
        return Err(DocStoreError::Unauthenticated);
    }
    let doc = store.get(id).ok_or(DocStoreError::NotFound(id))?;
    if doc.owner_id() != principal {
        return Err(DocStoreError::Unauthorized(id));
    }
    Ok(doc)
}

/// Ids of every document transitively below `root`, depth-first.
///
/// Explicit worklist instead of call-stack recursion so arbitrarily deep
/// trees cannot overflow the stack. The listing is owner-scoped, matching
/// the store contract the traversal is built on.
fn descendant_ids(store: &DocumentStore, owner: &str, root: Uuid) -> Vec<Uuid> {
    let mut out = Vec::new();
    let mut work = vec![root];
    while let Some(id) = work.pop() {
        for child in store.list_children(owner, Some(id)) {
            out.push(child.id());
            work.push(child.id());
        }
    }
    out
}

/// Applies archive, restore and delete to a document together with all of
/// its descendants.
///
/// Every walk runs to completion while the caller holds the store, so
/// readers behind the same lock never observe a half-cascaded subtree.
#[derive(Clone, Copy, Debug)]
pub struct CascadeEngine {
    cascade_on_delete: bool,
}

impl CascadeEngine {
    /// `cascade_on_delete` controls whether deleting a document also removes
    /// its subtree; `false` leaves descendants behind with a dangling parent
    /// edge, which is the historically observed behavior.
    pub fn new(cascade_on_delete: bool) -> Self {
        Self { cascade_on_delete }
    }

    /// Mark the document and every descendant archived. Returns the patched
    /// target. Calling it again on an already archived tree is a no-op.
    pub fn archive(
        &self,
        store: &mut DocumentStore,
        id: Uuid,
        principal: &str,
    ) -> Result<Document, DocStoreError> {
        authorize(store, id, principal)?;
        let updated = store.patch(
            id,
            DocumentPatch {
                is_archived: Some(true),
                ..Default::default()
            },
        )?;
        for child in descendant_ids(store, principal, id) {
            store.patch(
                child,
                DocumentPatch {
                    is_archived: Some(true),
                    ..Default::default()
                },
            )?;
        }
        Ok(updated)
    }

    /// Unarchive the document and every descendant. If the target's parent is
    /// itself still archived the target is detached and becomes a root, so a
    /// restored note never hangs under a hidden ancestor. Descendants keep
    /// their parent edges.
    pub fn restore(
        &self,
        store: &mut DocumentStore,
        id: Uuid,
        principal: &str,
    ) -> Result<Document, DocStoreError> {
        let target = authorize(store, id, principal)?;
        let detach = target
            .parent_id()
            .and_then(|pid| store.get(pid))
            .map(|parent| parent.is_archived())
            .unwrap_or(false);
        let updated = store.patch(
            id,
            DocumentPatch {
                is_archived: Some(false),
                detach_parent: detach,
                ..Default::default()
            },
        )?;
        for child in descendant_ids(store, principal, id) {
            store.patch(
                child,
                DocumentPatch {
                    is_archived: Some(false),
                    ..Default::default()
                },
            )?;
        }
        Ok(updated)
    }

    /// Permanently remove the document. With `cascade_on_delete` the whole
    /// subtree goes with it; otherwise descendants stay behind, their parent
    /// edge pointing at a record that no longer exists.
    pub fn delete(
        &self,
        store: &mut DocumentStore,
        id: Uuid,
        principal: &str,
    ) -> Result<(), DocStoreError> {
        authorize(store, id, principal)?;
        if self.cascade_on_delete {
            for child in descendant_ids(store, principal, id) {
                store.delete(child)?;
            }
        }
        store.delete(id)
    }
}
