//! Owner-scoped document storage for the note tree.
//! Documents are stored individually on disk as JSON and loaded at startup.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use uuid::Uuid;


const UNTITLED: &str = "Untitled";

/// Failures surfaced by store and cascade operations.
///
/// The first three variants are detected before any write, so a failed
/// operation leaves the store unmodified.
#[derive(Debug, Error)]
pub enum DocStoreError {
    #[error("no authenticated principal attached to the call")]
    Unauthenticated,
    #[error("document not found: {0}")]
    NotFound(Uuid),
    #[error("document {0} is not owned by the acting principal")]
    Unauthorized(Uuid),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A single note in the per-owner document forest.
///
/// `parent_id` edges form a forest: roots have no parent, and an edge is set
/// only at creation or by the restore repair, never to a descendant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Document {
    id: Uuid,
    owner_id: String,
    parent_id: Option<Uuid>,
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    cover_image: Option<String>,
    is_archived: bool,
    is_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Document {
    fn new(id: Uuid, title: String, owner_id: String, parent_id: Option<Uuid>) -> Self {
        let title = if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title
        };
        let now = Utc::now();
        Self {
            id,
            owner_id,
            parent_id,
            title,
            content: None,
            icon: None,
            cover_image: None,
            is_archived: false,
            is_published: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.cover_image.as_deref()
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    pub fn is_published(&self) -> bool {
        self.is_published
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Partial update applied by [`DocumentStore::patch`].
///
/// `None` fields are left untouched. `detach_parent` clears the parent edge
/// and is only ever set by the restore repair.
#[derive(Clone, Debug, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub is_published: Option<bool>,
    pub is_archived: Option<bool>,
    pub detach_parent: bool,
}

/// Simple filesystem-backed store for [`Document`] records.
pub struct DocumentStore {
    docs: HashMap<Uuid, Document>,
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        // load existing
        let mut docs = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = Uuid::parse_str(stem) else {
                continue;
            };
            let data = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Document>(&data) {
                Ok(doc) => {
                    docs.insert(id, doc);
                }
                Err(err) => {
                    tracing::warn!(%id, %err, "skipping unreadable document file");
                }
            }
        }
        Ok(Self { docs, dir })
    }

    /// Directory where documents are persisted.
    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    /// Iterate over all documents in the store.
    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, Uuid, Document> {
        self.docs.iter()
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn save(&self, doc: &Document) -> Result<(), DocStoreError> {
        let data = serde_json::to_vec_pretty(doc)?;
        std::fs::write(self.path(doc.id), data)?;
        Ok(())
    }

    /// Create a new document owned by `owner_id`, optionally under a parent.
    ///
    /// An empty title falls back to the placeholder. The parent edge is
    /// stored as given; callers pick parents from their own listings.
    pub fn insert(
        &mut self,
        title: String,
        owner_id: String,
        parent_id: Option<Uuid>,
    ) -> Result<Uuid, DocStoreError> {
        if owner_id.is_empty() {
            return Err(DocStoreError::Unauthenticated);
        }
        let id = Uuid::new_v4();
        let doc = Document::new(id, title, owner_id, parent_id);
        self.save(&doc)?;
        self.docs.insert(id, doc);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Document> {
        self.docs.get(&id)
    }

    /// All documents of `owner_id` whose parent edge equals `parent_id`,
    /// most recent first. `None` matches root documents.
    pub fn list_children(&self, owner_id: &str, parent_id: Option<Uuid>) -> Vec<&Document> {
        let mut out: Vec<&Document> = self
            .docs
            .values()
            .filter(|d| d.owner_id == owner_id && d.parent_id == parent_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// All documents of `owner_id`, most recent first.
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<&Document> {
        let mut out: Vec<&Document> = self
            .docs
            .values()
            .filter(|d| d.owner_id == owner_id)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Unarchived children of `parent_id`: the sidebar listing.
    pub fn sidebar(&self, owner_id: &str, parent_id: Option<Uuid>) -> Vec<&Document> {
        let mut out = self.list_children(owner_id, parent_id);
        out.retain(|d| !d.is_archived);
        out
    }

    /// Archived documents of `owner_id`: the trash listing.
    pub fn trash(&self, owner_id: &str) -> Vec<&Document> {
        let mut out = self.list_by_owner(owner_id);
        out.retain(|d| d.is_archived);
        out
    }

    /// Unarchived documents of `owner_id`, the command palette's source list.
    pub fn search(&self, owner_id: &str) -> Vec<&Document> {
        let mut out = self.list_by_owner(owner_id);
        out.retain(|d| !d.is_archived);
        out
    }

    /// Apply a partial update and return the updated record.
    pub fn patch(&mut self, id: Uuid, patch: DocumentPatch) -> Result<Document, DocStoreError> {
        let doc = self.docs.get_mut(&id).ok_or(DocStoreError::NotFound(id))?;
        if let Some(title) = patch.title {
            doc.title = if title.is_empty() {
                UNTITLED.to_string()
            } else {
                title
            };
        }
        if let Some(content) = patch.content {
            doc.content = Some(content);
        }
        if let Some(icon) = patch.icon {
            doc.icon = Some(icon);
        }
        if let Some(cover) = patch.cover_image {
            doc.cover_image = Some(cover);
        }
        if let Some(published) = patch.is_published {
            doc.is_published = published;
        }
        if let Some(archived) = patch.is_archived {
            doc.is_archived = archived;
        }
        if patch.detach_parent {
            doc.parent_id = None;
        }
        doc.updated_at = Utc::now();
        let updated = doc.clone();
        self.save(&updated)?;
        Ok(updated)
    }

    /// Clear the icon and return the updated record.
    pub fn remove_icon(&mut self, id: Uuid) -> Result<Document, DocStoreError> {
        let doc = self.docs.get_mut(&id).ok_or(DocStoreError::NotFound(id))?;
        doc.icon = None;
        doc.updated_at = Utc::now();
        let updated = doc.clone();
        self.save(&updated)?;
        Ok(updated)
    }

    /// Clear the cover image and return the updated record.
    pub fn remove_cover_image(&mut self, id: Uuid) -> Result<Document, DocStoreError> {
        let doc = self.docs.get_mut(&id).ok_or(DocStoreError::NotFound(id))?;
        doc.cover_image = None;
        doc.updated_at = Utc::now();
        let updated = doc.clone();
        self.save(&updated)?;
        Ok(updated)
    }

    /// Remove exactly one record and its file. Descendants are not touched;
    /// tree-wide removal is the cascade engine's job.
    pub fn delete(&mut self, id: Uuid) -> Result<(), DocStoreError> {
        if self.docs.remove(&id).is_none() {
            return Err(DocStoreError::NotFound(id));
        }
        match std::fs::remove_file(self.path(id)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
