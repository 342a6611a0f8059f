//! Mirrored file metadata record
//!
//! A `FileRecord` is the local copy of one remote file's metadata as seen
//! by one account. The same remote file visible to two accounts is stored
//! twice, keyed by (file id, account key).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::FileId;

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type Drive uses for shortcuts
pub const SHORTCUT_MIME_TYPE: &str = "application/vnd.google-apps.shortcut";

/// Metadata of a single remote file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    id: FileId,
    name: String,
    mime_type: String,
    size: u64,
    content_hash: Option<String>,
    parents: Vec<FileId>,
    modified_time: DateTime<Utc>,
    is_shortcut: bool,
    shortcut_target_id: Option<FileId>,
    trashed: bool,
    owned_by_me: bool,
    owner_email: Option<String>,
}

impl FileRecord {
    /// Creates a record with the mandatory fields; everything else defaults
    /// (size 0, no hash, no parents, not trashed, not owned)
    pub fn new(
        id: FileId,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        modified_time: DateTime<Utc>,
    ) -> Self {
        let mime_type = mime_type.into();
        Self {
            id,
            name: name.into(),
            is_shortcut: mime_type == SHORTCUT_MIME_TYPE,
            mime_type,
            size: 0,
            content_hash: None,
            parents: Vec::new(),
            modified_time,
            shortcut_target_id: None,
            trashed: false,
            owned_by_me: false,
            owner_email: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_content_hash(mut self, hash: Option<String>) -> Self {
        self.content_hash = hash.filter(|h| !h.is_empty());
        self
    }

    pub fn with_parents(mut self, parents: Vec<FileId>) -> Self {
        self.parents = parents;
        self
    }

    /// Marks the record as a shortcut pointing at `target`
    pub fn with_shortcut_target(mut self, target: Option<FileId>) -> Self {
        if target.is_some() {
            self.is_shortcut = true;
        }
        self.shortcut_target_id = target;
        self
    }

    pub fn with_trashed(mut self, trashed: bool) -> Self {
        self.trashed = trashed;
        self
    }

    pub fn with_ownership(mut self, owned_by_me: bool, owner_email: Option<String>) -> Self {
        self.owned_by_me = owned_by_me;
        self.owner_email = owner_email;
        self
    }

    // --- Getters ---

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes; 0 for folders and native Google documents
    pub fn size(&self) -> u64 {
        self.size
    }

    /// MD5 checksum reported by Drive, if any
    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    /// All parents, in the order Drive reported them
    pub fn parents(&self) -> &[FileId] {
        &self.parents
    }

    /// The parent used for virtual-path construction
    pub fn primary_parent(&self) -> Option<&FileId> {
        self.parents.first()
    }

    pub fn modified_time(&self) -> DateTime<Utc> {
        self.modified_time
    }

    pub fn is_shortcut(&self) -> bool {
        self.is_shortcut
    }

    pub fn shortcut_target_id(&self) -> Option<&FileId> {
        self.shortcut_target_id.as_ref()
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed
    }

    pub fn is_owned_by_me(&self) -> bool {
        self.owned_by_me
    }

    pub fn owner_email(&self) -> Option<&str> {
        self.owner_email.as_deref()
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}
