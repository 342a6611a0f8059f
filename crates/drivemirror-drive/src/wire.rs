//! Drive v3 JSON shapes
//!
//! Only the fields the mirror requests are modeled. Everything is optional
//! on the wire; validation happens later in `RemoteFile::into_record`.

use drivemirror_core::ports::{RemoteChange, RemoteFile};
use serde::Deserialize;

/// Fields requested for every file resource
pub(crate) const FILE_FIELDS: &str = "id,name,mimeType,size,md5Checksum,parents,modifiedTime,\
shortcutDetails/targetId,trashed,ownedByMe,owners/emailAddress";

pub(crate) fn file_list_fields() -> String {
    format!("nextPageToken,files({FILE_FIELDS})")
}

pub(crate) fn change_list_fields() -> String {
    format!("nextPageToken,newStartPageToken,changes(changeType,fileId,removed,file({FILE_FIELDS}))")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriveFile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub size: Option<String>,
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    pub modified_time: Option<String>,
    pub shortcut_details: Option<ShortcutDetails>,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub owned_by_me: bool,
    #[serde(default)]
    pub owners: Vec<Owner>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ShortcutDetails {
    pub target_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Owner {
    pub email_address: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(file: DriveFile) -> Self {
        let owner_email = file
            .owners
            .into_iter()
            .find_map(|owner| owner.email_address);
        RemoteFile {
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
            size: file.size,
            md5_checksum: file.md5_checksum,
            parents: file.parents,
            modified_time: file.modified_time,
            shortcut_target_id: file.shortcut_details.and_then(|s| s.target_id),
            trashed: file.trashed,
            owned_by_me: file.owned_by_me,
            owner_email,
        }
    }
}

/// Response of `GET /files`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriveChange {
    /// "file" or "drive"; shared-drive changes carry no file
    pub change_type: Option<String>,
    pub file_id: Option<String>,
    #[serde(default)]
    pub removed: bool,
    pub file: Option<DriveFile>,
}

impl DriveChange {
    /// Maps the wire change to a feed entry; drive-level changes yield None
    pub(crate) fn into_remote(self) -> Option<RemoteChange> {
        if self.change_type.as_deref() == Some("drive") {
            return None;
        }
        match (self.removed, self.file) {
            (false, Some(file)) => Some(RemoteChange::Upserted(file.into())),
            (_, file) => {
                let file_id = self
                    .file_id
                    .or_else(|| file.map(|f| f.id))
                    .filter(|id| !id.is_empty())?;
                Some(RemoteChange::Removed { file_id })
            }
        }
    }
}

/// Response of `GET /changes`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangeList {
    #[serde(default)]
    pub changes: Vec<DriveChange>,
    pub next_page_token: Option<String>,
    pub new_start_page_token: Option<String>,
}

/// Response of `GET /changes/startPageToken`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartPageToken {
    pub start_page_token: String,
}

/// Google JSON error envelope
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorItem {
    #[serde(default)]
    pub reason: String,
}

impl ErrorEnvelope {
    /// First non-empty reason, if any
    pub(crate) fn reason(&self) -> Option<&str> {
        self.error
            .errors
            .iter()
            .map(|e| e.reason.as_str())
            .find(|r| !r.is_empty())
    }
}
