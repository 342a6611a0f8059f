//! Builders for the Drive `q` search parameter
//!
//! String literals in a query are single-quoted; quotes and backslashes
//! inside them must be escaped with a backslash.

use chrono::{DateTime, SecondsFormat, Utc};
use drivemirror_core::{domain::FOLDER_MIME_TYPE, ports::ListScope};

/// Escapes a value for use inside a single-quoted query literal
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `'<folder>' in parents and trashed = false`
pub fn children_of(folder_id: &str) -> String {
    format!("'{}' in parents and trashed = false", escape(folder_id))
}

/// Children of a folder modified strictly after `since`
///
/// With `include_folders`, sub-folders match regardless of their modified
/// time.
pub fn children_modified_since(
    folder_id: &str,
    since: DateTime<Utc>,
    include_folders: bool,
) -> String {
    let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
    let modified = format!("modifiedTime > '{since}'");
    let filter = if include_folders {
        format!("(mimeType = '{FOLDER_MIME_TYPE}' or {modified})")
    } else {
        modified
    };
    format!("{} and {filter}", children_of(folder_id))
}

/// The `q` parameter for a listing scope (None lists everything)
pub fn for_scope(scope: &ListScope) -> Option<String> {
    match scope {
        ListScope::WholeDrive => None,
        ListScope::ChildrenOf { folder_id } => Some(children_of(folder_id.as_str())),
        ListScope::ChildrenModifiedSince {
            folder_id,
            since,
            include_folders,
        } => Some(children_modified_since(
            folder_id.as_str(),
            *since,
            *include_folders,
        )),
    }
}
