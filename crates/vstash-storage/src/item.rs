//! Listing and stat projections of the storage tree.

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vstash_path::CanonicalPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    // Declaration order is listing order: folders before files.
    Folder,
    File,
}

/// A file or directory under the storage root, read fresh from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageItem {
    pub name: String,
    pub kind: ItemKind,
    pub relative_path: CanonicalPath,
    /// Byte length; files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub last_modified: DateTime<Utc>,
}

impl StorageItem {
    pub(crate) fn from_metadata(path: CanonicalPath, meta: &Metadata) -> Self {
        let (kind, size) = if meta.is_dir() {
            (ItemKind::Folder, None)
        } else {
            (ItemKind::File, Some(meta.len()))
        };
        Self {
            name: path.file_name().unwrap_or_default().to_string(),
            kind,
            relative_path: path,
            size,
            last_modified: DateTime::from(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstash_path::canonicalize;

    #[test]
    fn test_json_shape() {
        let item = StorageItem {
            name: "a.txt".into(),
            kind: ItemKind::File,
            relative_path: canonicalize("docs/a.txt").unwrap(),
            size: Some(3),
            last_modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["relativePath"], "docs/a.txt");
        assert_eq!(json["size"], 3);
        assert!(json["lastModified"].as_str().unwrap().starts_with("2023-11-14"));
    }

    #[test]
    fn test_folder_has_no_size() {
        let item = StorageItem {
            name: "docs".into(),
            kind: ItemKind::Folder,
            relative_path: canonicalize("docs").unwrap(),
            size: None,
            last_modified: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "folder");
        assert!(json.get("size").is_none());
    }

    #[test]
    fn test_folders_order_first() {
        assert!(ItemKind::Folder < ItemKind::File);
    }
}
