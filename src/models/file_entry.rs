use std::fs::Metadata;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only projection of one directory entry, rebuilt on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub extension: Option<String>,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileSystemEntry {
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let is_directory = metadata.is_dir();
        let extension = if is_directory {
            None
        } else {
            extension_of(&name)
        };
        Self {
            name,
            path: path.to_string_lossy().to_string(),
            is_directory,
            extension,
            size_bytes: (!is_directory).then(|| metadata.len()),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

/// Lower-cased extension of a file name, if it has one.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}
