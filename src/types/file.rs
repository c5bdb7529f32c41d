//! Attachment records.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A file produced or referenced by the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filepath: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
}

impl FileRecord {
    /// Build a record for a path, deriving name, extension and MIME type.
    pub fn from_path(filepath: impl Into<String>) -> Self {
        let filepath = filepath.into();
        let path = Path::new(&filepath);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let mime_type = mime_for_extension(&extension).to_string();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            filepath,
            key: String::new(),
            extension,
            mime_type,
            size: 0,
        }
    }
}

fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
