//! Isolation keys: the namespace that scopes every node and edge of one upload.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace tag for one upload (or one top-level folder of an upload).
///
/// Keys are compared verbatim. Two graphs assembled under different keys
/// never share a node, even when their local ids are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsolationKey(String);

impl IsolationKey {
    /// Wrap an existing key, e.g. one supplied by a caller to `clear` or `stats`.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Mint a fresh key for an upload named `source_name`.
    pub fn mint(source_name: &str) -> Self {
        Self::mint_at(source_name, Utc::now())
    }

    /// Mint a fresh key with an explicit timestamp.
    ///
    /// The random suffix keeps two uploads of the same archive within the same
    /// second apart.
    pub fn mint_at(source_name: &str, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "Folder_{}_{}_{}",
            sanitize(source_name),
            at.format("%Y%m%d%H%M%S"),
            &suffix[..8]
        ))
    }

    /// Derive a child key for one top-level folder of an upload.
    pub fn child(&self, folder: &str) -> Self {
        Self(format!("{}__{}", self.0, sanitize(folder)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IsolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IsolationKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How the files of one archive are split into isolation scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationGranularity {
    /// Every `.iflw` in the archive shares one key.
    #[default]
    PerUpload,
    /// Each top-level directory inside the archive gets its own key.
    PerTopLevelFolder,
}

impl IsolationGranularity {
    /// Parse from string (case-insensitive). Unknown values fall back to per-upload.
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "folder" | "per_folder" | "per_top_level_folder" | "top_level_folder" => {
                Self::PerTopLevelFolder
            }
            _ => Self::PerUpload,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerUpload => "upload",
            Self::PerTopLevelFolder => "folder",
        }
    }
}

/// Reduce a display name to `[A-Za-z0-9_]`, collapsing separators to `_`.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if matches!(c, ' ' | '.' | '-' | '_' | '/') && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "iFlow".to_string()
    } else {
        trimmed.to_string()
    }
}
