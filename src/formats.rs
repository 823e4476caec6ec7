use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// On-disk manifest document.
///
/// Older manifests only carry `urls`; current ones carry `articles`. Both are
/// accepted on read, only `articles` is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default)]
    pub articles: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}
