use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::{ManifestEntry, ManifestFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub source_url: String,
    /// `None` for records carried over from the legacy URL-list manifest.
    pub filename: Option<String>,
    pub timestamp: String,
}

/// Ingested articles keyed by source URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: BTreeMap<String, ArticleRecord>,
}

impl Manifest {
    pub fn get(&self, url: &str) -> Option<&ArticleRecord> {
        self.records.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.records.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.records.values()
    }

    pub fn insert(&mut self, record: ArticleRecord) {
        self.records.insert(record.source_url.clone(), record);
    }

    pub fn remove(&mut self, url: &str) -> Option<ArticleRecord> {
        self.records.remove(url)
    }

    fn from_file(file: ManifestFile) -> Self {
        let mut manifest = Self::default();
        for url in file.urls {
            manifest.insert(ArticleRecord {
                source_url: url,
                filename: None,
                timestamp: String::new(),
            });
        }
        // Current-shape entries win over legacy ones for the same URL.
        for (url, entry) in file.articles {
            manifest.insert(ArticleRecord {
                source_url: url,
                filename: entry.filename,
                timestamp: entry.timestamp,
            });
        }
        manifest
    }

    fn to_file(&self) -> ManifestFile {
        ManifestFile {
            urls: Vec::new(),
            articles: self
                .records
                .values()
                .map(|r| {
                    (
                        r.source_url.clone(),
                        ManifestEntry {
                            filename: r.filename.clone(),
                            timestamp: r.timestamp.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Where an article's Markdown file lives, as far as we can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResolution {
    Resolved(String),
    NotFound,
}

impl FileResolution {
    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Resolved(name) => Some(name.as_str()),
            Self::NotFound => None,
        }
    }
}

/// Recorded filename, else the first Markdown file (by name) that mentions the URL.
pub fn resolve_filename(record: &ArticleRecord, output_dir: &Path) -> FileResolution {
    if let Some(filename) = record.filename.as_deref() {
        return FileResolution::Resolved(filename.to_owned());
    }

    match find_file_mentioning(output_dir, &record.source_url) {
        Ok(Some(name)) => FileResolution::Resolved(name),
        Ok(None) => FileResolution::NotFound,
        Err(err) => {
            tracing::warn!(url = %record.source_url, err = format!("{err:#}"), "content scan failed");
            FileResolution::NotFound
        }
    }
}

fn find_file_mentioning(output_dir: &Path, url: &str) -> anyhow::Result<Option<String>> {
    for path in crate::file_store::markdown_files(output_dir)? {
        let contents = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                tracing::debug!(path = %path.display(), ?err, "skip unreadable markdown file");
                continue;
            }
        };
        if contents.contains(url) {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("non-utf8 file name: {}", path.display()))?;
            return Ok(Some(name.to_owned()));
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub total: usize,
    pub resolved: Vec<(String, String)>,
    pub unresolved: Vec<String>,
}

/// Persisted URL → article mapping. Single writer; every update rewrites the file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable manifest is treated as empty.
    pub fn load(&self) -> Manifest {
        if !self.path.exists() {
            return Manifest::default();
        }
        match self.read_file() {
            Ok(file) => Manifest::from_file(file),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    err = format!("{err:#}"),
                    "manifest unreadable; starting from an empty manifest"
                );
                Manifest::default()
            }
        }
    }

    fn read_file(&self) -> anyhow::Result<ManifestFile> {
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read manifest: {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(ManifestFile::default());
        }
        serde_json::from_str(&contents).context("parse manifest json")
    }

    pub fn persist(&self, manifest: &Manifest) -> anyhow::Result<()> {
        let mut json =
            serde_json::to_string_pretty(&manifest.to_file()).context("serialize manifest")?;
        json.push('\n');
        crate::file_store::write_atomic(&self.path, json.as_bytes())
            .with_context(|| format!("write manifest: {}", self.path.display()))
    }

    pub fn upsert(&self, url: &str, filename: &str) -> anyhow::Result<()> {
        let mut manifest = self.load();
        manifest.insert(ArticleRecord {
            source_url: url.to_owned(),
            filename: Some(filename.to_owned()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        self.persist(&manifest)
    }

    /// Returns whether a record was present.
    pub fn remove(&self, url: &str) -> anyhow::Result<bool> {
        let mut manifest = self.load();
        let removed = manifest.remove(url).is_some();
        self.persist(&manifest)?;
        Ok(removed)
    }

    /// Rewrites the manifest in the current shape, filling in filenames of
    /// legacy records from the output directory where possible.
    pub fn migrate(&self, output_dir: &Path) -> anyhow::Result<MigrationReport> {
        let mut manifest = self.load();
        let mut report = MigrationReport {
            total: manifest.len(),
            ..MigrationReport::default()
        };

        let legacy: Vec<ArticleRecord> = manifest
            .records()
            .filter(|r| r.filename.is_none())
            .cloned()
            .collect();
        for mut record in legacy {
            match resolve_filename(&record, output_dir) {
                FileResolution::Resolved(name) => {
                    tracing::info!(url = %record.source_url, filename = %name, "resolved legacy record");
                    report.resolved.push((record.source_url.clone(), name.clone()));
                    record.filename = Some(name);
                    manifest.insert(record);
                }
                FileResolution::NotFound => {
                    tracing::warn!(url = %record.source_url, "no markdown file mentions legacy url");
                    report.unresolved.push(record.source_url);
                }
            }
        }

        self.persist(&manifest)?;
        Ok(report)
    }
}
