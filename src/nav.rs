use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_yaml::{Mapping, Value};

const NAV_KEY: &str = "nav";

#[derive(Debug, Clone, PartialEq)]
pub enum NavEntry {
    /// `- Title: path.md`
    Page { title: String, path: String },
    /// Anything else (sections, bare paths); written back as read.
    Other(Value),
}

impl NavEntry {
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Page { path, .. } => Some(path.as_str()),
            Self::Other(_) => None,
        }
    }

    fn from_value(value: Value) -> Self {
        if let Value::Mapping(map) = &value
            && map.len() == 1
            && let Some((Value::String(title), Value::String(path))) = map.iter().next()
        {
            return Self::Page {
                title: title.clone(),
                path: path.clone(),
            };
        }
        Self::Other(value)
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Page { title, path } => {
                let mut map = Mapping::new();
                map.insert(Value::String(title.clone()), Value::String(path.clone()));
                Value::Mapping(map)
            }
            Self::Other(value) => value.clone(),
        }
    }
}

/// The `nav` list of an MkDocs config, with the rest of the config kept intact.
///
/// Entry 0 is the site's home page and is never removed.
#[derive(Debug, Clone)]
pub struct NavigationIndex {
    path: PathBuf,
    document: Mapping,
    entries: Vec<NavEntry>,
    writable: bool,
}

impl NavigationIndex {
    /// Never fails. A missing or empty file yields an empty index; an
    /// unparsable one yields an empty index that refuses to overwrite the file.
    pub fn load(path: &Path) -> Self {
        let mut index = Self {
            path: path.to_path_buf(),
            document: Mapping::new(),
            entries: Vec::new(),
            writable: true,
        };
        if !path.exists() {
            return index;
        }

        match read_document(path) {
            Ok(document) => {
                // `nav` stays in the document so persisting keeps its key position.
                if let Some(nav) = document.get(NAV_KEY).cloned() {
                    index.entries = match nav {
                        Value::Sequence(items) => {
                            items.into_iter().map(NavEntry::from_value).collect()
                        }
                        Value::Null => Vec::new(),
                        other => {
                            tracing::warn!(
                                path = %path.display(),
                                "nav is not a list; keeping it as one entry"
                            );
                            vec![NavEntry::Other(other)]
                        }
                    };
                }
                index.document = document;
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    err = format!("{err:#}"),
                    "navigation file unreadable; treating nav as empty"
                );
                index.writable = false;
            }
        }
        index
    }

    pub fn entries(&self) -> &[NavEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path() == Some(path))
    }

    /// Appends a page unless one with the same path exists. Returns whether it was added.
    pub fn insert(&mut self, title: &str, path: &str) -> bool {
        if self.contains_path(path) {
            return false;
        }
        self.entries.push(NavEntry::Page {
            title: title.to_owned(),
            path: path.to_owned(),
        });
        true
    }

    /// Removes the first page with `path`, never the home entry.
    pub fn remove_by_path(&mut self, path: &str) -> bool {
        let found = self
            .entries
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, e)| e.path() == Some(path))
            .map(|(idx, _)| idx);
        match found {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Drops every page after the home entry for which `should_drop` holds.
    /// Returns how many entries were removed.
    pub fn prune_pages(&mut self, mut should_drop: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        let mut idx = 0_usize;
        self.entries.retain(|entry| {
            let keep = idx == 0 || entry.path().is_none_or(|p| !should_drop(p));
            idx += 1;
            keep
        });
        before - self.entries.len()
    }

    pub fn persist(&self) -> anyhow::Result<()> {
        if !self.writable {
            anyhow::bail!(
                "refusing to overwrite unparsable navigation file: {}",
                self.path.display()
            );
        }

        let mut document = self.document.clone();
        document.insert(
            Value::String(NAV_KEY.to_owned()),
            Value::Sequence(self.entries.iter().map(NavEntry::to_value).collect()),
        );
        let yaml = serde_yaml::to_string(&Value::Mapping(document))
            .context("serialize navigation yaml")?;
        crate::file_store::write_atomic(&self.path, yaml.as_bytes())
            .with_context(|| format!("write navigation: {}", self.path.display()))
    }
}

fn read_document(path: &Path) -> anyhow::Result<Mapping> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read navigation: {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value = serde_yaml::from_str(&contents).context("parse navigation yaml")?;
    match value {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => anyhow::bail!("navigation file must be a mapping"),
    }
}
