use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;

/// URLs requested by the desired-source file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredUrls {
    pub ingest: Vec<String>,
    pub delete: Vec<String>,
}

impl DesiredUrls {
    pub fn is_empty(&self) -> bool {
        self.ingest.is_empty() && self.delete.is_empty()
    }
}

/// Reads the desired-source file. `Ok(None)` when it does not exist.
pub fn load(
    path: &Path,
    comment_marker: &str,
    delete_marker: &str,
) -> anyhow::Result<Option<DesiredUrls>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read desired source: {}", path.display()))?;
    Ok(Some(parse(&contents, comment_marker, delete_marker)))
}

pub fn parse(contents: &str, comment_marker: &str, delete_marker: &str) -> DesiredUrls {
    let mut out = DesiredUrls::default();
    let mut seen_ingest = HashSet::new();
    let mut seen_delete = HashSet::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !comment_marker.is_empty() && line.starts_with(comment_marker) {
            continue;
        }

        if !delete_marker.is_empty()
            && let Some(rest) = line.strip_prefix(delete_marker)
        {
            let url = rest.trim();
            if url.is_empty() {
                tracing::warn!(line, "delete marker without url; ignoring");
                continue;
            }
            if seen_delete.insert(url.to_owned()) {
                out.delete.push(url.to_owned());
            }
            continue;
        }

        if seen_ingest.insert(line.to_owned()) {
            out.ingest.push(line.to_owned());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_ingest_and_delete_lines() {
        let contents = "\
# weekly picks
https://a.example/1

-https://a.example/2
- https://a.example/3
https://a.example/4
";
        let urls = parse(contents, "#", "-");
        assert_eq!(urls.ingest, vec!["https://a.example/1", "https://a.example/4"]);
        assert_eq!(urls.delete, vec!["https://a.example/2", "https://a.example/3"]);
    }

    #[test]
    fn parse_keeps_first_occurrence_of_duplicates() {
        let urls = parse("https://b\nhttps://a\nhttps://b\n", "#", "-");
        assert_eq!(urls.ingest, vec!["https://b", "https://a"]);
    }

    #[test]
    fn parse_honors_custom_markers() {
        let urls = parse("// note\nDEL https://x\nhttps://y\n", "//", "DEL ");
        assert_eq!(urls.ingest, vec!["https://y"]);
        assert_eq!(urls.delete, vec!["https://x"]);
    }

    #[test]
    fn parse_ignores_bare_delete_marker() {
        let urls = parse("-\n  -   \n", "#", "-");
        assert!(urls.is_empty());
    }

    #[test]
    fn load_returns_none_for_missing_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        assert_eq!(load(&temp.path().join("articles.txt"), "#", "-")?, None);
        Ok(())
    }
}
