use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;

/// Replaces `path` with `contents` via a temp file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("create parent dir: {}", parent_dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("create temp file in {}", parent_dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("flush temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;

    Ok(())
}

/// Lists `*.md` files directly under `dir`, sorted by name.
pub fn markdown_files(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read dir: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_existing_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("nested").join("state.json");

        write_atomic(&path, b"first")?;
        write_atomic(&path, b"second")?;

        assert_eq!(std::fs::read_to_string(&path)?, "second");
        let leftovers = std::fs::read_dir(temp.path().join("nested"))?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn markdown_files_are_sorted_and_filtered() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        for name in ["010.md", "002.md", "a.txt"] {
            std::fs::write(temp.path().join(name), "")?;
        }
        std::fs::create_dir(temp.path().join("images.md"))?;

        let names: Vec<String> = markdown_files(temp.path())?
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["002.md", "010.md"]);
        Ok(())
    }
}
