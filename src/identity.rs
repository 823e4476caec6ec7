use std::path::Path;

use anyhow::Context as _;
use md5::{Digest as _, Md5};

const DEFAULT_TITLE_SLUG: &str = "article";
const URL_HASH_LEN: usize = 8;

/// One more than the largest integer file stem in `output_dir`, or 1.
///
/// Gaps left by deleted files are never reused.
pub fn next_sequence_number(output_dir: &Path) -> anyhow::Result<u32> {
    if !output_dir.exists() {
        return Ok(1);
    }

    let mut max_seen = 0_u32;
    for entry in std::fs::read_dir(output_dir)
        .with_context(|| format!("read output dir: {}", output_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(n) = stem.parse::<u32>() {
            max_seen = max_seen.max(n);
        }
    }

    max_seen
        .checked_add(1)
        .ok_or_else(|| anyhow::anyhow!("article sequence exhausted in {}", output_dir.display()))
}

pub fn article_filename(sequence: u32) -> String {
    format!("{sequence:03}.md")
}

pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let slug = kept.trim().replace(' ', "_");
    if slug.is_empty() {
        DEFAULT_TITLE_SLUG.to_owned()
    } else {
        slug
    }
}

pub fn url_hash(url: &str) -> String {
    let digest = Md5::digest(url.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(URL_HASH_LEN);
    hash
}

/// Directory name for an article's images: `<sanitized title>_<url hash>`.
pub fn derive_asset_group_id(title: &str, url: &str) -> String {
    format!("{}_{}", sanitize_title(title), url_hash(url))
}

pub fn asset_group_suffix(url: &str) -> String {
    format!("_{}", url_hash(url))
}
