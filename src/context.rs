use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::SyncArgs;

/// Everything a sync run needs to know about its environment.
///
/// Built once from the command line and passed by reference through every
/// phase, so tests can point a run at a temporary directory.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub nav_path: PathBuf,
    pub delete_marker: String,
    pub comment_marker: String,
    pub page_delay: Duration,
    pub http_timeout: Duration,
}

impl SyncContext {
    /// Context rooted at `root` with the conventional file names.
    pub fn rooted_at(root: &Path) -> Self {
        let output_dir = root.join("markdown");
        Self {
            source_path: root.join("articles.txt"),
            images_dir: output_dir.join("images"),
            output_dir,
            manifest_path: root.join("downloaded.json"),
            nav_path: root.join("mkdocs.yml"),
            delete_marker: "-".to_owned(),
            comment_marker: "#".to_owned(),
            page_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(15),
        }
    }

    pub fn from_args(args: &SyncArgs) -> Self {
        let output_dir = PathBuf::from(&args.output_dir);
        Self {
            source_path: PathBuf::from(&args.source),
            images_dir: output_dir.join("images"),
            output_dir,
            manifest_path: PathBuf::from(&args.manifest),
            nav_path: PathBuf::from(&args.nav),
            delete_marker: args.delete_marker.clone(),
            comment_marker: args.comment_marker.clone(),
            page_delay: Duration::from_millis(args.page_delay_ms),
            http_timeout: Duration::from_secs(args.timeout_secs),
        }
    }

    pub fn article_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(filename)
    }

    pub fn asset_group_dir(&self, group_id: &str) -> PathBuf {
        self.images_dir.join(group_id)
    }

    /// Directory of an asset group as linked from a Markdown file:
    /// relative to `output_dir` and `/`-separated.
    pub fn image_link_dir(&self, group_id: &str) -> String {
        let images = self
            .images_dir
            .strip_prefix(&self.output_dir)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|_| "images".to_owned());
        format!("{images}/{group_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_links_are_relative_to_output_dir() {
        let ctx = SyncContext::rooted_at(Path::new("/srv/site"));
        assert_eq!(ctx.image_link_dir("Intro_1a2b3c4d"), "images/Intro_1a2b3c4d");
        assert_eq!(
            ctx.asset_group_dir("Intro_1a2b3c4d"),
            Path::new("/srv/site/markdown/images/Intro_1a2b3c4d")
        );
        assert_eq!(ctx.article_path("001.md"), Path::new("/srv/site/markdown/001.md"));
    }
}
