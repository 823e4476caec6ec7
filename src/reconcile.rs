//! Brings the output directory, manifest and navigation in line with the
//! desired-source list.
//!
//! A run has four phases, always in this order: delete, prune navigation,
//! ingest, extend navigation. Failures of a single article are logged and
//! recorded in the [`RunSummary`]; they never stop the run.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path};

use anyhow::Context as _;
use url::Url;

use crate::context::SyncContext;
use crate::fetch::ArticleFetcher;
use crate::identity;
use crate::images::ImageDownloader;
use crate::manifest::{ArticleRecord, FileResolution, ManifestStore};
use crate::nav::NavigationIndex;
use crate::source::DesiredUrls;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedArticle {
    pub url: String,
    pub filename: Option<String>,
    pub removed_asset_groups: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedArticle {
    pub url: String,
    pub filename: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedArticle {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub deleted: Vec<DeletedArticle>,
    /// Delete requests for URLs the manifest does not know.
    pub skipped_deletions: Vec<String>,
    pub added: Vec<AddedArticle>,
    pub failed: Vec<FailedArticle>,
}

impl RunSummary {
    pub fn changed(&self) -> bool {
        !self.deleted.is_empty() || !self.added.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct Reconciler<'a> {
    ctx: &'a SyncContext,
    store: ManifestStore,
    fetcher: &'a mut dyn ArticleFetcher,
    images: &'a dyn ImageDownloader,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        ctx: &'a SyncContext,
        fetcher: &'a mut dyn ArticleFetcher,
        images: &'a dyn ImageDownloader,
    ) -> Self {
        Self {
            ctx,
            store: ManifestStore::new(&ctx.manifest_path),
            fetcher,
            images,
        }
    }

    pub fn run(&mut self, desired: &DesiredUrls) -> anyhow::Result<RunSummary> {
        std::fs::create_dir_all(&self.ctx.output_dir).with_context(|| {
            format!("create output dir: {}", self.ctx.output_dir.display())
        })?;

        let mut summary = RunSummary::default();

        self.delete_requested(&desired.delete, &mut summary);
        if !summary.deleted.is_empty() {
            self.prune_navigation(&summary.deleted);
        }

        self.ingest_new(&desired.ingest, &mut summary);
        if !summary.added.is_empty() {
            self.extend_navigation(&summary.added);
        }

        tracing::info!(
            deleted = summary.deleted.len(),
            added = summary.added.len(),
            failed = summary.failed.len(),
            "reconciliation finished"
        );
        Ok(summary)
    }

    fn delete_requested(&self, urls: &[String], summary: &mut RunSummary) {
        if urls.is_empty() {
            return;
        }
        let manifest = self.store.load();
        tracing::info!(count = urls.len(), "processing delete requests");

        for url in urls {
            let Some(record) = manifest.get(url) else {
                tracing::warn!(%url, "delete requested for unknown url; skipping");
                summary.skipped_deletions.push(url.clone());
                continue;
            };
            match self.delete_article(record) {
                Ok(deleted) => summary.deleted.push(deleted),
                Err(err) => {
                    tracing::error!(%url, err = format!("{err:#}"), "delete failed");
                    summary.failed.push(FailedArticle {
                        url: url.clone(),
                        error: format!("{err:#}"),
                    });
                }
            }
        }
    }

    fn delete_article(&self, record: &ArticleRecord) -> anyhow::Result<DeletedArticle> {
        let url = &record.source_url;
        let resolution = crate::manifest::resolve_filename(record, &self.ctx.output_dir);
        match &resolution {
            FileResolution::Resolved(filename) if !is_plain_file_name(filename) => {
                tracing::warn!(%url, file = %filename, "recorded filename is not a plain file name; leaving it");
            }
            FileResolution::Resolved(filename) => {
                let path = self.ctx.article_path(filename);
                if path.is_file() {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("remove article: {}", path.display()))?;
                    tracing::info!(%url, file = %filename, "article file removed");
                } else {
                    tracing::warn!(%url, file = %filename, "article file already gone");
                }
            }
            FileResolution::NotFound => {
                tracing::warn!(%url, "no article file found for url");
            }
        }

        let removed_asset_groups = remove_asset_groups(&self.ctx.images_dir, url)?;
        self.store.remove(url)?;

        Ok(DeletedArticle {
            url: url.clone(),
            filename: resolution.filename().map(str::to_owned),
            removed_asset_groups,
        })
    }

    fn prune_navigation(&self, deleted: &[DeletedArticle]) {
        let filenames: HashSet<&str> = deleted
            .iter()
            .filter_map(|d| d.filename.as_deref())
            .collect();
        if filenames.is_empty() {
            return;
        }

        let mut nav = NavigationIndex::load(&self.ctx.nav_path);
        let removed = nav.prune_pages(|path| filenames.contains(path));
        if removed == 0 {
            return;
        }
        match nav.persist() {
            Ok(()) => tracing::info!(removed, "navigation pruned"),
            Err(err) => tracing::error!(err = format!("{err:#}"), "persist pruned navigation failed"),
        }
    }

    fn ingest_new(&mut self, urls: &[String], summary: &mut RunSummary) {
        let manifest = self.store.load();
        let to_process: Vec<&String> = urls.iter().filter(|u| !manifest.contains(u)).collect();
        tracing::info!(
            known = manifest.len(),
            pending = to_process.len(),
            "ingest plan"
        );

        let total = to_process.len();
        for (idx, url) in to_process.into_iter().enumerate() {
            tracing::info!(%url, n = idx + 1, total, "ingest article");
            match self.ingest_article(url) {
                Ok(added) => {
                    tracing::info!(%url, file = %added.filename, title = %added.title, "article saved");
                    summary.added.push(added);
                }
                Err(err) => {
                    tracing::error!(%url, err = format!("{err:#}"), "article failed");
                    summary.failed.push(FailedArticle {
                        url: url.clone(),
                        error: format!("{err:#}"),
                    });
                }
            }
        }
    }

    fn ingest_article(&mut self, url: &str) -> anyhow::Result<AddedArticle> {
        let article = self.fetcher.fetch(url).context("fetch article")?;

        let group_id = identity::derive_asset_group_id(&article.title, url);
        let page_url = Url::parse(url).ok();
        let localized = crate::images::localize_images(
            &article.content_html,
            page_url.as_ref(),
            &self.ctx.asset_group_dir(&group_id),
            &self.ctx.image_link_dir(&group_id),
            self.images,
        )
        .context("localize images")?;
        if localized.failed > 0 {
            tracing::warn!(%url, failed = localized.failed, saved = localized.saved, "some images were not saved");
        }

        let body = crate::markdown::html_to_markdown(&localized.html);
        let contents = crate::markdown::render_article(&article.title, &body);

        let sequence = identity::next_sequence_number(&self.ctx.output_dir)?;
        let filename = identity::article_filename(sequence);
        let path = self.ctx.article_path(&filename);
        write_new_file(&path, &contents)?;

        if let Err(err) = self.store.upsert(url, &filename) {
            let _ = std::fs::remove_file(&path);
            return Err(err.context("record article in manifest"));
        }

        Ok(AddedArticle {
            url: url.to_owned(),
            filename,
            title: article.title,
        })
    }

    fn extend_navigation(&self, added: &[AddedArticle]) {
        let mut nav = NavigationIndex::load(&self.ctx.nav_path);
        let mut inserted = 0_usize;
        for article in added {
            if nav.insert(&article.title, &article.filename) {
                tracing::info!(title = %article.title, file = %article.filename, "added to navigation");
                inserted += 1;
            }
        }
        if inserted == 0 {
            return;
        }
        if let Err(err) = nav.persist() {
            tracing::error!(err = format!("{err:#}"), "persist navigation failed");
        }
    }
}

/// Removes every directory in `images_dir` named `*_<hash(url)>`.
fn remove_asset_groups(images_dir: &Path, url: &str) -> anyhow::Result<usize> {
    if !images_dir.is_dir() {
        return Ok(0);
    }
    let suffix = identity::asset_group_suffix(url);
    let mut removed = 0_usize;
    for entry in std::fs::read_dir(images_dir)
        .with_context(|| format!("read images dir: {}", images_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if !name.to_string_lossy().ends_with(&suffix) {
            continue;
        }
        let path = entry.path();
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("remove image dir: {}", path.display()))?;
        tracing::info!(dir = %path.display(), "image directory removed");
        removed += 1;
    }
    Ok(removed)
}

/// A single normal path component: no directories, no `..`, not absolute.
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn write_new_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    create_new_with(path, |file| {
        file.write_all(contents.as_bytes())?;
        file.flush()
    })
}

/// Creates `path` (never clobbering) and fills it; a partial file is removed
/// again when filling fails.
fn create_new_with(
    path: &Path,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .with_context(|| format!("create article: {}", path.display()))?;
    if let Err(err) = fill(&mut file) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(anyhow::Error::new(err).context(format!("write article: {}", path.display())));
    }
    Ok(())
}
