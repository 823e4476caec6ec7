use std::path::PathBuf;

use anyhow::Context as _;

use crate::build::{BuildOutcome, CommandBuildTrigger};
use crate::cli::{ManifestMigrateArgs, SiteBuildArgs, SyncArgs};
use crate::context::SyncContext;
use crate::fetch::HttpArticleFetcher;
use crate::images::HttpImageDownloader;
use crate::manifest::ManifestStore;
use crate::reconcile::Reconciler;

pub fn run(args: SyncArgs) -> anyhow::Result<()> {
    let ctx = SyncContext::from_args(&args);
    tracing::info!(source = %ctx.source_path.display(), out = %ctx.output_dir.display(), "sync started");

    let desired = match crate::source::load(&ctx.source_path, &ctx.comment_marker, &ctx.delete_marker)
    {
        Ok(Some(desired)) if !desired.is_empty() => desired,
        Ok(Some(_)) => {
            tracing::warn!(source = %ctx.source_path.display(), "desired source lists no articles");
            return Ok(());
        }
        Ok(None) => {
            tracing::warn!(source = %ctx.source_path.display(), "desired source not found; nothing to do");
            return Ok(());
        }
        Err(err) => {
            tracing::warn!(err = format!("{err:#}"), "desired source unreadable; nothing to do");
            return Ok(());
        }
    };
    tracing::info!(
        ingest = desired.ingest.len(),
        delete = desired.delete.len(),
        "desired source loaded"
    );

    let mut fetcher = HttpArticleFetcher::new(ctx.http_timeout, ctx.page_delay)?;
    let images = HttpImageDownloader::new(ctx.http_timeout)?;
    let summary = Reconciler::new(&ctx, &mut fetcher, &images)
        .run(&desired)
        .context("reconcile")?;

    let trigger = CommandBuildTrigger::from_args(&args.build);
    let build = crate::build::run_for_summary(args.build_policy, &summary, &trigger);

    tracing::info!(
        deleted = summary.deleted.len(),
        added = summary.added.len(),
        failed = summary.failed.len(),
        build = ?build,
        "sync done"
    );

    if args.strict && (summary.has_failures() || build.is_failure()) {
        anyhow::bail!(
            "{} article(s) failed{}",
            summary.failed.len(),
            if build.is_failure() { "; site build failed" } else { "" }
        );
    }
    Ok(())
}

pub fn migrate_manifest(args: ManifestMigrateArgs) -> anyhow::Result<()> {
    let store = ManifestStore::new(&args.manifest);
    let report = store
        .migrate(&PathBuf::from(&args.output_dir))
        .context("migrate manifest")?;
    tracing::info!(
        total = report.total,
        resolved = report.resolved.len(),
        unresolved = report.unresolved.len(),
        manifest = %store.path().display(),
        "manifest migrated"
    );
    Ok(())
}

pub fn build_site(args: SiteBuildArgs) -> anyhow::Result<()> {
    use crate::build::BuildTrigger as _;

    match CommandBuildTrigger::from_args(&args.build).trigger() {
        BuildOutcome::Failed { reason } => anyhow::bail!("site build failed: {reason}"),
        BuildOutcome::Succeeded | BuildOutcome::Skipped => Ok(()),
    }
}
