use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    articlesync::logging::init("info").context("init logging")?;

    let cli = articlesync::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        articlesync::cli::Command::Sync(args) => {
            articlesync::sync::run(args).context("sync")?;
        }
        articlesync::cli::Command::Manifest {
            command: articlesync::cli::ManifestCommand::Migrate(args),
        } => {
            articlesync::sync::migrate_manifest(args).context("manifest migrate")?;
        }
        articlesync::cli::Command::Site {
            command: articlesync::cli::SiteCommand::Build(args),
        } => {
            articlesync::sync::build_site(args).context("site build")?;
        }
    }

    Ok(())
}
