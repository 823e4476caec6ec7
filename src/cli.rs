use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest new articles, apply deletions, and rebuild the site.
    Sync(SyncArgs),
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BuildPolicy {
    /// Build only when the run deleted or added something.
    OnChange,
    Always,
    Never,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Line-oriented list of article URLs.
    #[arg(long, default_value = "articles.txt")]
    pub source: String,

    /// Directory receiving `NNN.md` files (images go to `<dir>/images`).
    #[arg(long, default_value = "markdown")]
    pub output_dir: String,

    /// Manifest of already ingested URLs.
    #[arg(long, default_value = "downloaded.json")]
    pub manifest: String,

    /// MkDocs config whose `nav` list is maintained.
    #[arg(long, default_value = "mkdocs.yml")]
    pub nav: String,

    /// Prefix marking a source line as a deletion request.
    #[arg(long, default_value = "-")]
    pub delete_marker: String,

    /// Prefix marking a source line as a comment.
    #[arg(long, default_value = "#")]
    pub comment_marker: String,

    /// Delay before each article page request.
    #[arg(long, default_value_t = 4000)]
    pub page_delay_ms: u64,

    /// Timeout for each page or image HTTP request.
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = BuildPolicy::OnChange)]
    pub build_policy: BuildPolicy,

    #[command(flatten)]
    pub build: BuildCommandArgs,

    /// Exit non-zero if any article or the site build failed.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Clone, Args)]
pub struct BuildCommandArgs {
    /// Program used to build the site.
    #[arg(long, default_value = "python")]
    pub build_bin: String,

    /// Argument passed to the build program (repeatable).
    #[arg(
        long = "build-arg",
        allow_hyphen_values = true,
        default_values = ["-m", "mkdocs", "build"]
    )]
    pub build_args: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ManifestCommand {
    /// Rewrite a legacy manifest in the current format.
    Migrate(ManifestMigrateArgs),
}

#[derive(Debug, Args)]
pub struct ManifestMigrateArgs {
    #[arg(long, default_value = "downloaded.json")]
    pub manifest: String,

    /// Directory searched for the Markdown file of records without a filename.
    #[arg(long, default_value = "markdown")]
    pub output_dir: String,
}

#[derive(Debug, Subcommand)]
pub enum SiteCommand {
    /// Run the site build command once.
    Build(SiteBuildArgs),
}

#[derive(Debug, Args)]
pub struct SiteBuildArgs {
    #[command(flatten)]
    pub build: BuildCommandArgs,
}
