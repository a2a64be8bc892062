//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use databook_core::{
    BuildResult, ProgressReporter, Toolkit, compile, pipeline, survey,
};
use databook_shared::{
    AppConfig, BuildConfig, CanonicalName, find_config, init_config, load_config,
    load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DataBook: bind a tree of documents into one bookmarked PDF.
#[derive(Parser)]
#[command(
    name = "databook",
    version,
    about = "Bind section directories of Markdown and PDF documents into one watermarked, bookmarked PDF.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to <root>/databook.toml, then ~/.databook/databook.toml).
    #[arg(long, global = true, env = "DATABOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Book directory holding the section directories.
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Compile every section and bind the book.
    Build {
        #[command(flatten)]
        publish: PublishArgs,
    },

    /// Compile the sections into the build areas without binding.
    Compile,

    /// Bind whatever the build areas hold from a previous compile.
    Link {
        #[command(flatten)]
        publish: PublishArgs,
    },

    /// Print the table of contents without producing anything.
    Toc,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Output options shared by `build` and `link`.
#[derive(clap::Args)]
pub(crate) struct PublishArgs {
    /// Merge only; do not attach reference documents.
    #[arg(long)]
    pub no_attach: bool,

    /// Write the book here instead of `paths.output`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a default databook.toml into the book directory.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "databook=info",
        1 => "databook=debug",
        _ => "databook=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Build { publish } => cmd_build(&cli, publish).await,
        Command::Compile => cmd_compile(&cli).await,
        Command::Link { publish } => cmd_link(&cli, publish).await,
        Command::Toc => cmd_toc(&cli).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&cli).await,
            ConfigAction::Show => cmd_config_show(&cli).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Config resolution
// ---------------------------------------------------------------------------

/// Load the config named by `--config`, or the one found for `--root`.
/// Returns the config and the directory its relative paths resolve against.
fn load_app_config(cli: &Cli) -> Result<(AppConfig, PathBuf)> {
    match &cli.config {
        Some(path) => {
            let config = load_config_from(path)?;
            let base = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((config, base))
        }
        None => Ok((load_config(&cli.root)?, cli.root.clone())),
    }
}

fn build_config(cli: &Cli, publish: Option<&PublishArgs>) -> Result<BuildConfig> {
    let (app, base) = load_app_config(cli)?;
    let mut config = BuildConfig::resolve(&app, &base);
    if let Some(publish) = publish {
        if publish.no_attach {
            config.attach_references = false;
        }
        if let Some(output) = &publish.output {
            config.output = output.clone();
        }
    }
    Ok(config)
}

/// Run a synchronous pipeline step off the async runtime.
async fn run_blocking<T, F>(step: F) -> Result<T>
where
    F: FnOnce() -> databook_shared::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(step)
        .await
        .map_err(|e| eyre!("pipeline task failed: {e}"))??;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(cli: &Cli, publish: &PublishArgs) -> Result<()> {
    let config = build_config(cli, Some(publish))?;
    info!(
        root = %config.root.display(),
        output = %config.output.display(),
        attach = config.attach_references,
        "building databook"
    );

    let result = run_blocking(move || {
        let tools = Toolkit::from_config(&config);
        let reporter = CliProgress::new();
        let result = pipeline::build(&config, &tools, &reporter);
        reporter.clear();
        result
    })
    .await?;

    print_result("Databook built successfully!", &result);
    Ok(())
}

async fn cmd_link(cli: &Cli, publish: &PublishArgs) -> Result<()> {
    let config = build_config(cli, Some(publish))?;
    info!(build = %config.build_dir.display(), "linking from build areas");

    let result = run_blocking(move || {
        let tools = Toolkit::from_config(&config);
        let reporter = CliProgress::new();
        let result = pipeline::resume(&config, &tools, &reporter);
        reporter.clear();
        result
    })
    .await?;

    print_result("Databook linked successfully!", &result);
    Ok(())
}

async fn cmd_compile(cli: &Cli) -> Result<()> {
    let config = build_config(cli, None)?;
    let build_dir = config.build_dir.clone();

    let output = run_blocking(move || {
        let tools = Toolkit::from_config(&config);
        let reporter = CliProgress::new();
        let output = compile(&config, &tools, &reporter);
        reporter.clear();
        output
    })
    .await?;

    println!();
    println!("  Sections compiled.");
    println!("  Documents:  {}", output.manifest.documents.len());
    println!("  References: {}", output.manifest.references.len());
    println!("  Build area: {}", build_dir.display());
    print_skipped(&output.skipped);
    println!();
    Ok(())
}

async fn cmd_toc(cli: &Cli) -> Result<()> {
    let config = build_config(cli, None)?;
    let root = config.root.clone();
    let scanned = run_blocking(move || survey(&root)).await?;

    print!("{}", scanned.contents.render_toc());
    print_skipped(&scanned.skipped);
    Ok(())
}

async fn cmd_config_init(cli: &Cli) -> Result<()> {
    let path = init_config(&cli.root)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(cli: &Cli) -> Result<()> {
    let source = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config(&cli.root)?,
    };
    let (config, _) = load_app_config(cli)?;
    match source {
        Some(path) => println!("# {}", path.display()),
        None => println!("# defaults (no config file found)"),
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_result(headline: &str, result: &BuildResult) {
    println!();
    println!("  {headline}");
    println!("  Output:     {}", result.output.display());
    println!("  Documents:  {}", result.documents);
    println!("  References: {}", result.references);
    println!(
        "  Pages:      {} ({} numbered)",
        result.raw_pages, result.visible_pages
    );
    println!("  Bookmarks:  {}", result.bookmarks);
    println!("  SHA-256:    {}", result.sha256);
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    print_skipped(&result.skipped);
    println!();
}

fn print_skipped(skipped: &[PathBuf]) {
    if skipped.is_empty() {
        return;
    }
    println!("  Skipped:    {}", skipped.len());
    for path in skipped {
        println!("    - {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_compiled(&self, name: &CanonicalName, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Compiling [{current}/{total}] {name}"));
    }

    fn document_linked(&self, name: &CanonicalName, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Linked [{current}/{total}] {name}"));
    }

    fn done(&self, _result: &BuildResult) {
        self.spinner.finish_and_clear();
    }
}
