use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use multisuite::aggregate::Aggregator;
use multisuite::config::MultisuiteConfig;
use multisuite::registry::manifest;
use multisuite::telemetry::{self, LogFormat};

/// Multi-suite deployment aggregator
///
/// Scans a tree of compiled test classes, builds each class's deployment
/// unit from the class manifest, and merges them into one aggregate
/// deployment so a whole suite runs against a single deployment.
///
/// QUICK START:
///
///   multisuite check-config --config multisuite.toml
///   multisuite aggregate --root target/test-classes --manifest classes.toml \
///       --out target/multisuite-tck.war --report target/multisuite.json
///
/// Logging goes to stderr. Set RUST_LOG to change verbosity and
/// MULTISUITE_LOG_FORMAT=json for machine-readable events.
#[derive(Parser)]
#[command(name = "multisuite")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'multisuite <command> --help' for more information on a specific command.")]
struct Cli {
    /// Log format on stderr
    #[arg(long, global = true, env = telemetry::LOG_FORMAT_ENV, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the aggregate deployment
    ///
    /// Fails (exit code 1, nothing written) on a fail-policy conflict or,
    /// in strict mode, on any class whose unit cannot be built.
    Aggregate(AggregateArgs),

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Configuration file (defaults apply if it does not exist)
        #[arg(long, default_value = "multisuite.toml")]
        config: PathBuf,
    },
}

#[derive(Args)]
struct AggregateArgs {
    /// Root of the compiled test classes
    #[arg(long)]
    root: PathBuf,

    /// Class manifest (TOML)
    #[arg(long)]
    manifest: PathBuf,

    /// Configuration file (defaults apply if it does not exist)
    #[arg(long, default_value = "multisuite.toml")]
    config: PathBuf,

    /// Write the aggregate as an exploded directory
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Summary format on stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    match cli.command {
        Commands::Aggregate(args) => aggregate(&args),
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn aggregate(args: &AggregateArgs) -> Result<()> {
    let config = MultisuiteConfig::load(&args.config)?;
    let registry = manifest::load(&args.manifest, Some(&args.root))
        .with_context(|| format!("loading class manifest {}", args.manifest.display()))?;
    info!(classes = registry.len(), "loaded class manifest");

    let outcome = Aggregator::from_config(&registry, &config)?
        .aggregate(&args.root)
        .with_context(|| format!("aggregating {}", args.root.display()))?;

    if let Some(out) = &args.out {
        let written = outcome
            .artifact
            .store()
            .write_exploded(out)
            .with_context(|| format!("writing aggregate to {}", out.display()))?;
        info!(out = %out.display(), files = written, "wrote aggregate");
    }

    let report_json =
        serde_json::to_string_pretty(&outcome.report).context("serializing report")?;
    if let Some(path) = &args.report {
        write_atomic(path, report_json.as_bytes())
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    match args.format {
        OutputFormat::Text => print!("{}", outcome.report),
        OutputFormat::Json => println!("{report_json}"),
    }
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = MultisuiteConfig::load(path)?;
    let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
    println!("# effective configuration ({})", path.display());
    print!("{rendered}");
    Ok(())
}

/// Write via a temporary sibling and rename so readers never see a
/// partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
