use std::{io::Write, path::PathBuf};

use anyhow::Context;
use bb_filesystem::{DeviceFilter, Platform, Snapshot};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Print the storage devices and volumes of this machine as JSON.
#[derive(Parser)]
#[command(version, about)]
struct Opt {
    /// Parse previously captured command output instead of running the platform command
    #[arg(long, short)]
    input: Option<PathBuf>,
    /// Platform the captured output comes from. Defaults to the current one
    #[arg(long, short)]
    platform: Option<Platform>,
    /// Only keep devices whose identifier matches this regex
    #[arg(long, short)]
    filter: Option<String>,
    /// Print the command that would be run and exit
    #[arg(long)]
    print_command: bool,
    /// Single line JSON
    #[arg(long)]
    compact: bool,
    /// Log more. Overridden by RUST_LOG
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .expect("Failed to register tracing_subscriber");
}

fn snapshot(opt: &Opt) -> anyhow::Result<Snapshot> {
    let filter = match &opt.filter {
        Some(pattern) => DeviceFilter::regex(pattern)?,
        None => DeviceFilter::All,
    };
    let platform = match opt.platform {
        Some(p) => p,
        None => Platform::current()?,
    };

    match &opt.input {
        Some(path) => {
            let output = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let output = String::from_utf8_lossy(&output);
            tracing::info!("Parsing {} output from {}", platform, path.display());
            bb_filesystem::parse(platform, &output, &filter)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
        None if platform == Platform::current()? => {
            Ok(bb_filesystem::filesystem_sync(&filter)?)
        }
        None => anyhow::bail!("Cannot run the {platform} command on this machine, use --input"),
    }
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_logging(opt.verbose);

    if opt.print_command {
        let platform = match opt.platform {
            Some(p) => p,
            None => Platform::current()?,
        };
        println!("{}", platform.command());
        return Ok(());
    }

    let snapshot = snapshot(&opt)?;
    let json = if opt.compact {
        serde_json::to_string(&snapshot)?
    } else {
        serde_json::to_string_pretty(&snapshot)?
    };

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").context("Failed to write to stdout")?;

    Ok(())
}
