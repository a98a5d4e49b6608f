//! dtaunpack - Command-line tool for unpacking DTA game archives.
//!
//! This is the main entry point for the dtaunpack command-line application.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use dta::archive::keys::KNOWN_ARCHIVES;
use dta::archive::EntryEvent;
use dta::prelude::*;

/// dtaunpack - Hidden & Dangerous 2 / Mafia DTA archive unpacker
#[derive(Parser)]
#[command(name = "dtaunpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract files from a DTA archive
    Extract {
        /// Path to the DTA file
        #[arg(short, long, env = "DTA_INPUT")]
        input: PathBuf,

        /// First key (hex); looked up by file name when omitted
        #[arg(long, env = "DTA_KEY1", requires = "key2")]
        key1: Option<String>,

        /// Second key (hex)
        #[arg(long, env = "DTA_KEY2", requires = "key1")]
        key2: Option<String>,

        /// Output directory
        #[arg(short, long, env = "OUTPUT_FOLDER", default_value = ".")]
        output: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Keep extracting after a failed entry
        #[arg(short, long)]
        keep_going: bool,

        /// Prefer loose files found in this directory over archive contents
        #[arg(long)]
        loose: Option<PathBuf>,
    },

    /// List contents of a DTA archive
    List {
        /// Path to the DTA file
        #[arg(short, long, env = "DTA_INPUT")]
        input: PathBuf,

        /// First key (hex); looked up by file name when omitted
        #[arg(long, env = "DTA_KEY1", requires = "key2")]
        key1: Option<String>,

        /// Second key (hex)
        #[arg(long, env = "DTA_KEY2", requires = "key1")]
        key2: Option<String>,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print the key pairs of the retail archives
    Keys,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Extract {
            input,
            key1,
            key2,
            output,
            filter,
            keep_going,
            loose,
        } => {
            let keys = resolve_keys(&input, key1.as_deref(), key2.as_deref())?;
            let policy = if keep_going {
                ErrorPolicy::Continue
            } else {
                ErrorPolicy::FailFast
            };
            let mut options = ExtractOptions::default()
                .with_output_dir(output)
                .with_policy(policy);
            if let Some(pattern) = filter {
                options = options.with_filter(parse_filter(&pattern)?);
            }
            cmd_extract(&input, keys, options, loose)?;
        }
        Commands::List {
            input,
            key1,
            key2,
            filter,
            detailed,
        } => {
            let keys = resolve_keys(&input, key1.as_deref(), key2.as_deref())?;
            let mut options = ExtractOptions::default();
            if let Some(pattern) = filter {
                options = options.with_filter(parse_filter(&pattern)?);
            }
            cmd_list(&input, keys, options, detailed)?;
        }
        Commands::Keys => cmd_keys(),
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` or else by the `-v` count.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn resolve_keys(input: &Path, key1: Option<&str>, key2: Option<&str>) -> Result<KeyPair> {
    if let (Some(key1), Some(key2)) = (key1, key2) {
        let key1 = parse_key(key1).context("Invalid keys provided")?;
        let key2 = parse_key(key2).context("Invalid keys provided")?;
        return Ok(KeyPair::new(key1, key2));
    }

    let known = lookup(input).ok_or_else(|| {
        anyhow!(
            "No known keys for {}; pass --key1 and --key2 (see `dtaunpack keys`)",
            input.display()
        )
    })?;
    debug!(game = known.game, archive = known.file_name, "using known keys");
    Ok(known.keys)
}

fn parse_filter(pattern: &str) -> Result<glob::Pattern> {
    glob::Pattern::new(pattern).with_context(|| format!("Invalid filter pattern {:?}", pattern))
}

fn cmd_extract(
    input: &Path,
    keys: KeyPair,
    options: ExtractOptions,
    loose: Option<PathBuf>,
) -> Result<()> {
    println!("Opening DTA archive: {}", input.display());

    let mut access = MappedAccess::new(keys);
    if let Some(root) = loose {
        access = access.with_loose_root(root);
    }

    let output = options.output_dir.clone();
    let mut session =
        Session::new(access, keys, options).context("Failed to allocate payload buffer")?;

    let start = Instant::now();
    let mut archive = session.mount(input).context("Failed to open DTA archive")?;
    let total = archive.entries().len();
    println!("Loaded {} entries in {:?}", total, start.elapsed());

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let report = archive
        .extract_with(|event| {
            if let EntryEvent::Failed(err) = event {
                pb.println(format!("Error: {}", err));
            }
            pb.inc(1);
        })
        .context("Extraction failed")?;

    pb.finish_with_message("Done");
    info!(output = %output.display(), "extraction finished");
    println!(
        "Extracted {} files ({} bytes) in {:?} ({} skipped, {} errors)",
        report.extracted.len(),
        report.bytes_written(),
        start.elapsed(),
        report.skipped,
        report.failures.len()
    );

    if !report.is_success() {
        bail!("{} entries could not be extracted", report.failures.len());
    }

    Ok(())
}

fn cmd_list(input: &Path, keys: KeyPair, options: ExtractOptions, detailed: bool) -> Result<()> {
    let mut session = Session::new(MappedAccess::new(keys), keys, options)
        .context("Failed to allocate payload buffer")?;
    let records = session.list(input).context("Failed to read DTA archive")?;

    for record in &records {
        if detailed {
            println!(
                "{:>12} {:>4} {}",
                record.file_size(),
                record.header().filename_length(),
                record.name()
            );
        } else {
            println!("{}", record.name());
        }
    }

    println!("\nTotal: {} entries", records.len());

    Ok(())
}

fn cmd_keys() {
    let mut game = "";
    for known in KNOWN_ARCHIVES {
        if known.game != game {
            game = known.game;
            println!("{}:", game);
        }
        println!(
            "  {:<14} {:08X} {:08X}",
            known.file_name, known.keys.key1, known.keys.key2
        );
    }
}
