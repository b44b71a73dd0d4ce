use anyhow::{Context, Result};
use bitblock_idisa::selftest::{self, SelfTestOptions, SelfTestReport};
use bitblock_idisa::{BlockWidth, BuilderConfig, CpuFeatures, IdisaError, Tier, TierKind};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use std::path::PathBuf;
use std::time::Instant;

/// Tiered IDISA bit-block primitives: tier selection and self-test
#[derive(Parser)]
#[command(name = "bitblock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file path (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show detected CPU features and the tier selected for this host
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the unique name of every tier at every block width
    Names,

    /// Check every tier against the reference models
    Selftest {
        /// Block width to check (repeatable; default: all)
        #[arg(short, long = "width", value_name = "BITS", value_parser = parse_width)]
        widths: Vec<BlockWidth>,

        /// Random inputs per check
        #[arg(short, long, default_value_t = 8)]
        rounds: usize,

        /// Worker threads (0 = one per core)
        #[arg(short = 'j', long, default_value_t = 0)]
        threads: usize,

        /// Restrict tiers to the features of this host instead of all features
        #[arg(long)]
        host_features: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_width(text: &str) -> std::result::Result<BlockWidth, String> {
    let bits: u32 = text.parse().map_err(|_| format!("not a number: {}", text))?;
    BlockWidth::try_from(bits).map_err(|e: IdisaError| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity flags
    setup_logging(cli.verbose, cli.quiet);

    // Load configuration if specified
    let config = if let Some(config_path) = &cli.config {
        load_config(config_path)?
    } else {
        BuilderConfig::default()
    };

    match cli.command {
        Commands::Info { json } => info_command(&config, json)?,
        Commands::Names => names_command(),
        Commands::Selftest {
            widths,
            rounds,
            threads,
            host_features,
            json,
        } => {
            let options = SelfTestOptions {
                widths: if widths.is_empty() {
                    BlockWidth::ALL.to_vec()
                } else {
                    widths
                },
                features: if host_features {
                    CpuFeatures::detect()
                } else {
                    CpuFeatures::all()
                },
                backend_caps: config.backend,
                rounds,
                parallelism: threads,
                ..SelfTestOptions::default()
            };
            selftest_command(&options, json, cli.quiet)?;
        }
    }

    Ok(())
}

/// Set up logging based on verbosity flags
fn setup_logging(verbose: bool, quiet: bool) {
    let log_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    debug!("Logging initialized at {} level", log_level);
}

/// Load configuration from a file
fn load_config(path: &PathBuf) -> Result<BuilderConfig> {
    let config = BuilderConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration: {}", path.display()))?;
    debug!("Loaded configuration from {}: {:?}", path.display(), config);
    Ok(config)
}

/// Execute the info command
fn info_command(config: &BuilderConfig, json: bool) -> Result<()> {
    let features = CpuFeatures::detect();
    let kind = TierKind::select(&features, &config.tiers);
    let tier = Tier::from_config(kind, config, features);
    info!("Selected tier {}", tier.unique_name());

    if json {
        let value = serde_json::json!({
            "features": features,
            "tier": kind.tag(),
            "unique_name": tier.unique_name(),
            "block_width": tier.block_width().bits(),
            "stride": tier.stride(),
            "word_width": tier.word_width(),
            "chain": kind.chain().iter().map(|k| k.tag()).collect::<Vec<_>>(),
        });
        let text = serde_json::to_string_pretty(&value).context("Failed to encode info")?;
        println!("{}", text);
        return Ok(());
    }

    println!("=== Host ===\n");
    let present = features.names();
    if present.is_empty() {
        println!("Features: (none)");
    } else {
        println!("Features: {}", present.join(" "));
    }
    println!("\n=== Tier ===\n");
    println!("Tier: {}", kind);
    println!("Unique name: {}", tier.unique_name());
    println!("Block width: {}", tier.block_width());
    println!("Stride: {}", tier.stride());
    println!("Word width: {}", tier.word_width());
    let chain: Vec<&str> = kind
        .chain()
        .iter()
        .map(|k| k.tag())
        .chain(std::iter::once("generic"))
        .collect();
    println!("Resolution order: {}", chain.join(" -> "));
    println!(
        "Native lane permute: {}",
        if tier.backend_caps().native_lane_permute { "yes" } else { "no" }
    );
    Ok(())
}

/// Execute the names command
fn names_command() {
    print!("{:<10}", "tier");
    for width in BlockWidth::ALL {
        print!("{:>14}", width.bits());
    }
    println!();
    for kind in TierKind::ALL {
        print!("{:<10}", kind.tag());
        for width in BlockWidth::ALL {
            print!("{:>14}", kind.unique_name(width));
        }
        println!();
    }
}

/// Execute the selftest command
fn selftest_command(options: &SelfTestOptions, json: bool, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    let progress = create_progress_bar(quiet || json, "Checking tiers");
    let report = selftest::run(options).context("Self-test could not run")?;
    progress.finish_and_clear();
    let duration = start_time.elapsed();

    if json {
        let text = serde_json::to_string_pretty(&report).context("Failed to encode report")?;
        println!("{}", text);
    } else if !quiet {
        display_report(&report);
        println!("Time: {:.3}s", duration.as_secs_f64());
    }

    if !report.passed() {
        let failed = report.failed().count();
        error!("{} checks failed", failed);
        anyhow::bail!("self-test failed: {} of {} checks", failed, report.outcomes.len());
    }
    Ok(())
}

/// Display a self-test report
fn display_report(report: &SelfTestReport) {
    println!("=== Self-test ===\n");
    for outcome in &report.outcomes {
        let mark = if outcome.passed() { "ok" } else { "FAIL" };
        println!(
            "  {:<4} {:<12} {:<26} {:>5} cases",
            mark, outcome.tier, outcome.primitive, outcome.cases
        );
        for failure in &outcome.failures {
            println!("         {}", failure);
        }
    }
    println!();
    println!("Checks: {}", report.outcomes.len());
    println!("Cases: {}", report.total_cases());
    if report.passed() {
        println!("Result: passed");
    } else {
        println!("Result: {} checks failed", report.failed().count());
    }
}

/// Create a progress bar (spinner) for operations
fn create_progress_bar(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        // Return a hidden progress bar in quiet mode
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}
