//! Tradescope CLI - supplier concentration and disruption risk for bilateral trade data

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Reports go to stdout; logs and progress go to stderr

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tradescope_core::config::{self, ResolvedConfig};
use tradescope_core::ingest::{self, BaciLayout, YearOutcome};
use tradescope_core::narration::{
    self, ComprehensiveAnalysis, PromptKind, StakeholderProfile,
};
use tradescope_core::report;
use tradescope_core::summary;
use tradescope_core::{AnalysisSettings, Analyzer, TradeStore};

/// First year imported from a BACI release when --from is not given
const DEFAULT_IMPORT_FROM: i32 = 2014;

#[derive(Parser)]
#[command(name = "tradescope")]
#[command(about = "Supplier concentration and disruption risk for bilateral trade data")]
#[command(version = env!("TRADESCOPE_VERSION"))]
struct Cli {
    /// Path to config file (default: auto-discover)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Trade database (overrides config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load trade data into the database
    Import {
        #[command(subcommand)]
        source: ImportSource,
    },
    /// List products whose name contains TERM
    Products {
        term: String,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Compute concentration metrics for products matching TERM
    Analyze {
        term: String,

        /// Reference market (overrides config file)
        #[arg(long)]
        reference: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Simulate losing one supplier of products matching TERM
    Disrupt {
        term: String,

        /// Supplier to remove (default: largest supplier)
        #[arg(long)]
        supplier: Option<String>,

        /// Reference market (overrides config file)
        #[arg(long)]
        reference: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Render a narration prompt for products matching TERM
    Prompt {
        term: String,

        /// Prompt to render
        #[arg(long)]
        kind: PromptArg,

        /// Stakeholder role (overrides config file)
        #[arg(long)]
        stakeholder: Option<String>,

        /// Stakeholder profile JSON (a reply to the stakeholder prompt)
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Comprehensive analysis JSON (required for --kind followup)
        #[arg(long)]
        analysis: Option<PathBuf>,

        /// Supplier to remove (disruption prompt only)
        #[arg(long)]
        supplier: Option<String>,

        /// Reference market (overrides config file)
        #[arg(long)]
        reference: Option<String>,
    },
    /// Describe the whole trade table
    Summary {
        /// Entries kept in each ranking
        #[arg(long, default_value = "10")]
        top: usize,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ImportSource {
    /// Import a raw BACI release directory
    Baci {
        /// Directory holding the release CSV files
        #[arg(long)]
        dir: PathBuf,

        /// First year to import
        #[arg(long)]
        from: Option<i32>,

        /// Last year to import (default: configured current year)
        #[arg(long)]
        to: Option<i32>,

        /// Release suffix in file names
        #[arg(long, default_value = ingest::DEFAULT_RELEASE)]
        release: String,

        /// HS classification in file names
        #[arg(long, default_value = ingest::DEFAULT_CLASSIFICATION)]
        classification: String,

        /// Delete existing trade rows first
        #[arg(long)]
        replace: bool,
    },
    /// Import normalized CSV tables
    Csv {
        /// Trade table (year,exporter,importer,product_code,value_1000usd)
        #[arg(long)]
        records: PathBuf,

        /// Product table (product_code,product_name)
        #[arg(long)]
        products: Option<PathBuf>,

        /// Delete existing trade rows first
        #[arg(long)]
        replace: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running analysis
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PromptArg {
    Stakeholder,
    Comprehensive,
    Followup,
    Disruption,
}

impl From<PromptArg> for PromptKind {
    fn from(arg: PromptArg) -> Self {
        match arg {
            PromptArg::Stakeholder => PromptKind::Stakeholder,
            PromptArg::Comprehensive => PromptKind::Comprehensive,
            PromptArg::Followup => PromptKind::Followup,
            PromptArg::Disruption => PromptKind::Disruption,
        }
    }
}

/// Route tracing output to stderr; `--verbose` raises the default level to debug
fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let Cli {
        config: config_path,
        db,
        verbose,
        command,
    } = Cli::parse();
    init_logger(verbose);

    match command {
        Commands::Config { action } => run_config(action, config_path.as_deref()),
        command => {
            let resolved = load_config(config_path.as_deref(), db)?;
            run(command, resolved)
        }
    }
}

fn load_config(config_path: Option<&Path>, db: Option<PathBuf>) -> anyhow::Result<ResolvedConfig> {
    let cwd = std::env::current_dir()?;
    let mut resolved =
        config::load_and_resolve(&cwd, config_path).context("failed to load configuration")?;
    if let Some(path) = &resolved.config_path {
        tracing::info!(path = %path.display(), "using config");
    }
    if let Some(db) = db {
        resolved.database = db;
    }
    Ok(resolved)
}

fn run(command: Commands, mut resolved: ResolvedConfig) -> anyhow::Result<()> {
    match command {
        Commands::Import { source } => run_import(source, &resolved),
        Commands::Products { term, format } => {
            let analyzer = open_analyzer(&resolved)?;
            let products = analyzer.find_products(&term)?;
            match format {
                OutputFormat::Text => print!("{}", report::render_products_text(&term, &products)),
                OutputFormat::Json => println!("{}", report::render_json(&products)?),
            }
            Ok(())
        }
        Commands::Analyze {
            term,
            reference,
            format,
        } => {
            override_reference(&mut resolved, reference);
            let mut analyzer = open_analyzer(&resolved)?;
            let analysis = analyzer.analyze(&term)?;
            match format {
                OutputFormat::Text => print!("{}", report::render_analysis_text(&analysis)),
                OutputFormat::Json => println!("{}", analysis.to_json()?),
            }
            Ok(())
        }
        Commands::Disrupt {
            term,
            supplier,
            reference,
            format,
        } => {
            override_reference(&mut resolved, reference);
            let mut analyzer = open_analyzer(&resolved)?;
            let disruption = analyzer.simulate_disruption(&term, supplier.as_deref())?;
            match format {
                OutputFormat::Text => print!("{}", report::render_disruption_text(&disruption)),
                OutputFormat::Json => println!("{}", disruption.to_json()?),
            }
            Ok(())
        }
        Commands::Prompt {
            term,
            kind,
            stakeholder,
            profile,
            analysis,
            supplier,
            reference,
        } => {
            override_reference(&mut resolved, reference);
            let request = PromptRequest {
                term: &term,
                kind: kind.into(),
                stakeholder: stakeholder.as_deref(),
                profile: profile.as_deref(),
                analysis: analysis.as_deref(),
                supplier: supplier.as_deref(),
            };
            println!("{}", render_prompt(&request, &resolved)?);
            Ok(())
        }
        Commands::Summary { top, format } => {
            let store = open_store(&resolved)?;
            let summary = summary::summarize(&store, top)?;
            match format {
                OutputFormat::Text => print!("{}", report::render_summary_text(&summary)),
                OutputFormat::Json => println!("{}", summary.to_json()?),
            }
            Ok(())
        }
        Commands::Config { action } => run_config(action, resolved.config_path.as_deref()),
    }
}

fn override_reference(resolved: &mut ResolvedConfig, reference: Option<String>) {
    if let Some(reference) = reference {
        resolved.reference_market = reference;
    }
}

fn open_store(resolved: &ResolvedConfig) -> anyhow::Result<TradeStore> {
    if !resolved.database.exists() {
        anyhow::bail!(
            "trade database not found: {} (run `tradescope import` first)",
            resolved.database.display()
        );
    }
    TradeStore::open(&resolved.database)
}

fn open_analyzer(resolved: &ResolvedConfig) -> anyhow::Result<Analyzer<TradeStore>> {
    let store = open_store(resolved)?;
    Ok(Analyzer::new(store, AnalysisSettings::from(resolved)))
}

fn run_import(source: ImportSource, resolved: &ResolvedConfig) -> anyhow::Result<()> {
    let mut store = TradeStore::open(&resolved.database)?;

    match source {
        ImportSource::Baci {
            dir,
            from,
            to,
            release,
            classification,
            replace,
        } => {
            let from = from.unwrap_or(DEFAULT_IMPORT_FROM);
            let to = to.unwrap_or(resolved.current_year);
            if from > to {
                anyhow::bail!("--from ({}) must not be after --to ({})", from, to);
            }
            if replace {
                let removed = store.clear_trade()?;
                tracing::info!(removed, "cleared trade table");
            }

            let layout = BaciLayout::new(dir)
                .with_release(release)
                .with_classification(classification);

            let bar = ProgressBar::new((to - from + 1) as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} years {msg}")
                    .context("invalid progress template")?,
            );
            bar.set_message("parsing");

            let result = ingest::import_baci(&mut store, &layout, from..=to, |year| {
                match &year.outcome {
                    YearOutcome::Loaded { rows } => {
                        bar.set_message(format!("{}: {} rows", year.year, rows))
                    }
                    YearOutcome::Failed { error } => {
                        bar.println(format!("  [!] {}: {}", year.file.display(), error))
                    }
                }
                bar.inc(1);
            });
            bar.finish_and_clear();
            let summary = result?;

            println!(
                "Imported {} rows for {} years into {}",
                summary.rows,
                summary.years_loaded.len(),
                resolved.database.display()
            );
            println!(
                "  {} countries, {} products",
                summary.countries, summary.products
            );
            if !summary.years_failed.is_empty() {
                let years: Vec<String> =
                    summary.years_failed.iter().map(|y| y.to_string()).collect();
                println!("  Skipped years: {}", years.join(", "));
            }
            if !summary.unmapped_codes.is_empty() {
                let codes: Vec<&str> = summary.unmapped_codes.iter().map(String::as_str).collect();
                println!("  Unmapped country codes: {}", codes.join(", "));
            }
            Ok(())
        }
        ImportSource::Csv {
            records,
            products,
            replace,
        } => {
            if replace {
                store.clear_trade()?;
            }
            let counts = ingest::import_csv(&mut store, &records, products.as_deref())?;
            println!(
                "Imported {} rows and {} products into {}",
                counts.rows,
                counts.products,
                resolved.database.display()
            );
            Ok(())
        }
    }
}

struct PromptRequest<'a> {
    term: &'a str,
    kind: PromptKind,
    stakeholder: Option<&'a str>,
    profile: Option<&'a Path>,
    analysis: Option<&'a Path>,
    supplier: Option<&'a str>,
}

fn read_profile(path: Option<&Path>) -> anyhow::Result<StakeholderProfile> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read profile: {}", path.display()))?;
            narration::parse_response(&content)
                .with_context(|| format!("invalid stakeholder profile: {}", path.display()))
        }
        None => Ok(StakeholderProfile::default()),
    }
}

fn render_prompt(request: &PromptRequest<'_>, resolved: &ResolvedConfig) -> anyhow::Result<String> {
    tracing::debug!(kind = request.kind.as_str(), term = request.term, "rendering prompt");

    match request.kind {
        PromptKind::Stakeholder => {
            let stakeholder = request.stakeholder.unwrap_or(&resolved.stakeholder);
            Ok(narration::stakeholder_prompt(request.term, stakeholder))
        }
        PromptKind::Comprehensive => {
            let profile = read_profile(request.profile)?;
            let analysis = open_analyzer(resolved)?.analyze(request.term)?;
            narration::comprehensive_prompt(&analysis, &profile)
        }
        PromptKind::Followup => {
            let path = request
                .analysis
                .context("--analysis is required for --kind followup")?;
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read analysis: {}", path.display()))?;
            let analysis = ComprehensiveAnalysis::parse_or_fallback(&content);
            let profile = read_profile(request.profile)?;
            narration::followup_prompt(&analysis, &profile)
        }
        PromptKind::Disruption => {
            let profile = read_profile(request.profile)?;
            let disruption =
                open_analyzer(resolved)?.simulate_disruption(request.term, request.supplier)?;
            narration::disruption_prompt(&disruption, &profile)
        }
    }
}

fn run_config(action: ConfigAction, global_path: Option<&Path>) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    match action {
        ConfigAction::Validate { path } => {
            let path = path.as_deref().or(global_path);
            match config::load_and_resolve(&cwd, path) {
                Ok(config) => {
                    if let Some(ref p) = config.config_path {
                        println!("Config valid: {}", p.display());
                    } else {
                        println!("No config file found. Using defaults.");
                    }
                }
                Err(e) => {
                    eprintln!("Config validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Show { path, format } => {
            let path = path.as_deref().or(global_path);
            let resolved = config::load_and_resolve(&cwd, path)
                .context("failed to load configuration")?;

            if let OutputFormat::Json = format {
                println!("{}", resolved.to_json()?);
                return Ok(());
            }

            println!("Configuration:");
            if let Some(ref p) = resolved.config_path {
                println!("  Source: {}", p.display());
            } else {
                println!("  Source: defaults (no config file found)");
            }
            println!();
            println!("Data:");
            println!("  database: {}", resolved.database.display());
            println!();
            println!("Analysis:");
            println!("  reference_market: {}", resolved.reference_market);
            println!(
                "  years: {}-{} ({})",
                resolved.years().start,
                resolved.years().end,
                resolved.years().label()
            );
            println!("  top_suppliers: {}", resolved.top_suppliers);
            println!();
            println!("Risk levels:");
            println!("  low: >= {}", resolved.risk_low);
            println!("  moderate: >= {}", resolved.risk_moderate);
            println!();
            println!("Narration:");
            println!("  stakeholder: {}", resolved.stakeholder);
        }
    }
    Ok(())
}
