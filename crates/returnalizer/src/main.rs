use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use returnalizer::eval::{Analysis, DerivationMode, analyze};
use returnalizer::workbook::report::HISTOGRAM_SHEET;
use returnalizer::workbook::{ReportBuilder, ReportConfig, load_prices_csv, write_report_json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "returnalizer", version, about = "Return-distribution report from a price CSV")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute returns, statistics, outliers and bins; write a JSON report.
    Analyze(AnalyzeArgs),
    /// Print every defined name with its formula.
    Formulas(FormulasArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Price CSV with a header row.
    #[arg(long)]
    input: Option<PathBuf>,

    /// YAML or JSON config; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bin width as a fraction (0.1 = 10%).
    #[arg(long)]
    bin_width: Option<f64>,

    /// Soft cap on the number of bins.
    #[arg(long)]
    max_bins: Option<usize>,

    /// Fail instead of warning when the bin cap is exceeded.
    #[arg(long)]
    strict_bins: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Where to write the JSON report; the summary is printed when absent.
    #[arg(long)]
    output: Option<PathBuf>,

    /// `value` computes numbers, `formula` emits live formulas.
    #[arg(long)]
    mode: Option<DerivationMode>,
}

#[derive(Args, Debug)]
struct FormulasArgs {
    #[command(flatten)]
    common: CommonArgs,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &CommonArgs) -> Result<ReportConfig> {
    let mut config = match &args.config {
        Some(path) => ReportConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReportConfig::default(),
    };
    if let Some(input) = &args.input {
        config.input = Some(input.clone());
    }
    if let Some(width) = args.bin_width {
        config.bin_width = width;
    }
    if let Some(max) = args.max_bins {
        config.max_bins = max;
    }
    if args.strict_bins {
        config.strict_bins = true;
    }
    config.validate().context("invalid options")?;
    Ok(config)
}

fn load_input(config: &ReportConfig) -> Result<returnalizer::PriceSeries> {
    let Some(input) = &config.input else {
        bail!("no input CSV: pass --input or set `input` in the config");
    };
    load_prices_csv(input, &config.csv).with_context(|| format!("reading {}", input.display()))
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(output) = args.output {
        config.output = Some(output);
    }
    let prices = load_input(&config)?;
    let report = ReportBuilder::from_config(&config)
        .build(&prices)
        .context("building report")?;
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }

    match &config.output {
        Some(path) => {
            write_report_json(&report, path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => {
            for line in &report.summary {
                println!("{line}");
            }
            if let Some(hist) = report.sheet(HISTOGRAM_SHEET) {
                println!();
                for row in &hist.rows {
                    if let Some(cell) = row.first() {
                        println!("{}", cell.value);
                    }
                }
            }
        }
    }
    Ok(())
}

fn run_formulas(args: FormulasArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let prices = load_input(&config)?;
    let analysis = analyze(&prices, &config.analysis_options(), DerivationMode::Formula)
        .context("recording formulas")?;
    let Analysis::Formulas(formulas) = analysis else {
        bail!("formula mode returned values");
    };
    let layout = formulas.layout();
    for (i, node) in formulas.formulas().return_formulas().iter().enumerate() {
        println!(
            "{}[{}] row {}\t{}",
            layout.table,
            layout.return_header,
            i + 1,
            returnalizer::eval::canonical_formula(node)
        );
    }
    for helper in formulas.formulas().helper_columns() {
        println!("{}[{}]\t{}", layout.table, helper.name, helper.formula());
    }
    for named in formulas.formulas().names() {
        println!("{}\t{}", named.name, named.formula());
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Formulas(args) => run_formulas(args),
    }
}
