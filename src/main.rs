use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use qcr_engine::analysis::{DateWindow, TopIssueAnalysis, TopModelAnalysis, WeeklyAnalysis};
use qcr_engine::artifacts::{ArtifactManifest, ArtifactWriter, ChartRequestRenderer};
use qcr_engine::config::PipelineConfig;
use qcr_engine::llm::LlmClient;
use qcr_engine::pipeline::{analyse, prepare, PipelineOptions, Publisher};
use qcr_engine::store::IngestionGateway;
use qcr_engine::summary::Summarizer;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Weekly,
    TopIssue,
    TopModel,
}

impl Mode {
    fn dir_name(&self) -> &'static str {
        match self {
            Mode::Weekly => "weekly",
            Mode::TopIssue => "top_issue",
            Mode::TopModel => "top_model",
        }
    }
}

#[derive(Parser)]
#[command(name = "qcr")]
#[command(
    about = "Return-service record analysis: dedup, model resolution and distribution reports"
)]
struct Args {
    /// Which report to produce
    #[arg(long, value_enum)]
    mode: Mode,

    /// Service-ticket export (CSV)
    #[arg(long = "data")]
    data_file: PathBuf,

    /// MTM -> model name table (default: QCR_MTM_FILE or ./mtm.csv)
    #[arg(long = "mtm")]
    mtm_file: Option<PathBuf>,

    /// Output directory (default: QCR_OUTPUT_DIR or ./output)
    #[arg(long = "output")]
    output_dir: Option<PathBuf>,

    /// Window start, inclusive (YYYY-MM-DD); weekly mode only
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Window end, inclusive (YYYY-MM-DD); weekly mode only
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Top N for the top-issue / top-model modes
    #[arg(long)]
    top_n: Option<usize>,

    /// Batch label carried into the payload and output folder
    #[arg(long, default_value = "2024-2025")]
    batch_name: String,

    /// Drop records whose MTM has no mapping
    #[arg(long)]
    filter_unmapped: bool,

    /// Skip writing new records to the store
    #[arg(long)]
    no_persist: bool,

    /// Analyse only records not already in the store
    #[arg(long)]
    new_only: bool,

    /// Weekly mode: also write each model's cohort records as CSV
    #[arg(long)]
    record_dumps: bool,

    /// Ask the LLM for per-table summaries
    #[arg(long)]
    use_llm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = PipelineConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = &args.output_dir {
        config.output.output_dir = dir.clone();
    }
    if let Some(mtm) = &args.mtm_file {
        config.output.mapping_file = mtm.clone();
    }

    info!("QCR starting: mode {:?}, data '{}'", args.mode, args.data_file.display());

    let gateway = IngestionGateway::connect(&config.store);
    let mut options = PipelineOptions::new(&args.data_file, &config);
    options.filter_unmapped = args.filter_unmapped;
    options.persist = !args.no_persist;
    options.new_only = args.new_only;

    let prepared = prepare(&config, &options, Some(&gateway))
        .with_context(|| format!("cannot analyse '{}'", args.data_file.display()))?;

    let summarizer = if args.use_llm {
        let client = LlmClient::new(&config.llm);
        if !client.is_configured() {
            warn!("--use-llm given but LLM_API_KEY is not set; summaries will use fallback text");
        }
        Summarizer::new(Box::new(client), &config.llm)
    } else {
        Summarizer::disabled(&config.llm)
    };

    let renderer = ChartRequestRenderer;
    let mut publisher = Publisher {
        writer: ArtifactWriter::new(
            config
                .output
                .output_dir
                .join(&args.batch_name)
                .join(args.mode.dir_name()),
        ),
        renderer: &renderer,
        summarizer: &summarizer,
        style: config.output.charts,
        batch_name: args.batch_name.clone(),
    };

    let manifest: ArtifactManifest = match args.mode {
        Mode::Weekly => {
            let window = DateWindow::new(args.start_date, args.end_date);
            let analysis = WeeklyAnalysis::new(&config.analysis, window);
            let report = analyse(&analysis, &prepared)?;
            if args.record_dumps {
                publisher.weekly_records(&analysis.partition(&prepared.records));
            }
            publisher.weekly(&prepared, &report).await
        }
        Mode::TopIssue => {
            let k = args.top_n.unwrap_or(config.analysis.top_issue_k);
            let report = analyse(&TopIssueAnalysis::new(k), &prepared)?;
            publisher.top_issue(&prepared, &report).await
        }
        Mode::TopModel => {
            let k = args.top_n.unwrap_or(config.analysis.top_model_k);
            let report = analyse(&TopModelAnalysis::new(k, &config.analysis), &prepared)?;
            publisher.top_model(&prepared, &report).await
        }
    };

    println!(
        "{} records analysed ({} new), MTM coverage {:.1}%",
        prepared.records.len(),
        prepared.new_records,
        prepared.resolution.mapped_percent()
    );
    for path in &manifest.written {
        println!("  wrote {}", path.display());
    }
    for skipped in &manifest.skipped {
        println!("  skipped {}: {}", skipped.name, skipped.reason);
    }

    Ok(())
}
