use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use trialmine::app::{App, PipelineOptions, PipelineRun};
use trialmine::config::ConfigLoader;
use trialmine::domain::DateRange;
use trialmine::entrez::EntrezHttpClient;
use trialmine::error::TrialmineError;
use trialmine::export::{NCT_NOT_FOUND, export_run};
use trialmine::geo::GeoHttpClient;
use trialmine::output::{JsonOutput, OutputMode};
use trialmine::pubmed::PubmedHttpClient;
use trialmine::tui::Tui;

#[derive(Parser)]
#[command(name = "trialmine")]
#[command(about = "Search GEO by keyword and extract PubMed-linked clinical trial registrations")]
#[command(version, author)]
struct Cli {
    /// Keyword for the GEO dataset search
    keyword: String,

    /// Start of the publication-date window (inclusive)
    #[arg(long, value_name = "YYYY-MM-DD")]
    from: NaiveDate,

    /// End of the publication-date window (inclusive)
    #[arg(long, value_name = "YYYY-MM-DD")]
    to: NaiveDate,

    /// Contact identifier required by the Entrez usage policy
    #[arg(long)]
    contact: Option<String>,

    /// Path to a config file (default: trialmine.json if present)
    #[arg(long)]
    config: Option<String>,

    /// Records per Entrez search page
    #[arg(long)]
    page_size: Option<u64>,

    /// Concurrent GEO series page fetches
    #[arg(long)]
    workers: Option<usize>,

    /// Minimum milliseconds between PubMed requests
    #[arg(long)]
    interval_ms: Option<u64>,

    /// HTTP timeout in seconds for all upstream requests
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write per-stage CSV files into this directory
    #[arg(long, value_name = "DIR")]
    export: Option<PathBuf>,

    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<TrialmineError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TrialmineError) -> u8 {
    match error {
        TrialmineError::MissingContact
        | TrialmineError::ConfigRead(_)
        | TrialmineError::ConfigParse(_) => 2,
        TrialmineError::EntrezHttp(_)
        | TrialmineError::EntrezStatus { .. }
        | TrialmineError::EntrezPayload(_)
        | TrialmineError::GeoHttp(_)
        | TrialmineError::GeoStatus { .. }
        | TrialmineError::PubmedHttp(_)
        | TrialmineError::PubmedStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    let contact = cli
        .contact
        .clone()
        .or_else(|| config.contact.clone())
        .or_else(|| {
            std::env::var("TRIALMINE_CONTACT")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .ok_or(TrialmineError::MissingContact)
        .into_diagnostic()?;

    let range = DateRange::new(cli.from, cli.to).into_diagnostic()?;
    let options = PipelineOptions {
        page_size: cli.page_size.unwrap_or(config.page_size),
        workers: cli.workers.unwrap_or(config.workers).max(1),
        request_interval: Duration::from_millis(
            cli.interval_ms.unwrap_or(config.request_interval_ms),
        ),
    };
    let timeout = Duration::from_secs(cli.timeout_secs.unwrap_or(config.timeout_secs));

    let entrez = EntrezHttpClient::new(&contact, timeout).into_diagnostic()?;
    let geo = GeoHttpClient::new(timeout).into_diagnostic()?;
    let pubmed = PubmedHttpClient::new(timeout).into_diagnostic()?;
    let app = App::new(entrez, geo, pubmed, options);

    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&cli.keyword, range, &JsonOutput).into_diagnostic()?;
            JsonOutput::print_run(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new();
            let keyword = cli.keyword.clone();
            let result = tui.run(move |sink| app.run(&keyword, range, sink))?;
            print_run_summary(&result);
            result
        }
    };

    if let Some(dir) = cli.export.as_deref() {
        let folder = export_run(&result, dir, Local::now().date_naive()).into_diagnostic()?;
        println!("exported CSV files to {}", folder.display());
    }

    Ok(())
}

fn print_run_summary(result: &PipelineRun) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let summary = &result.summary;
    println!(
        "{cyan}trialmine summary for \"{}\"{reset}",
        result.keyword
    );
    println!("{green}GEO series found: {}{reset}", summary.accessions);
    println!("{green}PubMed identifiers: {}{reset}", summary.pubmed_ids);
    if summary.unreachable_series > 0 {
        println!(
            "{yellow}unreachable series pages: {} of {}{reset}",
            summary.unreachable_series, summary.accessions
        );
    }
    if summary.unreachable_abstracts > 0 {
        println!(
            "{yellow}unreachable abstracts: {} of {}{reset}",
            summary.unreachable_abstracts, summary.pubmed_ids
        );
    }
    println!(
        "{green}in window: {} (excluded: {}){reset}",
        summary.included, summary.excluded
    );

    for record in &result.filtered {
        let trial = record
            .trial_id
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| NCT_NOT_FOUND.to_string());
        let date = record
            .publication_date
            .map(|date| date.to_string())
            .unwrap_or_default();
        println!("  PMID {}  {}  {}", record.pubmed_id, trial, date);
    }
}
