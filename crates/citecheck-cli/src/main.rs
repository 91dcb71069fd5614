use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use citecheck_core::config_file::{self, ConfigFile};
use citecheck_core::{
    BackendError, Config, ConfigError, PdfBackend, RateLimiters, SourceKind, TextFileBackend,
};
use citecheck_parsing::{CitationExtractor, ParsingConfigBuilder, ParsingError};
use citecheck_pdf_mupdf::MupdfBackend;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Citation checker - verify the bibliography of a paper against CrossRef, Semantic Scholar and arXiv
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the citations of a PDF (or a form-feed paged .txt file)
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Path to the PDF or .txt file to check
    file_path: PathBuf,

    /// Where to write the JSON report
    #[arg(long, default_value = "citation_report.json")]
    out: PathBuf,

    /// Minimum score for a citation to count as verified
    #[arg(long, alias = "threshold")]
    min_score: Option<f64>,

    /// Comma-separated list of sources to query (crossref, semantic_scholar, arxiv)
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,

    /// Number of concurrent lookup workers
    #[arg(long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries after a transient lookup failure
    #[arg(long)]
    max_retries: Option<u32>,

    /// Contact address for the CrossRef polite pool
    #[arg(long)]
    mailto: Option<String>,

    /// Semantic Scholar API key
    #[arg(long)]
    s2_api_key: Option<String>,

    /// Config file to use instead of the default lookup
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Dry run: extract and print citations without querying any source
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 2 = configuration error, 3 = unreadable document or no bibliography, 1 = anything else.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        2
    } else if err.downcast_ref::<ParsingError>().is_some()
        || err.downcast_ref::<BackendError>().is_some()
    {
        3
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Check(args) => {
            if args.dry_run {
                dry_run_check(args)
            } else {
                check(args).await
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn load_file_config(path: Option<&Path>) -> anyhow::Result<ConfigFile> {
    match path {
        Some(path) => config_file::load_from_path(path)
            .ok_or_else(|| ConfigError::File(path.display().to_string()).into()),
        None => Ok(config_file::load_config()),
    }
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(args: &CheckArgs, file: &ConfigFile) -> anyhow::Result<Config> {
    let mut config = Config::default();
    file.apply_to(&mut config)?;

    if let Some(mailto) = args
        .mailto
        .clone()
        .or_else(|| std::env::var("CROSSREF_MAILTO").ok())
    {
        config.crossref_mailto = Some(mailto);
    }
    if let Some(key) = args
        .s2_api_key
        .clone()
        .or_else(|| std::env::var("S2_API_KEY").ok())
    {
        config.s2_api_key = Some(key);
    }
    if let Some(secs) = args.timeout.or_else(|| {
        std::env::var("DB_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
    }) {
        config.db_timeout_secs = secs;
    }
    if !args.sources.is_empty() {
        config.sources = args
            .sources
            .iter()
            .map(|s| s.parse::<SourceKind>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(t) = args.min_score {
        config.verify_threshold = t;
    }
    if let Some(n) = args.workers {
        config.num_workers = n;
    }
    if let Some(n) = args.max_retries {
        config.retry.max_retries = n;
    }

    config.rate_limiters = Arc::new(RateLimiters::new(
        config.crossref_mailto.is_some(),
        config.s2_api_key.is_some(),
    ));
    config.validate()?;
    Ok(config)
}

fn build_extractor(file: &ConfigFile) -> anyhow::Result<CitationExtractor> {
    let builder = match &file.parsing {
        Some(section) => ParsingConfigBuilder::from_file_section(section),
        None => ParsingConfigBuilder::new(),
    };
    Ok(CitationExtractor::with_config(builder.build()?))
}

fn backend_for(path: &Path) -> Box<dyn PdfBackend> {
    let is_text = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);
    if is_text {
        Box::new(TextFileBackend)
    } else {
        Box::new(MupdfBackend::default())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn check(args: CheckArgs) -> anyhow::Result<()> {
    let file = load_file_config(args.config.as_deref())?;
    // Both configs are validated before the document is touched
    let config = resolve_config(&args, &file)?;
    let extractor = build_extractor(&file)?;
    tracing::debug!(?config, "configuration resolved");

    let color = ColorMode(!args.no_color);
    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());

    if !args.file_path.exists() {
        return Err(BackendError::Open(format!("file not found: {}", args.file_path.display())).into());
    }
    let file_name = display_name(&args.file_path);

    let backend = backend_for(&args.file_path);
    let citations = extractor.extract_from_path(&args.file_path, backend.as_ref())?;
    output::print_extraction_summary(&mut writer, &file_name, &citations, color)?;

    let threshold = config.verify_threshold;

    let progress_writer: Arc<Mutex<Box<dyn Write + Send>>> =
        Arc::new(Mutex::new(Box::new(std::io::stdout())));
    let progress_cb = {
        let pw = Arc::clone(&progress_writer);
        move |event: citecheck_core::ProgressEvent| {
            if let Ok(mut w) = pw.lock() {
                let _ = output::print_progress(&mut *w, &event, color);
                let _ = w.flush();
            }
        }
    };

    let cancel = CancellationToken::new();

    // Ctrl+C stops new lookups; in-flight ones finish
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight lookups");
            cancel_clone.cancel();
        }
    });

    let report = citecheck_core::check_citations(citations, config, progress_cb, cancel).await?;

    writeln!(writer)?;
    output::print_unverified_report(&mut writer, &report, color)?;
    output::print_summary(&mut writer, &report, color)?;

    let mut out = std::fs::File::create(&args.out)
        .with_context(|| format!("could not create {}", args.out.display()))?;
    output::write_json_report(&mut out, &file_name, threshold, &report)?;
    writeln!(writer, "\nReport written to {}", args.out.display())?;

    Ok(())
}

fn dry_run_check(args: CheckArgs) -> anyhow::Result<()> {
    use owo_colors::OwoColorize;

    let file = load_file_config(args.config.as_deref())?;
    let extractor = build_extractor(&file)?;
    let use_color = !args.no_color;
    let mut writer: Box<dyn Write> = Box::new(std::io::stdout());

    if !args.file_path.exists() {
        return Err(BackendError::Open(format!("file not found: {}", args.file_path.display())).into());
    }
    let file_name = display_name(&args.file_path);

    let backend = backend_for(&args.file_path);
    let pages = backend.extract_page_texts(&args.file_path)?;
    let (strategy, entries) = extractor
        .segment_with_strategy(&pages)
        .ok_or(ParsingError::NoEntries)?;

    let header = format!(
        "({} pages, {} entries segmented by {:?})\n",
        pages.len(),
        entries.len(),
        strategy
    );
    if use_color {
        writeln!(writer, "{} {} {}", "DRY RUN:".bold().cyan(), file_name.bold(), header)?;
    } else {
        writeln!(writer, "DRY RUN: {} {}", file_name, header)?;
    }

    for entry in &entries {
        let citation = extractor.parse(entry);

        let raw_display: String = citation.raw_text.split_whitespace().collect::<Vec<_>>().join(" ");
        let raw_display = match raw_display.char_indices().nth(200) {
            Some((cut, _)) => format!("{}...", &raw_display[..cut]),
            None => raw_display,
        };

        let label = format!("[{}] page {}", entry.index + 1, entry.page);
        if use_color {
            writeln!(writer, "{}", label.bold().yellow())?;
        } else {
            writeln!(writer, "{}", label)?;
        }

        writeln!(
            writer,
            "  Title:   {}",
            citation.title.as_deref().unwrap_or("(none)")
        )?;
        writeln!(
            writer,
            "  Authors: {}",
            if citation.authors.is_empty() {
                "(none)".to_string()
            } else {
                citation.authors.join("; ")
            }
        )?;
        if let Some(year) = citation.year {
            writeln!(writer, "  Year:    {}", year)?;
        }

        if use_color {
            writeln!(writer, "  Raw:     {}", raw_display.dimmed())?;
        } else {
            writeln!(writer, "  Raw:     {}", raw_display)?;
        }

        if citation.low_confidence {
            if use_color {
                writeln!(writer, "  {}", "SKIPPED (no title parsed)".red())?;
            } else {
                writeln!(writer, "  SKIPPED (no title parsed)")?;
            }
        }

        writeln!(writer)?;
    }

    writeln!(writer, "Total: {} entries", entries.len())?;

    Ok(())
}
