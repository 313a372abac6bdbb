//! CyberX CLI - threat-intelligence pipeline with an interactive query loop

use std::io::{self, BufRead, IsTerminal, StdinLock};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cyberx_core::audit::AuditLogger;
use cyberx_core::collector::{ScrapeClient, SourceCollector};
use cyberx_core::config::{
    COLLECTION_API_KEY_ENV, Config, EXTRACTION_API_KEY_ENV, EmbeddingProvider, redact,
};
use cyberx_core::extraction::{ExtractionEngine, LlmExtractor};
use cyberx_core::fallback::FallbackProvider;
use cyberx_core::knowledge::{Embedder, HashingEmbedder, KnowledgeBase, RemoteEmbedder};
use cyberx_core::llm::LlmClient;
use cyberx_core::retrieval::LlmResponder;
use cyberx_core::session::{PipelineSummary, QueryOutcome, SessionController};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "cyberx> ";

/// Log filters used when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "cyberx=info";
const QUIET_LOG_FILTER: &str = "cyberx=warn";

#[derive(Parser)]
#[command(name = "cyberx")]
#[command(
    author,
    version,
    about = "Threat-intelligence RAG pipeline with deterministic fallback",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for execution log artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of reports to collect
    #[arg(long)]
    max_reports: Option<usize>,

    /// Run every stage on fallback data, ignoring API keys
    #[arg(long)]
    offline: bool,

    /// Quiet mode (answers only)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logs go to stderr so the query loop stays readable
    let filter = match std::env::var_os("RUST_LOG") {
        Some(_) => EnvFilter::from_default_env(),
        None if cli.quiet => EnvFilter::new(QUIET_LOG_FILTER),
        None => EnvFilter::new(DEFAULT_LOG_FILTER),
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error_report(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.output_dir.clone() {
        config.audit.output_dir = dir;
    }
    if let Some(max) = cli.max_reports {
        config.collection.max_reports = max;
    }
    config.validate()?;

    let mut session = build_session(&config, cli.offline, cli.quiet)?;

    if !cli.quiet {
        println!("CyberX Threat Intelligence");
        println!("==========================");
        println!();
        println!("Running collection, extraction and indexing...");
    }
    let summary = session.run_pipeline().await?;
    if !cli.quiet {
        print_pipeline_summary(&summary);
        print_entries(&session);
        print_suggested_questions(&session);
    }

    // The artifact is written even when reading queries fails
    let queries = query_loop(&mut session, cli.quiet).await;
    if let Err(err) = &queries {
        warn!(error = %err, "Query loop ended early");
    }

    let artifact = session.close()?;
    if !cli.quiet {
        println!();
        println!("Execution log saved to {}", artifact.path.display());
    }
    queries
}

/// Error text for stderr, with the code and hint for CyberX errors
fn error_report(err: &anyhow::Error) -> String {
    match err.downcast_ref::<cyberx_core::Error>() {
        Some(e) => match e.suggestion() {
            Some(hint) => format!("Error [{}]: {}\n  Suggestion: {}", e.code(), e, hint),
            None => format!("Error [{}]: {}", e.code(), e),
        },
        None => format!("Error: {:#}", err),
    }
}

fn build_session(config: &Config, offline: bool, quiet: bool) -> anyhow::Result<SessionController> {
    let fallback = Arc::new(match &config.fallback_dataset {
        Some(path) => FallbackProvider::from_json_file(path)?,
        None => FallbackProvider::default(),
    });

    let collection_key = if offline {
        None
    } else {
        config.collection.resolved_api_key()?
    };
    let llm_key = if offline {
        None
    } else {
        config.llm.resolved_api_key()?
    };

    if !quiet {
        report_key(COLLECTION_API_KEY_ENV, collection_key.as_deref(), offline);
        report_key(EXTRACTION_API_KEY_ENV, llm_key.as_deref(), offline);
    }

    let collector = match collection_key {
        Some(key) => SourceCollector::new(
            Arc::new(ScrapeClient::new(&config.collection, key)?),
            fallback.clone(),
        ),
        None => SourceCollector::fallback_only(
            fallback.clone(),
            unavailable_reason(COLLECTION_API_KEY_ENV, offline),
        ),
    }
    .with_policy(config.collection.invoke_policy())
    .with_concurrency(config.collection.concurrency);

    let llm = llm_key
        .map(|key| LlmClient::new(config.llm.clone(), key))
        .transpose()?;
    let policy = config.llm.invoke_policy();

    let extractor = match &llm {
        Some(client) => {
            ExtractionEngine::new(Arc::new(LlmExtractor::new(client.clone())), fallback.clone())
        }
        None => ExtractionEngine::fallback_only(
            fallback.clone(),
            unavailable_reason(EXTRACTION_API_KEY_ENV, offline),
        ),
    }
    .with_policy(policy);

    let embedder: Arc<dyn Embedder> = match (config.embedding.provider, &llm) {
        (EmbeddingProvider::Remote, Some(client)) => Arc::new(
            RemoteEmbedder::new(client.clone(), &config.embedding.model, policy)
                .with_dimensions(config.embedding.dimensions),
        ),
        (EmbeddingProvider::Remote, None) => {
            warn!("Remote embeddings need {}; using hashing embedder", EXTRACTION_API_KEY_ENV);
            Arc::new(HashingEmbedder::new(config.embedding.dimensions))
        }
        (EmbeddingProvider::Hashing, _) => {
            Arc::new(HashingEmbedder::new(config.embedding.dimensions))
        }
    };
    info!(embedder = embedder.name(), "Knowledge base ready");

    let mut builder = SessionController::builder()
        .topics(config.collection.topics.iter().cloned())
        .max_reports(config.collection.max_reports)
        .collector(collector)
        .extractor(extractor)
        .knowledge_base(KnowledgeBase::new(embedder))
        .retrieval_policy(policy)
        .top_k(config.retrieval.top_k)
        .min_similarity(config.retrieval.min_similarity)
        .fallback(fallback)
        .audit(AuditLogger::new(&config.audit.output_dir, &config.audit.product)?);
    builder = match llm {
        Some(client) => builder.responder(Arc::new(LlmResponder::new(client))),
        None => builder.responder_unavailable(unavailable_reason(EXTRACTION_API_KEY_ENV, offline)),
    };

    Ok(builder.build()?)
}

fn unavailable_reason(env: &str, offline: bool) -> String {
    if offline {
        "offline mode".to_string()
    } else {
        format!("{} not set", env)
    }
}

fn report_key(env: &str, key: Option<&str>, offline: bool) {
    match key {
        Some(key) => println!("[OK] {}: configured ({})", env, redact(key)),
        None if offline => println!("[--] {}: ignored (offline)", env),
        None => println!("[!!] {}: not set, using fallback data", env),
    }
}

fn print_pipeline_summary(summary: &PipelineSummary) {
    let collection = &summary.collection;
    println!(
        "{} Collection: {} reports ({} primary, {} fallback) [{}]",
        status_tag(collection.is_degraded()),
        collection.primary + collection.fallback,
        collection.primary,
        collection.fallback,
        collection.mode
    );
    for failure in &collection.failures {
        println!("     {}: {}", failure.topic, failure.failure);
    }

    let extraction = &summary.extraction;
    println!(
        "{} Extraction: {} records ({} primary, {} fallback, {} insufficient) [{}]",
        status_tag(extraction.is_degraded()),
        extraction.primary + extraction.fallback,
        extraction.primary,
        extraction.fallback,
        extraction.insufficient,
        extraction.mode
    );

    println!(
        "{} Indexing: {} indexed, {} failed",
        status_tag(summary.index_failures > 0),
        summary.indexed,
        summary.index_failures
    );
}

fn status_tag(degraded: bool) -> &'static str {
    if degraded { "[!!]" } else { "[OK]" }
}

fn print_entries(session: &SessionController) {
    let Some(kb) = session.knowledge_base() else {
        return;
    };
    println!();
    println!("Loaded intelligence entries ({}):", kb.len());
    println!("  {:<3} {:<20} {:<10} {}", "#", "Actor", "Nexus", "Source");
    for (idx, record) in kb.records().enumerate() {
        println!(
            "  {:<3} {:<20} {:<10} {}",
            idx + 1,
            record.actor_name(),
            record.nexus(),
            record.extracted_via()
        );
    }
}

fn print_suggested_questions(session: &SessionController) {
    println!();
    println!("Suggested questions:");
    for question in session.suggested_questions() {
        println!("  - {}", question);
    }
    println!();
    println!("Type 'exit' to finish.");
}

/// Line source for the query loop
enum Input {
    Editor(DefaultEditor),
    Plain(StdinLock<'static>),
}

impl Input {
    fn open() -> anyhow::Result<Self> {
        if io::stdin().is_terminal() {
            Ok(Input::Editor(DefaultEditor::new()?))
        } else {
            Ok(Input::Plain(io::stdin().lock()))
        }
    }

    /// Next line, or `None` at end of input
    fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        match self {
            Input::Editor(editor) => match editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = editor.add_history_entry(line.as_str());
                    }
                    Ok(Some(line))
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
                Err(e) => Err(e.into()),
            },
            Input::Plain(stdin) => {
                // Undecodable bytes become U+FFFD instead of ending the session
                let mut buf = Vec::new();
                if stdin.read_until(b'\n', &mut buf)? == 0 {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&buf);
                Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
            }
        }
    }
}

async fn query_loop(session: &mut SessionController, quiet: bool) -> anyhow::Result<()> {
    let mut input = Input::open()?;

    while let Some(line) = input.next_line()? {
        match session.submit(&line).await? {
            QueryOutcome::Answered { text, via } => {
                println!("{}", text);
                if !quiet {
                    println!("  (answered via {})", via);
                    println!();
                }
            }
            QueryOutcome::Ignored => {}
            QueryOutcome::Terminated => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_has_no_required_arguments() {
        let cli = Cli::try_parse_from(["cyberx"]).unwrap();
        assert!(!cli.offline);
        assert!(cli.config.is_none());
        assert!(cli.max_reports.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "cyberx",
            "--offline",
            "--quiet",
            "--max-reports",
            "3",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        assert!(cli.offline);
        assert!(cli.quiet);
        assert_eq!(cli.max_reports, Some(3));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_error_report_includes_code_and_suggestion() {
        let err = anyhow::Error::from(cyberx_core::Error::ArtifactExists("CyberX #1.json".into()));
        let report = error_report(&err);
        assert!(report.starts_with("Error [E600]:"));
        assert!(report.contains("Suggestion: Remove the stale artifact"));

        let err = anyhow::anyhow!("plain failure").context("loading config");
        assert_eq!(error_report(&err), "Error: loading config: plain failure");
    }

    #[test]
    fn test_unavailable_reason() {
        assert_eq!(unavailable_reason("X_KEY", true), "offline mode");
        assert_eq!(unavailable_reason("X_KEY", false), "X_KEY not set");
    }
}
