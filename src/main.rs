use std::sync::Arc;

use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use inbox_triage::config::{GatewayConfig, MetricsConfig, PipelineConfig};
use inbox_triage::ledger::AccuracyLedger;
use inbox_triage::llm::{LlmBackend, LlmGateway};
use inbox_triage::mail::FileProvider;
use inbox_triage::pipeline::PipelineScheduler;
use inbox_triage::prompts::PromptRegistry;
use inbox_triage::settings::SettingsStore;
use inbox_triage::store::{Database, LibSqlBackend};
use inbox_triage::tasks::Extractor;
use inbox_triage::triage::{Classifier, ExampleStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; optional rolling file output alongside stderr.
    let _log_guard = match std::env::var("TRIAGE_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_target(false)
                .init();
            None
        }
    };

    let pipeline_config = PipelineConfig::from_env()?;
    let gateway_config = GatewayConfig::from_env()?;
    let metrics_config = MetricsConfig::from_env()?;

    let backend: LlmBackend = std::env::var("TRIAGE_LLM_BACKEND")
        .unwrap_or_else(|_| "anthropic".to_string())
        .parse()
        .unwrap_or(LlmBackend::Anthropic);
    let key_var = match backend {
        LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        LlmBackend::OpenAi => "OPENAI_API_KEY",
    };
    let api_key = std::env::var(key_var).unwrap_or_else(|_| {
        eprintln!("Error: {key_var} not set");
        std::process::exit(1);
    });
    let model = std::env::var("TRIAGE_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let inbox_file = std::env::var("TRIAGE_INBOX_FILE").unwrap_or_else(|_| {
        eprintln!("Error: TRIAGE_INBOX_FILE not set");
        eprintln!("  Point it at a JSON array of messages to triage.");
        std::process::exit(1);
    });
    let folder = std::env::var("TRIAGE_FOLDER").unwrap_or_else(|_| "Inbox".to_string());
    let username = std::env::var("TRIAGE_USER").unwrap_or_else(|_| "default".to_string());
    let db_path = std::env::var("TRIAGE_DB_PATH")
        .unwrap_or_else(|_| "./data/inbox-triage.db".to_string());

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {model}");
    eprintln!("   Inbox: {inbox_file} (folder: {folder})");
    eprintln!("   Database: {db_path}");
    eprintln!(
        "   Page size: {}, parallel pages: {}\n",
        pipeline_config.page_size, pipeline_config.parallel_pages
    );

    // ── LLM ──────────────────────────────────────────────────────────
    let client = backend.connect(&secrecy::SecretString::from(api_key), &model)?;
    let gateway = Arc::new(LlmGateway::new(client, gateway_config));

    // ── Storage & settings ───────────────────────────────────────────
    let db: Arc<dyn Database> =
        Arc::new(LibSqlBackend::new_local(std::path::Path::new(&db_path)).await?);
    let settings = SettingsStore::new(Arc::clone(&db)).get(&username).await?;

    // ── Pipeline ─────────────────────────────────────────────────────
    let registry = Arc::new(PromptRegistry::new(pipeline_config.custom_overrides_enabled));
    let classifier = Arc::new(Classifier::new(
        Arc::clone(&gateway),
        Arc::clone(&registry),
        ExampleStore::new(Arc::clone(&db)),
    ));
    let extractor = Arc::new(Extractor::new(
        Arc::clone(&gateway),
        Arc::clone(&registry),
        pipeline_config.extractor_version.clone(),
    ));
    let ledger = Arc::new(AccuracyLedger::new(Arc::clone(&db)));

    let scheduler = PipelineScheduler::new(
        Arc::new(FileProvider::new(inbox_file)),
        classifier,
        extractor,
        gateway,
        Arc::clone(&registry),
        Arc::clone(&db),
        Arc::clone(&ledger),
        pipeline_config,
    );

    // Progress display
    let mut progress = BroadcastStream::new(scheduler.subscribe());
    tokio::spawn(async move {
        while let Some(Ok(event)) = progress.next().await {
            eprintln!(
                "   page {} [{}] {}/{}",
                event.page_index,
                event.stage.label(),
                event.current,
                event.total
            );
        }
    });

    // ── Run ──────────────────────────────────────────────────────────
    let summary = scheduler.run(&folder, None, &settings).await?;

    eprintln!(
        "\nDone: {} messages, {} classified, {} tasks across {} pages",
        summary.total_messages,
        summary.total_classified(),
        summary.total_tasks(),
        summary.pages.len()
    );
    let delete_candidates: usize = summary
        .pages
        .iter()
        .map(|p| p.delete_candidates.len())
        .sum();
    if delete_candidates > 0 {
        eprintln!("   {delete_candidates} delete candidate(s) flagged for the provider");
    }

    // ── Metrics & housekeeping ───────────────────────────────────────
    ledger.prune(metrics_config.retention_days).await?;
    let metrics = ledger.running_metrics(metrics_config.window_days).await?;
    if metrics.total > 0 {
        eprintln!(
            "   Accuracy over last {} days: {:.1}% ({} predictions)",
            metrics_config.window_days,
            metrics.overall_accuracy * 100.0,
            metrics.total
        );
    }

    if std::env::var("TRIAGE_HOLISTIC").is_ok() {
        match scheduler.holistic_summary(&settings).await {
            Ok(overview) if !overview.is_empty() => {
                eprintln!("\nInbox overview:\n{overview}");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Holistic summary unavailable"),
        }
    }

    Ok(())
}
