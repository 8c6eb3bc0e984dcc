use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use career_insights::config::AppConfig;
use career_insights::insights::{GeneratorConfig, InsightStore, LlmInsightGenerator};
use career_insights::llm::create_provider;
use career_insights::refresh;
use career_insights::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");
    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("career-insights v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Insight store ────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let generator = Arc::new(LlmInsightGenerator::new(llm, GeneratorConfig::default()));
    let store = Arc::new(InsightStore::new(db, generator, config.insights.clone()));

    if once {
        let report = store.refresh_stale(Utc::now()).await?;
        eprintln!(
            "   Refreshed {} insight(s), {} failed",
            report.refreshed, report.failed
        );
        return Ok(());
    }

    let schedule = refresh::parse_schedule(&config.refresh_schedule)?;
    eprintln!("   Refresh schedule: {}", config.refresh_schedule);

    let ticker = refresh::spawn_refresh_ticker(store, schedule);
    tokio::select! {
        result = ticker => result.context("Refresh task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}
