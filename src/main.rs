use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use otc_onboarding::cli::Console;
use otc_onboarding::config::WizardConfig;
use otc_onboarding::onboarding::{OnboardingManager, ProfileStore};
use otc_onboarding::services::{LocalHandoff, MockScreener, MockVerifier};
use otc_onboarding::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WizardConfig::from_env().context("Invalid configuration")?;

    // ── Logging ──────────────────────────────────────────────────────────
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "onboarding.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    eprintln!("OTC Onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Type 'help' for commands, 'quit' to exit.\n");

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    tracing::info!(path = %config.db_path.display(), "Database opened");

    // ── Wizard ───────────────────────────────────────────────────────────
    let store = Arc::new(ProfileStore::open(Arc::clone(&db), config.user_id.clone()).await);
    let manager = Arc::new(OnboardingManager::new(
        store,
        Arc::new(MockScreener::new(config.simulate_latency)),
        Arc::new(MockVerifier::new(
            config.verify_success_rate,
            config.simulate_latency,
        )),
        Arc::new(LocalHandoff::new(
            db,
            config.bizdev_email.clone(),
            config.from_email.clone(),
        )),
    ));

    Console::new(manager).run().await
}
