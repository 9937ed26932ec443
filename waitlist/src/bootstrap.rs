//! Application assembly from configuration.
//!
//! 1. Build the code store and ledger for the selected backend (running
//!    migrations for `PostgreSQL`)
//! 2. Seed both code pools from their lists (skipped once a pool has been seeded)
//! 3. Build the photo store, renderer and notifier
//! 4. Wire everything into an [`AppState`]

use crate::admission::{AdmissionEnvironment, AdmissionPolicy};
use crate::artifacts::{ArtifactRenderer, PdfArtifactRenderer};
use crate::codes::{CodeStore, InMemoryCodeStore, PostgresCodeStore, SeedOutcome, load_code_list};
use crate::config::{Config, StorageBackend};
use crate::ledger::{InMemoryRegistrantLedger, PostgresRegistrantLedger, RegistrantLedger};
use crate::notify::{ConsoleNotifier, MessageTemplates, Notifier, SmtpNotifier};
use crate::photos::PhotoStore;
use crate::server::{AppSettings, AppState};
use crate::types::{CodePool, EventIdFormat};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use waitlist_core::environment::{Clock, SystemClock};
use waitlist_runtime::RetryPolicy;
use waitlist_runtime::retry::retry_with_backoff;
use waitlist_web::UploadLimits;

/// Code store and ledger for one backend.
pub struct Storage {
    /// Registration codes
    pub codes: Arc<dyn CodeStore>,
    /// Registrants and the identifier sequence
    pub ledger: Arc<dyn RegistrantLedger>,
}

/// Connect to the configured backend.
///
/// # Errors
///
/// Fails if `PostgreSQL` is unreachable, migrations fail, or the identifier
/// counter cannot be initialised.
pub async fn build_storage(config: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<Storage> {
    let registration = &config.registration;
    let format = EventIdFormat::new(
        registration.event_id_prefix.clone(),
        registration.event_id_width,
    );

    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; registrants are lost on restart");
            Ok(Storage {
                codes: Arc::new(InMemoryCodeStore::new(clock, registration.claim_ttl())),
                ledger: Arc::new(InMemoryRegistrantLedger::new(format)),
            })
        },
        StorageBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let options = PgPoolOptions::new()
                .max_connections(config.storage.max_connections)
                .acquire_timeout(Duration::from_secs(config.storage.connect_timeout));
            let backoff = RetryPolicy::builder()
                .max_retries(config.storage.connect_retries)
                .initial_delay(Duration::from_millis(500))
                .max_delay(Duration::from_secs(10))
                .build();
            let pool = retry_with_backoff(&backoff, || {
                options.clone().connect(&config.storage.database_url)
            })
            .await
            .context("Failed to connect to PostgreSQL")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            info!("Migrations applied");

            let ledger = PostgresRegistrantLedger::new(pool.clone(), format);
            let last = ledger.initialize().await.context("Failed to initialise event id counter")?;
            info!(last_sequence = last, "Event id counter ready");

            Ok(Storage {
                codes: Arc::new(PostgresCodeStore::new(pool, clock, registration.claim_ttl())),
                ledger: Arc::new(ledger),
            })
        },
    }
}

/// Seed both pools from their configured lists.
///
/// A missing list file leaves that pool as it is.
///
/// # Errors
///
/// Fails if a list exists but cannot be read, or the store rejects the seed.
pub async fn seed_codes(codes: &dyn CodeStore, config: &Config) -> anyhow::Result<()> {
    let lists = [
        (CodePool::Standard, config.registration.codes_file.as_path()),
        (CodePool::Late, config.registration.late_codes_file.as_path()),
    ];

    for (pool, path) in lists {
        seed_pool(codes, pool, path).await?;
    }
    Ok(())
}

async fn seed_pool(codes: &dyn CodeStore, pool: CodePool, path: &Path) -> anyhow::Result<()> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!(%pool, path = %path.display(), "Code list not found; pool not seeded");
        return Ok(());
    }

    let list = load_code_list(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match codes.seed(pool, &list).await? {
        SeedOutcome::Seeded(n) => info!(%pool, codes = n, "Code pool seeded"),
        SeedOutcome::AlreadySeeded(n) => info!(%pool, remaining = n, "Code pool already seeded"),
    }
    Ok(())
}

/// SMTP notifier when credentials are configured, console otherwise.
///
/// # Errors
///
/// Fails if the SMTP transport cannot be built.
pub fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    if config.smtp.is_configured() {
        info!(host = %config.smtp.host, port = config.smtp.port, "Using SMTP notifier");
        Ok(Arc::new(SmtpNotifier::new(&config.smtp)?))
    } else {
        warn!("SMTP credentials not set; emails are logged to the console");
        Ok(Arc::new(ConsoleNotifier::new()))
    }
}

/// Admission rules from configuration.
#[must_use]
pub fn admission_policy(config: &Config) -> AdmissionPolicy {
    let mut policy = AdmissionPolicy::new(config.registration.late_registration_start);
    policy.max_allocation_attempts = config.registration.max_allocation_attempts.max(1);
    policy.allocation_backoff = RetryPolicy::builder()
        .initial_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(200))
        .build();
    policy.messages = MessageTemplates {
        event_name: config.branding.event_name.clone(),
        signature: config.smtp.from_name.clone(),
    };
    policy
}

/// Handler settings from configuration.
#[must_use]
pub fn app_settings(config: &Config) -> AppSettings {
    AppSettings {
        admission_timeout: config.registration.admission_timeout(),
        certificate_release: config.registration.certificate_release,
        uploads: UploadLimits::images(config.uploads.max_bytes),
        require_photo: config.uploads.require_photo,
        admin_token: config.admin.token.clone(),
        cors_origin: config.server.cors_origin.clone(),
    }
}

/// Build the full application state from configuration.
///
/// # Errors
///
/// Fails if storage, seeding, the uploads directory, or the notifier cannot
/// be set up.
pub async fn build_app_state(config: &Config) -> anyhow::Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = build_storage(config, Arc::clone(&clock)).await?;
    seed_codes(storage.codes.as_ref(), config).await?;

    let photos = PhotoStore::new(config.uploads.dir.clone());
    photos
        .ensure_dir()
        .await
        .with_context(|| format!("Failed to create {}", config.uploads.dir.display()))?;

    let renderer: Arc<dyn ArtifactRenderer> =
        Arc::new(PdfArtifactRenderer::new(config.branding.clone(), photos.clone()));
    let notifier = build_notifier(config)?;

    let env = AdmissionEnvironment {
        clock,
        codes: storage.codes,
        ledger: storage.ledger,
        renderer,
        notifier,
        policy: admission_policy(config),
    };

    Ok(AppState::new(env, photos, app_settings(config)))
}
