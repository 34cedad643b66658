use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use tracing::{error, info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use quorum::config::{AppConfig, NotifyMode};
use quorum::notify::{Delivery, Dispatcher, LogMailer, Mailer, Notifier, SmtpMailer};
use quorum::openapi::ApiDoc;
use quorum::repo::Repo;
use quorum::storage::build_blob_store;
use quorum::{config, retry, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };
    info!("Bootstrapping Quorum server");
    info!("Site URL: {}", cfg.site.url);

    let repo = build_repo(&cfg).await?;
    let blob_store = build_blob_store().await?;

    let mailer: Arc<dyn Mailer> = match &cfg.smtp {
        Some(smtp) => {
            info!("SMTP relay {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpMailer::new(smtp, &cfg.email_from)?)
        }
        None => {
            warn!("SMTP_HOST not set; notifications are logged, not sent");
            Arc::new(LogMailer)
        }
    };
    let dispatcher = Arc::new(Dispatcher::new(mailer, cfg.site.clone()));
    let delivery = match cfg.notify_mode {
        NotifyMode::Sync => Delivery::Immediate,
        NotifyMode::Queued => {
            let (queue, worker) = retry::spawn(Arc::clone(&dispatcher), cfg.retry);
            tokio::spawn(async move {
                match worker.await {
                    Ok(()) => warn!("notification retry runner stopped"),
                    Err(e) => error!(error = %e, "notification retry runner died"),
                }
            });
            info!(
                max_attempts = cfg.retry.max_attempts,
                backoff_secs = cfg.retry.backoff.as_secs(),
                "notification retry runner started"
            );
            Delivery::Queued(queue)
        }
    };
    let state = AppState {
        repo,
        blob_store,
        notifier: Arc::new(Notifier::new(dispatcher, delivery)),
    };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let site_url = cfg.site.url.trim_end_matches('/').to_string();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // during local dev allow the usual frontend ports
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin(&site_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await?;
    Ok(())
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use quorum::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let db_url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new().max_connections(5).connect(db_url).await?;
    let repo = PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use quorum::repo::inmem::InMemRepo;

    let repo = match &cfg.data_dir {
        Some(dir) => {
            info!("Using in-memory repository backend with snapshots in {}", dir.display());
            InMemRepo::with_snapshot_dir(dir)
        }
        None => {
            info!("Using ephemeral in-memory repository backend");
            InMemRepo::ephemeral()
        }
    };
    Ok(Arc::new(repo))
}
