use outreach_pipeline::AppResources;
use outreach_pipeline::api::{ApiState, start_webserver};
use outreach_pipeline::config::load_config_or_panic;
use outreach_pipeline::pipeline::Pipeline;
use outreach_pipeline::reply_tracker::ReplyTracker;
use sea_orm::Database;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "outreach_pipeline=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");

    initialize_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Set up SeaORM database connection
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    // One shared HTTP client for the generation, directory, mail and
    // storage backends.
    let http = reqwest::Client::builder()
        .user_agent(concat!("outreach-pipeline/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()?;

    let resources = Arc::new(AppResources { db, http, config });
    let pipeline = Arc::new(Pipeline::new(resources.clone()));
    let tracker = Arc::new(ReplyTracker::new(
        resources.http.clone(),
        resources.config.mail.clone(),
    ));

    // Periodic send-batch sweep
    {
        let pipeline = pipeline.clone();
        let resources = resources.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(
                resources.config.pipeline.send_interval_secs,
            ));
            loop {
                interval.tick().await;
                let batch_size = resources.config.pipeline.batch_size;
                if let Err(e) = pipeline.run_send_batch(batch_size, None).await {
                    tracing::error!(error = %e, "scheduled send batch failed");
                }
            }
        });
    }

    // Periodic reply-tracking sweep
    {
        let tracker = tracker.clone();
        let resources = resources.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(
                resources.config.pipeline.reply_sweep_interval_secs,
            ));
            loop {
                interval.tick().await;
                if let Err(e) = tracker.run_sweep(resources.db.as_ref()).await {
                    tracing::error!(error = %e, "scheduled reply sweep failed");
                }
            }
        });
    }

    let state = ApiState {
        resources,
        pipeline,
        tracker,
    };
    start_webserver(state).await?;
    Ok(())
}
