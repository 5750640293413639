use std::{net::SocketAddr, process, time::Duration};

use dotenvy::dotenv;
use ims::{
    config::AppConfig,
    create_router,
    database::{create_database_pool, run_migrations},
    AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info,sqlx=warn")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let db = create_database_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&db).await?;

    let addr = config.bind_address();
    let state = AppState::new(db, config);

    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            limiter.purge(Duration::from_secs(300));
        }
    });

    let app = create_router(state);

    log::info!("IMS server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
