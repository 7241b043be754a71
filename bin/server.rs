// Bank Product Recommendation Service - Web Server
// REST API with Axum

use clap::Parser;
use recommendation_service::api::router;
use recommendation_service::config::{init_tracing, ServiceConfig};
use std::sync::Arc;

/// HTTP server for recommendations and rule administration
#[derive(Parser, Debug)]
#[command(name = "recommendation-server", version, about, long_about = None)]
struct ServerCli {
    #[command(flatten)]
    config: ServiceConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = ServerCli::parse();
    init_tracing(&cli.config.log)?;

    println!("🌐 Recommendation Service - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let ctx = cli.config.build_context().map_err(|e| {
        tracing::error!("Database initialization failed: {e:#}");
        e
    })?;
    println!("✓ Database opened: {:?}", cli.config.database);

    let app = router(Arc::new(ctx));

    let listener = tokio::net::TcpListener::bind(&cli.config.bind).await?;
    tracing::info!(addr = %cli.config.bind, "recommendation server listening");

    println!("\n🚀 Server running on http://{}", cli.config.bind);
    println!("   API: http://{}/recommendation/<user_id>", cli.config.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
