//! HTTP server for the natural-language query endpoint

use anyhow::Result;
use askdb::config::Config;
use askdb::http::App;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "English-to-SQL query service over a MySQL database")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::from_env();

    if config.llm_api_key.is_some() {
        info!("GROQ_API_KEY found, LLM fallback enabled");
    } else {
        warn!("GROQ_API_KEY not set, LLM fallback will be skipped");
    }
    info!(
        "Database: {}@{}:{}/{}",
        config.db_user, config.db_host, config.db_port, config.db_name
    );

    let app = Arc::new(App::new(config));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("New connection from {}", peer);
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            app.handle_connection(stream).await;
        });
    }
}
