//! CorvusDB server binary

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use tracing_subscriber::EnvFilter;

use corvusdb::catalog::Catalog;
use corvusdb::executor::MemoryExecutor;
use corvusdb::server::{Server, Settings, ShutdownSignal};

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CorvusDB column-oriented analytical database server")]
struct Cli {
    #[arg(long, default_value = "9100", env = "CORVUSDB_PORT")]
    port: u16,
    /// Additional database names clients may select at handshake
    #[arg(long, env = "CORVUSDB_DATABASES", value_delimiter = ',')]
    databases: Vec<String>,
    #[arg(long, default_value = "300", env = "CORVUSDB_RECEIVE_TIMEOUT_SECS")]
    receive_timeout_secs: u64,
    #[arg(long, default_value = "300", env = "CORVUSDB_SEND_TIMEOUT_SECS")]
    send_timeout_secs: u64,
    #[arg(long, default_value = "10", env = "CORVUSDB_POLL_INTERVAL_SECS")]
    poll_interval_secs: u64,
    #[arg(long, default_value = "100", env = "CORVUSDB_INTERACTIVE_DELAY_MS")]
    interactive_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    tracing::info!(port = cli.port, "Starting CorvusDB");

    let settings = Settings {
        receive_timeout: Duration::from_secs(cli.receive_timeout_secs),
        send_timeout: Duration::from_secs(cli.send_timeout_secs),
        poll_interval: Duration::from_secs(cli.poll_interval_secs),
        interactive_delay: Duration::from_millis(cli.interactive_delay_ms),
    };

    let mut catalog = Catalog::new();
    for database in cli.databases {
        catalog.add_database(database);
    }
    let catalog = Arc::new(RwLock::new(catalog));

    let executor = Arc::new(MemoryExecutor::new());

    let addr: SocketAddr = format!("0.0.0.0:{}", cli.port).parse()?;
    let server = Server::new(addr, settings, catalog, executor, ShutdownSignal::new());
    server.run().await?;

    Ok(())
}
