use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledgersift::classify::OpenAiClassifier;
use ledgersift::cleanup::CleanupScheduler;
use ledgersift::config::Settings;
use ledgersift::events::EventHub;
use ledgersift::jobs::JobStore;
use ledgersift::ledger::HttpLedgerClient;
use ledgersift::pipeline::Pipeline;
use ledgersift::queue::ProcessingQueue;
use ledgersift::resolve::HumanInputResolver;
use ledgersift::server::{AppState, Server, router};
use ledgersift::webhook::WebhookValidator;

#[derive(Parser, Debug)]
#[command(name = "ledgersift", about = "LLM-backed transaction categorization")]
struct Cli {
    /// Bind host (overrides LEDGERSIFT_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides LEDGERSIFT_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let store = Arc::new(JobStore::new());
    let hub = Arc::new(EventHub::new());
    let bridge = hub.spawn_bridge(&store);

    let ledger = Arc::new(HttpLedgerClient::new(settings.ledger.clone()));
    let classifier = Arc::new(OpenAiClassifier::new(settings.classifier.clone()));

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&store),
        ledger.clone(),
        classifier,
        Arc::clone(&hub),
    ));
    let queue = Arc::new(ProcessingQueue::start(
        pipeline,
        Arc::clone(&store),
        settings.queue.task_timeout,
    ));

    let resolver = Arc::new(HumanInputResolver::new(Arc::clone(&store), ledger));
    let cleanup = Arc::new(CleanupScheduler::new(
        Arc::clone(&store),
        settings.cleanup.clone(),
    ));

    let cleanup_task = {
        let cleanup = Arc::clone(&cleanup);
        tokio::spawn(async move { cleanup.run().await })
    };

    let state = AppState {
        store,
        queue,
        validator: Arc::new(WebhookValidator::new()),
        resolver,
        cleanup,
        hub,
    };

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let mut server = Server::new(addr);
    server.start(router(state)).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    server.shutdown().await;
    cleanup_task.abort();
    bridge.abort();

    Ok(())
}
