use clap::Parser;
use escrowd::application::decision::DecisionEngine;
use escrowd::application::escrow::{EscrowPorts, EscrowService};
use escrowd::config::Cli;
use escrowd::domain::ports::{DecisionBackendBox, OrderStoreRef, PaymentGatewayRef};
use escrowd::infrastructure::in_memory::{
    InMemoryMessageStore, InMemoryNotificationSink, InMemoryPaymentGateway, InMemoryStore,
};
use escrowd::infrastructure::openai::OpenAiBackend;
#[cfg(feature = "storage-rocksdb")]
use escrowd::infrastructure::rocksdb::RocksDBStore;
use escrowd::infrastructure::stripe::StripeGateway;
use escrowd::interfaces::csv::command_reader::{CommandOutcome, CommandReader};
use escrowd::interfaces::csv::order_writer::OrderWriter;
use escrowd::interfaces::json::seed::Seed;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_order_store(cli: &Cli) -> Result<OrderStoreRef> {
    if let Some(db_path) = &cli.db_path {
        // Use persistent storage (RocksDB)
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok(Arc::new(store));
    }
    // Use in-memory storage
    Ok(Arc::new(InMemoryStore::new()))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_order_store(cli: &Cli) -> Result<OrderStoreRef> {
    if cli.db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    // Use in-memory storage
    Ok(Arc::new(InMemoryStore::new()))
}

fn payment_gateway(cli: &Cli) -> Result<PaymentGatewayRef> {
    match cli.stripe() {
        Some(config) => Ok(Arc::new(StripeGateway::new(config).into_diagnostic()?)),
        None => {
            info!("no processor key configured, using the in-memory payment gateway");
            Ok(Arc::new(InMemoryPaymentGateway::new()))
        }
    }
}

fn decision_backend(cli: &Cli) -> Option<DecisionBackendBox> {
    let config = cli.decision_backend()?;
    match OpenAiBackend::new(config) {
        Ok(backend) => Some(Box::new(backend)),
        Err(e) => {
            warn!(error = %e, "decision backend unavailable, release decisions use fallback heuristics");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let seed = Seed::from_reader(File::open(&cli.seed).into_diagnostic()?).into_diagnostic()?;

    let orders = open_order_store(&cli)?;
    for order in seed.orders {
        // Persisted state wins over the seed.
        if orders.find_by_id(&order.id).await.into_diagnostic()?.is_none() {
            orders.insert(order).await.into_diagnostic()?;
        }
    }
    let messages = InMemoryMessageStore::new();
    for message in seed.messages {
        messages.add(message).await;
    }

    let engine = DecisionEngine::new(decision_backend(&cli), cli.escrow_config().decision_timeout);
    if !engine.has_backend() {
        info!("no decision backend configured, release decisions use fallback heuristics");
    }

    let service = EscrowService::new(
        EscrowPorts {
            orders: orders.clone(),
            messages: Arc::new(messages),
            notifications: Arc::new(InMemoryNotificationSink::new()),
            gateway: payment_gateway(&cli)?,
        },
        engine,
        cli.escrow_config(),
    );

    // Process commands
    let file = File::open(&cli.commands).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => match command.apply(&service).await {
                Ok(CommandOutcome::Created(created)) => {
                    info!(order = %command.order, authorization_id = %created.authorization_id, "escrow created");
                }
                Ok(CommandOutcome::Released(outcome)) if outcome.released => {
                    info!(order = %command.order, reason = %outcome.reason, "escrow released");
                }
                Ok(CommandOutcome::Released(outcome)) => {
                    info!(order = %command.order, reason = %outcome.reason, confidence = outcome.confidence, "escrow held");
                }
                Ok(CommandOutcome::Cancelled(_)) => {
                    info!(order = %command.order, "escrow cancelled");
                }
                Err(e) => {
                    error!(order = %command.order, retryable = e.is_retryable(), "Error processing command: {}", e);
                }
            },
            Err(e) => {
                error!("Error reading command: {}", e);
            }
        }
    }

    // Output final state
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer
        .write_orders(orders.all_orders().await.into_diagnostic()?)
        .into_diagnostic()?;

    Ok(())
}
