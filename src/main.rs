mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use pdrbox::config::Config;
use pdrbox::handlers::{HandlerError, HandlerRegistry};
use pdrbox::observability::init_tracing;
use pdrbox::state::AppState;
use serde_json::{Value, json};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let state = AppState::open(config)?;
    let registry = HandlerRegistry::with_defaults(state.clone());

    let (handler, event) = match cli.command {
        Commands::Discover(args) => (
            "discover-pdrs".to_string(),
            json!({"collectionName": args.collection, "providerName": args.provider}),
        ),
        Commands::ParsePdrs(args) => (
            "parse-pdrs".to_string(),
            json!({
                "numOfMessages": args.messages,
                "visibilityTimeout": args.visibility,
                "concurrency": args.concurrency,
                "maxIterations": args.max_iterations,
            }),
        ),
        Commands::IngestGranules(args) => (
            "ingest-granules".to_string(),
            json!({
                "concurrency": args.concurrency,
                "visibilityTimeout": args.visibility,
                "maxIterations": args.max_iterations,
            }),
        ),
        Commands::Invoke(args) => {
            let event: Value = serde_json::from_str(&args.event)?;
            (args.handler, event)
        }
    };

    info!(handler = %handler, "Starting");
    let run = registry.invoke(&handler, event, |err, msg| match err {
        Some(e) => Err::<Value, HandlerError>(e),
        None => Ok(msg.unwrap_or(Value::Null)),
    });

    let outcome = tokio::select! {
        outcome = run => Some(outcome),
        _ = tokio::signal::ctrl_c() => {
            warn!(handler = %handler, "Interrupted; unacknowledged messages return after their visibility timeout");
            None
        }
    };

    // Durable before exit, whether the handler finished, failed or was interrupted
    state.persist()?;

    if let Some(outcome) = outcome {
        let message = outcome?;
        println!("{}", serde_json::to_string_pretty(&message)?);
    }
    Ok(())
}
