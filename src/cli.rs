use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pdrbox")]
#[command(about = "PDR ingest pipeline: discover, parse and stage granules", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to PDRBOX_CONFIG or config/pdrbox.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List a provider and queue manifests not seen before
    Discover(DiscoverArgs),
    /// Consume the manifest queue and dispatch granules
    ParsePdrs(ParsePdrsArgs),
    /// Consume the file transfer queue and stage files
    IngestGranules(IngestGranulesArgs),
    /// Run a named handler with a JSON event
    Invoke(InvokeArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct DiscoverArgs {
    /// Discover through a collection's provider
    #[arg(long)]
    pub collection: Option<String>,

    /// Discover one provider directly
    #[arg(long)]
    pub provider: Option<String>,
}

#[derive(Args, Debug)]
pub struct ParsePdrsArgs {
    /// Messages per poll
    #[arg(long)]
    pub messages: Option<usize>,

    /// Visibility timeout in seconds
    #[arg(long)]
    pub visibility: Option<u64>,

    /// File groups dispatched concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Empty polls tolerated before exiting; negative runs until interrupted
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_iterations: i64,
}

#[derive(Args, Debug)]
pub struct IngestGranulesArgs {
    /// Files staged concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Visibility timeout in seconds
    #[arg(long)]
    pub visibility: Option<u64>,

    /// Empty polls tolerated before exiting; negative runs until interrupted
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_iterations: i64,
}

#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// discover-pdrs, parse-pdrs or ingest-granules
    pub handler: String,

    /// JSON event passed to the handler
    #[arg(long, default_value = "{}")]
    pub event: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["pdrbox", "discover", "--provider", "LPDAAC"]);
        match cli.command {
            Commands::Discover(args) => {
                assert_eq!(args.provider.as_deref(), Some("LPDAAC"));
                assert!(args.collection.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from([
            "pdrbox",
            "--config",
            "ops.toml",
            "parse-pdrs",
            "--max-iterations",
            "0",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("ops.toml")));
        match cli.command {
            Commands::ParsePdrs(args) => {
                assert_eq!(args.max_iterations, 0);
                assert!(args.messages.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_discover_needs_exactly_one_scope() {
        assert!(Cli::try_parse_from(["pdrbox", "discover"]).is_err());
        assert!(
            Cli::try_parse_from(["pdrbox", "discover", "--provider", "A", "--collection", "B"])
                .is_err()
        );
    }

    #[test]
    fn test_unbounded_by_default() {
        let cli = Cli::parse_from(["pdrbox", "ingest-granules"]);
        match cli.command {
            Commands::IngestGranules(args) => assert_eq!(args.max_iterations, -1),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
