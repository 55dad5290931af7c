pub mod config;
pub mod handlers;
pub mod ingest;
pub mod ledger;
pub mod observability;
pub mod pdr;
pub mod queue;
pub mod state;
pub mod storage;
pub mod worker;
