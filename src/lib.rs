pub mod assembler;
pub mod config;
pub mod contracts;
pub mod error;
pub mod gas_policy;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod price_table;
pub mod rpc;
pub mod selector;
pub mod subgraph;
pub mod submitter;
