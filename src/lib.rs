pub mod apis;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod output;
pub mod parser;
pub mod patch;
pub mod pipeline;
pub mod types;

// Application ports and their infrastructure adapters
pub mod app;
pub mod infra;
