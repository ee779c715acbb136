pub mod completions;
pub mod config;
pub mod emit;
pub mod filter;
pub mod report;
