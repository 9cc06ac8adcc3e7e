pub mod aggregate;
pub mod attribution;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod mapping;
pub mod model;
pub mod rank;
pub mod ranges;
pub mod report;
pub mod usage;
