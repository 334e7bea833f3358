// Chronobench - Library root

pub mod bench;
pub mod config;
pub mod error;
pub mod http_client;
pub mod logsvc;
pub mod models;
pub mod workload;
