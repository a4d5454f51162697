pub mod buffer;
pub mod cache;
pub mod config;
pub mod domain;
pub mod graph;
pub mod handlers;
pub mod persistence;
pub mod rpc;
pub mod supervisor;
pub mod telemetry;
pub mod translation;
