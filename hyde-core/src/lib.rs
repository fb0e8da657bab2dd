pub mod command;
pub mod config;
pub mod error;
pub mod log;
pub mod session;

// Extension roles and the fresh-install flow
pub mod extension;
pub mod lifecycle;
