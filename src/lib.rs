pub mod config;
pub mod debugger;
pub mod demo;
pub mod log;
pub mod server;
