pub mod config;
pub mod lock;
pub mod runner;
