pub mod config;
pub mod error;
pub mod hub;
pub mod runner;
pub mod sim;
