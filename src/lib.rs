// Svcdeck - Cross-platform service control and resilience layer
// Library root

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod manager;
pub mod provider;
pub mod resilience;
pub mod version;

#[cfg(test)]
mod health_tests;
