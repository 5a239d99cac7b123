// Library exports for Rehome
// This allows integration tests and external code to use Rehome modules

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod store;
