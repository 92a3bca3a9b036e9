//! REST calls against the gateway

mod catalog;
mod client;

pub use catalog::{ApiCatalog, ApiSpec};
pub use client::{AlgClient, ApiBody, ApiResponse, METRICS_API};
