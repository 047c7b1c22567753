//! Price client module for the fuel price monitor.
//!
//! This module provides the interface the refresh coordinator and the setup
//! flow use to talk to a fuel price source, together with the available
//! backends. It follows the same trait-plus-registry pattern as the other
//! pluggable components: each backend exposes a `Registry` with a factory
//! that builds it from its `[client.implementations.<name>]` table.

use async_trait::async_trait;
use fuel_types::{Company, ConfigSchema, ImplementationRegistry, PriceSnapshot, StationSummary};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod mock;
}

/// Errors that can occur while talking to a price source.
#[derive(Debug, Error)]
pub enum PriceClientError {
	/// The source reports that a requested product does not exist for the station.
	#[error("Product not found: {0}")]
	ProductNotFound(String),
	/// The source does not know the requested station.
	#[error("Station not found: {0}")]
	StationNotFound(u64),
	/// The source rejected the request because of rate limiting.
	#[error("Rate limit exceeded")]
	RateLimited,
	/// The API key was rejected.
	#[error("Unauthorized: invalid API key")]
	Unauthorized,
	/// Transport failure or an unexpected HTTP status.
	#[error("Network error: {0}")]
	Network(String),
	/// The source answered with a body we could not understand.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The client could not be built from its configuration.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl PriceClientError {
	/// Whether the error means the station/product binding itself is wrong.
	///
	/// Such errors will not go away by asking again; everything else is
	/// assumed to clear up on a later attempt.
	pub fn is_binding_error(&self) -> bool {
		matches!(
			self,
			PriceClientError::ProductNotFound(_) | PriceClientError::StationNotFound(_)
		)
	}
}

/// Interface every price source backend implements.
#[async_trait]
pub trait PriceClientInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Fetches the current prices and station metadata for one station.
	async fn fetch_prices(&self, station_id: u64) -> Result<PriceSnapshot, PriceClientError>;

	/// Lists the companies known to the source.
	async fn list_companies(&self) -> Result<Vec<Company>, PriceClientError>;

	/// Lists the stations operated by a company.
	async fn list_stations(&self, company: &str) -> Result<Vec<StationSummary>, PriceClientError>;
}

/// Factory signature every backend provides.
pub type PriceClientFactory =
	fn(&toml::Value) -> Result<Box<dyn PriceClientInterface>, PriceClientError>;

/// Registry trait for price client backends.
pub trait PriceClientRegistry: ImplementationRegistry<Factory = PriceClientFactory> {}

/// Get all registered price client implementations.
///
/// Returns `(name, factory)` pairs used by the host to build the backend
/// named in `client.primary`.
pub fn get_all_implementations() -> Vec<(&'static str, PriceClientFactory)> {
	use implementations::{http, mock};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(mock::Registry::NAME, mock::Registry::factory()),
	]
}
