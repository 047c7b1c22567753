//! Configuration builder for tests and local development.
//!
//! Builds a `Config` directly, without going through TOML parsing or
//! validation, so tests can use intervals or bindings a config file would
//! reject.

use crate::{ClientConfig, Config, ServiceConfig, StationConfig};
use fuel_types::{ProductSelection, StationInfo};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults to an empty mock client and no stations.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	update_interval_seconds: u64,
	client_primary: String,
	client_config: toml::Value,
	stations: Vec<StationConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			update_interval_seconds: 3600,
			client_primary: "mock".to_string(),
			client_config: toml::Value::Table(toml::map::Map::new()),
			stations: Vec::new(),
		}
	}

	pub fn update_interval_seconds(mut self, seconds: u64) -> Self {
		self.update_interval_seconds = seconds;
		self
	}

	/// Sets the primary client implementation and its configuration table.
	pub fn client(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.client_primary = primary.into();
		self.client_config = config;
		self
	}

	/// Adds a station tracking the given products.
	pub fn station(
		mut self,
		company: impl Into<String>,
		id: u64,
		name: impl Into<String>,
		products: &[&str],
	) -> Self {
		self.stations.push(StationConfig {
			company: company.into(),
			station: StationInfo::new(id, name),
			products: products.iter().map(|p| (*p, true)).collect::<ProductSelection>(),
		});
		self
	}

	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(self.client_primary.clone(), self.client_config);

		Config {
			service: ServiceConfig {
				id: "test-service".to_string(),
				update_interval_seconds: self.update_interval_seconds,
			},
			client: ClientConfig {
				primary: self.client_primary,
				implementations,
			},
			stations: self.stations,
		}
	}
}
