//! Configuration module for the fuel price monitor.
//!
//! This module provides structures and utilities for loading the service
//! configuration from TOML files, resolving `${VAR}` references from the
//! environment and validating that every configured station binding is
//! usable before any coordinator is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["client.toml", "stations.toml"]` to include other files
//! - Each top-level section must be unique across all files
//!
//! ## Legacy layout
//!
//! Older configurations bound a single station with top-level `company`,
//! `station` and `products` keys. When no `[[stations]]` entries are present
//! those keys are folded into one station entry.

#[cfg(feature = "testing")]
pub mod builders {
	pub mod config;
}
mod loader;

use fuel_types::{ProductSelection, StationBinding, StationInfo};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Shortest refresh interval accepted, to stay friendly with the API's rate limit.
pub const MIN_UPDATE_INTERVAL_SECONDS: u64 = 60;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message; the default Display dumps the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
	/// Settings for this service instance.
	pub service: ServiceConfig,
	/// Price client backend selection and settings.
	pub client: ClientConfig,
	/// Station bindings, one coordinator each.
	pub stations: Vec<StationConfig>,
}

/// Settings for this service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in log lines.
	pub id: String,
	/// Seconds between scheduled refreshes of every station.
	#[serde(default = "default_update_interval_seconds")]
	pub update_interval_seconds: u64,
}

/// One hour, matching how often the source itself updates.
fn default_update_interval_seconds() -> u64 {
	3600
}

/// Price client backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to its raw configuration table.
	pub implementations: HashMap<String, toml::Value>,
}

impl ClientConfig {
	/// Raw configuration table of the primary implementation.
	pub fn primary_config(&self) -> Option<&toml::Value> {
		self.implementations.get(&self.primary)
	}
}

/// One configured station.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StationConfig {
	pub company: String,
	pub station: StationInfo,
	pub products: ProductSelection,
}

impl StationConfig {
	pub fn binding(&self) -> StationBinding {
		StationBinding::new(self.company.clone(), self.station.clone())
	}

	/// Entry id of this station, `{company}_{station_id}`.
	pub fn entry_id(&self) -> String {
		self.binding().unique_id()
	}

	/// Renders this station as a `[[stations]]` TOML snippet.
	pub fn to_toml_entry(&self) -> Result<String, ConfigError> {
		#[derive(Serialize)]
		struct Wrapper<'a> {
			stations: [&'a StationConfig; 1],
		}

		toml::to_string(&Wrapper { stations: [self] })
			.map_err(|e| ConfigError::Parse(format!("Failed to render station entry: {}", e)))
	}
}

/// On-disk shape, including the legacy single-station keys.
#[derive(Debug, Deserialize)]
struct RawConfig {
	service: ServiceConfig,
	client: ClientConfig,
	#[serde(default)]
	stations: Vec<StationConfig>,
	#[serde(default)]
	company: Option<String>,
	#[serde(default)]
	station: Option<StationInfo>,
	#[serde(default)]
	products: Option<ProductSelection>,
}

impl TryFrom<RawConfig> for Config {
	type Error = ConfigError;

	fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
		let mut stations = raw.stations;

		match (raw.company, raw.station, raw.products) {
			(None, None, None) => {},
			(Some(company), Some(station), Some(products)) => {
				if !stations.is_empty() {
					return Err(ConfigError::Validation(
						"Top-level company/station/products cannot be combined with [[stations]]"
							.into(),
					));
				}
				stations.push(StationConfig {
					company,
					station,
					products,
				});
			},
			_ => {
				return Err(ConfigError::Validation(
					"Legacy station binding needs all of company, station and products".into(),
				));
			},
		}

		Ok(Config {
			service: raw.service,
			client: raw.client,
			stations,
		})
	}
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME` and supports defaults
/// with `${VAR_NAME:-default_value}`. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}

	result.push_str(&input[last_end..]);
	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Configuration of the station with the given entry id.
	pub fn station(&self, entry_id: &str) -> Option<&StationConfig> {
		self.stations.iter().find(|s| s.entry_id() == entry_id)
	}

	/// Validates the configuration.
	///
	/// Checks the service id and refresh interval, that the primary client
	/// implementation is configured, and that every station binding is
	/// complete, tracks at least one product and is not configured twice.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.service.update_interval_seconds < MIN_UPDATE_INTERVAL_SECONDS {
			return Err(ConfigError::Validation(format!(
				"update_interval_seconds must be at least {}, got {}",
				MIN_UPDATE_INTERVAL_SECONDS, self.service.update_interval_seconds
			)));
		}

		if self.client.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Client primary implementation cannot be empty".into(),
			));
		}

		if self.client.primary_config().is_none() {
			return Err(ConfigError::Validation(format!(
				"Primary client '{}' has no entry in [client.implementations]",
				self.client.primary
			)));
		}

		let mut seen = HashSet::new();
		for station in &self.stations {
			if station.company.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Station {} has an empty company",
					station.station.id
				)));
			}

			if station.station.id == 0 {
				return Err(ConfigError::Validation(format!(
					"Station '{}' of {} has no station id",
					station.station.name, station.company
				)));
			}

			if station.products.selected_count() == 0 {
				return Err(ConfigError::Validation(format!(
					"Station '{}' selects no products",
					station.binding().title()
				)));
			}

			if !seen.insert(station.entry_id()) {
				return Err(ConfigError::Validation(format!(
					"Station '{}' is configured more than once",
					station.binding().title()
				)));
			}
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let raw: RawConfig = toml::from_str(&resolved)?;
		let config = Config::try_from(raw)?;
		config.validate()?;
		Ok(config)
	}
}
