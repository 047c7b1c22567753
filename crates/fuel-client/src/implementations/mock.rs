//! Mock price client for development and testing.
//!
//! Serves a fixed catalog of companies, stations and prices taken from its
//! configuration table, and can be told to fail every request with a given
//! error class to exercise the coordinator's failure handling.

use crate::{
	PriceClientError, PriceClientFactory, PriceClientInterface, PriceClientRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fuel_types::{
	Company, ConfigSchema, Field, FieldType, ImplementationRegistry, Price, PriceSnapshot, Schema,
	StationSnapshot, StationSummary, ValidationError,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Error class a mock client can be told to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockFailure {
	RateLimited,
	Unauthorized,
	Network,
	ProductNotFound,
	StationNotFound,
}

/// One station served by the mock.
#[derive(Debug, Clone, Deserialize)]
pub struct MockStation {
	pub id: u64,
	pub company: String,
	pub name: String,
	#[serde(default)]
	pub last_update: Option<DateTime<Utc>>,
	/// Product to price.
	#[serde(default)]
	pub prices: BTreeMap<String, Price>,
	/// Products the station lists without a price.
	#[serde(default)]
	pub unpriced: Vec<String>,
}

/// Configuration for the mock price client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MockClientConfig {
	/// Companies listed in addition to the ones owning a station.
	#[serde(default)]
	pub companies: Vec<String>,
	#[serde(default)]
	pub stations: Vec<MockStation>,
	/// When set, every request fails with this error class.
	#[serde(default)]
	pub fail_with: Option<MockFailure>,
}

/// Configuration schema for the mock client.
pub struct MockClientSchema;

impl ConfigSchema for MockClientSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let station = Schema::new(
			vec![
				Field::new(
					"id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("company", FieldType::String),
				Field::new("name", FieldType::String),
			],
			vec![
				Field::new("last_update", FieldType::String),
				Field::new("prices", FieldType::Map(Box::new(FieldType::Number))),
				Field::new("unpriced", FieldType::Array(Box::new(FieldType::String))),
			],
		);

		let schema = Schema::new(
			vec![],
			vec![
				Field::new("companies", FieldType::Array(Box::new(FieldType::String))),
				Field::new("stations", FieldType::Array(Box::new(FieldType::Table(station)))),
				Field::new("fail_with", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Price client serving configured data.
pub struct MockPriceClient {
	config: MockClientConfig,
}

impl MockPriceClient {
	pub fn new(config: MockClientConfig) -> Self {
		Self { config }
	}

	fn check_failure(&self, station_id: Option<u64>) -> Result<(), PriceClientError> {
		match self.config.fail_with {
			None => Ok(()),
			Some(MockFailure::RateLimited) => Err(PriceClientError::RateLimited),
			Some(MockFailure::Unauthorized) => Err(PriceClientError::Unauthorized),
			Some(MockFailure::Network) => {
				Err(PriceClientError::Network("mock network failure".to_string()))
			},
			Some(MockFailure::ProductNotFound) => Err(PriceClientError::ProductNotFound(
				"mock product".to_string(),
			)),
			Some(MockFailure::StationNotFound) => {
				Err(PriceClientError::StationNotFound(station_id.unwrap_or_default()))
			},
		}
	}
}

#[async_trait]
impl PriceClientInterface for MockPriceClient {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockClientSchema)
	}

	async fn fetch_prices(&self, station_id: u64) -> Result<PriceSnapshot, PriceClientError> {
		self.check_failure(Some(station_id))?;

		let station = self
			.config
			.stations
			.iter()
			.find(|s| s.id == station_id)
			.ok_or(PriceClientError::StationNotFound(station_id))?;

		let mut prices: BTreeMap<String, Option<Price>> = station
			.prices
			.iter()
			.map(|(product, price)| (product.clone(), Some(*price)))
			.collect();
		for product in &station.unpriced {
			prices.entry(product.clone()).or_insert(None);
		}

		Ok(PriceSnapshot {
			station: StationSnapshot {
				name: station.name.clone(),
				last_update: station.last_update,
			},
			prices,
		})
	}

	async fn list_companies(&self) -> Result<Vec<Company>, PriceClientError> {
		self.check_failure(None)?;

		let mut names: Vec<String> = self.config.companies.clone();
		for station in &self.config.stations {
			if !names.contains(&station.company) {
				names.push(station.company.clone());
			}
		}

		Ok(names.into_iter().map(|name| Company { name }).collect())
	}

	async fn list_stations(&self, company: &str) -> Result<Vec<StationSummary>, PriceClientError> {
		self.check_failure(None)?;

		Ok(self
			.config
			.stations
			.iter()
			.filter(|s| s.company == company)
			.map(|s| StationSummary {
				id: s.id,
				name: s.name.clone(),
			})
			.collect())
	}
}

/// Factory function to create a mock price client from configuration.
pub fn create_client(
	config: &toml::Value,
) -> Result<Box<dyn PriceClientInterface>, PriceClientError> {
	MockClientSchema
		.validate(config)
		.map_err(|e| PriceClientError::Configuration(format!("Invalid mock config: {}", e)))?;

	let mock_config: MockClientConfig = config
		.clone()
		.try_into()
		.map_err(|e| PriceClientError::Configuration(format!("Invalid mock config: {}", e)))?;

	Ok(Box::new(MockPriceClient::new(mock_config)))
}

/// Registry for the mock price client.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = PriceClientFactory;

	fn factory() -> Self::Factory {
		create_client
	}
}

impl PriceClientRegistry for Registry {}
