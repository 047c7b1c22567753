//! HTTP price client for the fuelprices.dk REST API.
//!
//! Endpoints used:
//! - `GET {base_url}/companies`
//! - `GET {base_url}/stations?company=<name>`
//! - `GET {base_url}/prices?station_id=<id>`
//!
//! Every request carries the API key in the `X-API-KEY` header. Status codes
//! are mapped onto [`PriceClientError`] so callers can tell a rejected key or
//! a rate limit apart from a stale station binding.

use crate::{
	PriceClientError, PriceClientFactory, PriceClientInterface, PriceClientRegistry,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use fuel_types::{
	Company, ConfigSchema, Field, FieldType, ImplementationRegistry, Price, PriceSnapshot, Schema,
	SecretString, StationSnapshot, StationSummary, ValidationError,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.fuelprices.dk/v1";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const API_KEY_HEADER: &str = "X-API-KEY";

/// Configuration for the HTTP price client.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpClientConfig {
	pub api_key: SecretString,
	#[serde(default = "default_base_url")]
	pub base_url: String,
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
}

fn default_base_url() -> String {
	DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
	DEFAULT_TIMEOUT_SECONDS
}

/// Configuration schema for the HTTP client.
pub struct HttpClientSchema;

impl ConfigSchema for HttpClientSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("api_key", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(key) if !key.trim().is_empty() => Ok(()),
					_ => Err("API key cannot be empty".to_string()),
				}
			})],
			vec![
				Field::new("base_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("base_url must start with http:// or https://".to_string()),
					}
				}),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Raw price response; `last_update` is parsed leniently afterwards since
/// the API has been seen sending timestamps with and without an offset.
#[derive(Debug, Deserialize)]
struct RawPriceResponse {
	station: RawStation,
	#[serde(default)]
	prices: BTreeMap<String, Option<Price>>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
	name: String,
	#[serde(default)]
	last_update: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	message: Option<String>,
	#[serde(default)]
	product: Option<String>,
}

/// Price client backed by the fuelprices.dk HTTP API.
pub struct HttpPriceClient {
	http: reqwest::Client,
	base_url: String,
	api_key: SecretString,
}

impl HttpPriceClient {
	pub fn new(config: HttpClientConfig) -> Result<Self, PriceClientError> {
		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_seconds))
			.user_agent(concat!("fuelprices/", env!("CARGO_PKG_VERSION")))
			.build()
			.map_err(|e| PriceClientError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			http,
			base_url: config.base_url.trim_end_matches('/').to_string(),
			api_key: config.api_key,
		})
	}

	async fn get_json<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[(&str, String)],
		station_id: Option<u64>,
	) -> Result<T, PriceClientError> {
		let url = format!("{}{}", self.base_url, path);
		tracing::debug!(url = %url, "Requesting");

		let response = self
			.http
			.get(&url)
			.header(API_KEY_HEADER, self.api_key.expose_secret())
			.query(query)
			.send()
			.await
			.map_err(|e| PriceClientError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(classify_failure(status, &body, station_id));
		}

		response
			.json::<T>()
			.await
			.map_err(|e| PriceClientError::InvalidResponse(e.to_string()))
	}
}

/// Maps a non-success response onto the client error taxonomy.
fn classify_failure(status: StatusCode, body: &str, station_id: Option<u64>) -> PriceClientError {
	match status {
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PriceClientError::Unauthorized,
		StatusCode::TOO_MANY_REQUESTS => PriceClientError::RateLimited,
		StatusCode::NOT_FOUND => {
			let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
			match parsed {
				Some(err) if err.error.as_deref() == Some("product_not_found") => {
					PriceClientError::ProductNotFound(
						err.product
							.or(err.message)
							.unwrap_or_else(|| "unknown product".to_string()),
					)
				},
				_ => match station_id {
					Some(id) => PriceClientError::StationNotFound(id),
					None => PriceClientError::Network(format!("HTTP {}", status)),
				},
			}
		},
		_ => PriceClientError::Network(format!("HTTP {}", status)),
	}
}

/// Parses the API's `last_update` field.
///
/// Accepts RFC 3339 and offset-less ISO 8601 (treated as UTC). Anything
/// else is logged and dropped rather than failing the whole refresh.
fn parse_last_update(raw: Option<&str>) -> Option<DateTime<Utc>> {
	let raw = raw?.trim();
	if raw.is_empty() {
		return None;
	}

	if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
		return Some(ts.with_timezone(&Utc));
	}

	for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
		if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
			return Some(naive.and_utc());
		}
	}

	tracing::warn!(last_update = %raw, "Unrecognised last_update format");
	None
}

#[async_trait]
impl PriceClientInterface for HttpPriceClient {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpClientSchema)
	}

	async fn fetch_prices(&self, station_id: u64) -> Result<PriceSnapshot, PriceClientError> {
		let raw: RawPriceResponse = self
			.get_json("/prices", &[("station_id", station_id.to_string())], Some(station_id))
			.await?;

		Ok(PriceSnapshot {
			station: StationSnapshot {
				last_update: parse_last_update(raw.station.last_update.as_deref()),
				name: raw.station.name,
			},
			prices: raw.prices,
		})
	}

	async fn list_companies(&self) -> Result<Vec<Company>, PriceClientError> {
		self.get_json("/companies", &[], None).await
	}

	async fn list_stations(&self, company: &str) -> Result<Vec<StationSummary>, PriceClientError> {
		self.get_json("/stations", &[("company", company.to_string())], None)
			.await
	}
}

/// Factory function to create an HTTP price client from configuration.
///
/// Configuration parameters:
/// - `api_key`: API key for fuelprices.dk (required)
/// - `base_url`: API root (optional, defaults to the public API)
/// - `timeout_seconds`: per-request timeout (optional, defaults to 30)
pub fn create_client(
	config: &toml::Value,
) -> Result<Box<dyn PriceClientInterface>, PriceClientError> {
	HttpClientSchema
		.validate(config)
		.map_err(|e| PriceClientError::Configuration(format!("Invalid http config: {}", e)))?;

	let http_config: HttpClientConfig = config
		.clone()
		.try_into()
		.map_err(|e| PriceClientError::Configuration(format!("Invalid http config: {}", e)))?;

	Ok(Box::new(HttpPriceClient::new(http_config)?))
}

/// Registry for the HTTP price client.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = PriceClientFactory;

	fn factory() -> Self::Factory {
		create_client
	}
}

impl PriceClientRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal::Decimal;

	fn client_for(server: &mockito::Server) -> HttpPriceClient {
		HttpPriceClient::new(HttpClientConfig {
			api_key: SecretString::from("test-key"),
			base_url: server.url(),
			timeout_seconds: 5,
		})
		.unwrap()
	}

	#[tokio::test]
	async fn test_fetch_prices() {
		let mut server = mockito::Server::new_async().await;
		let mock = server
			.mock("GET", "/prices")
			.match_query(mockito::Matcher::UrlEncoded(
				"station_id".into(),
				"1234".into(),
			))
			.match_header("x-api-key", "test-key")
			.with_status(200)
			.with_header("content-type", "application/json")
			.with_body(
				r#"{"station": {"name": "Circle K Aarhus", "last_update": "2026-10-16T08:30:00"},
				    "prices": {"Blyfri 95": 13.49, "Diesel": null}}"#,
			)
			.create_async()
			.await;

		let snapshot = client_for(&server).fetch_prices(1234).await.unwrap();
		mock.assert_async().await;

		assert_eq!(snapshot.station.name, "Circle K Aarhus");
		assert_eq!(
			snapshot.station.last_update.map(|ts| ts.to_rfc3339()),
			Some("2026-10-16T08:30:00+00:00".to_string())
		);
		assert_eq!(snapshot.price_of("Blyfri 95"), Some(Decimal::new(1349, 2)));
		assert_eq!(snapshot.prices.get("Diesel"), Some(&None));
	}

	#[tokio::test]
	async fn test_status_mapping() {
		let mut server = mockito::Server::new_async().await;
		let _unauthorized = server
			.mock("GET", "/companies")
			.with_status(401)
			.create_async()
			.await;
		let _limited = server
			.mock("GET", "/stations")
			.match_query(mockito::Matcher::Any)
			.with_status(429)
			.create_async()
			.await;

		let client = client_for(&server);
		assert!(matches!(
			client.list_companies().await,
			Err(PriceClientError::Unauthorized)
		));
		assert!(matches!(
			client.list_stations("Q8").await,
			Err(PriceClientError::RateLimited)
		));
	}

	#[tokio::test]
	async fn test_not_found_distinguishes_product_and_station() {
		let mut server = mockito::Server::new_async().await;
		let _product = server
			.mock("GET", "/prices")
			.match_query(mockito::Matcher::UrlEncoded("station_id".into(), "1".into()))
			.with_status(404)
			.with_body(r#"{"error": "product_not_found", "product": "HVO100"}"#)
			.create_async()
			.await;
		let _station = server
			.mock("GET", "/prices")
			.match_query(mockito::Matcher::UrlEncoded("station_id".into(), "2".into()))
			.with_status(404)
			.with_body("not here")
			.create_async()
			.await;

		let client = client_for(&server);
		match client.fetch_prices(1).await {
			Err(PriceClientError::ProductNotFound(product)) => assert_eq!(product, "HVO100"),
			other => panic!("expected ProductNotFound, got {:?}", other),
		}
		assert!(matches!(
			client.fetch_prices(2).await,
			Err(PriceClientError::StationNotFound(2))
		));
	}

	#[tokio::test]
	async fn test_malformed_body() {
		let mut server = mockito::Server::new_async().await;
		let _mock = server
			.mock("GET", "/companies")
			.with_status(200)
			.with_body("<html>maintenance</html>")
			.create_async()
			.await;

		assert!(matches!(
			client_for(&server).list_companies().await,
			Err(PriceClientError::InvalidResponse(_))
		));
	}

	#[test]
	fn test_parse_last_update_formats() {
		assert!(parse_last_update(Some("2026-10-16T08:30:00+02:00")).is_some());
		assert!(parse_last_update(Some("2026-10-16 08:30:00")).is_some());
		assert!(parse_last_update(Some("yesterday")).is_none());
		assert!(parse_last_update(Some("")).is_none());
		assert!(parse_last_update(None).is_none());
	}

	#[test]
	fn test_factory_rejects_missing_key() {
		let config: toml::Value = toml::from_str("base_url = \"https://example.com\"").unwrap();
		assert!(matches!(
			create_client(&config),
			Err(PriceClientError::Configuration(_))
		));
	}

	#[test]
	fn test_factory_rejects_bad_base_url() {
		let config: toml::Value =
			toml::from_str("api_key = \"k\"\nbase_url = \"ftp://example.com\"").unwrap();
		assert!(create_client(&config).is_err());
	}
}
