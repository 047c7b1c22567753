//! Scripted price client shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fuel_client::{PriceClientError, PriceClientInterface};
use fuel_types::{
	Company, ConfigSchema, Price, PriceSnapshot, Schema, StationSnapshot, StationSummary,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Client answering `fetch_prices` from a queue of prepared results.
///
/// Once the queue is empty every call fails with a network error.
pub struct ScriptedClient {
	script: Mutex<VecDeque<Result<PriceSnapshot, PriceClientError>>>,
	calls: AtomicUsize,
}

impl ScriptedClient {
	pub fn new(script: Vec<Result<PriceSnapshot, PriceClientError>>) -> Self {
		Self {
			script: Mutex::new(script.into()),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl PriceClientInterface for ScriptedClient {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(Schema::new(vec![], vec![]))
	}

	async fn fetch_prices(&self, _station_id: u64) -> Result<PriceSnapshot, PriceClientError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.script
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or_else(|| Err(PriceClientError::Network("script exhausted".into())))
	}

	async fn list_companies(&self) -> Result<Vec<Company>, PriceClientError> {
		Ok(Vec::new())
	}

	async fn list_stations(&self, _company: &str) -> Result<Vec<StationSummary>, PriceClientError> {
		Ok(Vec::new())
	}
}

pub fn at(hour: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 10, 16, hour, 0, 0).unwrap()
}

pub fn snapshot(
	name: &str,
	last_update: Option<DateTime<Utc>>,
	prices: &[(&str, Option<Price>)],
) -> PriceSnapshot {
	PriceSnapshot {
		station: StationSnapshot {
			name: name.to_string(),
			last_update,
		},
		prices: prices
			.iter()
			.map(|(product, price)| (product.to_string(), *price))
			.collect::<BTreeMap<_, _>>(),
	}
}
