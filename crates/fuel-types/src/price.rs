//! Price snapshot and catalog types.
//!
//! These are the shapes price clients hand back to the coordinator and to
//! the setup flow. A price is a decimal amount per litre; a missing price is
//! `None` and means "unknown", never zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Price per unit as reported by the source.
pub type Price = rust_decimal::Decimal;

/// Station metadata attached to a price response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
	/// Station name as currently reported by the source.
	pub name: String,
	/// When the source last updated this station's prices, if known.
	#[serde(default)]
	pub last_update: Option<DateTime<Utc>>,
}

/// Result of one price fetch for a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
	pub station: StationSnapshot,
	/// Product identifier to price; `None` when the source has no price.
	#[serde(default)]
	pub prices: BTreeMap<String, Option<Price>>,
}

impl PriceSnapshot {
	/// Looks up the price of a product. Missing products read as `None`.
	pub fn price_of(&self, product: &str) -> Option<Price> {
		self.prices.get(product).copied().flatten()
	}

	/// Product identifiers offered by this station.
	pub fn products(&self) -> impl Iterator<Item = &str> {
		self.prices.keys().map(String::as_str)
	}
}

/// A fuel company in the source's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
	#[serde(alias = "company")]
	pub name: String,
}

/// A station entry in a company's station list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSummary {
	pub id: u64,
	pub name: String,
}
