//! Sensors exposed for each configured station.
//!
//! Every station gets one price sensor per selected product and one sensor
//! holding the time of the last update. Sensors observe their station's
//! coordinator and re-read their value whenever it reports new prices.

use crate::coordinator::{PriceCoordinator, PriceObserver};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use fuel_types::{slugify, Price};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
	Monetary,
	Timestamp,
}

/// Static description shared by all sensors of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescription {
	pub key: &'static str,
	pub name: &'static str,
	pub unit: Option<&'static str>,
	pub device_class: DeviceClass,
	pub icon: &'static str,
}

pub const PRICE_SENSOR: SensorDescription = SensorDescription {
	key: "price",
	name: "Fuel Price",
	unit: Some("DKK/L"),
	device_class: DeviceClass::Monetary,
	icon: "mdi:gas-station",
};

pub const LAST_UPDATED_SENSOR: SensorDescription = SensorDescription {
	key: "last_updated",
	name: "Last Updated",
	unit: None,
	device_class: DeviceClass::Timestamp,
	icon: "mdi:clock-outline",
};

/// What a sensor reads from the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorKind {
	Price { product: String },
	LastUpdated,
}

/// Device grouping the sensors of one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
	pub identifier: String,
	pub name: String,
	pub model: String,
	pub manufacturer: String,
}

impl DeviceInfo {
	fn of(coordinator: &PriceCoordinator) -> Self {
		let station_name = coordinator.station_name();
		Self {
			identifier: coordinator.entry_id().to_string(),
			name: station_name.clone(),
			model: station_name,
			manufacturer: coordinator.company().to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorValue {
	Price(Price),
	Timestamp(DateTime<Utc>),
}

impl fmt::Display for SensorValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SensorValue::Price(price) => write!(f, "{}", price),
			SensorValue::Timestamp(at) => write!(f, "{}", at.to_rfc3339()),
		}
	}
}

/// Current reading of a sensor; `value` is `None` while unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorState {
	pub value: Option<SensorValue>,
	pub device: DeviceInfo,
}

pub struct PriceSensor {
	description: SensorDescription,
	kind: SensorKind,
	unique_id: String,
	name: String,
	state: ArcSwap<SensorState>,
}

impl PriceSensor {
	/// Creates a sensor and reads its initial value.
	pub fn new(
		coordinator: &PriceCoordinator,
		description: SensorDescription,
		kind: SensorKind,
		display_name: &str,
	) -> Self {
		let product_key = match &kind {
			SensorKind::Price { product } => product.as_str(),
			SensorKind::LastUpdated => "last_updated",
		};
		let unique_id = slugify(&format!(
			"{}_{}_{}",
			coordinator.entry_id(),
			description.key,
			product_key
		));
		let name = match kind {
			SensorKind::LastUpdated => description.name.to_string(),
			SensorKind::Price { .. } => display_name.to_string(),
		};
		let state = Self::read(&kind, coordinator);

		Self {
			description,
			kind,
			unique_id,
			name,
			state: ArcSwap::from_pointee(state),
		}
	}

	/// Builds every sensor of a station: one per product plus the update time.
	pub fn for_station(coordinator: &PriceCoordinator) -> Vec<Arc<PriceSensor>> {
		let mut sensors: Vec<Arc<PriceSensor>> = coordinator
			.products()
			.into_iter()
			.map(|(product, entry)| {
				Arc::new(PriceSensor::new(
					coordinator,
					PRICE_SENSOR,
					SensorKind::Price { product },
					&entry.name,
				))
			})
			.collect();

		sensors.push(Arc::new(PriceSensor::new(
			coordinator,
			LAST_UPDATED_SENSOR,
			SensorKind::LastUpdated,
			LAST_UPDATED_SENSOR.name,
		)));
		sensors
	}

	fn read(kind: &SensorKind, coordinator: &PriceCoordinator) -> SensorState {
		let value = match kind {
			SensorKind::Price { product } => coordinator
				.current_price(product)
				.flatten()
				.map(SensorValue::Price),
			SensorKind::LastUpdated => coordinator.last_updated().map(SensorValue::Timestamp),
		};

		SensorState {
			value,
			device: DeviceInfo::of(coordinator),
		}
	}

	pub fn unique_id(&self) -> &str {
		&self.unique_id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn kind(&self) -> &SensorKind {
		&self.kind
	}

	pub fn description(&self) -> &SensorDescription {
		&self.description
	}

	pub fn state(&self) -> Arc<SensorState> {
		self.state.load_full()
	}

	pub fn value(&self) -> Option<SensorValue> {
		self.state.load().value
	}
}

impl PriceObserver for PriceSensor {
	fn on_prices_updated(&self, coordinator: &PriceCoordinator) {
		let state = Self::read(&self.kind, coordinator);
		tracing::trace!(
			sensor = %self.unique_id,
			value = ?state.value,
			"Sensor updated"
		);
		self.state.store(Arc::new(state));
	}
}
