//! Assembly and lifetime of all configured stations.
//!
//! The [`HostBuilder`] creates the price client named in the configuration
//! through its factory, then brings every configured station up: coordinator,
//! first refresh, sensors and refresh scheduler. The resulting [`Host`] owns
//! all of them until [`Host::shutdown`].

use crate::coordinator::PriceCoordinator;
use crate::scheduler::RefreshScheduler;
use crate::sensor::PriceSensor;
use fuel_client::{PriceClientFactory, PriceClientInterface};
use fuel_config::{Config, StationConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building the host.
#[derive(Debug, Error)]
pub enum HostError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Lifecycle state of a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationStatus {
	/// The scheduler is refreshing the station.
	Running,
	/// The binding was rejected, on the first refresh or by a later one.
	Failed(String),
	/// The scheduler was shut down.
	Stopped,
}

/// Everything running for one configured station.
pub struct Station {
	coordinator: Arc<PriceCoordinator>,
	sensors: Vec<Arc<PriceSensor>>,
	scheduler: Option<RefreshScheduler>,
	failure: Option<String>,
}

impl Station {
	pub fn entry_id(&self) -> &str {
		self.coordinator.entry_id()
	}

	pub fn coordinator(&self) -> &Arc<PriceCoordinator> {
		&self.coordinator
	}

	pub fn sensors(&self) -> &[Arc<PriceSensor>] {
		&self.sensors
	}

	pub fn status(&self) -> StationStatus {
		if let Some(reason) = &self.failure {
			return StationStatus::Failed(reason.clone());
		}
		match &self.scheduler {
			Some(scheduler) => match scheduler.halted() {
				Some(e) => StationStatus::Failed(e.to_string()),
				None if scheduler.is_running() => StationStatus::Running,
				None => StationStatus::Stopped,
			},
			None => StationStatus::Stopped,
		}
	}
}

/// Builder for the host from configuration and client factories.
pub struct HostBuilder {
	config: Config,
}

impl HostBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates the primary price client and starts every station.
	pub async fn build(self, factories: &HashMap<String, PriceClientFactory>) -> Result<Host, HostError> {
		let primary = &self.config.client.primary;
		let client_config = self.config.client.primary_config().ok_or_else(|| {
			HostError::Config(format!(
				"Primary client '{}' has no configuration",
				primary
			))
		})?;
		let factory = factories.get(primary).ok_or_else(|| {
			HostError::MissingComponent(format!("No price client implementation named '{}'", primary))
		})?;

		let client: Arc<dyn PriceClientInterface> = match factory(client_config) {
			Ok(client) => {
				tracing::info!(component = "client", implementation = %primary, "Loaded");
				Arc::from(client)
			},
			Err(e) => {
				tracing::error!(
					component = "client",
					implementation = %primary,
					error = %e,
					"Failed to create price client"
				);
				return Err(HostError::Config(format!(
					"Failed to create price client '{}': {}",
					primary, e
				)));
			},
		};

		Host::start(client, &self.config).await
	}
}

/// Owner of every running station.
pub struct Host {
	client: Arc<dyn PriceClientInterface>,
	interval: Duration,
	stations: Vec<Station>,
}

impl Host {
	/// Brings up all configured stations with the given client.
	pub async fn start(
		client: Arc<dyn PriceClientInterface>,
		config: &Config,
	) -> Result<Self, HostError> {
		let mut host = Self {
			client,
			interval: Duration::from_secs(config.service.update_interval_seconds),
			stations: Vec::with_capacity(config.stations.len()),
		};

		if config.stations.is_empty() {
			tracing::warn!("No stations configured");
		}

		for station in &config.stations {
			host.add_station(station).await?;
		}
		Ok(host)
	}

	/// Starts one more station.
	pub async fn add_station(&mut self, config: &StationConfig) -> Result<&Station, HostError> {
		let entry_id = config.entry_id();
		if self.station(&entry_id).is_some() {
			return Err(HostError::Config(format!(
				"Station '{}' is already running",
				entry_id
			)));
		}

		let coordinator = Arc::new(
			PriceCoordinator::new(
				self.client.clone(),
				entry_id.clone(),
				config.company.clone(),
				config.station.clone(),
				&config.products,
			)
			.map_err(|e| HostError::Config(format!("Station '{}': {}", entry_id, e)))?,
		);

		let failure = match coordinator.refresh().await {
			Ok(()) => None,
			Err(e) if e.is_configuration() => {
				tracing::error!(entry_id = %entry_id, error = %e, "Station binding rejected, not scheduling refreshes");
				Some(e.to_string())
			},
			Err(e) => {
				tracing::warn!(entry_id = %entry_id, error = %e, "First price refresh failed, prices unknown until next refresh");
				None
			},
		};

		let sensors = PriceSensor::for_station(&coordinator);
		for sensor in &sensors {
			coordinator.subscribe(sensor.clone()).await;
		}

		let scheduler = if failure.is_none() {
			let scheduler = RefreshScheduler::new(coordinator.clone(), self.interval);
			scheduler
				.start()
				.await
				.map_err(|e| HostError::Config(format!("Station '{}': {}", entry_id, e)))?;
			Some(scheduler)
		} else {
			None
		};

		tracing::info!(
			entry_id = %entry_id,
			station = %coordinator.binding(),
			sensors = sensors.len(),
			"Station started"
		);

		self.stations.push(Station {
			coordinator,
			sensors,
			scheduler,
			failure,
		});
		self.stations
			.last()
			.ok_or_else(|| HostError::MissingComponent(entry_id))
	}

	pub fn stations(&self) -> &[Station] {
		&self.stations
	}

	pub fn station(&self, entry_id: &str) -> Option<&Station> {
		self.stations.iter().find(|s| s.entry_id() == entry_id)
	}

	pub fn coordinator(&self, entry_id: &str) -> Option<&Arc<PriceCoordinator>> {
		self.station(entry_id).map(Station::coordinator)
	}

	pub fn sensors(&self, entry_id: &str) -> Option<&[Arc<PriceSensor>]> {
		self.station(entry_id).map(Station::sensors)
	}

	/// Stops every scheduler.
	pub async fn shutdown(&self) {
		for station in &self.stations {
			let Some(scheduler) = &station.scheduler else {
				continue;
			};
			match scheduler.stop().await {
				Ok(()) => tracing::debug!(entry_id = %station.entry_id(), "Station stopped"),
				Err(e) => tracing::error!(entry_id = %station.entry_id(), error = %e, "Station had stopped refreshing"),
			}
		}
	}
}
