//! Core of the fuel price monitor.
//!
//! This crate ties the price client and the configuration together: a
//! [`PriceCoordinator`] per station keeps the latest prices in memory, a
//! [`RefreshScheduler`] refreshes it periodically, [`PriceSensor`]s expose the
//! cached values, and the [`Host`] owns all of them for the configured
//! stations. The [`setup`] module implements the interactive flow that
//! produces new station bindings.

pub mod coordinator;
pub mod host;
pub mod scheduler;
pub mod sensor;
pub mod setup;

#[cfg(test)]
mod test_support;

pub use coordinator::{CoordinatorError, PriceCoordinator, PriceObserver, ProductPrice, SubscriptionId};
pub use host::{Host, HostBuilder, HostError, Station, StationStatus};
pub use scheduler::{RefreshScheduler, SchedulerError};
pub use sensor::{DeviceInfo, PriceSensor, SensorDescription, SensorKind, SensorState, SensorValue};
pub use setup::{
	reauthenticate, AbortReason, ClientConnector, SetupError, SetupFlow, SetupInput, SetupOutcome,
	SetupStep,
};
