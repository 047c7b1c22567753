//! Price refresh coordinator for a single station.
//!
//! The coordinator owns the in-memory price cache of one configured station.
//! A refresh fetches the station's prices from the price client, builds a
//! new cache snapshot and swaps it in atomically, so readers always see
//! either the previous or the new state. Observers registered with
//! [`PriceCoordinator::subscribe`] are notified after every successful
//! refresh and read whatever they need back from the coordinator.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use fuel_client::{PriceClientError, PriceClientInterface};
use fuel_types::{Price, ProductSelection, StationBinding, StationInfo};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Errors reported by the coordinator.
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
	/// The station binding is unusable; asking again will not help.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// The source failed in a way a later refresh may not.
	#[error("Transient source error: {0}")]
	TransientSource(String),
}

impl CoordinatorError {
	pub fn is_configuration(&self) -> bool {
		matches!(self, CoordinatorError::Configuration(_))
	}
}

impl From<PriceClientError> for CoordinatorError {
	fn from(err: PriceClientError) -> Self {
		if err.is_binding_error() {
			CoordinatorError::Configuration(err.to_string())
		} else {
			CoordinatorError::TransientSource(err.to_string())
		}
	}
}

/// Cached price of one selected product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPrice {
	/// Display name of the product.
	pub name: String,
	/// Last known price, `None` while unknown.
	pub price: Option<Price>,
}

/// Handle returned by [`PriceCoordinator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Listener notified after every successful refresh.
///
/// Notifications carry no data; implementations read the values they need
/// from the coordinator they are handed.
pub trait PriceObserver: Send + Sync {
	fn on_prices_updated(&self, coordinator: &PriceCoordinator);
}

/// One committed state of the cache.
#[derive(Debug, Clone)]
struct CacheState {
	station_name: String,
	last_updated: Option<DateTime<Utc>>,
	products: BTreeMap<String, ProductPrice>,
}

/// Polls one station and caches its prices.
pub struct PriceCoordinator {
	client: Arc<dyn PriceClientInterface>,
	entry_id: String,
	binding: StationBinding,
	state: ArcSwap<CacheState>,
	observers: RwLock<Vec<(SubscriptionId, Arc<dyn PriceObserver>)>>,
	next_subscription: AtomicU64,
	/// Held for the whole of a refresh so two refreshes never interleave.
	refresh_guard: Mutex<()>,
}

impl PriceCoordinator {
	/// Creates a coordinator with every selected product priced as unknown.
	pub fn new(
		client: Arc<dyn PriceClientInterface>,
		entry_id: impl Into<String>,
		company: impl Into<String>,
		station: StationInfo,
		products: &ProductSelection,
	) -> Result<Self, CoordinatorError> {
		let company = company.into();
		if company.trim().is_empty() {
			return Err(CoordinatorError::Configuration(
				"Company must not be empty".into(),
			));
		}
		if station.id == 0 {
			return Err(CoordinatorError::Configuration(format!(
				"Station '{}' has no station id",
				station.name
			)));
		}

		let cache = products
			.selected()
			.map(|product| {
				(
					product.to_string(),
					ProductPrice {
						name: product.to_string(),
						price: None,
					},
				)
			})
			.collect();

		let state = CacheState {
			station_name: station.name.clone(),
			last_updated: None,
			products: cache,
		};

		Ok(Self {
			client,
			entry_id: entry_id.into(),
			binding: StationBinding::new(company, station),
			state: ArcSwap::from_pointee(state),
			observers: RwLock::new(Vec::new()),
			next_subscription: AtomicU64::new(1),
			refresh_guard: Mutex::new(()),
		})
	}

	/// Fetches the station's prices and commits them to the cache.
	///
	/// Selected products missing from the response are cached as unknown.
	/// On failure the cache is left as it was and no observer is notified.
	#[instrument(skip_all, fields(entry_id = %self.entry_id, station_id = self.binding.station.id))]
	pub async fn refresh(&self) -> Result<(), CoordinatorError> {
		let _guard = self.refresh_guard.lock().await;

		let snapshot = self
			.client
			.fetch_prices(self.binding.station.id)
			.await
			.map_err(CoordinatorError::from)?;

		let previous = self.state.load_full();

		// Never move the timestamp backwards.
		let reported = snapshot.station.last_update.unwrap_or_else(Utc::now);
		let last_updated = match previous.last_updated {
			Some(prev) if prev > reported => {
				tracing::debug!(
					previous = %prev,
					reported = %reported,
					"Source reported an older update time, keeping previous"
				);
				Some(prev)
			},
			_ => Some(reported),
		};

		let products = previous
			.products
			.iter()
			.map(|(key, entry)| {
				let price = snapshot.price_of(key);
				if !snapshot.prices.contains_key(key) {
					tracing::debug!(product = %key, "Product missing from response");
				}
				(
					key.clone(),
					ProductPrice {
						name: entry.name.clone(),
						price,
					},
				)
			})
			.collect();

		let station_name = if snapshot.station.name.is_empty() {
			previous.station_name.clone()
		} else {
			snapshot.station.name
		};

		self.state.store(Arc::new(CacheState {
			station_name,
			last_updated,
			products,
		}));

		tracing::debug!("Prices refreshed");
		self.notify_observers().await;
		Ok(())
	}

	async fn notify_observers(&self) {
		let observers: Vec<Arc<dyn PriceObserver>> = self
			.observers
			.read()
			.await
			.iter()
			.map(|(_, observer)| observer.clone())
			.collect();

		for observer in observers {
			observer.on_prices_updated(self);
		}
	}

	pub async fn subscribe(&self, observer: Arc<dyn PriceObserver>) -> SubscriptionId {
		let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
		self.observers.write().await.push((id, observer));
		id
	}

	/// Removes an observer; returns whether it was registered.
	pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut observers = self.observers.write().await;
		let before = observers.len();
		observers.retain(|(existing, _)| *existing != id);
		observers.len() != before
	}

	/// Cached price of a product.
	///
	/// `None` if the product is not selected, `Some(None)` while its price is
	/// unknown.
	pub fn current_price(&self, product: &str) -> Option<Option<Price>> {
		self.state.load().products.get(product).map(|entry| entry.price)
	}

	/// Update time of the last successful refresh.
	pub fn last_updated(&self) -> Option<DateTime<Utc>> {
		self.state.load().last_updated
	}

	/// Station name as last reported by the source.
	pub fn station_name(&self) -> String {
		self.state.load().station_name.clone()
	}

	/// Selected products in key order.
	pub fn products(&self) -> Vec<(String, ProductPrice)> {
		self.state
			.load()
			.products
			.iter()
			.map(|(key, entry)| (key.clone(), entry.clone()))
			.collect()
	}

	pub fn company(&self) -> &str {
		&self.binding.company
	}

	pub fn entry_id(&self) -> &str {
		&self.entry_id
	}

	pub fn binding(&self) -> &StationBinding {
		&self.binding
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{at, snapshot, ScriptedClient};
	use rust_decimal::Decimal;
	use std::sync::atomic::AtomicUsize;

	struct CountingObserver {
		count: AtomicUsize,
	}

	impl CountingObserver {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				count: AtomicUsize::new(0),
			})
		}

		fn count(&self) -> usize {
			self.count.load(Ordering::SeqCst)
		}
	}

	impl PriceObserver for CountingObserver {
		fn on_prices_updated(&self, _coordinator: &PriceCoordinator) {
			self.count.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn selection(products: &[&str]) -> ProductSelection {
		products.iter().map(|p| (*p, true)).collect()
	}

	fn coordinator(client: Arc<ScriptedClient>, products: &[&str]) -> PriceCoordinator {
		PriceCoordinator::new(
			client,
			"OK_77",
			"OK",
			StationInfo::new(77, "OK Viby"),
			&selection(products),
		)
		.unwrap()
	}

	fn price(value: i64, scale: u32) -> Option<Price> {
		Some(Decimal::new(value, scale))
	}

	#[test]
	fn test_only_selected_products_are_cached() {
		let mut products = selection(&["A", "B"]);
		products.set("C", false);
		let coordinator = PriceCoordinator::new(
			Arc::new(ScriptedClient::new(vec![])),
			"OK_77",
			"OK",
			StationInfo::new(77, "OK Viby"),
			&products,
		)
		.unwrap();

		assert_eq!(coordinator.current_price("A"), Some(None));
		assert_eq!(coordinator.current_price("B"), Some(None));
		assert_eq!(coordinator.current_price("C"), None);
		assert_eq!(coordinator.current_price("D"), None);
		assert_eq!(coordinator.last_updated(), None);
		assert_eq!(coordinator.station_name(), "OK Viby");
	}

	#[test]
	fn test_rejects_incomplete_binding() {
		let client: Arc<ScriptedClient> = Arc::new(ScriptedClient::new(vec![]));
		let products = selection(&["A"]);

		let no_company = PriceCoordinator::new(
			client.clone(),
			"x",
			" ",
			StationInfo::new(77, "OK Viby"),
			&products,
		);
		assert!(matches!(no_company, Err(CoordinatorError::Configuration(_))));

		let no_station =
			PriceCoordinator::new(client, "x", "OK", StationInfo::new(0, ""), &products);
		assert!(matches!(no_station, Err(CoordinatorError::Configuration(_))));
	}

	#[tokio::test]
	async fn test_refresh_updates_prices_and_timestamp() {
		let client = Arc::new(ScriptedClient::new(vec![Ok(snapshot(
			"OK Viby Ringvej",
			Some(at(8)),
			&[("A", price(105, 1)), ("B", None)],
		))]));
		let coordinator = coordinator(client, &["A", "B"]);

		coordinator.refresh().await.unwrap();

		assert_eq!(coordinator.current_price("A"), Some(price(105, 1)));
		assert_eq!(coordinator.current_price("B"), Some(None));
		assert_eq!(coordinator.last_updated(), Some(at(8)));
		assert_eq!(coordinator.station_name(), "OK Viby Ringvej");
	}

	#[tokio::test]
	async fn test_missing_product_becomes_unknown() {
		let client = Arc::new(ScriptedClient::new(vec![
			Ok(snapshot("OK Viby", Some(at(8)), &[("A", price(10, 0)), ("B", price(11, 0))])),
			Ok(snapshot("OK Viby", Some(at(9)), &[("A", price(12, 0))])),
		]));
		let coordinator = coordinator(client, &["A", "B"]);

		coordinator.refresh().await.unwrap();
		coordinator.refresh().await.unwrap();

		assert_eq!(coordinator.current_price("A"), Some(price(12, 0)));
		assert_eq!(coordinator.current_price("B"), Some(None));
		assert_eq!(coordinator.products().len(), 2);
	}

	#[tokio::test]
	async fn test_unselected_products_in_response_are_ignored() {
		let client = Arc::new(ScriptedClient::new(vec![Ok(snapshot(
			"OK Viby",
			Some(at(8)),
			&[("A", price(10, 0)), ("Z", price(99, 0))],
		))]));
		let coordinator = coordinator(client, &["A"]);

		coordinator.refresh().await.unwrap();

		assert_eq!(coordinator.current_price("Z"), None);
		let keys: Vec<String> = coordinator.products().into_iter().map(|(k, _)| k).collect();
		assert_eq!(keys, vec!["A"]);
	}

	#[tokio::test]
	async fn test_transient_failure_leaves_cache_untouched() {
		let client = Arc::new(ScriptedClient::new(vec![
			Ok(snapshot("OK Viby", Some(at(8)), &[("A", price(10, 0))])),
			Err(PriceClientError::RateLimited),
			Err(PriceClientError::Network("timeout".into())),
		]));
		let coordinator = coordinator(client, &["A"]);
		let observer = CountingObserver::new();
		coordinator.subscribe(observer.clone()).await;

		coordinator.refresh().await.unwrap();
		for _ in 0..2 {
			let err = coordinator.refresh().await.unwrap_err();
			assert!(matches!(err, CoordinatorError::TransientSource(_)));
		}

		assert_eq!(coordinator.current_price("A"), Some(price(10, 0)));
		assert_eq!(coordinator.last_updated(), Some(at(8)));
		assert_eq!(observer.count(), 1);
	}

	#[tokio::test]
	async fn test_product_not_found_is_configuration_error() {
		let client = Arc::new(ScriptedClient::new(vec![
			Ok(snapshot("OK Viby", Some(at(8)), &[("A", price(10, 0))])),
			Err(PriceClientError::ProductNotFound("A".into())),
		]));
		let coordinator = coordinator(client, &["A"]);
		let observer = CountingObserver::new();
		coordinator.subscribe(observer.clone()).await;

		coordinator.refresh().await.unwrap();
		let err = coordinator.refresh().await.unwrap_err();

		assert!(err.is_configuration());
		assert_eq!(coordinator.current_price("A"), Some(price(10, 0)));
		assert_eq!(coordinator.last_updated(), Some(at(8)));
		assert_eq!(observer.count(), 1);
	}

	#[tokio::test]
	async fn test_refresh_is_idempotent() {
		let response = snapshot("OK Viby", Some(at(8)), &[("A", price(1349, 2)), ("B", None)]);
		let client = Arc::new(ScriptedClient::new(vec![Ok(response.clone()), Ok(response)]));
		let coordinator = coordinator(client, &["A", "B"]);

		coordinator.refresh().await.unwrap();
		let first = (coordinator.products(), coordinator.last_updated());
		coordinator.refresh().await.unwrap();
		let second = (coordinator.products(), coordinator.last_updated());

		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn test_timestamp_never_regresses() {
		let client = Arc::new(ScriptedClient::new(vec![
			Ok(snapshot("OK Viby", Some(at(10)), &[("A", price(10, 0))])),
			Ok(snapshot("OK Viby", Some(at(7)), &[("A", price(11, 0))])),
		]));
		let coordinator = coordinator(client, &["A"]);

		coordinator.refresh().await.unwrap();
		coordinator.refresh().await.unwrap();

		assert_eq!(coordinator.last_updated(), Some(at(10)));
		assert_eq!(coordinator.current_price("A"), Some(price(11, 0)));
	}

	#[tokio::test]
	async fn test_missing_source_timestamp_uses_now() {
		let client = Arc::new(ScriptedClient::new(vec![Ok(snapshot(
			"OK Viby",
			None,
			&[("A", price(10, 0))],
		))]));
		let coordinator = coordinator(client, &["A"]);

		let before = Utc::now();
		coordinator.refresh().await.unwrap();

		assert!(coordinator.last_updated().unwrap() >= before);
	}

	#[tokio::test]
	async fn test_unsubscribed_observer_is_not_notified() {
		let response = snapshot("OK Viby", Some(at(8)), &[("A", price(10, 0))]);
		let client = Arc::new(ScriptedClient::new(vec![Ok(response.clone()), Ok(response)]));
		let coordinator = coordinator(client, &["A"]);
		let kept = CountingObserver::new();
		let dropped = CountingObserver::new();

		coordinator.subscribe(kept.clone()).await;
		let id = coordinator.subscribe(dropped.clone()).await;

		coordinator.refresh().await.unwrap();
		assert!(coordinator.unsubscribe(id).await);
		assert!(!coordinator.unsubscribe(id).await);
		coordinator.refresh().await.unwrap();

		assert_eq!(kept.count(), 2);
		assert_eq!(dropped.count(), 1);
	}

	#[tokio::test]
	async fn test_observer_sees_committed_state() {
		struct Recorder(std::sync::Mutex<Vec<Option<Option<Price>>>>);

		impl PriceObserver for Recorder {
			fn on_prices_updated(&self, coordinator: &PriceCoordinator) {
				self.0.lock().unwrap().push(coordinator.current_price("A"));
			}
		}

		let client = Arc::new(ScriptedClient::new(vec![Ok(snapshot(
			"OK Viby",
			Some(at(8)),
			&[("A", price(10, 0))],
		))]));
		let coordinator = coordinator(client, &["A"]);
		let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
		coordinator.subscribe(recorder.clone()).await;

		coordinator.refresh().await.unwrap();

		assert_eq!(*recorder.0.lock().unwrap(), vec![Some(price(10, 0))]);
	}
}
