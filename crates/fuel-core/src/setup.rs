//! Interactive setup of station bindings.
//!
//! A [`SetupFlow`] walks through the choices needed to bind a station:
//! API key, company, station and products. Each step validates its input
//! against the price source before moving on. The caller renders the
//! current [`SetupStep`] however it likes and feeds the answer back through
//! [`SetupFlow::submit`].
//!
//! Invalid input leaves the flow on the same step. Source failures abort
//! the flow with an [`AbortReason`].

use fuel_client::{PriceClientError, PriceClientInterface};
use fuel_config::StationConfig;
use fuel_types::{ProductSelection, SecretString, StationBinding, StationInfo, StationSummary};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a setup flow was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
	InvalidApiKey,
	RateLimitExceeded,
	CannotConnect,
	AlreadyConfigured,
}

impl AbortReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			AbortReason::InvalidApiKey => "invalid_api_key",
			AbortReason::RateLimitExceeded => "rate_limit_exceeded",
			AbortReason::CannotConnect => "cannot_connect",
			AbortReason::AlreadyConfigured => "already_configured",
		}
	}

	/// Reason for a failed key check.
	fn from_key_check(err: &PriceClientError) -> Self {
		match err {
			PriceClientError::Unauthorized => AbortReason::InvalidApiKey,
			PriceClientError::RateLimited => AbortReason::RateLimitExceeded,
			_ => AbortReason::CannotConnect,
		}
	}

	/// Reason for any other failed source call.
	fn from_lookup(err: &PriceClientError) -> Self {
		match err {
			PriceClientError::RateLimited => AbortReason::RateLimitExceeded,
			_ => AbortReason::CannotConnect,
		}
	}
}

impl fmt::Display for AbortReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
pub enum SetupError {
	#[error("Setup aborted: {0}")]
	Aborted(AbortReason),
	/// The answer was not acceptable; the flow stays on the same step.
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Unexpected input for step {step}")]
	UnexpectedInput { step: &'static str },
	#[error("Setup already finished")]
	Finished,
}

/// Builds a price client for a candidate API key.
pub type ClientConnector =
	Box<dyn Fn(&SecretString) -> Result<Arc<dyn PriceClientInterface>, PriceClientError> + Send + Sync>;

/// Step the flow is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupStep {
	ApiKey,
	CompanySelection { companies: Vec<String> },
	StationSelection { company: String, stations: Vec<StationSummary> },
	ProductSelection { station: StationBinding, available: Vec<String>, defaults: ProductSelection },
	Done(SetupOutcome),
	Aborted(AbortReason),
}

impl SetupStep {
	pub fn name(&self) -> &'static str {
		match self {
			SetupStep::ApiKey => "api_key",
			SetupStep::CompanySelection { .. } => "company_selection",
			SetupStep::StationSelection { .. } => "station_selection",
			SetupStep::ProductSelection { .. } => "product_selection",
			SetupStep::Done(_) => "done",
			SetupStep::Aborted(_) => "aborted",
		}
	}
}

/// Answer to the current step.
#[derive(Debug, Clone)]
pub enum SetupInput {
	ApiKey(SecretString),
	Company(String),
	/// Station display name, as listed in the station step.
	Station(String),
	Products(ProductSelection),
}

/// Result of a completed flow.
#[derive(Debug, Clone, PartialEq)]
pub struct SetupOutcome {
	/// Only set by the initial flow, which is the one asking for a key.
	pub api_key: Option<SecretString>,
	pub binding: StationBinding,
	pub products: ProductSelection,
}

impl SetupOutcome {
	pub fn station_config(&self) -> StationConfig {
		StationConfig {
			company: self.binding.company.clone(),
			station: self.binding.station.clone(),
			products: self.products.clone(),
		}
	}
}

pub struct SetupFlow {
	connector: Option<ClientConnector>,
	client: Option<Arc<dyn PriceClientInterface>>,
	api_key: Option<SecretString>,
	/// Entry ids already configured.
	existing: HashSet<String>,
	/// Entry being reconfigured, exempt from the duplicate check.
	reconfiguring: Option<String>,
	step: SetupStep,
}

impl fmt::Debug for SetupFlow {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SetupFlow")
			.field("step", &self.step)
			.field("reconfiguring", &self.reconfiguring)
			.finish_non_exhaustive()
	}
}

impl SetupFlow {
	/// Flow for a fresh installation, starting with the API key.
	pub fn initial(connector: ClientConnector, existing: impl IntoIterator<Item = String>) -> Self {
		Self {
			connector: Some(connector),
			client: None,
			api_key: None,
			existing: existing.into_iter().collect(),
			reconfiguring: None,
			step: SetupStep::ApiKey,
		}
	}

	/// Flow adding another station with an already working client.
	pub async fn add_station(
		client: Arc<dyn PriceClientInterface>,
		existing: impl IntoIterator<Item = String>,
	) -> Result<Self, SetupError> {
		let mut flow = Self {
			connector: None,
			client: Some(client.clone()),
			api_key: None,
			existing: existing.into_iter().collect(),
			reconfiguring: None,
			step: SetupStep::ApiKey,
		};

		match client.list_companies().await {
			Ok(companies) => flow.enter_company_selection(companies.into_iter().map(|c| c.name).collect())?,
			Err(e) => return Err(flow.abort(AbortReason::from_lookup(&e), &e)),
		}
		Ok(flow)
	}

	/// Flow changing the product selection of a configured station.
	pub async fn reconfigure(
		client: Arc<dyn PriceClientInterface>,
		station: &StationConfig,
	) -> Result<Self, SetupError> {
		let mut flow = Self {
			connector: None,
			client: Some(client),
			api_key: None,
			existing: HashSet::new(),
			reconfiguring: Some(station.entry_id()),
			step: SetupStep::ApiKey,
		};
		flow.enter_product_selection(station.binding(), station.products.clone())
			.await?;
		Ok(flow)
	}

	pub fn step(&self) -> &SetupStep {
		&self.step
	}

	/// Outcome of a finished flow.
	pub fn outcome(&self) -> Option<&SetupOutcome> {
		match &self.step {
			SetupStep::Done(outcome) => Some(outcome),
			_ => None,
		}
	}

	/// Answers the current step and advances the flow.
	pub async fn submit(&mut self, input: SetupInput) -> Result<&SetupStep, SetupError> {
		match (&self.step, input) {
			(SetupStep::Done(_) | SetupStep::Aborted(_), _) => return Err(SetupError::Finished),
			(SetupStep::ApiKey, SetupInput::ApiKey(key)) => self.submit_api_key(key).await?,
			(SetupStep::CompanySelection { companies }, SetupInput::Company(company)) => {
				if !companies.contains(&company) {
					return Err(SetupError::InvalidInput(format!(
						"Unknown company '{}'",
						company
					)));
				}
				self.enter_station_selection(company).await?;
			},
			(SetupStep::StationSelection { company, stations }, SetupInput::Station(name)) => {
				let station = stations
					.iter()
					.find(|s| s.name == name)
					.ok_or_else(|| SetupError::InvalidInput(format!("Unknown station '{}'", name)))?;
				let binding =
					StationBinding::new(company.clone(), StationInfo::new(station.id, &station.name));

				let entry_id = binding.unique_id();
				if self.existing.contains(&entry_id)
					&& self.reconfiguring.as_deref() != Some(entry_id.as_str())
				{
					tracing::info!(entry_id = %entry_id, "Station already configured");
					self.step = SetupStep::Aborted(AbortReason::AlreadyConfigured);
					return Err(SetupError::Aborted(AbortReason::AlreadyConfigured));
				}

				self.enter_product_selection(binding, ProductSelection::new())
					.await?;
			},
			(SetupStep::ProductSelection { station, available, .. }, SetupInput::Products(products)) => {
				if let Some((unknown, _)) = products.iter().find(|(p, _)| !available.iter().any(|a| a == p)) {
					return Err(SetupError::InvalidInput(format!(
						"Product '{}' is not sold at {}",
						unknown, station.station.name
					)));
				}
				if products.selected_count() == 0 {
					return Err(SetupError::InvalidInput("Select at least one product".into()));
				}

				let outcome = SetupOutcome {
					api_key: self.api_key.clone(),
					binding: station.clone(),
					products,
				};
				tracing::info!(station = %outcome.binding, products = outcome.products.selected_count(), "Station setup complete");
				self.step = SetupStep::Done(outcome);
			},
			(step, _) => {
				return Err(SetupError::UnexpectedInput { step: step.name() });
			},
		}

		Ok(&self.step)
	}

	async fn submit_api_key(&mut self, key: SecretString) -> Result<(), SetupError> {
		if key.is_empty() {
			return Err(SetupError::InvalidInput("API key must not be empty".into()));
		}
		let Some(connector) = self.connector.as_ref() else {
			return Err(SetupError::UnexpectedInput { step: "api_key" });
		};

		let client = match connector(&key) {
			Ok(client) => client,
			Err(e) => return Err(self.abort(AbortReason::from_key_check(&e), &e)),
		};
		let companies = match client.list_companies().await {
			Ok(companies) => companies,
			Err(e) => return Err(self.abort(AbortReason::from_key_check(&e), &e)),
		};

		self.client = Some(client);
		self.api_key = Some(key);
		self.enter_company_selection(companies.into_iter().map(|c| c.name).collect())
	}

	fn enter_company_selection(&mut self, companies: Vec<String>) -> Result<(), SetupError> {
		// The source answers an exhausted quota with an empty list.
		if companies.is_empty() {
			self.step = SetupStep::Aborted(AbortReason::RateLimitExceeded);
			return Err(SetupError::Aborted(AbortReason::RateLimitExceeded));
		}
		self.step = SetupStep::CompanySelection { companies };
		Ok(())
	}

	async fn enter_station_selection(&mut self, company: String) -> Result<(), SetupError> {
		let client = self.client()?;
		let mut stations = match client.list_stations(&company).await {
			Ok(stations) => stations,
			Err(e) => return Err(self.abort(AbortReason::from_lookup(&e), &e)),
		};
		stations.sort_by(|a, b| a.name.cmp(&b.name));

		if stations.is_empty() {
			return Err(SetupError::InvalidInput(format!(
				"{} has no stations",
				company
			)));
		}
		self.step = SetupStep::StationSelection { company, stations };
		Ok(())
	}

	async fn enter_product_selection(
		&mut self,
		station: StationBinding,
		defaults: ProductSelection,
	) -> Result<(), SetupError> {
		let client = self.client()?;
		let snapshot = match client.fetch_prices(station.station.id).await {
			Ok(snapshot) => snapshot,
			Err(e) => return Err(self.abort(AbortReason::from_lookup(&e), &e)),
		};

		let available: Vec<String> = snapshot.products().map(str::to_string).collect();
		let defaults = available
			.iter()
			.map(|p| (p.clone(), defaults.is_selected(p)))
			.collect();

		self.step = SetupStep::ProductSelection {
			station,
			available,
			defaults,
		};
		Ok(())
	}

	fn client(&self) -> Result<Arc<dyn PriceClientInterface>, SetupError> {
		self.client
			.clone()
			.ok_or(SetupError::UnexpectedInput { step: self.step.name() })
	}

	fn abort(&mut self, reason: AbortReason, err: &PriceClientError) -> SetupError {
		tracing::warn!(step = self.step.name(), reason = %reason, error = %err, "Setup aborted");
		self.step = SetupStep::Aborted(reason);
		SetupError::Aborted(reason)
	}
}

/// Checks a replacement API key.
///
/// Unlike the setup flow, a rejected key is meant to be asked for again, so
/// the reason is returned to the caller instead of ending anything.
pub async fn reauthenticate(connector: &ClientConnector, key: &SecretString) -> Result<(), AbortReason> {
	let client = connector(key).map_err(|e| AbortReason::from_key_check(&e))?;
	client
		.list_companies()
		.await
		.map(|_| ())
		.map_err(|e| AbortReason::from_key_check(&e))
}

#[cfg(test)]
mod tests {
	use super::*;
	use fuel_client::implementations::mock;

	const CATALOG: &str = r#"
		[[stations]]
		id = 1234
		company = "Circle K"
		name = "Circle K Aarhus"
		unpriced = ["El"]
		[stations.prices]
		"Blyfri 95" = 13.49
		Diesel = 12.09

		[[stations]]
		id = 55
		company = "Circle K"
		name = "Circle K Aalborg"
		[stations.prices]
		Diesel = 12.19
	"#;

	fn mock_client(extra: &str) -> Arc<dyn PriceClientInterface> {
		let config: toml::Value = toml::from_str(&format!("{}\n{}", extra, CATALOG)).unwrap();
		Arc::from(mock::create_client(&config).unwrap())
	}

	fn connector() -> ClientConnector {
		Box::new(|key: &SecretString| -> Result<Arc<dyn PriceClientInterface>, PriceClientError> {
			let extra = match key.expose_secret() {
				"bad" => "fail_with = \"unauthorized\"",
				"busy" => "fail_with = \"rate_limited\"",
				"down" => "fail_with = \"network\"",
				_ => "",
			};
			Ok(mock_client(extra))
		})
	}

	fn selection(products: &[&str]) -> ProductSelection {
		products.iter().map(|p| (*p, true)).collect()
	}

	#[tokio::test]
	async fn test_initial_flow() {
		let mut flow = SetupFlow::initial(connector(), Vec::new());
		assert_eq!(flow.step(), &SetupStep::ApiKey);

		let step = flow
			.submit(SetupInput::ApiKey("good".into()))
			.await
			.unwrap();
		assert_eq!(step, &SetupStep::CompanySelection {
			companies: vec!["Circle K".into()]
		});

		let step = flow
			.submit(SetupInput::Company("Circle K".into()))
			.await
			.unwrap();
		let SetupStep::StationSelection { stations, .. } = step else {
			panic!("expected station selection, got {:?}", step);
		};
		let names: Vec<&str> = stations.iter().map(|s| s.name.as_str()).collect();
		assert_eq!(names, vec!["Circle K Aalborg", "Circle K Aarhus"]);

		let step = flow
			.submit(SetupInput::Station("Circle K Aarhus".into()))
			.await
			.unwrap();
		let SetupStep::ProductSelection { available, defaults, .. } = step else {
			panic!("expected product selection, got {:?}", step);
		};
		assert_eq!(available, &vec!["Blyfri 95", "Diesel", "El"]);
		assert_eq!(defaults.selected_count(), 0);

		flow.submit(SetupInput::Products(selection(&["Diesel"])))
			.await
			.unwrap();
		let outcome = flow.outcome().unwrap();
		assert_eq!(outcome.api_key, Some(SecretString::from("good")));
		assert_eq!(outcome.binding.unique_id(), "Circle K_1234");
		assert_eq!(outcome.station_config().entry_id(), "Circle K_1234");
		assert!(outcome.products.is_selected("Diesel"));
	}

	#[tokio::test]
	async fn test_api_key_abort_reasons() {
		for (key, reason) in [
			("bad", AbortReason::InvalidApiKey),
			("busy", AbortReason::RateLimitExceeded),
			("down", AbortReason::CannotConnect),
		] {
			let mut flow = SetupFlow::initial(connector(), Vec::new());
			let err = flow.submit(SetupInput::ApiKey(key.into())).await.unwrap_err();
			assert!(matches!(err, SetupError::Aborted(r) if r == reason), "{}", key);
			assert_eq!(flow.step(), &SetupStep::Aborted(reason));
		}
	}

	#[tokio::test]
	async fn test_empty_company_list_aborts() {
		let empty: toml::Value = toml::from_str("").unwrap();
		let client: Arc<dyn PriceClientInterface> = Arc::from(mock::create_client(&empty).unwrap());

		let err = SetupFlow::add_station(client, Vec::new()).await.unwrap_err();
		assert!(matches!(
			err,
			SetupError::Aborted(AbortReason::RateLimitExceeded)
		));
	}

	#[tokio::test]
	async fn test_duplicate_station_aborts() {
		let mut flow = SetupFlow::add_station(mock_client(""), vec!["Circle K_1234".to_string()])
			.await
			.unwrap();
		flow.submit(SetupInput::Company("Circle K".into()))
			.await
			.unwrap();

		let err = flow
			.submit(SetupInput::Station("Circle K Aarhus".into()))
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			SetupError::Aborted(AbortReason::AlreadyConfigured)
		));
		assert!(matches!(flow.submit(SetupInput::Station("x".into())).await, Err(SetupError::Finished)));
	}

	#[tokio::test]
	async fn test_invalid_input_keeps_step() {
		let mut flow = SetupFlow::add_station(mock_client(""), Vec::new())
			.await
			.unwrap();

		assert!(matches!(
			flow.submit(SetupInput::Company("Shell".into())).await,
			Err(SetupError::InvalidInput(_))
		));
		assert!(matches!(
			flow.submit(SetupInput::Station("Circle K Aarhus".into())).await,
			Err(SetupError::UnexpectedInput { step: "company_selection" })
		));
		assert_eq!(flow.step().name(), "company_selection");

		flow.submit(SetupInput::Company("Circle K".into()))
			.await
			.unwrap();
		flow.submit(SetupInput::Station("Circle K Aalborg".into()))
			.await
			.unwrap();
		assert!(matches!(
			flow.submit(SetupInput::Products(selection(&["HVO"]))).await,
			Err(SetupError::InvalidInput(_))
		));
		assert!(matches!(
			flow.submit(SetupInput::Products(ProductSelection::new())).await,
			Err(SetupError::InvalidInput(_))
		));

		flow.submit(SetupInput::Products(selection(&["Diesel"])))
			.await
			.unwrap();
		assert_eq!(flow.outcome().unwrap().api_key, None);
	}

	#[tokio::test]
	async fn test_reconfigure_preselects_current_products() {
		let station = StationConfig {
			company: "Circle K".into(),
			station: StationInfo::new(1234, "Circle K Aarhus"),
			products: selection(&["Diesel"]),
		};

		let mut flow = SetupFlow::reconfigure(mock_client(""), &station)
			.await
			.unwrap();
		let SetupStep::ProductSelection { defaults, .. } = flow.step() else {
			panic!("expected product selection");
		};
		assert!(defaults.is_selected("Diesel"));
		assert!(!defaults.is_selected("Blyfri 95"));

		flow.submit(SetupInput::Products(selection(&["Diesel", "Blyfri 95"])))
			.await
			.unwrap();
		let outcome = flow.outcome().unwrap();
		assert_eq!(outcome.binding, station.binding());
		assert_eq!(outcome.products.selected_count(), 2);
	}

	#[tokio::test]
	async fn test_reconfigure_unreachable_source() {
		let station = StationConfig {
			company: "Circle K".into(),
			station: StationInfo::new(1234, "Circle K Aarhus"),
			products: selection(&["Diesel"]),
		};
		let err = SetupFlow::reconfigure(mock_client("fail_with = \"rate_limited\""), &station)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			SetupError::Aborted(AbortReason::RateLimitExceeded)
		));
	}

	#[tokio::test]
	async fn test_reauthenticate() {
		let connector = connector();
		assert_eq!(reauthenticate(&connector, &"good".into()).await, Ok(()));
		assert_eq!(
			reauthenticate(&connector, &"bad".into()).await,
			Err(AbortReason::InvalidApiKey)
		);
		assert_eq!(
			reauthenticate(&connector, &"busy".into()).await,
			Err(AbortReason::RateLimitExceeded)
		);
	}
}
