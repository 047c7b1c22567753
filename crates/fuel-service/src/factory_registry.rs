//! Registry of price client factories.
//!
//! Collects the factories of every available price client backend so the
//! host and the setup commands can build whichever one the configuration
//! names.

use fuel_client::{PriceClientFactory, PriceClientInterface};
use fuel_config::Config;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub struct FactoryRegistry {
	pub client: HashMap<String, PriceClientFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			client: HashMap::new(),
		}
	}

	pub fn register_client(&mut self, name: impl Into<String>, factory: PriceClientFactory) {
		self.client.insert(name.into(), factory);
	}

	/// Builds the primary price client named in the configuration.
	pub fn build_primary_client(
		&self,
		config: &Config,
	) -> Result<Arc<dyn PriceClientInterface>, Box<dyn std::error::Error>> {
		let primary = &config.client.primary;
		let factory = self
			.client
			.get(primary)
			.ok_or_else(|| format!("Unknown price client implementation '{}'", primary))?;
		let client_config = config
			.client
			.primary_config()
			.ok_or_else(|| format!("Missing configuration for price client '{}'", primary))?;

		Ok(Arc::from(factory(client_config)?))
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Registry with every built-in backend registered.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();
		for (name, factory) in fuel_client::get_all_implementations() {
			tracing::debug!(implementation = name, "Registered price client");
			registry.register_client(name, factory);
		}
		registry
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builtin_backends_registered() {
		let registry = get_registry();
		assert!(registry.client.contains_key("http"));
		assert!(registry.client.contains_key("mock"));
	}

	#[test]
	fn test_build_primary_client() {
		let config: Config = r#"
[service]
id = "test"

[client]
primary = "mock"
[client.implementations.mock]
"#
		.parse()
		.unwrap();

		assert!(get_registry().build_primary_client(&config).is_ok());
	}
}
