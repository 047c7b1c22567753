//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Every price client backend provides a `Registry` struct implementing this
/// trait, tying the name used under `[client.implementations.<name>]` to the
/// factory that builds it.
pub trait ImplementationRegistry {
	/// The name used in configuration files, e.g. `"http"` or `"mock"`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from its config.
	fn factory() -> Self::Factory;
}
