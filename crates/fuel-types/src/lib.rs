//! Common types module for the fuel price monitor.
//!
//! This module defines the data types shared by the configuration loader,
//! the price clients and the refresh coordinator, so that every crate in the
//! workspace agrees on what a station, a product selection and a price
//! snapshot look like.

/// Price snapshot and catalog types returned by price clients.
pub mod price;
/// Registry trait for self-registering client implementations.
pub mod registry;
/// Redacting wrapper for API keys.
pub mod secret_string;
/// Station binding and product selection types.
pub mod station;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use price::{Company, Price, PriceSnapshot, StationSnapshot, StationSummary};
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use station::{slugify, ProductSelection, StationBinding, StationInfo};
pub use validation::*;
