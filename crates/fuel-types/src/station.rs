//! Station binding types.
//!
//! A station binding is the immutable part of a configured station: which
//! company operates it, the source-assigned station id and the display name
//! captured when the station was set up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A fuel station as identified by the price source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationInfo {
	/// Source-assigned station identifier.
	pub id: u64,
	/// Human readable station name.
	pub name: String,
}

impl StationInfo {
	pub fn new(id: u64, name: impl Into<String>) -> Self {
		Self {
			id,
			name: name.into(),
		}
	}
}

/// Company and station pair that one coordinator is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationBinding {
	/// Company identifier as listed by the price source.
	pub company: String,
	/// The station within that company.
	pub station: StationInfo,
}

impl StationBinding {
	pub fn new(company: impl Into<String>, station: StationInfo) -> Self {
		Self {
			company: company.into(),
			station,
		}
	}

	/// Unique identifier of the binding, `{company}_{station_id}`.
	///
	/// Used as the entry id of the coordinator and as the prefix of every
	/// sensor unique id, so two bindings to the same station collide.
	pub fn unique_id(&self) -> String {
		format!("{}_{}", self.company, self.station.id)
	}

	/// Display title, `{company} - {station_name}`.
	pub fn title(&self) -> String {
		format!("{} - {}", self.company, self.station.name)
	}
}

impl fmt::Display for StationBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} (#{})", self.title(), self.station.id)
	}
}

/// Mapping from product identifier to whether it is tracked.
///
/// Ordered so that sensors and log lines come out in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductSelection(BTreeMap<String, bool>);

impl ProductSelection {
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks a product as selected or not.
	pub fn set(&mut self, product: impl Into<String>, selected: bool) {
		self.0.insert(product.into(), selected);
	}

	/// Returns whether the product is selected. Unknown products are not.
	pub fn is_selected(&self, product: &str) -> bool {
		self.0.get(product).copied().unwrap_or(false)
	}

	/// Iterates the selected product identifiers in order.
	pub fn selected(&self) -> impl Iterator<Item = &str> {
		self.0
			.iter()
			.filter(|(_, selected)| **selected)
			.map(|(product, _)| product.as_str())
	}

	/// Number of selected products.
	pub fn selected_count(&self) -> usize {
		self.selected().count()
	}

	/// Iterates every known product with its selection flag.
	pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
		self.0.iter().map(|(product, selected)| (product.as_str(), *selected))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<K: Into<String>> FromIterator<(K, bool)> for ProductSelection {
	fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}
}

/// Lowercases a string and collapses every run of non-alphanumeric
/// characters into a single underscore.
///
/// Non-ASCII letters are folded to their closest ASCII spelling for the
/// Danish alphabet, so `"Brændstof Øst"` becomes `"braendstof_oest"`.
pub fn slugify(input: &str) -> String {
	let mut slug = String::with_capacity(input.len());
	let mut pending_separator = false;

	for ch in input.chars().flat_map(char::to_lowercase) {
		let folded: &str = match ch {
			'æ' => "ae",
			'ø' => "oe",
			'å' => "aa",
			'é' | 'è' => "e",
			'ü' => "u",
			'ö' => "o",
			'ä' => "a",
			_ => "",
		};

		if !folded.is_empty() {
			if pending_separator && !slug.is_empty() {
				slug.push('_');
			}
			pending_separator = false;
			slug.push_str(folded);
		} else if ch.is_ascii_alphanumeric() {
			if pending_separator && !slug.is_empty() {
				slug.push('_');
			}
			pending_separator = false;
			slug.push(ch);
		} else {
			pending_separator = true;
		}
	}

	slug
}
