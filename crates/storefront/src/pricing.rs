//! Order pricing.
//!
//! [`compute_totals`] is a pure function of the cart, the destination and the
//! rate table. Shipping is free once the subtotal reaches the region's
//! threshold; otherwise the region's base rate applies.
//!
//! Regions missing from the table are rejected with
//! [`PricingError::UnknownRegion`]; there is no fallback rate.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use souq_core::Price;

use crate::cart::Cart;
use crate::models::ShippingDestination;

/// Shipping terms for one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    /// Charge applied below the threshold.
    pub base_rate: Price,
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Price,
}

/// Errors raised while loading a rate table.
#[derive(Debug, Error)]
pub enum RateTableError {
    /// The file could not be read.
    #[error("failed to read rate table: {0}")]
    Io(#[from] std::io::Error),
    /// The document is not a valid rate table.
    #[error("invalid rate table: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// The table lists no regions.
    #[error("rate table has no regions")]
    Empty,
    /// Two entries name the same region (names compare case-insensitively).
    #[error("region listed twice: {0}")]
    DuplicateRegion(String),
}

/// Errors raised while pricing an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// The destination region has no entry in the rate table.
    #[error("no shipping rate for region {0:?}")]
    UnknownRegion(String),
    /// The order total is past the largest storable amount.
    #[error("order total {0} is too large")]
    TotalTooLarge(Price),
}

/// Static region → shipping terms mapping.
///
/// Region names are matched case-insensitively, ignoring surrounding
/// whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingRateTable {
    rates: BTreeMap<String, (String, ShippingRate)>,
}

impl ShippingRateTable {
    /// Build a table from `(region, rate)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `RateTableError::Empty` for no entries and
    /// `RateTableError::DuplicateRegion` when two names collide.
    pub fn new(
        entries: impl IntoIterator<Item = (String, ShippingRate)>,
    ) -> Result<Self, RateTableError> {
        let mut rates = BTreeMap::new();
        for (region, rate) in entries {
            let display = region.trim().to_owned();
            let key = normalize(&display);
            if rates.insert(key, (display.clone(), rate)).is_some() {
                return Err(RateTableError::DuplicateRegion(display));
            }
        }
        if rates.is_empty() {
            return Err(RateTableError::Empty);
        }
        Ok(Self { rates })
    }

    /// Parse a YAML document of the form
    ///
    /// ```yaml
    /// Cairo:
    ///   base_rate: 50
    ///   free_shipping_threshold: 1000
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `RateTableError::Parse` for malformed YAML or negative amounts,
    /// plus the errors of [`Self::new`].
    pub fn from_yaml_str(document: &str) -> Result<Self, RateTableError> {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(document)?;
        let mut entries = Vec::with_capacity(mapping.len());
        for (region, rate) in mapping {
            let region: String = serde_yaml::from_value(region)?;
            let rate: ShippingRate = serde_yaml::from_value(rate)?;
            entries.push((region, rate));
        }
        Self::new(entries)
    }

    /// Load a YAML rate table from disk.
    ///
    /// # Errors
    ///
    /// Returns `RateTableError::Io` if the file cannot be read, plus the
    /// errors of [`Self::from_yaml_str`].
    pub fn load(path: &Path) -> Result<Self, RateTableError> {
        let document = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&document)
    }

    /// Shipping terms for a region.
    #[must_use]
    pub fn rate_for(&self, region: &str) -> Option<&ShippingRate> {
        self.resolve(region).map(|(_, rate)| rate)
    }

    /// The table's spelling of a region together with its terms.
    ///
    /// `"  cAIRO "` resolves to `"Cairo"` when the table lists `Cairo`.
    #[must_use]
    pub fn resolve(&self, region: &str) -> Option<(&str, &ShippingRate)> {
        self.rates
            .get(&normalize(region))
            .map(|(display, rate)| (display.as_str(), rate))
    }

    /// Regions with their display names, sorted.
    pub fn regions(&self) -> impl Iterator<Item = (&str, &ShippingRate)> {
        self.rates
            .values()
            .map(|(display, rate)| (display.as_str(), rate))
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Whether the table has no regions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

fn normalize(region: &str) -> String {
    region.trim().to_lowercase()
}

/// Priced order amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Σ line totals.
    pub subtotal: Price,
    /// Shipping charge.
    pub shipping_cost: Price,
    /// `subtotal + shipping_cost`.
    pub total: Price,
}

/// Shipping charge for a subtotal under the given terms.
#[must_use]
pub fn shipping_cost(subtotal: Price, rate: &ShippingRate) -> Price {
    if subtotal >= rate.free_shipping_threshold {
        Price::ZERO
    } else {
        rate.base_rate
    }
}

/// Price a cart for delivery to `destination`.
///
/// # Errors
///
/// Returns `PricingError::UnknownRegion` if the destination's region is not in
/// the table, and `PricingError::TotalTooLarge` if the total cannot be stored.
pub fn compute_totals(
    cart: &Cart,
    destination: &ShippingDestination,
    table: &ShippingRateTable,
) -> Result<Totals, PricingError> {
    let rate = table
        .rate_for(&destination.region)
        .ok_or_else(|| PricingError::UnknownRegion(destination.region.trim().to_owned()))?;
    let subtotal = cart.subtotal();
    let shipping_cost = shipping_cost(subtotal, rate);
    let total = subtotal + shipping_cost;
    if !total.is_storable() {
        return Err(PricingError::TotalTooLarge(total));
    }
    Ok(Totals {
        subtotal,
        shipping_cost,
        total,
    })
}
