// =============================================================================
// Shared types used across the dólar futuro arbitrage monitor
// =============================================================================

use serde::{Deserialize, Serialize};

/// Which side of the cash-and-carry trade a quote points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Futures rich: buy the futures contract, sell the spot leg.
    Long,
    /// Futures cheap: sell the futures contract, buy the spot leg.
    Short,
    /// Implied rate inside the margin band.
    None,
}

impl Default for Direction {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::None => write!(f, "NONE"),
        }
    }
}

// =============================================================================
// QuoteSet
// =============================================================================

/// One spot quote in local currency. A price of `0.0` means "unavailable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

/// Spot quotes keyed by quote-type name, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteSet(Vec<Quote>);

impl QuoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the price for `name`, keeping its original position.
    pub fn insert(&mut self, name: impl Into<String>, price: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|q| q.name == name) {
            Some(existing) => existing.price = price,
            None => self.0.push(Quote { name, price }),
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.iter().find(|q| q.name == name).map(|q| q.price)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quote> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Quotes with a usable (non-zero) price.
    pub fn available(&self) -> impl Iterator<Item = &Quote> {
        self.iter().filter(|q| q.price != 0.0)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for QuoteSet {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, price) in iter {
            set.insert(name, price);
        }
        set
    }
}

// =============================================================================
// RateSet
// =============================================================================

/// Annualised funding rate for one instrument, in percent (40.0 = 40 %).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRate {
    pub name: String,
    #[serde(default)]
    pub rate_pct: f64,
}

/// Funding rates keyed by instrument name, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateSet(Vec<FundingRate>);

impl RateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, rate_pct: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|r| r.name == name) {
            Some(existing) => existing.rate_pct = rate_pct,
            None => self.0.push(FundingRate { name, rate_pct }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FundingRate> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Arithmetic mean of all rates. `None` when the set is empty.
    pub fn average(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: f64 = self.iter().map(|r| r.rate_pct).sum();
        Some(sum / self.len() as f64)
    }

    /// Display lines, e.g. `"Caucion 7d: 40.00%"`.
    pub fn lines(&self) -> Vec<String> {
        self.iter()
            .map(|r| format!("{}: {:.2}%", r.name, r.rate_pct))
            .collect()
    }

    /// Same instruments with every rate set to zero.
    pub fn zeroed(&self) -> Self {
        self.iter().map(|r| (r.name.clone(), 0.0)).collect()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for RateSet {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, rate) in iter {
            set.insert(name, rate);
        }
        set
    }
}
