// =============================================================================
// Contract Calendar — ROFEX contract code to expiry date resolution
// =============================================================================
//
// Contract identifiers look like `DLR/DEC25`.  The month code after the `/`
// is looked up in the configured table; anything unknown resolves to the
// configured default expiry instead of failing.
//
// Day counts follow calendar subtraction floored to whole days, with the
// expiry taken at local midnight:
//   now = 2025-10-02 00:00, expiry = 2025-12-31  =>  90
//   now = 2025-10-02 12:00, expiry = 2025-12-31  =>  89
//   now = 2025-12-31 08:00, expiry = 2025-12-31  =>  -1

use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::warn;

use crate::runtime_config::{ContractSpec, RuntimeConfig};

const SECS_PER_DAY: i64 = 86_400;

// =============================================================================
// Clock
// =============================================================================

/// Source of "now" for day-count arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

// =============================================================================
// ContractCalendar
// =============================================================================

/// Resolves contract identifiers to expiry dates.
#[derive(Debug, Clone)]
pub struct ContractCalendar {
    expiries: HashMap<String, NaiveDate>,
    default_expiry: NaiveDate,
}

impl ContractCalendar {
    pub fn new(contracts: &[ContractSpec], default_expiry: NaiveDate) -> Self {
        let expiries = contracts
            .iter()
            .map(|c| (c.code.trim().to_uppercase(), c.expiry))
            .collect();
        Self {
            expiries,
            default_expiry,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(&config.contracts, config.default_expiry)
    }

    pub fn default_expiry(&self) -> NaiveDate {
        self.default_expiry
    }

    /// Listed expiry for `contract`, without the default fallback.
    pub fn lookup(&self, contract: &str) -> Option<NaiveDate> {
        self.expiries.get(&month_code(contract)).copied()
    }

    /// Whether the month code of `contract` is in the table.
    pub fn is_known(&self, contract: &str) -> bool {
        self.lookup(contract).is_some()
    }

    /// Expiry date for `contract`, or the default expiry when the month code
    /// is not listed. Never fails.
    pub fn expiry(&self, contract: &str) -> NaiveDate {
        match self.lookup(contract) {
            Some(date) => date,
            None => {
                warn!(
                    contract,
                    default_expiry = %self.default_expiry,
                    "unknown contract, using default expiry"
                );
                self.default_expiry
            }
        }
    }

    /// Signed whole days from `now` until the contract's expiry.
    pub fn days_to_expiry(&self, contract: &str, now: NaiveDateTime) -> i64 {
        days_between(now, self.expiry(contract))
    }
}

/// Month code of a contract identifier: the part after the first `/`, or the
/// whole identifier when there is no separator.
pub fn month_code(contract: &str) -> String {
    let code = contract
        .split_once('/')
        .map(|(_, code)| code)
        .unwrap_or(contract);
    code.trim().to_uppercase()
}

/// Parse a pinned evaluation instant: `2025-10-02`, `2025-10-02T09:30:00`
/// or `2025-10-02 09:30:00`. Dates alone mean local midnight.
pub fn parse_as_of(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::default()))
        })
}

/// Whole days from `now` to midnight of `expiry`, floored.
pub fn days_between(now: NaiveDateTime, expiry: NaiveDate) -> i64 {
    let diff = expiry.and_time(NaiveTime::default()) - now;
    let mut secs = diff.num_seconds();
    // num_seconds truncates toward zero; floor a negative fractional second.
    if Duration::seconds(secs) > diff {
        secs -= 1;
    }
    secs.div_euclid(SECS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn calendar() -> ContractCalendar {
        ContractCalendar::from_config(&RuntimeConfig::default())
    }

    #[test]
    fn known_contract_resolves_to_month_end() {
        let cal = calendar();
        assert_eq!(
            cal.expiry("DLR/NOV25"),
            NaiveDate::from_ymd_opt(2025, 11, 30).unwrap()
        );
        assert_eq!(
            cal.expiry("DLR/JAN26"),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
        );
        assert!(cal.is_known("dlr/oct25"));
    }

    #[test]
    fn unknown_contract_falls_back_to_default() {
        let cal = calendar();
        assert!(!cal.is_known("DLR/MAR27"));
        assert_eq!(cal.expiry("DLR/MAR27"), cal.default_expiry());
        assert_eq!(cal.expiry(""), cal.default_expiry());
    }

    #[test]
    fn bare_month_code_is_accepted() {
        let cal = calendar();
        assert_eq!(cal.expiry("OCT25"), NaiveDate::from_ymd_opt(2025, 10, 31).unwrap());
    }

    #[test]
    fn whole_days_at_midnight() {
        let cal = calendar();
        assert_eq!(cal.days_to_expiry("DLR/DEC25", at(2025, 10, 2, 0)), 90);
    }

    #[test]
    fn partial_days_are_floored() {
        let cal = calendar();
        assert_eq!(cal.days_to_expiry("DLR/DEC25", at(2025, 10, 2, 12)), 89);
        assert_eq!(cal.days_to_expiry("DLR/DEC25", at(2025, 12, 30, 23)), 0);
    }

    #[test]
    fn expiry_day_and_after_are_non_positive() {
        let cal = calendar();
        assert_eq!(cal.days_to_expiry("DLR/DEC25", at(2025, 12, 31, 0)), 0);
        assert_eq!(cal.days_to_expiry("DLR/DEC25", at(2025, 12, 31, 8)), -1);
        assert_eq!(cal.days_to_expiry("DLR/OCT25", at(2025, 12, 31, 0)), -61);
    }

    #[test]
    fn sub_second_past_expiry_is_minus_one() {
        let expiry = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let now = expiry.and_hms_milli_opt(0, 0, 0, 500).unwrap();
        assert_eq!(days_between(now, expiry), -1);
    }

    #[test]
    fn lookup_has_no_fallback() {
        let cal = calendar();
        assert_eq!(
            cal.lookup("DLR/DEC25"),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
        assert_eq!(cal.lookup("DLR/MAR27"), None);
    }

    #[test]
    fn parse_as_of_formats() {
        assert_eq!(parse_as_of("2025-10-02"), Some(at(2025, 10, 2, 0)));
        assert_eq!(parse_as_of(" 2025-10-02T09:00:00 "), Some(at(2025, 10, 2, 9)));
        assert_eq!(parse_as_of("2025-10-02 09:00:00"), Some(at(2025, 10, 2, 9)));
        assert_eq!(parse_as_of("yesterday"), None);
        assert_eq!(parse_as_of("2025-13-40"), None);
    }

    #[test]
    fn fixed_clock_is_frozen() {
        let clock = FixedClock(at(2025, 10, 1, 9));
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn month_code_extraction() {
        assert_eq!(month_code("DLR/DEC25"), "DEC25");
        assert_eq!(month_code(" dlr/dec25 "), "DEC25");
        assert_eq!(month_code("DEC25"), "DEC25");
    }
}
