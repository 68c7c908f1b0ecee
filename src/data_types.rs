/*!
 * Data type definitions for claims rows and running totals
 *
 * `ClaimRecord` is transient: it borrows from the reader's record buffer and
 * lives for one row. The `*Total` types are the Pass 1 accumulators.
 */

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, RollupError};

/// Calendar month used as an ordering key (`YYYY-MM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a month, validating the month number
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|date| Month { year: date.year(), month: date.month() })
            .ok_or_else(|| RollupError::invalid_month(&format!("{year:04}-{month:02}")))
    }

    /// Caller guarantees `1 <= month <= 12`
    pub(crate) const fn from_parts(year: i32, month: u32) -> Self {
        Month { year, month }
    }

    /// Parse `YYYY-MM` or `YYYY-MM-DD` into a month
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let date = match raw.len() {
            7 => NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok()?,
            10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?,
            _ => return None,
        };
        Some(Month { year: date.year(), month: date.month() })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self> {
        Month::parse(s).ok_or_else(|| RollupError::invalid_month(s))
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Month::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid month '{raw}'")))
    }
}

/// One parsed row of the claims file
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRecord<'a> {
    /// Billing provider NPI (opaque 10-digit identifier)
    pub provider_id: &'a str,
    pub procedure_code: &'a str,
    pub month: Month,
    pub beneficiaries: u64,
    pub claims: u64,
    pub paid: f64,
}

impl ClaimRecord<'_> {
    /// Cost per claim for this row, if it has claims
    pub fn cost_per_claim(&self) -> Option<f64> {
        (self.claims > 0).then(|| self.paid / self.claims as f64)
    }
}

/// Additive paid / claims / beneficiaries accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

impl Totals {
    pub fn add(&mut self, record: &ClaimRecord<'_>) {
        self.paid += record.paid;
        self.claims += record.claims;
        self.beneficiaries += record.beneficiaries;
    }

    pub fn merge(&mut self, other: &Totals) {
        self.paid += other.paid;
        self.claims += other.claims;
        self.beneficiaries += other.beneficiaries;
    }

    pub fn cost_per_claim(&self) -> Option<f64> {
        (self.claims > 0).then(|| self.paid / self.claims as f64)
    }

    pub fn cost_per_beneficiary(&self) -> Option<f64> {
        (self.beneficiaries > 0).then(|| self.paid / self.beneficiaries as f64)
    }

    pub fn claims_per_beneficiary(&self) -> Option<f64> {
        (self.beneficiaries > 0).then(|| self.claims as f64 / self.beneficiaries as f64)
    }
}

/// Whole-input totals for one procedure code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcedureTotal {
    pub totals: Totals,
    /// Insertion order, used to break ranking ties
    pub first_seen: u64,
}

/// Whole-input totals for one provider, with the early/late period split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderTotal {
    pub totals: Totals,
    /// Rows with month before the cutoff
    pub early: Totals,
    /// Rows with month at or after the cutoff
    pub late: Totals,
    /// Incremented whenever the procedure differs from this provider's previous row.
    /// Exact only when the input is grouped by provider and procedure.
    pub approx_procedure_count: u64,
    pub first_seen: u64,
}

impl ProviderTotal {
    pub fn observe(&mut self, record: &ClaimRecord<'_>, cutoff: Month) {
        self.totals.add(record);
        if record.month < cutoff {
            self.early.add(record);
        } else {
            self.late.add(record);
        }
    }
}

/// National totals for one month
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthTotal {
    pub totals: Totals,
    /// Distinct procedure codes billed in this month
    pub procedure_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(provider: &'a str, code: &'a str, month: &str, claims: u64, paid: f64) -> ClaimRecord<'a> {
        ClaimRecord {
            provider_id: provider,
            procedure_code: code,
            month: Month::parse(month).unwrap(),
            beneficiaries: 1,
            claims,
            paid,
        }
    }

    #[test]
    fn test_month_parsing_and_ordering() {
        let a = Month::parse("2021-07").unwrap();
        let b = Month::parse("2021-07-01").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2021-07");
        assert!(Month::parse("2021-06").unwrap() < a);
        assert!(Month::parse("2020-12").unwrap() < Month::parse("2021-01").unwrap());
        assert!(Month::parse("2021-13").is_none());
        assert!(Month::parse("July 2021").is_none());
        assert!(Month::parse("").is_none());
        assert!(Month::new(2021, 0).is_err());
    }

    #[test]
    fn test_month_serde_as_string() {
        let month = Month::parse("2019-03").unwrap();
        assert_eq!(serde_json::to_string(&month).unwrap(), "\"2019-03\"");
        let back: Month = serde_json::from_str("\"2019-03-15\"").unwrap();
        assert_eq!(back, month);
    }

    #[test]
    fn test_totals_ratios_are_absent_on_zero() {
        let totals = Totals::default();
        assert_eq!(totals.cost_per_claim(), None);
        assert_eq!(totals.cost_per_beneficiary(), None);
        assert_eq!(totals.claims_per_beneficiary(), None);
    }

    #[test]
    fn test_provider_period_split() {
        let cutoff = Month::parse("2021-07").unwrap();
        let mut provider = ProviderTotal::default();
        provider.observe(&record("P1", "A", "2021-01", 10, 100.0), cutoff);
        provider.observe(&record("P1", "A", "2021-07", 10, 300.0), cutoff);
        provider.observe(&record("P1", "B", "2021-08", 5, 50.0), cutoff);
        provider.observe(&record("P1", "A", "2021-09", 5, 50.0), cutoff);

        assert_eq!(provider.early.paid, 100.0);
        assert_eq!(provider.late.paid, 400.0);
        assert_eq!(provider.late.claims, 20);
        assert_eq!(provider.totals.claims, 30);
    }
}
