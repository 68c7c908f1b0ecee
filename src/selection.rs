/*!
 * Top-K selection over Pass 1 totals
 */

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::data_types::{ProcedureTotal, ProviderTotal, Totals};
use crate::totals::PassOneTotals;

/// Ranking order: paid descending, then first-seen ascending
pub fn rank_order(a: (&Totals, u64), b: (&Totals, u64)) -> Ordering {
    b.0.paid.total_cmp(&a.0.paid).then(a.1.cmp(&b.1))
}

/// Rank every key of a totals map, best first
pub fn rank<'a, V, F>(map: &'a HashMap<String, V>, key_of: F) -> Vec<&'a str>
where
    F: Fn(&V) -> (&Totals, u64),
{
    let mut ranked: Vec<(&str, &V)> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    ranked.sort_by(|a, b| rank_order(key_of(a.1), key_of(b.1)));
    ranked.into_iter().map(|(k, _)| k).collect()
}

pub fn rank_procedures(procedures: &HashMap<String, ProcedureTotal>) -> Vec<&str> {
    rank(procedures, |p| (&p.totals, p.first_seen))
}

pub fn rank_providers(providers: &HashMap<String, ProviderTotal>) -> Vec<&str> {
    rank(providers, |p| (&p.totals, p.first_seen))
}

/// Selection thresholds
#[derive(Debug, Clone, Copy)]
pub struct TopKSelector {
    pub procedures: usize,
    pub providers: usize,
    pub monthly_providers: usize,
}

impl TopKSelector {
    pub fn new(procedures: usize, providers: usize, monthly_providers: usize) -> Self {
        Self { procedures, providers, monthly_providers }
    }

    pub fn select(&self, totals: &PassOneTotals) -> TopSets {
        let ranked_procedures: Vec<String> = rank_procedures(&totals.procedures)
            .into_iter()
            .take(self.procedures)
            .map(str::to_string)
            .collect();

        let ranked_providers = rank_providers(&totals.providers);
        let monthly_providers = ranked_providers
            .iter()
            .take(self.monthly_providers)
            .map(|k| k.to_string())
            .collect();
        let ranked_providers: Vec<String> = ranked_providers
            .into_iter()
            .take(self.providers)
            .map(str::to_string)
            .collect();

        TopSets {
            procedures: ranked_procedures.iter().cloned().collect(),
            providers: ranked_providers.iter().cloned().collect(),
            ranked_procedures,
            ranked_providers,
            monthly_providers,
        }
    }
}

/// Membership sets consumed by Pass 2
#[derive(Debug, Clone, Default)]
pub struct TopSets {
    /// Top-N procedure codes, best first
    pub ranked_procedures: Vec<String>,
    /// Top-M providers, best first
    pub ranked_providers: Vec<String>,
    pub procedures: HashSet<String>,
    pub providers: HashSet<String>,
    /// Top-P providers that get month-level detail
    pub monthly_providers: HashSet<String>,
}

impl TopSets {
    pub fn is_top_procedure(&self, code: &str) -> bool {
        self.procedures.contains(code)
    }

    pub fn is_top_provider(&self, npi: &str) -> bool {
        self.providers.contains(npi)
    }

    pub fn is_monthly_provider(&self, npi: &str) -> bool {
        self.monthly_providers.contains(npi)
    }

    /// Rank position of a top procedure
    pub fn procedure_rank(&self) -> HashMap<&str, usize> {
        self.ranked_procedures.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn procedure(paid: f64, first_seen: u64) -> ProcedureTotal {
        ProcedureTotal {
            totals: Totals { paid, claims: 1, beneficiaries: 1 },
            first_seen,
        }
    }

    fn provider(paid: f64, first_seen: u64) -> ProviderTotal {
        ProviderTotal {
            totals: Totals { paid, claims: 1, beneficiaries: 1 },
            first_seen,
            ..Default::default()
        }
    }

    fn sample_totals() -> PassOneTotals {
        let mut totals = PassOneTotals::default();
        for (i, (code, paid)) in [("A", 10.0), ("B", 50.0), ("C", 50.0), ("D", 5.0), ("E", 70.0)].iter().enumerate() {
            totals.procedures.insert(code.to_string(), procedure(*paid, i as u64));
        }
        for (i, (npi, paid)) in [("P1", 1.0), ("P2", 9.0), ("P3", 3.0), ("P4", 9.0)].iter().enumerate() {
            totals.providers.insert(npi.to_string(), provider(*paid, i as u64));
        }
        totals
    }

    #[test]
    fn test_ties_break_by_first_seen() {
        let totals = sample_totals();
        assert_eq!(rank_procedures(&totals.procedures), vec!["E", "B", "C", "A", "D"]);
        assert_eq!(rank_providers(&totals.providers), vec!["P2", "P4", "P3", "P1"]);
    }

    #[test]
    fn test_selection_sizes_and_membership() {
        let totals = sample_totals();
        let sets = TopKSelector::new(3, 3, 1).select(&totals);

        assert_eq!(sets.ranked_procedures, vec!["E", "B", "C"]);
        assert!(sets.is_top_procedure("C"));
        assert!(!sets.is_top_procedure("A"));
        assert_eq!(sets.providers.len(), 3);
        assert!(!sets.is_top_provider("P1"));
        assert!(sets.is_monthly_provider("P2"));
        assert_eq!(sets.monthly_providers.len(), 1);
        assert_eq!(sets.procedure_rank()["B"], 1);
    }

    #[test]
    fn test_top_set_dominates_rest() {
        let totals = sample_totals();
        let sets = TopKSelector::new(2, 2, 2).select(&totals);
        let min_in = sets
            .procedures
            .iter()
            .map(|c| totals.procedures[c].totals.paid)
            .fold(f64::INFINITY, f64::min);
        for (code, p) in &totals.procedures {
            if !sets.is_top_procedure(code) {
                assert!(p.totals.paid <= min_in);
            }
        }
    }

    #[test]
    fn test_thresholds_larger_than_input() {
        let totals = sample_totals();
        let sets = TopKSelector::new(100, 100, 100).select(&totals);
        assert_eq!(sets.procedures.len(), 5);
        assert_eq!(sets.providers.len(), 4);
        assert_eq!(sets.monthly_providers.len(), 4);
    }
}
