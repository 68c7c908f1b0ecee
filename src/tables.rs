/*!
 * Output table assembly
 *
 * Turns the Pass 1 totals, the top-K sets and the Pass 2 aggregates into the
 * ten denormalised tables. Every table is fully sorted on a unique key so
 * two runs over the same input serialise identically. Currency and ratio
 * fields are rounded to cents here; all arithmetic before this point runs on
 * unrounded values.
 */

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::analytics::{
    cost_index, cost_per_claim_growth_pct, growth_pct, median, round_cents, round_cents_opt, OutlierDirection,
    OutlierRule,
};
use crate::category::ProcedureCategory;
use crate::data_types::{Month, Totals};
use crate::detail::DetailAggregates;
use crate::enrichment::{ProcedureDescriptions, ProviderDirectory};
use crate::selection::{rank_procedures, TopSets};
use crate::totals::PassOneTotals;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyNationalRow {
    pub month: Month,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    /// Not tracked per month
    pub provider_count: Option<u64>,
    pub procedure_count: Option<u64>,
    pub avg_cost_per_claim: Option<f64>,
    pub avg_cost_per_beneficiary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureSummaryRow {
    pub hcpcs_code: String,
    pub category: ProcedureCategory,
    pub description: Option<String>,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    /// Distinct providers for top procedures, 0 for the rest
    pub provider_count: u64,
    pub avg_cost_per_claim: Option<f64>,
    pub median_cost_per_claim: Option<f64>,
    pub avg_cost_per_beneficiary: Option<f64>,
    pub claims_per_beneficiary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummaryRow {
    pub npi: String,
    pub name: Option<String>,
    pub state: Option<String>,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub procedure_count: u64,
    pub avg_cost_per_claim: Option<f64>,
    pub avg_cost_per_beneficiary: Option<f64>,
    pub top_procedure: Option<String>,
    pub top_procedure_paid: Option<f64>,
    pub spending_growth_pct: Option<f64>,
    pub cost_per_claim_growth_pct: Option<f64>,
    pub volume_growth_pct: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSummaryRow {
    pub state: String,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub provider_count: u64,
    pub procedure_count: u64,
    pub avg_cost_per_claim: Option<f64>,
    pub avg_cost_per_beneficiary: Option<f64>,
    pub claims_per_beneficiary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureMonthlyRow {
    pub hcpcs_code: String,
    pub month: Month,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub avg_cost_per_claim: Option<f64>,
    pub avg_cost_per_beneficiary: Option<f64>,
    /// Contributing source rows
    pub provider_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProcedureRow {
    pub npi: String,
    pub hcpcs_code: String,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub cost_per_claim: Option<f64>,
    pub cost_per_beneficiary: Option<f64>,
    pub procedure_median_cost_per_claim: Option<f64>,
    pub cost_index: Option<f64>,
    pub state: Option<String>,
    pub provider_name: Option<String>,
    /// 1-based rank of the provider within the procedure
    pub rn: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMonthlyRow {
    pub npi: String,
    pub month: Month,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub avg_cost_per_claim: Option<f64>,
    /// Contributing source rows
    pub procedure_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMonthlyRow {
    pub state: String,
    pub month: Month,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub avg_cost_per_claim: Option<f64>,
    pub avg_cost_per_beneficiary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateProcedureRow {
    pub state: String,
    pub hcpcs_code: String,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub avg_cost_per_claim: Option<f64>,
    pub provider_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierRow {
    pub npi: String,
    pub state: Option<String>,
    pub hcpcs_code: String,
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    pub cost_per_claim: Option<f64>,
    pub procedure_median: Option<f64>,
    pub cost_index: Option<f64>,
    pub direction: Option<OutlierDirection>,
    pub provider_name: Option<String>,
    pub hcpcs_description: Option<String>,
}

/// The complete set of emitted tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTables {
    pub monthly_national: Vec<MonthlyNationalRow>,
    pub procedures: Vec<ProcedureSummaryRow>,
    pub providers: Vec<ProviderSummaryRow>,
    pub states: Vec<StateSummaryRow>,
    pub procedure_monthly: Vec<ProcedureMonthlyRow>,
    pub provider_procedures: Vec<ProviderProcedureRow>,
    pub provider_monthly: Vec<ProviderMonthlyRow>,
    pub state_monthly: Vec<StateMonthlyRow>,
    pub state_procedures: Vec<StateProcedureRow>,
    pub outliers: Vec<OutlierRow>,
}

impl OutputTables {
    /// (table name, row count) in load order
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("monthly_national", self.monthly_national.len()),
            ("procedures", self.procedures.len()),
            ("providers", self.providers.len()),
            ("states", self.states.len()),
            ("procedure_monthly", self.procedure_monthly.len()),
            ("provider_procedures", self.provider_procedures.len()),
            ("provider_monthly", self.provider_monthly.len()),
            ("state_monthly", self.state_monthly.len()),
            ("state_procedures", self.state_procedures.len()),
            ("outliers", self.outliers.len()),
        ]
    }
}

fn by_paid_desc(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Everything the builder reads
pub struct BuildInputs<'a> {
    pub totals: &'a PassOneTotals,
    pub sets: &'a TopSets,
    pub detail: &'a DetailAggregates,
    pub directory: Option<&'a ProviderDirectory>,
    pub descriptions: Option<&'a ProcedureDescriptions>,
}

/// Output table builder with its size caps
#[derive(Debug, Clone, Copy)]
pub struct TableBuilder {
    pub procedure_monthly_limit: usize,
    pub providers_per_procedure: usize,
    pub outlier_limit: usize,
    pub outlier_rule: OutlierRule,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self {
            procedure_monthly_limit: crate::constants::DEFAULT_PROCEDURE_MONTHLY_LIMIT,
            providers_per_procedure: crate::constants::DEFAULT_PROVIDERS_PER_PROCEDURE,
            outlier_limit: crate::constants::DEFAULT_OUTLIER_LIMIT,
            outlier_rule: OutlierRule::default(),
        }
    }
}

impl TableBuilder {
    pub fn build(&self, inputs: &BuildInputs<'_>) -> OutputTables {
        let medians: HashMap<&str, f64> = inputs
            .detail
            .samples
            .iter()
            .filter_map(|(code, sample)| median(sample.values()).map(|m| (code.as_str(), m)))
            .collect();

        let providers = self.provider_summary(inputs);
        OutputTables {
            monthly_national: monthly_national(inputs.totals),
            procedures: procedure_summary(inputs, &medians),
            states: state_summary(inputs),
            procedure_monthly: self.procedure_monthly(inputs),
            provider_procedures: self.provider_procedures(inputs, &medians),
            provider_monthly: provider_monthly(inputs.detail),
            state_monthly: state_monthly(inputs.detail),
            state_procedures: state_procedures(inputs),
            outliers: self.outliers(inputs, &medians),
            providers,
        }
    }

    fn provider_summary(&self, inputs: &BuildInputs<'_>) -> Vec<ProviderSummaryRow> {
        inputs
            .sets
            .ranked_providers
            .iter()
            .filter_map(|npi| {
                let total = inputs.totals.providers.get(npi)?;
                let procedures = inputs.detail.provider_procedures.get(npi);

                let procedure_count = procedures
                    .map(|p| p.len() as u64)
                    .unwrap_or(total.approx_procedure_count);
                let top = procedures.and_then(|p| {
                    p.iter()
                        .min_by(|a, b| by_paid_desc(a.1.paid, b.1.paid).then(a.0.cmp(b.0)))
                        .map(|(code, t)| (code.clone(), t.paid))
                });
                let info = inputs.directory.and_then(|d| d.get(npi));

                Some(ProviderSummaryRow {
                    npi: npi.clone(),
                    name: info.and_then(|i| i.name.clone()),
                    state: info.and_then(|i| i.state.clone()),
                    total_paid: round_cents(total.totals.paid),
                    total_claims: total.totals.claims,
                    total_beneficiaries: total.totals.beneficiaries,
                    procedure_count,
                    avg_cost_per_claim: round_cents_opt(total.totals.cost_per_claim()),
                    avg_cost_per_beneficiary: round_cents_opt(total.totals.cost_per_beneficiary()),
                    top_procedure_paid: top.as_ref().map(|(_, paid)| round_cents(*paid)),
                    top_procedure: top.map(|(code, _)| code),
                    spending_growth_pct: round_cents_opt(growth_pct(total.early.paid, total.late.paid)),
                    cost_per_claim_growth_pct: round_cents_opt(cost_per_claim_growth_pct(&total.early, &total.late)),
                    volume_growth_pct: round_cents_opt(growth_pct(
                        total.early.claims as f64,
                        total.late.claims as f64,
                    )),
                    lat: info.and_then(|i| i.lat),
                    lng: info.and_then(|i| i.lng),
                })
            })
            .collect()
    }

    fn procedure_monthly(&self, inputs: &BuildInputs<'_>) -> Vec<ProcedureMonthlyRow> {
        let mut rows: Vec<ProcedureMonthlyRow> = inputs
            .sets
            .ranked_procedures
            .iter()
            .take(self.procedure_monthly_limit)
            .filter_map(|code| inputs.detail.procedure_months.get(code).map(|months| (code, months)))
            .flat_map(|(code, months)| {
                months.iter().map(move |(month, entry)| ProcedureMonthlyRow {
                    hcpcs_code: code.clone(),
                    month: *month,
                    total_paid: round_cents(entry.totals.paid),
                    total_claims: entry.totals.claims,
                    total_beneficiaries: entry.totals.beneficiaries,
                    avg_cost_per_claim: round_cents_opt(entry.totals.cost_per_claim()),
                    avg_cost_per_beneficiary: round_cents_opt(entry.totals.cost_per_beneficiary()),
                    provider_count: Some(entry.rows),
                })
            })
            .collect();
        rows.sort_by(|a, b| a.hcpcs_code.cmp(&b.hcpcs_code).then(a.month.cmp(&b.month)));
        rows
    }

    fn provider_procedures(&self, inputs: &BuildInputs<'_>, medians: &HashMap<&str, f64>) -> Vec<ProviderProcedureRow> {
        let mut by_procedure: HashMap<&str, Vec<(&str, &Totals)>> = HashMap::new();
        for (npi, procedures) in &inputs.detail.provider_procedures {
            for (code, totals) in procedures {
                if inputs.sets.is_top_procedure(code) {
                    by_procedure.entry(code.as_str()).or_default().push((npi.as_str(), totals));
                }
            }
        }

        let mut rows = Vec::new();
        for code in &inputs.sets.ranked_procedures {
            let Some(mut peers) = by_procedure.remove(code.as_str()) else {
                continue;
            };
            peers.sort_by(|a, b| by_paid_desc(a.1.paid, b.1.paid).then(a.0.cmp(b.0)));
            let procedure_median = medians.get(code.as_str()).copied();

            for (rank, (npi, totals)) in peers.into_iter().take(self.providers_per_procedure).enumerate() {
                let cpc = totals.cost_per_claim();
                rows.push(ProviderProcedureRow {
                    npi: npi.to_string(),
                    hcpcs_code: code.clone(),
                    total_paid: round_cents(totals.paid),
                    total_claims: totals.claims,
                    total_beneficiaries: totals.beneficiaries,
                    cost_per_claim: round_cents_opt(cpc),
                    cost_per_beneficiary: round_cents_opt(totals.cost_per_beneficiary()),
                    procedure_median_cost_per_claim: round_cents_opt(procedure_median),
                    cost_index: round_cents_opt(cost_index(cpc, procedure_median)),
                    state: state_of(inputs.directory, npi),
                    provider_name: name_of(inputs.directory, npi),
                    rn: Some(rank as u64 + 1),
                });
            }
        }
        rows
    }

    fn outliers(&self, inputs: &BuildInputs<'_>, medians: &HashMap<&str, f64>) -> Vec<OutlierRow> {
        let rule = self.outlier_rule;
        let mut candidates: Vec<(&str, &str, &Totals, f64, f64, OutlierDirection)> = Vec::new();

        for (npi, procedures) in &inputs.detail.provider_procedures {
            for (code, totals) in procedures {
                let Some(procedure_median) = medians.get(code.as_str()).copied() else {
                    continue;
                };
                if !rule.is_candidate(totals) {
                    continue;
                }
                let Some(index) = cost_index(totals.cost_per_claim(), Some(procedure_median)) else {
                    continue;
                };
                if let Some(direction) = rule.classify(totals, Some(index)) {
                    candidates.push((npi.as_str(), code.as_str(), totals, procedure_median, index, direction));
                }
            }
        }

        candidates.sort_by(|a, b| by_paid_desc(a.2.paid, b.2.paid).then(a.0.cmp(b.0)).then(a.1.cmp(b.1)));
        candidates.truncate(self.outlier_limit);

        candidates
            .into_iter()
            .map(|(npi, code, totals, procedure_median, index, direction)| OutlierRow {
                npi: npi.to_string(),
                state: state_of(inputs.directory, npi),
                hcpcs_code: code.to_string(),
                total_paid: round_cents(totals.paid),
                total_claims: totals.claims,
                total_beneficiaries: totals.beneficiaries,
                cost_per_claim: round_cents_opt(totals.cost_per_claim()),
                procedure_median: Some(round_cents(procedure_median)),
                cost_index: Some(round_cents(index)),
                direction: Some(direction),
                provider_name: name_of(inputs.directory, npi),
                hcpcs_description: inputs.descriptions.and_then(|d| d.get(code)).map(str::to_string),
            })
            .collect()
    }
}

fn state_of(directory: Option<&ProviderDirectory>, npi: &str) -> Option<String> {
    directory.and_then(|d| d.state_of(npi)).map(str::to_string)
}

fn name_of(directory: Option<&ProviderDirectory>, npi: &str) -> Option<String> {
    directory.and_then(|d| d.name_of(npi)).map(str::to_string)
}

fn monthly_national(totals: &PassOneTotals) -> Vec<MonthlyNationalRow> {
    totals
        .months
        .iter()
        .map(|(month, entry)| MonthlyNationalRow {
            month: *month,
            total_paid: round_cents(entry.totals.paid),
            total_claims: entry.totals.claims,
            total_beneficiaries: entry.totals.beneficiaries,
            provider_count: None,
            procedure_count: Some(entry.procedure_count),
            avg_cost_per_claim: round_cents_opt(entry.totals.cost_per_claim()),
            avg_cost_per_beneficiary: round_cents_opt(entry.totals.cost_per_beneficiary()),
        })
        .collect()
}

fn procedure_summary(inputs: &BuildInputs<'_>, medians: &HashMap<&str, f64>) -> Vec<ProcedureSummaryRow> {
    let provider_counts = inputs.detail.provider_counts();

    rank_procedures(&inputs.totals.procedures)
        .into_iter()
        .filter_map(|code| {
            let total = inputs.totals.procedures.get(code)?;
            let provider_count = if inputs.sets.is_top_procedure(code) {
                provider_counts.get(code).copied().unwrap_or(0)
            } else {
                0
            };
            Some(ProcedureSummaryRow {
                hcpcs_code: code.to_string(),
                category: ProcedureCategory::classify(code),
                description: inputs.descriptions.and_then(|d| d.get(code)).map(str::to_string),
                total_paid: round_cents(total.totals.paid),
                total_claims: total.totals.claims,
                total_beneficiaries: total.totals.beneficiaries,
                provider_count,
                avg_cost_per_claim: round_cents_opt(total.totals.cost_per_claim()),
                median_cost_per_claim: round_cents_opt(medians.get(code).copied()),
                avg_cost_per_beneficiary: round_cents_opt(total.totals.cost_per_beneficiary()),
                claims_per_beneficiary: round_cents_opt(total.totals.claims_per_beneficiary()),
            })
        })
        .collect()
}

/// Top providers with a known state, in rank order
fn providers_with_state<'a>(inputs: &'a BuildInputs<'a>) -> Vec<(&'a str, &'a str)> {
    let Some(directory) = inputs.directory else {
        return Vec::new();
    };
    inputs
        .sets
        .ranked_providers
        .iter()
        .filter_map(|npi| directory.state_of(npi).map(|state| (npi.as_str(), state)))
        .collect()
}

fn state_summary<'a>(inputs: &'a BuildInputs<'a>) -> Vec<StateSummaryRow> {
    #[derive(Default)]
    struct Acc<'a> {
        totals: Totals,
        providers: u64,
        procedures: HashSet<&'a str>,
    }

    let mut states: BTreeMap<&str, Acc<'a>> = BTreeMap::new();
    for (npi, state) in providers_with_state(inputs) {
        let Some(total) = inputs.totals.providers.get(npi) else {
            continue;
        };
        let acc = states.entry(state).or_default();
        acc.totals.merge(&total.totals);
        acc.providers += 1;
        if let Some(procedures) = inputs.detail.provider_procedures.get(npi) {
            acc.procedures.extend(procedures.keys().map(String::as_str));
        }
    }

    let mut rows: Vec<StateSummaryRow> = states
        .into_iter()
        .map(|(state, acc)| StateSummaryRow {
            state: state.to_string(),
            total_paid: round_cents(acc.totals.paid),
            total_claims: acc.totals.claims,
            total_beneficiaries: acc.totals.beneficiaries,
            provider_count: acc.providers,
            procedure_count: acc.procedures.len() as u64,
            avg_cost_per_claim: round_cents_opt(acc.totals.cost_per_claim()),
            avg_cost_per_beneficiary: round_cents_opt(acc.totals.cost_per_beneficiary()),
            claims_per_beneficiary: round_cents_opt(acc.totals.claims_per_beneficiary()),
        })
        .collect();
    rows.sort_by(|a, b| by_paid_desc(a.total_paid, b.total_paid).then_with(|| a.state.cmp(&b.state)));
    rows
}

fn provider_monthly(detail: &DetailAggregates) -> Vec<ProviderMonthlyRow> {
    let mut rows: Vec<ProviderMonthlyRow> = detail
        .provider_months
        .iter()
        .flat_map(|(npi, months)| {
            months.iter().map(move |(month, entry)| ProviderMonthlyRow {
                npi: npi.clone(),
                month: *month,
                total_paid: round_cents(entry.totals.paid),
                total_claims: entry.totals.claims,
                total_beneficiaries: entry.totals.beneficiaries,
                avg_cost_per_claim: round_cents_opt(entry.totals.cost_per_claim()),
                procedure_count: Some(entry.rows),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.npi.cmp(&b.npi).then(a.month.cmp(&b.month)));
    rows
}

fn state_monthly(detail: &DetailAggregates) -> Vec<StateMonthlyRow> {
    let mut rows: Vec<StateMonthlyRow> = detail
        .state_months
        .iter()
        .flat_map(|(state, months)| {
            months.iter().map(move |(month, totals)| StateMonthlyRow {
                state: state.clone(),
                month: *month,
                total_paid: round_cents(totals.paid),
                total_claims: totals.claims,
                total_beneficiaries: totals.beneficiaries,
                avg_cost_per_claim: round_cents_opt(totals.cost_per_claim()),
                avg_cost_per_beneficiary: round_cents_opt(totals.cost_per_beneficiary()),
            })
        })
        .collect();
    rows.sort_by(|a, b| a.state.cmp(&b.state).then(a.month.cmp(&b.month)));
    rows
}

fn state_procedures<'a>(inputs: &'a BuildInputs<'a>) -> Vec<StateProcedureRow> {
    let mut groups: HashMap<(&'a str, &'a str), (Totals, u64)> = HashMap::new();
    for (npi, state) in providers_with_state(inputs) {
        let Some(procedures) = inputs.detail.provider_procedures.get(npi) else {
            continue;
        };
        for (code, totals) in procedures {
            let group = groups.entry((state, code.as_str())).or_default();
            group.0.merge(totals);
            group.1 += 1;
        }
    }

    let mut rows: Vec<StateProcedureRow> = groups
        .into_iter()
        .map(|((state, code), (totals, providers))| StateProcedureRow {
            state: state.to_string(),
            hcpcs_code: code.to_string(),
            total_paid: round_cents(totals.paid),
            total_claims: totals.claims,
            total_beneficiaries: totals.beneficiaries,
            avg_cost_per_claim: round_cents_opt(totals.cost_per_claim()),
            provider_count: Some(providers),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.state
            .cmp(&b.state)
            .then_with(|| by_paid_desc(a.total_paid, b.total_paid))
            .then_with(|| a.hcpcs_code.cmp(&b.hcpcs_code))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::ClaimRecord;
    use crate::detail::{DetailAggregator, SamplingStrategy};
    use crate::enrichment::ProviderInfo;
    use crate::selection::TopKSelector;
    use crate::totals::TotalsAggregator;

    type Row = (&'static str, &'static str, &'static str, u64, u64, f64);

    fn run(rows: &[Row], selector: TopKSelector, directory: Option<&ProviderDirectory>) -> OutputTables {
        let cutoff = Month::parse("2021-07").unwrap();
        let records: Vec<ClaimRecord<'static>> = rows
            .iter()
            .map(|&(p, c, m, beneficiaries, claims, paid)| ClaimRecord {
                provider_id: p,
                procedure_code: c,
                month: Month::parse(m).unwrap(),
                beneficiaries,
                claims,
                paid,
            })
            .collect();

        let mut pass_one = TotalsAggregator::new(cutoff);
        records.iter().for_each(|r| pass_one.observe(r));
        let totals = pass_one.finish();
        let sets = selector.select(&totals);

        let mut pass_two = DetailAggregator::new(&sets, 10_000, SamplingStrategy::FirstN, 0).with_directory(directory);
        records.iter().for_each(|r| pass_two.observe(r));
        let detail = pass_two.finish();

        TableBuilder::default().build(&BuildInputs {
            totals: &totals,
            sets: &sets,
            detail: &detail,
            directory,
            descriptions: None,
        })
    }

    const SCENARIO: [Row; 3] = [
        ("P1", "CODE_A", "2021-01", 5, 10, 1000.0),
        ("P1", "CODE_A", "2021-08", 5, 10, 2000.0),
        ("P2", "CODE_A", "2021-01", 2, 4, 50000.0),
    ];

    #[test]
    fn test_three_row_scenario() {
        let tables = run(&SCENARIO, TopKSelector::new(200, 10_000, 1_000), None);

        let code_a = &tables.procedures[0];
        assert_eq!(code_a.total_paid, 53000.0);
        assert_eq!(code_a.total_claims, 24);
        assert_eq!(code_a.total_beneficiaries, 12);
        assert_eq!(code_a.provider_count, 2);
        // samples 100, 200, 12500
        assert_eq!(code_a.median_cost_per_claim, Some(200.0));

        let p1 = tables.providers.iter().find(|p| p.npi == "P1").unwrap();
        assert_eq!(p1.spending_growth_pct, Some(100.0));
        assert_eq!(p1.cost_per_claim_growth_pct, Some(100.0));
        assert_eq!(p1.volume_growth_pct, Some(0.0));

        let p2 = tables.providers.iter().find(|p| p.npi == "P2").unwrap();
        assert_eq!(p2.spending_growth_pct, Some(-100.0));

        let p2_pair = tables.provider_procedures.iter().find(|r| r.npi == "P2").unwrap();
        assert_eq!(p2_pair.cost_per_claim, Some(12500.0));
        assert_eq!(p2_pair.cost_index, Some(62.5));
        assert_eq!(p2_pair.rn, Some(1));
        assert!(tables.outliers.is_empty());
    }

    #[test]
    fn test_growth_is_null_without_early_spend() {
        let rows = [("P1", "A", "2021-09", 1, 1, 50.0)];
        let tables = run(&rows, TopKSelector::new(10, 10, 10), None);
        let p1 = &tables.providers[0];
        assert_eq!(p1.spending_growth_pct, None);
        assert_eq!(p1.cost_per_claim_growth_pct, None);
        assert_eq!(p1.volume_growth_pct, None);
    }

    #[test]
    fn test_outliers_pass_the_gate() {
        let rows = [
            ("P1", "A", "2021-01", 10, 200, 20_000.0),
            ("P2", "A", "2021-01", 10, 200, 22_000.0),
            ("P3", "A", "2021-01", 10, 200, 21_000.0),
            ("P4", "A", "2021-01", 10, 200, 90_000.0),
            ("P5", "A", "2021-01", 10, 200, 4_000.0),
            ("P6", "A", "2021-01", 1, 50, 90_000.0),
        ];
        let tables = run(&rows, TopKSelector::new(10, 10, 10), None);

        let flagged: Vec<(&str, Option<OutlierDirection>)> =
            tables.outliers.iter().map(|o| (o.npi.as_str(), o.direction)).collect();
        assert_eq!(flagged, vec![("P4", Some(OutlierDirection::High))]);
        for outlier in &tables.outliers {
            assert!(outlier.total_claims >= 100 && outlier.total_paid >= 10_000.0);
            assert!(outlier.cost_index.unwrap() > 2.0 || outlier.cost_index.unwrap() < 0.5);
        }
    }

    #[test]
    fn test_non_top_procedure_absent_from_detail() {
        let rows = [
            ("P1", "BIG", "2021-01", 1, 1, 500.0),
            ("P2", "SMALL", "2021-01", 1, 1, 5.0),
        ];
        let tables = run(&rows, TopKSelector::new(1, 10, 10), None);
        assert_eq!(tables.procedures.len(), 2);
        assert_eq!(tables.procedures[1].hcpcs_code, "SMALL");
        assert_eq!(tables.procedures[1].provider_count, 0);
        assert_eq!(tables.procedures[1].median_cost_per_claim, None);
        assert!(tables.procedure_monthly.iter().all(|r| r.hcpcs_code == "BIG"));
        assert!(tables.provider_procedures.iter().all(|r| r.hcpcs_code == "BIG"));
    }

    #[test]
    fn test_state_tables_follow_directory() {
        let mut directory = ProviderDirectory::new();
        directory.insert("P1", ProviderInfo { state: Some("CA".into()), name: Some("One".into()), ..Default::default() });
        directory.insert("P2", ProviderInfo { state: Some("NY".into()), ..Default::default() });

        let rows = [
            ("P1", "A", "2021-01", 1, 2, 100.0),
            ("P1", "B", "2021-02", 1, 2, 50.0),
            ("P2", "A", "2021-01", 1, 2, 300.0),
            ("P3", "A", "2021-01", 1, 2, 999.0),
        ];
        let tables = run(&rows, TopKSelector::new(10, 10, 10), Some(&directory));

        let states: Vec<(&str, f64, u64)> =
            tables.states.iter().map(|s| (s.state.as_str(), s.total_paid, s.procedure_count)).collect();
        assert_eq!(states, vec![("NY", 300.0, 1), ("CA", 150.0, 2)]);
        assert_eq!(tables.state_monthly.len(), 3);
        assert_eq!(tables.state_procedures.len(), 3);
        assert_eq!(tables.state_procedures[0].state, "CA");
        assert_eq!(tables.state_procedures[0].hcpcs_code, "A");

        let p1 = tables.providers.iter().find(|p| p.npi == "P1").unwrap();
        assert_eq!(p1.name.as_deref(), Some("One"));
        assert_eq!(p1.top_procedure.as_deref(), Some("A"));
        assert_eq!(p1.procedure_count, 2);

        let without = run(&rows, TopKSelector::new(10, 10, 10), None);
        assert!(without.states.is_empty());
        assert!(without.state_monthly.is_empty());
        assert!(without.state_procedures.is_empty());
    }

    #[test]
    fn test_provider_procedure_cap_and_rank() {
        let rows = [
            ("P1", "A", "2021-01", 1, 1, 10.0),
            ("P2", "A", "2021-01", 1, 1, 30.0),
            ("P3", "A", "2021-01", 1, 1, 20.0),
        ];
        let mut tables = run(&rows, TopKSelector::new(10, 10, 10), None);
        let order: Vec<(&str, Option<u64>)> =
            tables.provider_procedures.iter().map(|r| (r.npi.as_str(), r.rn)).collect();
        assert_eq!(order, vec![("P2", Some(1)), ("P3", Some(2)), ("P1", Some(3))]);
        tables.provider_procedures.clear();
        assert_eq!(tables.row_counts()[5], ("provider_procedures", 0));
    }
}
