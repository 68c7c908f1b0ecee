/*!
 * Pass 2: detail aggregates restricted to the top-K sets
 *
 * The second scan only accumulates rows whose procedure or provider is in a
 * membership set from Pass 1, so memory is bounded by the set sizes rather
 * than by the input. A row may feed several branches at once.
 */

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data_types::{ClaimRecord, Month, Totals};
use crate::enrichment::ProviderDirectory;
use crate::selection::TopSets;
use crate::totals::slot;

/// How cost-per-claim samples are retained once a procedure's sample is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Keep the first `cap` values in file order and drop the rest.
    /// Biased toward rows early in the file.
    #[default]
    FirstN,
    /// Seeded Algorithm R; uniform over the whole stream
    Reservoir,
}

/// Bounded sample of cost-per-claim values for one procedure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostSample {
    values: Vec<f64>,
    seen: u64,
    cap: usize,
}

impl CostSample {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            values: Vec::with_capacity(cap.min(1024)),
            seen: 0,
            cap,
        }
    }

    /// Offer a value; first-N mode drops it once the sample is full
    pub fn push(&mut self, value: f64) {
        self.seen += 1;
        if self.values.len() < self.cap {
            self.values.push(value);
        }
    }

    /// Offer a value under reservoir sampling
    pub fn push_reservoir<R: Rng>(&mut self, value: f64, rng: &mut R) {
        self.seen += 1;
        if self.values.len() < self.cap {
            self.values.push(value);
            return;
        }
        let j = rng.random_range(0..self.seen);
        if (j as usize) < self.cap {
            self.values[j as usize] = value;
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values offered, including dropped ones
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Totals for one (entity, month) cell plus the number of source rows in it
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthEntry {
    pub totals: Totals,
    pub rows: u64,
}

impl MonthEntry {
    fn add(&mut self, record: &ClaimRecord<'_>) {
        self.totals.add(record);
        self.rows += 1;
    }
}

/// Output of Pass 2
#[derive(Debug, Clone, Default)]
pub struct DetailAggregates {
    /// procedure -> month -> totals, top procedures only
    pub procedure_months: HashMap<String, BTreeMap<Month, MonthEntry>>,
    /// provider -> procedure -> totals, for top procedures and top providers
    pub provider_procedures: HashMap<String, HashMap<String, Totals>>,
    /// procedure -> cost-per-claim sample, top procedures only
    pub samples: HashMap<String, CostSample>,
    /// provider -> month -> totals, monthly providers only
    pub provider_months: HashMap<String, BTreeMap<Month, MonthEntry>>,
    /// state -> month -> totals, top providers with a known state
    pub state_months: HashMap<String, BTreeMap<Month, Totals>>,
    /// Rows that fed at least one branch
    pub rows_matched: u64,
}

impl DetailAggregates {
    /// Distinct providers billing a procedure in the provider x procedure map
    pub fn provider_counts(&self) -> HashMap<&str, u64> {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for procedures in self.provider_procedures.values() {
            for code in procedures.keys() {
                *counts.entry(code.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Streaming aggregator for Pass 2
pub struct DetailAggregator<'a> {
    sets: &'a TopSets,
    directory: Option<&'a ProviderDirectory>,
    sample_cap: usize,
    strategy: SamplingStrategy,
    rng: StdRng,
    detail: DetailAggregates,
}

impl<'a> DetailAggregator<'a> {
    pub fn new(sets: &'a TopSets, sample_cap: usize, strategy: SamplingStrategy, seed: u64) -> Self {
        Self {
            sets,
            directory: None,
            sample_cap,
            strategy,
            rng: StdRng::seed_from_u64(seed),
            detail: DetailAggregates::default(),
        }
    }

    /// Attach the provider directory used for state-month accumulation
    pub fn with_directory(mut self, directory: Option<&'a ProviderDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn observe(&mut self, record: &ClaimRecord<'_>) {
        let top_procedure = self.sets.is_top_procedure(record.procedure_code);
        let top_provider = self.sets.is_top_provider(record.provider_id);
        let monthly_provider = self.sets.is_monthly_provider(record.provider_id);

        if !(top_procedure || top_provider || monthly_provider) {
            return;
        }
        self.detail.rows_matched += 1;

        // provider x procedure is fed once per row even when both branches apply
        if top_procedure || top_provider {
            let procedures = slot(&mut self.detail.provider_procedures, record.provider_id, HashMap::new);
            slot(procedures, record.procedure_code, Totals::default).add(record);
        }

        if top_procedure {
            slot(&mut self.detail.procedure_months, record.procedure_code, BTreeMap::new)
                .entry(record.month)
                .or_default()
                .add(record);

            if let Some(cpc) = record.cost_per_claim() {
                let cap = self.sample_cap;
                let sample = slot(&mut self.detail.samples, record.procedure_code, || CostSample::with_cap(cap));
                match self.strategy {
                    SamplingStrategy::FirstN => sample.push(cpc),
                    SamplingStrategy::Reservoir => sample.push_reservoir(cpc, &mut self.rng),
                }
            }
        }

        if top_provider {
            if let Some(state) = self.directory.and_then(|d| d.state_of(record.provider_id)) {
                slot(&mut self.detail.state_months, state, BTreeMap::new)
                    .entry(record.month)
                    .or_default()
                    .add(record);
            }
        }

        if monthly_provider {
            slot(&mut self.detail.provider_months, record.provider_id, BTreeMap::new)
                .entry(record.month)
                .or_default()
                .add(record);
        }
    }

    pub fn finish(self) -> DetailAggregates {
        self.detail
    }
}
