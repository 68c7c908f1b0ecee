/*!
 * Pass 1: whole-input running totals
 *
 * One streaming pass builds totals by procedure, by provider (with the
 * early/late period split) and by month. Memory is proportional to the
 * number of distinct keys, never to the number of rows.
 */

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::data_types::{ClaimRecord, Month, MonthTotal, ProcedureTotal, ProviderTotal, Totals};

/// Get or create the entry for a borrowed key without allocating on hits.
///
/// A missing key is inserted before the lookup, so the final `get_mut`
/// always finds it.
pub(crate) fn slot<'m, V, F>(map: &'m mut HashMap<String, V>, key: &str, init: F) -> &'m mut V
where
    F: FnOnce() -> V,
{
    if !map.contains_key(key) {
        map.insert(key.to_string(), init());
    }
    map.get_mut(key).unwrap_or_else(|| unreachable!())
}

/// Output of Pass 1
#[derive(Debug, Clone, Default)]
pub struct PassOneTotals {
    pub procedures: HashMap<String, ProcedureTotal>,
    pub providers: HashMap<String, ProviderTotal>,
    pub months: BTreeMap<Month, MonthTotal>,
    /// Valid rows aggregated
    pub rows: u64,
}

impl PassOneTotals {
    /// Sum over every month
    pub fn grand_total(&self) -> Totals {
        let mut total = Totals::default();
        for month in self.months.values() {
            total.merge(&month.totals);
        }
        total
    }
}

/// Provider state that only lives while the pass runs
#[derive(Debug, Default)]
struct ProviderCursor {
    total: ProviderTotal,
    last_procedure: String,
}

/// Month state that only lives while the pass runs
#[derive(Debug, Default)]
struct MonthCursor {
    totals: Totals,
    procedures: HashSet<String>,
}

/// Streaming aggregator for Pass 1.
///
/// The scratch state behind the approximate provider counter and the
/// per-month procedure sets is dropped by [`finish`](Self::finish).
#[derive(Debug)]
pub struct TotalsAggregator {
    cutoff: Month,
    rows: u64,
    procedures: HashMap<String, ProcedureTotal>,
    providers: HashMap<String, ProviderCursor>,
    months: BTreeMap<Month, MonthCursor>,
}

impl TotalsAggregator {
    pub fn new(cutoff: Month) -> Self {
        Self {
            cutoff,
            rows: 0,
            procedures: HashMap::new(),
            providers: HashMap::new(),
            months: BTreeMap::new(),
        }
    }

    pub fn cutoff(&self) -> Month {
        self.cutoff
    }

    pub fn observe(&mut self, record: &ClaimRecord<'_>) {
        let order = self.rows;
        self.rows += 1;

        let procedure = slot(&mut self.procedures, record.procedure_code, || ProcedureTotal {
            first_seen: order,
            ..Default::default()
        });
        procedure.totals.add(record);

        let provider = slot(&mut self.providers, record.provider_id, || ProviderCursor {
            total: ProviderTotal {
                first_seen: order,
                ..Default::default()
            },
            last_procedure: String::new(),
        });
        provider.total.observe(record, self.cutoff);
        if provider.last_procedure != record.procedure_code {
            provider.total.approx_procedure_count += 1;
            provider.last_procedure.clear();
            provider.last_procedure.push_str(record.procedure_code);
        }

        let month = self.months.entry(record.month).or_default();
        month.totals.add(record);
        if !month.procedures.contains(record.procedure_code) {
            month.procedures.insert(record.procedure_code.to_string());
        }
    }

    /// Collapse the running state into the totals the table builder reads
    pub fn finish(self) -> PassOneTotals {
        PassOneTotals {
            procedures: self.procedures,
            providers: self
                .providers
                .into_iter()
                .map(|(id, cursor)| (id, cursor.total))
                .collect(),
            months: self
                .months
                .into_iter()
                .map(|(month, cursor)| {
                    let total = MonthTotal {
                        totals: cursor.totals,
                        procedure_count: cursor.procedures.len() as u64,
                    };
                    (month, total)
                })
                .collect(),
            rows: self.rows,
        }
    }
}
