/*!
 * Schema definitions for the claims file and the emitted tables
 *
 * The claims file contract is positional: only the first seven columns are
 * read. Output table schemas describe the relational store the tables are
 * bulk-loaded into (column names, SQL types, nullability and indexes).
 */

/// Medicaid provider spending claims file schema
pub struct ClaimsSchema;

impl ClaimsSchema {
    pub const PROVIDER: usize = 0;
    pub const PROCEDURE: usize = 2;
    pub const MONTH: usize = 3;
    pub const BENEFICIARIES: usize = 4;
    pub const CLAIMS: usize = 5;
    pub const PAID: usize = 6;

    /// Leading column names in the order they appear in the CSV file
    pub fn column_names() -> Vec<&'static str> {
        vec![
            "BILLING_PROVIDER_NPI_NUM",
            "SERVICING_PROVIDER_NPI_NUM",
            "HCPCS_CODE",
            "CLAIM_FROM_MONTH",
            "TOTAL_UNIQUE_BENEFICIARIES",
            "TOTAL_CLAIMS",
            "TOTAL_PAID",
        ]
    }

    /// Minimum number of fields a row must carry
    pub fn column_count() -> usize {
        Self::column_names().len()
    }

    /// Validate that a header row starts with the expected claims columns
    ///
    /// Extra trailing columns are allowed. Names compare case-insensitively.
    pub fn validate_headers(headers: &[String]) -> Result<(), crate::RollupError> {
        let expected_columns = Self::column_names();

        if headers.len() < expected_columns.len() {
            return Err(crate::RollupError::schema_mismatch_detailed(
                expected_columns.len(),
                headers.len(),
                None,
            ));
        }

        for (i, (expected, actual)) in expected_columns.iter().zip(headers.iter()).enumerate() {
            if !expected.eq_ignore_ascii_case(actual.trim()) {
                return Err(crate::RollupError::schema_mismatch_detailed(
                    expected_columns.len(),
                    headers.len(),
                    Some((i, expected.to_string(), actual.clone())),
                ));
            }
        }

        Ok(())
    }
}

/// SQL column type of an output table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

/// One column of an output table
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// Column name in the relational store
    pub name: &'static str,
    /// Field name in the JSON table file
    pub json_key: &'static str,
    pub sql_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
}

const fn col(name: &'static str, json_key: &'static str, sql_type: ColumnType, nullable: bool) -> ColumnDef {
    ColumnDef { name, json_key, sql_type, nullable, primary_key: false }
}

const fn key(name: &'static str, json_key: &'static str, sql_type: ColumnType) -> ColumnDef {
    ColumnDef { name, json_key, sql_type, nullable: false, primary_key: true }
}

use ColumnType::{Integer, Real, Text};

/// Schema of one emitted table
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    /// Relational table name
    pub name: &'static str,
    /// JSON file name inside the output directory
    pub file_name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Whether the table gets a surrogate autoincrement id
    pub surrogate_id: bool,
    /// (index name, indexed columns)
    pub indexes: &'static [(&'static str, &'static [&'static str])],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

pub const MONTHLY_NATIONAL: TableSchema = TableSchema {
    name: "monthly_national",
    file_name: "monthly-national.json",
    columns: &[
        key("month", "month", Text),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("provider_count", "providerCount", Integer, true),
        col("procedure_count", "procedureCount", Integer, true),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("avg_cost_per_beneficiary", "avgCostPerBeneficiary", Real, true),
    ],
    surrogate_id: false,
    indexes: &[],
};

pub const PROCEDURES: TableSchema = TableSchema {
    name: "procedures",
    file_name: "procedure-summary.json",
    columns: &[
        key("hcpcs_code", "hcpcsCode", Text),
        col("category", "category", Text, false),
        col("description", "description", Text, true),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("provider_count", "providerCount", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("median_cost_per_claim", "medianCostPerClaim", Real, true),
        col("avg_cost_per_beneficiary", "avgCostPerBeneficiary", Real, true),
        col("claims_per_beneficiary", "claimsPerBeneficiary", Real, true),
    ],
    surrogate_id: false,
    indexes: &[
        ("idx_procedures_category", &["category"]),
        ("idx_procedures_paid", &["total_paid"]),
    ],
};

pub const PROVIDERS: TableSchema = TableSchema {
    name: "providers",
    file_name: "provider-summary.json",
    columns: &[
        key("npi", "npi", Text),
        col("name", "name", Text, true),
        col("state", "state", Text, true),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("procedure_count", "procedureCount", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("avg_cost_per_beneficiary", "avgCostPerBeneficiary", Real, true),
        col("top_procedure", "topProcedure", Text, true),
        col("top_procedure_paid", "topProcedurePaid", Real, true),
        col("spending_growth_pct", "spendingGrowthPct", Real, true),
        col("cost_per_claim_growth_pct", "costPerClaimGrowthPct", Real, true),
        col("volume_growth_pct", "volumeGrowthPct", Real, true),
        col("lat", "lat", Real, true),
        col("lng", "lng", Real, true),
    ],
    surrogate_id: false,
    indexes: &[
        ("idx_providers_state", &["state"]),
        ("idx_providers_paid", &["total_paid"]),
    ],
};

pub const STATES: TableSchema = TableSchema {
    name: "states",
    file_name: "state-summary.json",
    columns: &[
        key("state", "state", Text),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("provider_count", "providerCount", Integer, false),
        col("procedure_count", "procedureCount", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("avg_cost_per_beneficiary", "avgCostPerBeneficiary", Real, true),
        col("claims_per_beneficiary", "claimsPerBeneficiary", Real, true),
    ],
    surrogate_id: false,
    indexes: &[],
};

pub const PROCEDURE_MONTHLY: TableSchema = TableSchema {
    name: "procedure_monthly",
    file_name: "procedure-monthly.json",
    columns: &[
        col("hcpcs_code", "hcpcsCode", Text, false),
        col("month", "month", Text, false),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("avg_cost_per_beneficiary", "avgCostPerBeneficiary", Real, true),
        col("provider_count", "providerCount", Integer, true),
    ],
    surrogate_id: true,
    indexes: &[
        ("idx_proc_monthly_code", &["hcpcs_code"]),
        ("idx_proc_monthly_code_month", &["hcpcs_code", "month"]),
    ],
};

pub const PROVIDER_PROCEDURES: TableSchema = TableSchema {
    name: "provider_procedures",
    file_name: "provider-procedures.json",
    columns: &[
        col("npi", "npi", Text, false),
        col("hcpcs_code", "hcpcsCode", Text, false),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("cost_per_claim", "costPerClaim", Real, true),
        col("cost_per_beneficiary", "costPerBeneficiary", Real, true),
        col("procedure_median_cost_per_claim", "procedureMedianCostPerClaim", Real, true),
        col("cost_index", "costIndex", Real, true),
        col("state", "state", Text, true),
        col("provider_name", "providerName", Text, true),
        col("rn", "rn", Integer, true),
    ],
    surrogate_id: true,
    indexes: &[
        ("idx_pp_code", &["hcpcs_code"]),
        ("idx_pp_npi", &["npi"]),
    ],
};

pub const PROVIDER_MONTHLY: TableSchema = TableSchema {
    name: "provider_monthly",
    file_name: "provider-monthly.json",
    columns: &[
        col("npi", "npi", Text, false),
        col("month", "month", Text, false),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("procedure_count", "procedureCount", Integer, true),
    ],
    surrogate_id: true,
    indexes: &[("idx_pm_npi", &["npi"])],
};

pub const STATE_MONTHLY: TableSchema = TableSchema {
    name: "state_monthly",
    file_name: "state-monthly.json",
    columns: &[
        col("state", "state", Text, false),
        col("month", "month", Text, false),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("avg_cost_per_beneficiary", "avgCostPerBeneficiary", Real, true),
    ],
    surrogate_id: true,
    indexes: &[("idx_state_monthly_state", &["state"])],
};

pub const STATE_PROCEDURES: TableSchema = TableSchema {
    name: "state_procedures",
    file_name: "state-procedures.json",
    columns: &[
        col("state", "state", Text, false),
        col("hcpcs_code", "hcpcsCode", Text, false),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("avg_cost_per_claim", "avgCostPerClaim", Real, true),
        col("provider_count", "providerCount", Integer, true),
    ],
    surrogate_id: true,
    indexes: &[("idx_sp_state", &["state"])],
};

pub const OUTLIERS: TableSchema = TableSchema {
    name: "outliers",
    file_name: "outliers.json",
    columns: &[
        col("npi", "npi", Text, false),
        col("state", "state", Text, true),
        col("hcpcs_code", "hcpcsCode", Text, false),
        col("total_paid", "totalPaid", Real, false),
        col("total_claims", "totalClaims", Integer, false),
        col("total_beneficiaries", "totalBeneficiaries", Integer, false),
        col("cost_per_claim", "costPerClaim", Real, true),
        col("procedure_median", "procedureMedian", Real, true),
        col("cost_index", "costIndex", Real, true),
        col("direction", "direction", Text, true),
        col("provider_name", "providerName", Text, true),
        col("hcpcs_description", "hcpcsDescription", Text, true),
    ],
    surrogate_id: true,
    indexes: &[
        ("idx_outliers_code", &["hcpcs_code"]),
        ("idx_outliers_npi", &["npi"]),
        ("idx_outliers_index", &["cost_index"]),
    ],
};

/// Every emitted table, in load order
pub static OUTPUT_TABLES: [TableSchema; 10] = [
    MONTHLY_NATIONAL,
    PROCEDURES,
    PROVIDERS,
    STATES,
    PROCEDURE_MONTHLY,
    PROVIDER_PROCEDURES,
    PROVIDER_MONTHLY,
    STATE_MONTHLY,
    STATE_PROCEDURES,
    OUTLIERS,
];
