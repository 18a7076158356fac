use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::derived::FallRiskBinding;

/// How the submission body is laid out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum PayloadSpec {
    /// Field name to value, as answered.
    #[default]
    Direct,
    /// One spreadsheet-style row keyed by human-readable column headers.
    FixedHeader { columns: Vec<ColumnSpec> },
}

/// One output column of a fixed-header row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    pub header: String,
    #[serde(flatten)]
    pub rule: ColumnRule,
}

/// Value-producing rule of a column; always a pure function of the form state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ColumnRule {
    /// Trimmed, whitespace-collapsed value of one field.
    Field { name: String },
    /// Non-empty values of several fields joined with a separator.
    Join {
        fields: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// A date-like field normalized to `YYYY-MM`.
    Month { name: String },
    /// Age computed from a birthdate field.
    Age { birthdate: String },
    /// BMI computed from height/weight fields.
    Bmi { height: String, weight: String },
    /// Fall-risk classification over its own five signal fields.
    FallRisk(FallRiskBinding),
    Constant { value: String },
}

fn default_separator() -> String {
    " / ".into()
}
