//! Raw transaction records as found in the source CSV

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Cell contents read as a missing value, matching the usual CSV tooling.
pub const NA_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// True when a raw cell stands for a missing value
pub fn is_na(raw: &str) -> bool {
    NA_VALUES.contains(&raw.trim())
}

/// Parse a numeric cell; NA tokens and NaN both become `None`.
pub fn parse_numeric(raw: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    if is_na(raw) {
        return Ok(None);
    }
    let value: f64 = raw.trim().parse()?;
    Ok((!value.is_nan()).then_some(value))
}

fn na_float<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_numeric(&raw)
            .map_err(|e| de::Error::custom(format!("invalid number `{}`: {}", raw, e))),
        None => Ok(None),
    }
}

fn na_flag<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if is_na(&raw) => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid flag `{}`: {}", raw, e))),
        None => Ok(None),
    }
}

/// One row of the transactions dataset.
///
/// Column names follow the source file. Numeric cells may be empty or hold
/// an NA token such as `NaN` or `NA`; both deserialize to `None` and are
/// later handled by the imputer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Simulation time unit (one step = one hour)
    #[serde(default, deserialize_with = "na_float")]
    pub step: Option<f64>,

    /// Transfer kind (CASH_IN, CASH_OUT, DEBIT, PAYMENT, TRANSFER)
    #[serde(rename = "type")]
    pub tx_type: String,

    /// Transaction amount
    #[serde(default, deserialize_with = "na_float")]
    pub amount: Option<f64>,

    /// Origin account name
    #[serde(rename = "nameOrig", default)]
    pub name_orig: String,

    /// Origin balance before the transaction
    #[serde(rename = "oldbalanceOrg", default, deserialize_with = "na_float")]
    pub old_balance_orig: Option<f64>,

    /// Origin balance after the transaction
    #[serde(rename = "newbalanceOrig", default, deserialize_with = "na_float")]
    pub new_balance_orig: Option<f64>,

    /// Destination account name
    #[serde(rename = "nameDest", default)]
    pub name_dest: String,

    /// Destination balance before the transaction
    #[serde(rename = "oldbalanceDest", default, deserialize_with = "na_float")]
    pub old_balance_dest: Option<f64>,

    /// Destination balance after the transaction
    #[serde(rename = "newbalanceDest", default, deserialize_with = "na_float")]
    pub new_balance_dest: Option<f64>,

    /// Ground-truth fraud label
    #[serde(rename = "isFraud", default, deserialize_with = "na_flag")]
    pub is_fraud: Option<u8>,

    /// Flag raised by the legacy rule engine
    #[serde(rename = "isFlaggedFraud", default, deserialize_with = "na_flag")]
    pub is_flagged_fraud: Option<u8>,
}

impl Transaction {
    /// Create a transaction with the required fields and zeroed balances
    pub fn new(tx_type: &str, amount: f64) -> Self {
        Self {
            step: Some(1.0),
            tx_type: tx_type.to_string(),
            amount: Some(amount),
            name_orig: String::new(),
            old_balance_orig: Some(0.0),
            new_balance_orig: Some(0.0),
            name_dest: String::new(),
            old_balance_dest: Some(0.0),
            new_balance_dest: Some(0.0),
            is_fraud: Some(0),
            is_flagged_fraud: Some(0),
        }
    }

    /// Set origin balances before/after
    pub fn with_origin(mut self, old: f64, new: f64) -> Self {
        self.old_balance_orig = Some(old);
        self.new_balance_orig = Some(new);
        self
    }

    /// Set destination balances before/after
    pub fn with_destination(mut self, old: f64, new: f64) -> Self {
        self.old_balance_dest = Some(old);
        self.new_balance_dest = Some(new);
        self
    }

    /// Set the fraud label
    pub fn with_label(mut self, is_fraud: u8) -> Self {
        self.is_fraud = Some(is_fraud);
        self
    }
}
