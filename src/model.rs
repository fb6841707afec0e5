//! Ledger and reference-data records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Normalize a vehicle registration for lookup and storage.
///
/// Plates are compared trimmed and uppercased so `ab12 cde ` and `AB12 CDE`
/// name the same vehicle.
pub fn normalize_reg(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Only the first weighing is recorded.
    Partial,
    /// Both weighings are recorded.
    Complete,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Partial => "partial",
            TransactionStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partial" => Ok(TransactionStatus::Partial),
            "complete" => Ok(TransactionStatus::Complete),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// One weighbridge ticket.
///
/// `status` is `Complete` exactly when `second_weight` is present, and
/// `net_weight` is then `|second_weight - first_weight|`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub ticket_number: String,
    pub vehicle_reg: String,
    pub material: String,
    pub destination: String,
    pub first_weight: f64,
    pub second_weight: Option<f64>,
    pub net_weight: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub operator_name: String,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub material_rate: Option<f64>,
    pub total_value: Option<f64>,
    /// Values of operator-configured fields beyond the built-in ones.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_fields: BTreeMap<String, String>,
}

impl Transaction {
    pub fn is_partial(&self) -> bool {
        self.status == TransactionStatus::Partial
    }
}

/// Advance record of a vehicle's expected first weighing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreRegisteredVehicle {
    pub id: String,
    pub vehicle_reg: String,
    pub material: String,
    pub destination: String,
    pub first_weight: f64,
    pub operator_name: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub price_per_unit: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Select,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Select => "select",
        }
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(FieldKind::Text),
            "number" => Ok(FieldKind::Number),
            "select" => Ok(FieldKind::Select),
            other => Err(format!("unknown field type: {other}")),
        }
    }
}

/// One entry of the operator form configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub order: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_reg() {
        assert_eq!(normalize_reg("  ab12 cde "), "AB12 CDE");
        assert_eq!(normalize_reg(""), "");
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!("partial".parse::<TransactionStatus>(), Ok(TransactionStatus::Partial));
        assert_eq!(TransactionStatus::Complete.to_string(), "complete");
        assert!("void".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_field_config_json_shape() {
        let field = FieldConfig {
            id: "weight1".into(),
            name: "weight1".into(),
            label: "Weight 1 (kg)".into(),
            kind: FieldKind::Number,
            required: true,
            options: Vec::new(),
            order: 4,
        };
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "number");
        assert!(json.get("options").is_none());
    }
}
