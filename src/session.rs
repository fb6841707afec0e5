//! Per-operator weighing session.
//!
//! Holds the ticket form being filled in, the result of the last vehicle
//! lookup and the most recent routed reading. The active weight slot is
//! derived from that state on every call, never stored.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::catalog::field;
use crate::error::SubmitError;
use crate::model::normalize_reg;
use crate::reconciler::VehicleMatch;
use crate::router::{select_slot, WeightReading, WeightSlot};

// ---------------------------------------------------------------------------
// Ticket form
// ---------------------------------------------------------------------------

/// Values typed or captured for one ticket, keyed by the known field names.
/// Operator-configured fields beyond the built-in five live in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketForm {
    pub vehicle_reg: String,
    pub material: String,
    pub destination: String,
    pub first_weight: Option<f64>,
    pub second_weight: Option<f64>,
    pub notes: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl TicketForm {
    /// Whether the form holds a value for the named field.
    pub fn value_present(&self, name: &str) -> bool {
        match name {
            field::VEHICLE_REG => !self.vehicle_reg.trim().is_empty(),
            field::MATERIAL => !self.material.trim().is_empty(),
            field::DESTINATION => !self.destination.trim().is_empty(),
            field::FIRST_WEIGHT => self.first_weight.is_some(),
            field::SECOND_WEIGHT => self.second_weight.is_some(),
            other => self
                .extra
                .get(other)
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false),
        }
    }

    /// Set a field from operator text. Blank text clears the field.
    ///
    /// Weight fields must parse as finite, non-negative numbers.
    pub fn set_field(&mut self, name: &str, raw: &str) -> Result<(), SubmitError> {
        let value = raw.trim();
        match name {
            field::VEHICLE_REG => self.vehicle_reg = normalize_reg(value),
            field::MATERIAL => self.material = value.to_string(),
            field::DESTINATION => self.destination = value.to_string(),
            field::FIRST_WEIGHT => self.first_weight = parse_weight(name, value)?,
            field::SECOND_WEIGHT => self.second_weight = parse_weight(name, value)?,
            "notes" => self.notes = (!value.is_empty()).then(|| value.to_string()),
            other => {
                if value.is_empty() {
                    self.extra.remove(other);
                } else {
                    self.extra.insert(other.to_string(), value.to_string());
                }
            }
        }
        Ok(())
    }

    /// Store a weight captured for `slot`.
    pub fn set_weight(&mut self, slot: WeightSlot, value: f64) {
        match slot {
            WeightSlot::First => self.first_weight = Some(value),
            WeightSlot::Second => self.second_weight = Some(value),
        }
    }
}

fn parse_weight(field: &str, raw: &str) -> Result<Option<f64>, SubmitError> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value: f64 = raw.parse().map_err(|_| SubmitError::InvalidNumber {
        field: field.to_string(),
        raw: raw.to_string(),
    })?;
    check_weight(field, value)?;
    Ok(Some(value))
}

/// Reject negative and non-finite weights.
pub(crate) fn check_weight(field: &str, value: f64) -> Result<(), SubmitError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SubmitError::InvalidWeight {
            field: field.to_string(),
            value,
        })
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WeighSession {
    form: TicketForm,
    matched: VehicleMatch,
    last_reading: Option<WeightReading>,
}

impl Default for WeighSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WeighSession {
    pub fn new() -> Self {
        Self {
            form: TicketForm::default(),
            matched: VehicleMatch::NoMatch,
            last_reading: None,
        }
    }

    pub fn form(&self) -> &TicketForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TicketForm {
        &mut self.form
    }

    pub fn matched(&self) -> &VehicleMatch {
        &self.matched
    }

    pub fn last_reading(&self) -> Option<WeightReading> {
        self.last_reading
    }

    /// Record a vehicle lookup and prefill the form from it.
    ///
    /// A partial ticket or pre-registration supplies material, destination
    /// and the first weighing; a new vehicle starts from an empty form. The
    /// second weighing is always cleared.
    pub fn apply_match(&mut self, vehicle_reg: &str, matched: VehicleMatch) {
        let vehicle_reg = normalize_reg(vehicle_reg);
        self.form = match &matched {
            VehicleMatch::MatchedPartial(tx) => TicketForm {
                vehicle_reg,
                material: tx.material.clone(),
                destination: tx.destination.clone(),
                first_weight: Some(tx.first_weight),
                extra: tx.extra_fields.clone(),
                ..TicketForm::default()
            },
            VehicleMatch::MatchedPreRegistration(pre) => TicketForm {
                vehicle_reg,
                material: pre.material.clone(),
                destination: pre.destination.clone(),
                first_weight: Some(pre.first_weight),
                ..TicketForm::default()
            },
            VehicleMatch::NoMatch => TicketForm {
                vehicle_reg,
                ..TicketForm::default()
            },
        };
        self.matched = matched;
        self.last_reading = None;
    }

    /// Slot the next scale reading goes to.
    ///
    /// A first weighing only counts toward the second slot for a known
    /// vehicle; an unseen vehicle keeps capturing into the first slot.
    pub fn active_slot(&self) -> WeightSlot {
        let known = !matches!(self.matched, VehicleMatch::NoMatch);
        select_slot(
            self.matched.is_partial(),
            known && self.form.first_weight.is_some(),
        )
    }

    /// Route a decoded scale value into the active slot.
    pub fn apply_weight(&mut self, value: f64) -> WeightReading {
        let slot = self.active_slot();
        self.form.set_weight(slot, value);
        let reading = WeightReading { value, slot };
        self.last_reading = Some(reading);
        reading
    }

    /// Back to an empty form with no vehicle selected.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
