//! Routes live scale readings to the first or second weighing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::field;

/// Which weighing an incoming reading fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSlot {
    First,
    Second,
}

impl WeightSlot {
    /// Form field name backing this slot.
    pub fn field_name(&self) -> &'static str {
        match self {
            WeightSlot::First => field::FIRST_WEIGHT,
            WeightSlot::Second => field::SECOND_WEIGHT,
        }
    }
}

impl fmt::Display for WeightSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A decoded weight and the slot it was written to. Transient: replaced by
/// the next frame and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightReading {
    pub value: f64,
    pub slot: WeightSlot,
}

/// Pick the slot for the next reading.
///
/// A vehicle with an open partial ticket, or a session that already holds a
/// first weighing (typed, pre-registered or captured), gets its second
/// weighing next. Everything else starts at the first.
pub fn select_slot(has_open_partial: bool, has_first_weight: bool) -> WeightSlot {
    if has_open_partial || has_first_weight {
        WeightSlot::Second
    } else {
        WeightSlot::First
    }
}
