//! Vehicle resolution and ticket submission.
//!
//! Key design goals:
//! - A vehicle never has more than one open partial ticket. A second weighing
//!   completes the existing partial in place (same id and ticket reference).
//! - An open partial always outranks a pre-registration, which outranks
//!   treating the vehicle as new.
//! - Rejected submissions leave the ledger untouched.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::catalog::{field, Catalog};
use crate::error::{StoreError, SubmitError};
use crate::ledger::Ledger;
use crate::model::{normalize_reg, PreRegisteredVehicle, Transaction, TransactionStatus};
use crate::session::{check_weight, TicketForm, WeighSession};
use crate::ticket::{next_ticket_number, DEFAULT_TICKET_PREFIX};

/// Outcome of looking a vehicle up against the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum VehicleMatch {
    MatchedPartial(Transaction),
    MatchedPreRegistration(PreRegisteredVehicle),
    NoMatch,
}

impl VehicleMatch {
    pub fn is_partial(&self) -> bool {
        matches!(self, VehicleMatch::MatchedPartial(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            VehicleMatch::MatchedPartial(_) => "partial",
            VehicleMatch::MatchedPreRegistration(_) => "pre-registered",
            VehicleMatch::NoMatch => "new",
        }
    }
}

/// Fields a ticket can never be recorded without, whatever the field
/// configuration says.
const ALWAYS_REQUIRED: &[&str] = &[field::VEHICLE_REG, field::FIRST_WEIGHT];

pub struct Reconciler<L: Ledger> {
    ledger: L,
    catalog: Catalog,
    ticket_prefix: String,
}

impl<L: Ledger> Reconciler<L> {
    pub fn new(ledger: L, catalog: Catalog) -> Self {
        Self {
            ledger,
            catalog,
            ticket_prefix: DEFAULT_TICKET_PREFIX.to_string(),
        }
    }

    pub fn with_ticket_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ticket_prefix = prefix.into();
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve a vehicle registration.
    ///
    /// With several pre-registrations for one vehicle, the most recent
    /// timestamp wins and equal timestamps go to the later-inserted record.
    pub fn resolve(&self, vehicle_reg: &str) -> Result<VehicleMatch, StoreError> {
        let reg = normalize_reg(vehicle_reg);
        if reg.is_empty() {
            return Ok(VehicleMatch::NoMatch);
        }
        if let Some(tx) = self.ledger.open_partial(&reg)? {
            return Ok(VehicleMatch::MatchedPartial(tx));
        }
        let latest = self
            .ledger
            .pre_registrations_for(&reg)?
            .into_iter()
            .max_by_key(|p| p.timestamp);
        Ok(match latest {
            Some(pre) => VehicleMatch::MatchedPreRegistration(pre),
            None => VehicleMatch::NoMatch,
        })
    }

    /// Resolve `vehicle_reg` and prefill `session` from the result.
    pub fn select_vehicle(
        &self,
        session: &mut WeighSession,
        vehicle_reg: &str,
    ) -> Result<(), StoreError> {
        let matched = self.resolve(vehicle_reg)?;
        debug!(vehicle = %normalize_reg(vehicle_reg), matched = matched.label(), "Vehicle resolved");
        session.apply_match(vehicle_reg, matched);
        Ok(())
    }

    /// Registrations from history and pre-registrations containing `text`,
    /// case-insensitively, distinct and sorted.
    pub fn suggest(&self, text: &str) -> Result<Vec<String>, StoreError> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut regs: BTreeSet<String> = BTreeSet::new();
        for tx in self.ledger.transactions()? {
            regs.insert(tx.vehicle_reg);
        }
        for pre in self.ledger.pre_registrations()? {
            regs.insert(pre.vehicle_reg);
        }
        Ok(regs
            .into_iter()
            .filter(|r| r.to_lowercase().contains(&needle))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate `form` and record it.
    ///
    /// Completes the vehicle's open partial in place when there is one,
    /// otherwise appends a new ticket.
    pub fn submit(&mut self, form: &TicketForm, operator: &str) -> Result<Transaction, SubmitError> {
        self.validate(form)?;
        let first_weight = form.first_weight.ok_or_else(|| {
            SubmitError::MissingRequiredFields(vec![self.catalog.label_for(field::FIRST_WEIGHT).to_string()])
        })?;
        let reg = normalize_reg(&form.vehicle_reg);

        let matched = self.resolve(&reg)?;
        if matched == VehicleMatch::NoMatch && form.second_weight.is_some() {
            return Err(SubmitError::SecondWeighingNotAllowed(reg));
        }

        let (tx, replacing) = match (&matched, form.second_weight) {
            (VehicleMatch::MatchedPartial(existing), Some(second)) => {
                (self.complete_partial(existing, form, second), true)
            }
            (VehicleMatch::MatchedPartial(existing), None) => {
                // A repeated first weighing corrects the open partial.
                let mut tx = self.new_transaction(form, &reg, first_weight, operator);
                tx.id = existing.id.clone();
                tx.ticket_number = existing.ticket_number.clone();
                (tx, true)
            }
            _ => (self.new_transaction(form, &reg, first_weight, operator), false),
        };

        if replacing {
            self.ledger.replace(&tx)?;
        } else {
            self.ledger.append(&tx)?;
        }

        info!(
            ticket = %tx.ticket_number,
            vehicle = %tx.vehicle_reg,
            status = %tx.status,
            net = ?tx.net_weight,
            in_place = replacing,
            "Ticket recorded"
        );
        Ok(tx)
    }

    /// Close an open partial with its second weighing.
    ///
    /// The partial keeps its first weighing, operator and recorded fields;
    /// blank material, destination, notes and custom fields are filled from
    /// the form.
    fn complete_partial(&self, existing: &Transaction, form: &TicketForm, second: f64) -> Transaction {
        let mut tx = existing.clone();
        if tx.material.trim().is_empty() {
            tx.material = form.material.trim().to_string();
        }
        if tx.destination.trim().is_empty() {
            tx.destination = form.destination.trim().to_string();
        }
        if tx.notes.is_none() {
            tx.notes = form.notes.clone();
        }
        for (name, value) in &form.extra {
            tx.extra_fields
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        let rate = self.catalog.price_for(&tx.material);
        let net = (second - tx.first_weight).abs();
        tx.second_weight = Some(second);
        tx.net_weight = Some(net);
        tx.material_rate = Some(rate);
        tx.total_value = Some(net * rate);
        tx.status = TransactionStatus::Complete;
        tx.timestamp = Utc::now();
        tx
    }

    fn new_transaction(
        &self,
        form: &TicketForm,
        reg: &str,
        first_weight: f64,
        operator: &str,
    ) -> Transaction {
        let rate = self.catalog.price_for(&form.material);
        let net_weight = form.second_weight.map(|second| (second - first_weight).abs());
        let status = if form.second_weight.is_some() {
            TransactionStatus::Complete
        } else {
            TransactionStatus::Partial
        };
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_number: next_ticket_number(&self.ticket_prefix),
            vehicle_reg: reg.to_string(),
            material: form.material.trim().to_string(),
            destination: form.destination.trim().to_string(),
            first_weight,
            second_weight: form.second_weight,
            net_weight,
            timestamp: Utc::now(),
            operator_name: operator.to_string(),
            status,
            notes: form.notes.clone(),
            material_rate: Some(rate),
            total_value: net_weight.map(|net| net * rate),
            extra_fields: form.extra.clone(),
        }
    }

    /// Submit the session's form and reset the session on success.
    pub fn submit_session(
        &mut self,
        session: &mut WeighSession,
        operator: &str,
    ) -> Result<Transaction, SubmitError> {
        let tx = self.submit(session.form(), operator)?;
        session.reset();
        Ok(tx)
    }

    fn validate(&self, form: &TicketForm) -> Result<(), SubmitError> {
        let mut missing: Vec<String> = self
            .catalog
            .sorted_fields()
            .into_iter()
            .filter(|f| f.required && !form.value_present(&f.name))
            .map(|f| f.label.clone())
            .collect();
        for name in ALWAYS_REQUIRED {
            let label = self.catalog.label_for(name);
            if !form.value_present(name) && !missing.iter().any(|m| m == label) {
                missing.push(label.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(SubmitError::MissingRequiredFields(missing));
        }

        if let Some(first) = form.first_weight {
            check_weight(field::FIRST_WEIGHT, first)?;
        }
        if let Some(second) = form.second_weight {
            check_weight(field::SECOND_WEIGHT, second)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    pub fn delete_transaction(&mut self, id: &str) -> Result<bool, StoreError> {
        let removed = self.ledger.delete_transaction(id)?;
        if removed {
            info!(id, "Transaction deleted");
        }
        Ok(removed)
    }

    /// Record a vehicle's expected first weighing ahead of arrival.
    pub fn pre_register(
        &mut self,
        vehicle_reg: &str,
        material: &str,
        destination: &str,
        first_weight: f64,
        operator: &str,
    ) -> Result<PreRegisteredVehicle, SubmitError> {
        let reg = normalize_reg(vehicle_reg);
        if reg.is_empty() {
            return Err(SubmitError::MissingRequiredFields(vec![self
                .catalog
                .label_for(field::VEHICLE_REG)
                .to_string()]));
        }
        check_weight(field::FIRST_WEIGHT, first_weight)?;

        let record = PreRegisteredVehicle {
            id: uuid::Uuid::new_v4().to_string(),
            vehicle_reg: reg,
            material: material.trim().to_string(),
            destination: destination.trim().to_string(),
            first_weight,
            operator_name: operator.to_string(),
            timestamp: Utc::now(),
        };
        self.ledger.add_pre_registration(&record)?;
        info!(vehicle = %record.vehicle_reg, "Vehicle pre-registered");
        Ok(record)
    }

    pub fn delete_pre_registration(&mut self, id: &str) -> Result<bool, StoreError> {
        self.ledger.delete_pre_registration(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::router::WeightSlot;
    use chrono::Duration;
    use std::collections::HashMap;

    fn reconciler() -> Reconciler<MemoryLedger> {
        Reconciler::new(MemoryLedger::new(), Catalog::defaults())
    }

    fn form(reg: &str, first: Option<f64>, second: Option<f64>) -> TicketForm {
        TicketForm {
            vehicle_reg: reg.to_string(),
            material: "Steel".to_string(),
            destination: "Warehouse A".to_string(),
            first_weight: first,
            second_weight: second,
            ..TicketForm::default()
        }
    }

    fn partial_count(r: &Reconciler<MemoryLedger>) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for tx in r.ledger().transactions().unwrap() {
            if tx.is_partial() {
                *counts.entry(tx.vehicle_reg).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn test_first_only_for_new_vehicle_appends_one_partial() {
        let mut r = reconciler();
        let tx = r.submit(&form("AB12 CDE", Some(1000.0), None), "op").unwrap();
        assert_eq!(tx.status, TransactionStatus::Partial);
        assert_eq!(tx.net_weight, None);
        assert_eq!(tx.total_value, None);
        assert_eq!(r.ledger().transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_second_weighing_completes_partial_in_place() {
        let mut r = reconciler();
        let first = r.submit(&form("AB12 CDE", Some(1000.0), None), "op").unwrap();
        let done = r.submit(&form("ab12 cde", Some(1000.0), Some(1500.0)), "op").unwrap();

        assert_eq!(done.id, first.id);
        assert_eq!(done.ticket_number, first.ticket_number);
        assert_eq!(done.status, TransactionStatus::Complete);
        assert_eq!(done.net_weight, Some(500.0));
        assert_eq!(done.material_rate, Some(0.5));
        assert_eq!(done.total_value, Some(250.0));

        let all = r.ledger().transactions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], done);
    }

    #[test]
    fn test_completion_keeps_recorded_first_weighing() {
        let mut r = reconciler();
        let mut first_form = form("AB12", Some(1000.0), None);
        first_form.notes = Some("tare checked".into());
        first_form.extra.insert("haulier".into(), "Acme".into());
        let partial = r.submit(&first_form, "alice").unwrap();

        let mut second_form = form("AB12", Some(1200.0), Some(1500.0));
        second_form.material = "Copper".into();
        second_form.destination = "Export Terminal".into();
        second_form.extra.insert("haulier".into(), "Bolt".into());
        second_form.extra.insert("seal".into(), "S-19".into());
        let done = r.submit(&second_form, "bob").unwrap();

        assert_eq!(done.id, partial.id);
        assert_eq!(done.first_weight, 1000.0);
        assert_eq!(done.operator_name, "alice");
        assert_eq!(done.material, "Steel");
        assert_eq!(done.destination, "Warehouse A");
        assert_eq!(done.notes.as_deref(), Some("tare checked"));
        assert_eq!(done.extra_fields.get("haulier").map(String::as_str), Some("Acme"));
        assert_eq!(done.extra_fields.get("seal").map(String::as_str), Some("S-19"));
        assert_eq!(done.second_weight, Some(1500.0));
        assert_eq!(done.net_weight, Some(500.0));
        assert_eq!(done.material_rate, Some(0.5));
        assert_eq!(done.total_value, Some(250.0));
        assert!(done.timestamp >= partial.timestamp);
        assert_eq!(r.ledger().transactions().unwrap(), vec![done]);
    }

    #[test]
    fn test_completion_fills_blank_material_from_form() {
        let mut catalog = Catalog::defaults();
        for f in catalog.fields.iter_mut() {
            if f.name == field::MATERIAL {
                f.required = false;
            }
        }
        let mut r = Reconciler::new(MemoryLedger::new(), catalog);
        let mut f = form("AB12", Some(1000.0), None);
        f.material.clear();
        r.submit(&f, "op").unwrap();

        f.material = "Steel".into();
        f.second_weight = Some(3000.0);
        let done = r.submit(&f, "op").unwrap();
        assert_eq!(done.material, "Steel");
        assert_eq!(done.total_value, Some(1000.0));
    }

    #[test]
    fn test_net_is_absolute_difference() {
        let mut r = reconciler();
        r.submit(&form("OUT 1", Some(15000.0), None), "op").unwrap();
        let done = r.submit(&form("OUT 1", Some(15000.0), Some(6000.0)), "op").unwrap();
        assert_eq!(done.net_weight, Some(9000.0));
        assert_eq!(done.total_value, Some(4500.0));
    }

    #[test]
    fn test_second_weighing_for_unseen_vehicle_rejected() {
        let mut r = reconciler();
        let err = r.submit(&form("NEW 1", Some(1000.0), Some(1500.0)), "op").unwrap_err();
        assert!(matches!(err, SubmitError::SecondWeighingNotAllowed(ref reg) if reg == "NEW 1"));
        assert!(r.ledger().transactions().unwrap().is_empty());
    }

    #[test]
    fn test_missing_required_fields_lists_labels() {
        let mut r = reconciler();
        let mut f = form("AB12", None, None);
        f.material.clear();
        let err = r.submit(&f, "op").unwrap_err();
        match err {
            SubmitError::MissingRequiredFields(labels) => {
                assert_eq!(labels, vec!["Material", "Weight 1 (kg)"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(r.ledger().transactions().unwrap().is_empty());
    }

    #[test]
    fn test_first_weight_required_even_when_configured_optional() {
        let mut catalog = Catalog::defaults();
        for f in catalog.fields.iter_mut() {
            f.required = false;
        }
        let mut r = Reconciler::new(MemoryLedger::new(), catalog);
        let err = r.submit(&form("AB12", None, None), "op").unwrap_err();
        assert!(matches!(err, SubmitError::MissingRequiredFields(ref l) if l == &vec!["Weight 1 (kg)".to_string()]));
    }

    #[test]
    fn test_required_custom_field() {
        let mut catalog = Catalog::defaults();
        catalog.fields.push(crate::model::FieldConfig {
            id: "haulier".into(),
            name: "haulier".into(),
            label: "Haulier".into(),
            kind: crate::model::FieldKind::Text,
            required: true,
            options: Vec::new(),
            order: 6,
        });
        let mut r = Reconciler::new(MemoryLedger::new(), catalog);
        let mut f = form("AB12", Some(100.0), None);
        let err = r.submit(&f, "op").unwrap_err();
        assert!(err.to_string().contains("Haulier"));

        f.extra.insert("haulier".into(), "Acme".into());
        let tx = r.submit(&f, "op").unwrap();
        assert_eq!(tx.extra_fields.get("haulier").map(String::as_str), Some("Acme"));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut r = reconciler();
        let err = r.submit(&form("AB12", Some(-1.0), None), "op").unwrap_err();
        assert!(matches!(err, SubmitError::InvalidWeight { .. }));
        let err = r.submit(&form("AB12", Some(f64::NAN), None), "op").unwrap_err();
        assert!(matches!(err, SubmitError::InvalidWeight { .. }));
        assert!(r.ledger().transactions().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_material_prices_at_zero() {
        let mut r = reconciler();
        let mut f = form("AB12", Some(1000.0), None);
        f.material = "Gravel".into();
        r.submit(&f, "op").unwrap();
        f.second_weight = Some(3000.0);
        let done = r.submit(&f, "op").unwrap();
        assert_eq!(done.net_weight, Some(2000.0));
        assert_eq!(done.material_rate, Some(0.0));
        assert_eq!(done.total_value, Some(0.0));
    }

    #[test]
    fn test_first_only_resubmit_replaces_partial() {
        let mut r = reconciler();
        let first = r.submit(&form("AB12", Some(1000.0), None), "op").unwrap();
        let again = r.submit(&form("AB12", Some(1100.0), None), "op").unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.is_partial());
        assert_eq!(again.first_weight, 1100.0);
        assert_eq!(r.ledger().transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_one_partial_per_vehicle_over_sequence() {
        let mut r = reconciler();
        let steps: &[(&str, f64, Option<f64>)] = &[
            ("A1", 1000.0, None),
            ("B2", 2000.0, None),
            ("A1", 1000.0, None),
            ("A1", 1000.0, Some(1800.0)),
            ("A1", 900.0, None),
            ("B2", 2000.0, Some(500.0)),
            ("B2", 700.0, None),
            ("A1", 900.0, Some(1900.0)),
        ];
        for (reg, first, second) in steps {
            let _ = r.submit(&form(reg, Some(*first), *second), "op");
            assert!(partial_count(&r).values().all(|n| *n <= 1));
        }
        let all = r.ledger().transactions().unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.iter().filter(|t| t.is_partial()).count(), 1);
        let unique: BTreeSet<&str> = all.iter().map(|t| t.ticket_number.as_str()).collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn test_pre_registration_allows_direct_completion() {
        let mut r = reconciler();
        r.pre_register("xy34 zzz", "Copper", "Export Terminal", 8000.0, "admin").unwrap();
        let tx = r.submit(&form("XY34 ZZZ", Some(8000.0), Some(20000.0)), "op").unwrap();
        assert_eq!(tx.status, TransactionStatus::Complete);
        assert_eq!(tx.net_weight, Some(12000.0));
        assert_eq!(r.ledger().pre_registrations().unwrap().len(), 1);
    }

    #[test]
    fn test_partial_outranks_pre_registration() {
        let mut r = reconciler();
        r.pre_register("AB12", "Iron", "Warehouse B", 5000.0, "admin").unwrap();
        let partial = r.submit(&form("AB12", Some(1000.0), None), "op").unwrap();
        match r.resolve("ab12").unwrap() {
            VehicleMatch::MatchedPartial(tx) => assert_eq!(tx.id, partial.id),
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[test]
    fn test_latest_pre_registration_wins() {
        let mut ledger = MemoryLedger::new();
        let now = Utc::now();
        let make = |id: &str, weight: f64, at| PreRegisteredVehicle {
            id: id.into(),
            vehicle_reg: "AB12".into(),
            material: "Steel".into(),
            destination: "Warehouse A".into(),
            first_weight: weight,
            operator_name: "admin".into(),
            timestamp: at,
        };
        ledger.add_pre_registration(&make("new", 2.0, now)).unwrap();
        ledger.add_pre_registration(&make("old", 1.0, now - Duration::hours(1))).unwrap();
        ledger.add_pre_registration(&make("tie", 3.0, now)).unwrap();
        let r = Reconciler::new(ledger, Catalog::defaults());
        match r.resolve("AB12").unwrap() {
            VehicleMatch::MatchedPreRegistration(pre) => assert_eq!(pre.id, "tie"),
            other => panic!("expected pre-registration, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_unknown_and_blank() {
        let r = reconciler();
        assert_eq!(r.resolve("ZZ99").unwrap(), VehicleMatch::NoMatch);
        assert_eq!(r.resolve("   ").unwrap(), VehicleMatch::NoMatch);
    }

    #[test]
    fn test_session_flow_routes_and_resets() {
        let mut r = reconciler();
        let mut session = WeighSession::new();

        r.select_vehicle(&mut session, "AB12").unwrap();
        session.form_mut().set_field(field::MATERIAL, "Steel").unwrap();
        session.form_mut().set_field(field::DESTINATION, "Warehouse A").unwrap();
        assert_eq!(session.apply_weight(1000.0).slot, WeightSlot::First);
        let partial = r.submit_session(&mut session, "op").unwrap();
        assert!(session.form().vehicle_reg.is_empty());

        r.select_vehicle(&mut session, "ab12").unwrap();
        assert_eq!(session.apply_weight(1500.0).slot, WeightSlot::Second);
        let done = r.submit_session(&mut session, "op").unwrap();
        assert_eq!(done.id, partial.id);
        assert_eq!(done.net_weight, Some(500.0));
        assert_eq!(done.total_value, Some(250.0));
    }

    #[test]
    fn test_failed_submit_keeps_session() {
        let mut r = reconciler();
        let mut session = WeighSession::new();
        r.select_vehicle(&mut session, "AB12").unwrap();
        assert!(r.submit_session(&mut session, "op").is_err());
        assert_eq!(session.form().vehicle_reg, "AB12");
    }

    #[test]
    fn test_suggest_distinct_sorted_case_insensitive() {
        let mut r = reconciler();
        r.submit(&form("XB12", Some(1.0), None), "op").unwrap();
        r.submit(&form("AB12", Some(1.0), None), "op").unwrap();
        r.submit(&form("AB12", Some(1.0), Some(5.0)), "op").unwrap();
        r.pre_register("cab1", "Steel", "Warehouse A", 1.0, "admin").unwrap();
        r.pre_register("ZZ", "Steel", "Warehouse A", 1.0, "admin").unwrap();
        assert_eq!(r.suggest("b1").unwrap(), vec!["AB12", "CAB1", "XB12"]);
        assert!(r.suggest("").unwrap().is_empty());
    }

    #[test]
    fn test_delete_transaction_frees_vehicle() {
        let mut r = reconciler();
        let tx = r.submit(&form("AB12", Some(1000.0), None), "op").unwrap();
        assert!(r.delete_transaction(&tx.id).unwrap());
        assert_eq!(r.resolve("AB12").unwrap(), VehicleMatch::NoMatch);
        assert!(!r.delete_transaction(&tx.id).unwrap());
    }

    #[test]
    fn test_pre_register_requires_reg() {
        let mut r = reconciler();
        assert!(matches!(
            r.pre_register("  ", "Steel", "Warehouse A", 1.0, "admin"),
            Err(SubmitError::MissingRequiredFields(_))
        ));
    }
}
