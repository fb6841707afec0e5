//! Ticket ledger seam.
//!
//! The reconciler reads history and pre-registrations through [`Ledger`] and
//! writes through `append`/`replace`. The SQLite store implements it for the
//! application; [`MemoryLedger`] backs embedded use and tests.
//!
//! Implementations must refuse a second open partial ticket for the same
//! vehicle with [`StoreError::DuplicatePartial`].

use crate::error::StoreError;
use crate::model::{PreRegisteredVehicle, Transaction};

pub trait Ledger {
    /// The open partial ticket for a (normalized) vehicle registration.
    fn open_partial(&self, vehicle_reg: &str) -> Result<Option<Transaction>, StoreError>;

    /// Every pre-registration for a vehicle, in insertion order.
    fn pre_registrations_for(&self, vehicle_reg: &str)
        -> Result<Vec<PreRegisteredVehicle>, StoreError>;

    /// All pre-registrations, in insertion order.
    fn pre_registrations(&self) -> Result<Vec<PreRegisteredVehicle>, StoreError>;

    /// Full ticket history, oldest first.
    fn transactions(&self) -> Result<Vec<Transaction>, StoreError>;

    /// Insert a new ticket.
    fn append(&mut self, tx: &Transaction) -> Result<(), StoreError>;

    /// Overwrite the ticket with the same id.
    fn replace(&mut self, tx: &Transaction) -> Result<(), StoreError>;

    /// Remove a ticket. Returns whether it existed.
    fn delete_transaction(&mut self, id: &str) -> Result<bool, StoreError>;

    fn add_pre_registration(&mut self, record: &PreRegisteredVehicle) -> Result<(), StoreError>;

    /// Remove a pre-registration. Returns whether it existed.
    fn delete_pre_registration(&mut self, id: &str) -> Result<bool, StoreError>;
}

/// Vec-backed ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    transactions: Vec<Transaction>,
    pre_registrations: Vec<PreRegisteredVehicle>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ledger for MemoryLedger {
    fn open_partial(&self, vehicle_reg: &str) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .transactions
            .iter()
            .find(|t| t.vehicle_reg == vehicle_reg && t.is_partial())
            .cloned())
    }

    fn pre_registrations_for(
        &self,
        vehicle_reg: &str,
    ) -> Result<Vec<PreRegisteredVehicle>, StoreError> {
        Ok(self
            .pre_registrations
            .iter()
            .filter(|p| p.vehicle_reg == vehicle_reg)
            .cloned()
            .collect())
    }

    fn pre_registrations(&self) -> Result<Vec<PreRegisteredVehicle>, StoreError> {
        Ok(self.pre_registrations.clone())
    }

    fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.transactions.clone())
    }

    fn append(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        if tx.is_partial() && self.open_partial(&tx.vehicle_reg)?.is_some() {
            return Err(StoreError::DuplicatePartial(tx.vehicle_reg.clone()));
        }
        self.transactions.push(tx.clone());
        Ok(())
    }

    fn replace(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        let conflict = tx.is_partial()
            && self
                .transactions
                .iter()
                .any(|t| t.id != tx.id && t.vehicle_reg == tx.vehicle_reg && t.is_partial());
        if conflict {
            return Err(StoreError::DuplicatePartial(tx.vehicle_reg.clone()));
        }
        let slot = self
            .transactions
            .iter_mut()
            .find(|t| t.id == tx.id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", tx.id)))?;
        *slot = tx.clone();
        Ok(())
    }

    fn delete_transaction(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.transactions.len();
        self.transactions.retain(|t| t.id != id);
        Ok(self.transactions.len() != before)
    }

    fn add_pre_registration(&mut self, record: &PreRegisteredVehicle) -> Result<(), StoreError> {
        self.pre_registrations.push(record.clone());
        Ok(())
    }

    fn delete_pre_registration(&mut self, id: &str) -> Result<bool, StoreError> {
        let before = self.pre_registrations.len();
        self.pre_registrations.retain(|p| p.id != id);
        Ok(self.pre_registrations.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionStatus;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn partial(id: &str, reg: &str) -> Transaction {
        Transaction {
            id: id.into(),
            ticket_number: format!("WB-{id}"),
            vehicle_reg: reg.into(),
            material: "Steel".into(),
            destination: "Warehouse A".into(),
            first_weight: 1000.0,
            second_weight: None,
            net_weight: None,
            timestamp: Utc::now(),
            operator_name: "op".into(),
            status: TransactionStatus::Partial,
            notes: None,
            material_rate: Some(0.5),
            total_value: None,
            extra_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn test_append_refuses_second_partial() {
        let mut ledger = MemoryLedger::new();
        ledger.append(&partial("1", "AB12")).unwrap();
        let err = ledger.append(&partial("2", "AB12")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePartial(reg) if reg == "AB12"));
        assert_eq!(ledger.transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_unknown_id() {
        let mut ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.replace(&partial("9", "X")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_reports_existence() {
        let mut ledger = MemoryLedger::new();
        ledger.append(&partial("1", "AB12")).unwrap();
        assert!(ledger.delete_transaction("1").unwrap());
        assert!(!ledger.delete_transaction("1").unwrap());
        assert!(ledger.open_partial("AB12").unwrap().is_none());
    }
}
