//! Ticket references and printable ticket text.

use chrono::Utc;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::{Transaction, TransactionStatus};

pub const DEFAULT_TICKET_PREFIX: &str = "WB";

/// Last sequence handed out in this process (unix ms based).
static LAST_TICKET_SEQ: AtomicU64 = AtomicU64::new(0);

/// Next ticket reference, e.g. `WB-1760870400123`.
///
/// The sequence follows the wall clock in milliseconds but never repeats or
/// goes backwards within a process, however fast tickets are issued.
pub fn next_ticket_number(prefix: &str) -> String {
    format!("{prefix}-{}", next_sequence())
}

fn next_sequence() -> u64 {
    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
    let mut last = LAST_TICKET_SEQ.load(Ordering::SeqCst);
    loop {
        let candidate = now_ms.max(last + 1);
        match LAST_TICKET_SEQ.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}

/// Plain-text ticket for the receipt printer.
pub fn render_ticket(tx: &Transaction, site_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:^40}", site_name.to_uppercase());
    let _ = writeln!(out, "Ticket #: {}", tx.ticket_number);
    let _ = writeln!(out, "Date: {}", tx.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "Vehicle Registration: {}", tx.vehicle_reg);
    let _ = writeln!(out, "Material: {}", tx.material);
    let _ = writeln!(out, "Destination: {}", tx.destination);
    let _ = writeln!(out, "Weight 1: {} kg", tx.first_weight);
    if let Some(second) = tx.second_weight {
        let _ = writeln!(out, "Weight 2: {second} kg");
        if let Some(net) = tx.net_weight {
            let _ = writeln!(out, "Net Weight: {net} kg");
        }
        if let Some(rate) = tx.material_rate.filter(|r| *r > 0.0) {
            let _ = writeln!(out, "{}", "-".repeat(40));
            let _ = writeln!(out, "Rate: {rate:.2}/kg");
            let _ = writeln!(out, "Total Value: {:.2}", tx.total_value.unwrap_or(0.0));
        }
    }
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "Operator: {}", tx.operator_name);
    let status = match tx.status {
        TransactionStatus::Complete => "Complete",
        TransactionStatus::Partial => "Partial - Weight 2 Required",
    };
    let _ = writeln!(out, "Status: {status}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};

    #[test]
    fn test_ticket_numbers_unique_under_burst() {
        let numbers: HashSet<String> = (0..1000).map(|_| next_ticket_number("WB")).collect();
        assert_eq!(numbers.len(), 1000);
    }

    #[test]
    fn test_ticket_numbers_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| (0..250).map(|_| next_ticket_number("WB")).collect::<Vec<_>>())
            })
            .collect();
        let all: HashSet<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(all.len(), 1000);
    }

    #[test]
    fn test_ticket_number_prefix() {
        assert!(next_ticket_number("JWS").starts_with("JWS-"));
    }

    #[test]
    fn test_render_complete_ticket_shows_value() {
        let tx = Transaction {
            id: "1".into(),
            ticket_number: "WB-1".into(),
            vehicle_reg: "AB12 CDE".into(),
            material: "Steel".into(),
            destination: "Warehouse A".into(),
            first_weight: 1000.0,
            second_weight: Some(1500.0),
            net_weight: Some(500.0),
            timestamp: Utc::now(),
            operator_name: "John Operator".into(),
            status: TransactionStatus::Complete,
            notes: None,
            material_rate: Some(0.5),
            total_value: Some(250.0),
            extra_fields: BTreeMap::new(),
        };
        let text = render_ticket(&tx, "Weighbridge");
        assert!(text.contains("Net Weight: 500 kg"));
        assert!(text.contains("Total Value: 250.00"));
        assert!(text.contains("Status: Complete"));
    }
}
