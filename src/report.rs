//! Period reports over the ticket history.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::io;

use crate::error::ReportError;
use crate::model::{Transaction, TransactionStatus};

/// Tickets in a date range plus their totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: Vec<Transaction>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub completed: usize,
    pub partial: usize,
    /// Sum of `total_value` over completed tickets.
    pub total_value: f64,
}

/// UTC instants bounding `[start 00:00:00.000, end 23:59:59.999]`.
pub fn period_bounds(
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
    if end < start {
        return Err(ReportError::InvalidRange { start, end });
    }
    let from = start.and_time(NaiveTime::MIN).and_utc();
    let to = end.and_time(NaiveTime::MIN).and_utc() + Duration::days(1) - Duration::milliseconds(1);
    Ok((from, to))
}

/// Build the report for tickets stamped within the (inclusive) date range.
pub fn period_report(
    transactions: impl IntoIterator<Item = Transaction>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PeriodReport, ReportError> {
    let (from, to) = period_bounds(start, end)?;
    let rows: Vec<Transaction> = transactions
        .into_iter()
        .filter(|t| t.timestamp >= from && t.timestamp <= to)
        .collect();

    let mut summary = ReportSummary {
        total: rows.len(),
        ..ReportSummary::default()
    };
    for tx in &rows {
        match tx.status {
            TransactionStatus::Complete => {
                summary.completed += 1;
                summary.total_value += tx.total_value.unwrap_or(0.0);
            }
            TransactionStatus::Partial => summary.partial += 1,
        }
    }

    Ok(PeriodReport {
        start,
        end,
        rows,
        summary,
    })
}

impl PeriodReport {
    /// Suggested export file name, e.g. `WB_Report_2024-01-01_to_2024-01-31.csv`.
    pub fn file_name(&self, prefix: &str) -> String {
        format!("{prefix}_Report_{}_to_{}.csv", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CsvRow {
    #[serde(rename = "Ticket #")]
    ticket_number: String,
    #[serde(rename = "Vehicle")]
    vehicle: String,
    #[serde(rename = "Material")]
    material: String,
    #[serde(rename = "Destination")]
    destination: String,
    #[serde(rename = "Weight 1")]
    first_weight: String,
    #[serde(rename = "Weight 2")]
    second_weight: String,
    #[serde(rename = "Net Weight")]
    net_weight: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Value")]
    value: String,
    #[serde(rename = "Date")]
    date: String,
}

fn kg(value: Option<f64>) -> String {
    value.map(|v| format!("{v} kg")).unwrap_or_else(|| "-".to_string())
}

impl From<&Transaction> for CsvRow {
    fn from(tx: &Transaction) -> Self {
        CsvRow {
            ticket_number: tx.ticket_number.clone(),
            vehicle: tx.vehicle_reg.clone(),
            material: tx.material.clone(),
            destination: tx.destination.clone(),
            first_weight: kg(Some(tx.first_weight)),
            second_weight: kg(tx.second_weight),
            net_weight: kg(tx.net_weight),
            status: tx.status.to_string(),
            value: tx
                .total_value
                .map(|v| format!("{v:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            date: tx.timestamp.date_naive().to_string(),
        }
    }
}

/// Write the report rows as CSV with a header line.
pub fn write_csv<W: io::Write>(report: &PeriodReport, writer: W) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if report.rows.is_empty() {
        // serialize() emits the header with the first record only
        wtr.write_record([
            "Ticket #",
            "Vehicle",
            "Material",
            "Destination",
            "Weight 1",
            "Weight 2",
            "Net Weight",
            "Status",
            "Value",
            "Date",
        ])?;
    }
    for tx in &report.rows {
        wtr.serialize(CsvRow::from(tx))?;
    }
    wtr.flush()?;
    Ok(())
}
