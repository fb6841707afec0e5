//! Weighbridge ticketing backend.
//!
//! Two subsystems do the real work:
//! - **Scale telemetry**: [`scale::ScaleLink`] owns the serial connection to
//!   the weight indicator, runs a cancellable read loop and decodes free-form
//!   ASCII frames with [`weight_frame::parse_frame`].
//! - **Ticket reconciliation**: [`reconciler::Reconciler`] resolves a vehicle
//!   against open partial tickets and pre-registrations, and records first
//!   and second weighings without ever opening a duplicate ticket.
//!
//! [`session::WeighSession`] ties the two together for one operator: live
//! readings are routed into the first or second weighing by
//! [`router::select_slot`].

pub mod catalog;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod model;
pub mod reconciler;
pub mod report;
pub mod router;
pub mod scale;
pub mod serial;
pub mod session;
pub mod ticket;
pub mod weight_frame;

pub use error::{ConfigError, ReportError, ScaleError, StoreError, SubmitError};
pub use ledger::{Ledger, MemoryLedger};
pub use model::{PreRegisteredVehicle, Transaction, TransactionStatus};
pub use reconciler::{Reconciler, VehicleMatch};
pub use scale::{ConnectionState, ScaleEvent, ScaleLink};
pub use session::{TicketForm, WeighSession};
pub use weight_frame::parse_frame;

/// Crate version and build metadata stamped by `build.rs`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BUILD_GIT_SHA: &str = env!("BUILD_GIT_SHA");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
