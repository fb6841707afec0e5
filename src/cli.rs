//! CLI definition using clap

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use weighbridge::model::FieldKind;
use weighbridge::weight_frame::Framing;

#[derive(Parser)]
#[command(name = "weighbridge")]
#[command(version)]
#[command(about = "Weighbridge ticketing: scale telemetry and ticket reconciliation")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory holding the database and logs
    #[arg(long, global = true, env = "WEIGHBRIDGE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log filter (RUST_LOG syntax); RUST_LOG itself takes precedence
    #[arg(long, global = true)]
    pub log_filter: Option<String>,

    /// Operator name recorded on tickets
    #[arg(long, short = 'o', global = true)]
    pub operator: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

/// Scale connection options shared by `monitor` and `weigh`.
#[derive(Args, Clone, Default)]
pub struct ScaleArgs {
    /// Serial port (e.g. COM3, /dev/ttyUSB0); defaults to the stored or first port
    #[arg(long, short = 'p')]
    pub port: Option<String>,

    /// Frame boundaries: chunk (as delivered) or line (newline-terminated)
    #[arg(long)]
    pub framing: Option<Framing>,
}

/// Ticket fields accepted by `submit` and `weigh`.
#[derive(Args, Clone, Default)]
pub struct FormArgs {
    #[arg(long, short = 'm')]
    pub material: Option<String>,

    #[arg(long, short = 'd')]
    pub destination: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,

    /// Custom field value, repeatable (e.g. --field haulier=Acme)
    #[arg(long = "field", value_name = "NAME=VALUE")]
    pub fields: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List serial ports
    Ports,

    /// Decode weight frames without a scale
    Parse {
        /// Raw frames, e.g. "ST,GS,    1200,kg"
        #[arg(required = true)]
        frames: Vec<String>,
    },

    /// Connect to the scale and print decoded weights until Ctrl-C
    Monitor {
        #[command(flatten)]
        scale: ScaleArgs,
    },

    /// Weigh a vehicle live: resolve, capture readings, submit on Ctrl-C
    Weigh {
        /// Vehicle registration
        vehicle: String,

        #[command(flatten)]
        scale: ScaleArgs,

        #[command(flatten)]
        form: FormArgs,

        /// Stop after this many readings instead of waiting for Ctrl-C
        #[arg(long)]
        readings: Option<usize>,
    },

    /// Show how a vehicle resolves (open partial, pre-registration, new)
    Resolve {
        vehicle: String,
    },

    /// Record a ticket from typed values
    Submit {
        /// Vehicle registration
        vehicle: String,

        #[command(flatten)]
        form: FormArgs,

        /// First weighing (kg)
        #[arg(long = "weight1")]
        first_weight: Option<String>,

        /// Second weighing (kg)
        #[arg(long = "weight2")]
        second_weight: Option<String>,
    },

    /// List tickets
    Tickets {
        /// Only open partial tickets
        #[arg(long)]
        partial: bool,
    },

    /// Print a ticket by ticket number or id
    Show {
        ticket: String,
    },

    /// Delete a ticket by id
    DeleteTicket {
        id: String,
    },

    /// Vehicle registrations containing TEXT
    Suggest {
        text: String,
    },

    /// Period report with optional CSV export
    Report {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Write CSV to this file or directory (use "-" for stdout)
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Manage pre-registered vehicles
    #[command(subcommand)]
    PreRegister(PreRegisterCommand),

    /// Manage materials and prices
    #[command(subcommand)]
    Materials(MaterialCommand),

    /// Manage destinations
    #[command(subcommand)]
    Destinations(DestinationCommand),

    /// Manage the operator form fields
    #[command(subcommand)]
    Fields(FieldCommand),

    /// Show or change stored settings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Version, build and store health
    Status,
}

#[derive(Subcommand)]
pub enum PreRegisterCommand {
    Add {
        vehicle: String,
        #[arg(long, short = 'm')]
        material: String,
        #[arg(long, short = 'd')]
        destination: String,
        #[arg(long = "weight1")]
        first_weight: f64,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
pub enum MaterialCommand {
    List,
    /// Add a material or update its price
    Set {
        name: String,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "kg")]
        unit: String,
    },
    Delete {
        name: String,
    },
}

#[derive(Subcommand)]
pub enum DestinationCommand {
    List,
    Add { name: String },
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum FieldCommand {
    List,
    /// Add a custom field or change an existing one
    Set {
        name: String,
        #[arg(long)]
        label: String,
        #[arg(long = "type", default_value = "text")]
        kind: FieldKind,
        #[arg(long)]
        required: bool,
        /// Choices for select fields, repeatable
        #[arg(long = "option")]
        options: Vec<String>,
        /// Display position; defaults to after the last field
        #[arg(long)]
        order: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Effective configuration
    Show,
    /// Store a setting (hardware.scale_port, hardware.scale_framing, ticket.prefix, operator.name)
    Set { key: String, value: String },
}

/// Split `NAME=VALUE`.
pub fn parse_field_arg(raw: &str) -> Option<(&str, &str)> {
    let (name, value) = raw.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value))
}
