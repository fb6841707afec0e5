//! Local SQLite store for the weighbridge.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings helpers,
//! the [`Ledger`] implementation backing the reconciler, and reference-data
//! maintenance (materials, destinations, field configuration).

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::ledger::Ledger;
use crate::model::{
    Destination, FieldConfig, FieldKind, Material, PreRegisteredVehicle, Transaction,
    TransactionStatus,
};

/// Open store shared by the CLI commands.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

pub const DB_FILE_NAME: &str = "weighbridge.db";

/// Initialize the database at `{data_dir}/weighbridge.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations.
pub fn init(data_dir: &Path) -> Result<DbState, StoreError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| StoreError::Invalid(format!("create data dir {}: {e}", data_dir.display())))?;

    let db_path = data_dir.join(DB_FILE_NAME);
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

impl DbState {
    /// Migrated in-memory store, for embedding and tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        run_migrations(&conn)?;
        Ok(DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reference-data snapshot for the reconciler.
    pub fn load_catalog(&self) -> Result<Catalog, StoreError> {
        load_catalog(&self.lock())
    }
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: ledger and reference-data tables.
fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        -- local_settings (category/key/value store)
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            ticket_number TEXT NOT NULL UNIQUE,
            vehicle_reg TEXT NOT NULL,
            material TEXT NOT NULL,
            destination TEXT NOT NULL,
            first_weight REAL NOT NULL,
            second_weight REAL,
            net_weight REAL,
            timestamp TEXT NOT NULL,
            operator_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('partial', 'complete')),
            notes TEXT,
            material_rate REAL,
            total_value REAL,
            extra_fields TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS pre_registrations (
            id TEXT PRIMARY KEY,
            vehicle_reg TEXT NOT NULL,
            material TEXT NOT NULL,
            destination TEXT NOT NULL,
            first_weight REAL NOT NULL,
            operator_name TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS materials (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            unit TEXT NOT NULL DEFAULT 'kg',
            price_per_unit REAL NOT NULL CHECK (price_per_unit >= 0)
        );

        CREATE TABLE IF NOT EXISTS destinations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS field_configs (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            label TEXT NOT NULL,
            field_type TEXT NOT NULL CHECK (field_type IN ('text', 'number', 'select')),
            required INTEGER NOT NULL DEFAULT 0,
            options TEXT NOT NULL DEFAULT '[]',
            display_order INTEGER NOT NULL DEFAULT 0
        );

        -- At most one open partial ticket per vehicle
        CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_one_partial
            ON transactions(vehicle_reg) WHERE status = 'partial';
        CREATE INDEX IF NOT EXISTS idx_transactions_vehicle ON transactions(vehicle_reg);
        CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp);
        CREATE INDEX IF NOT EXISTS idx_pre_registrations_vehicle ON pre_registrations(vehicle_reg);
        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key ON local_settings(setting_category, setting_key);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        StoreError::from(e)
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: seed default reference data.
fn migrate_v2(conn: &Connection) -> Result<(), StoreError> {
    let defaults = Catalog::defaults();
    immediate(conn, |conn| {
        for m in &defaults.materials {
            conn.execute(
                "INSERT OR IGNORE INTO materials (id, name, unit, price_per_unit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![m.id, m.name, m.unit, m.price_per_unit],
            )?;
        }
        for d in &defaults.destinations {
            conn.execute(
                "INSERT OR IGNORE INTO destinations (id, name) VALUES (?1, ?2)",
                params![d.id, d.name],
            )?;
        }
        for f in &defaults.fields {
            insert_field_config(conn, f)?;
        }
        conn.execute("INSERT INTO schema_version (version) VALUES (2)", [])?;
        Ok(())
    })
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        e
    })?;

    info!("Applied migration v2 (default reference data)");
    Ok(())
}

/// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling back
/// on any error.
fn immediate<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value. `Ok(None)` means the setting is unset.
pub fn get_setting(
    conn: &Connection,
    category: &str,
    key: &str,
) -> Result<Option<String>, StoreError> {
    let value = conn
        .query_row(
            "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// Get all settings grouped by category as JSON.
pub fn get_all_settings(conn: &Connection) -> Result<serde_json::Value, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT setting_category, setting_key, setting_value FROM local_settings ORDER BY setting_category, setting_key",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut result = serde_json::Map::new();
    for row in rows {
        let (cat, key, val) = row?;
        let category = result.entry(cat).or_insert_with(|| serde_json::json!({}));
        if let serde_json::Value::Object(ref mut map) = category {
            map.insert(key, serde_json::Value::String(val));
        }
    }

    Ok(serde_json::Value::Object(result))
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const TRANSACTION_COLUMNS: &str = "id, ticket_number, vehicle_reg, material, destination,
    first_weight, second_weight, net_weight, timestamp, operator_name, status, notes,
    material_rate, total_value, extra_fields";

const PRE_REGISTRATION_COLUMNS: &str =
    "id, vehicle_reg, material, destination, first_weight, operator_name, timestamp";

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

/// Raw `transactions` row before text columns are decoded.
struct TransactionRow {
    id: String,
    ticket_number: String,
    vehicle_reg: String,
    material: String,
    destination: String,
    first_weight: f64,
    second_weight: Option<f64>,
    net_weight: Option<f64>,
    timestamp: String,
    operator_name: String,
    status: String,
    notes: Option<String>,
    material_rate: Option<f64>,
    total_value: Option<f64>,
    extra_fields: String,
}

impl TransactionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ticket_number: row.get(1)?,
            vehicle_reg: row.get(2)?,
            material: row.get(3)?,
            destination: row.get(4)?,
            first_weight: row.get(5)?,
            second_weight: row.get(6)?,
            net_weight: row.get(7)?,
            timestamp: row.get(8)?,
            operator_name: row.get(9)?,
            status: row.get(10)?,
            notes: row.get(11)?,
            material_rate: row.get(12)?,
            total_value: row.get(13)?,
            extra_fields: row.get(14)?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status: TransactionStatus = row.status.parse().map_err(StoreError::Corrupt)?;
        let extra_fields: BTreeMap<String, String> = serde_json::from_str(&row.extra_fields)?;
        Ok(Transaction {
            timestamp: parse_timestamp(&row.timestamp)?,
            id: row.id,
            ticket_number: row.ticket_number,
            vehicle_reg: row.vehicle_reg,
            material: row.material,
            destination: row.destination,
            first_weight: row.first_weight,
            second_weight: row.second_weight,
            net_weight: row.net_weight,
            operator_name: row.operator_name,
            status,
            notes: row.notes,
            material_rate: row.material_rate,
            total_value: row.total_value,
            extra_fields,
        })
    }
}

/// Raw `pre_registrations` row before the timestamp is decoded.
struct PreRegistrationRow {
    id: String,
    vehicle_reg: String,
    material: String,
    destination: String,
    first_weight: f64,
    operator_name: String,
    timestamp: String,
}

impl PreRegistrationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            vehicle_reg: row.get(1)?,
            material: row.get(2)?,
            destination: row.get(3)?,
            first_weight: row.get(4)?,
            operator_name: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }
}

impl TryFrom<PreRegistrationRow> for PreRegisteredVehicle {
    type Error = StoreError;

    fn try_from(row: PreRegistrationRow) -> Result<Self, Self::Error> {
        Ok(PreRegisteredVehicle {
            timestamp: parse_timestamp(&row.timestamp)?,
            id: row.id,
            vehicle_reg: row.vehicle_reg,
            material: row.material,
            destination: row.destination,
            first_weight: row.first_weight,
            operator_name: row.operator_name,
        })
    }
}

fn query_transactions(
    conn: &Connection,
    where_clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Transaction>, StoreError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions {where_clause} ORDER BY rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, TransactionRow::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(Transaction::try_from(row?)?);
    }
    Ok(out)
}

fn query_pre_registrations(
    conn: &Connection,
    where_clause: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<PreRegisteredVehicle>, StoreError> {
    let sql = format!(
        "SELECT {PRE_REGISTRATION_COLUMNS} FROM pre_registrations {where_clause} ORDER BY rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, PreRegistrationRow::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(PreRegisteredVehicle::try_from(row?)?);
    }
    Ok(out)
}

/// Map the one-partial index violation to `DuplicatePartial`.
fn map_write_error(err: rusqlite::Error, vehicle_reg: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref msg)) = err {
        if failure.code == ErrorCode::ConstraintViolation && msg.contains("transactions.vehicle_reg")
        {
            return StoreError::DuplicatePartial(vehicle_reg.to_string());
        }
    }
    StoreError::Sqlite(err)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

impl Ledger for DbState {
    fn open_partial(&self, vehicle_reg: &str) -> Result<Option<Transaction>, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions
                     WHERE vehicle_reg = ?1 AND status = 'partial'"
                ),
                params![vehicle_reg],
                TransactionRow::from_row,
            )
            .optional()?;
        row.map(Transaction::try_from).transpose()
    }

    fn pre_registrations_for(
        &self,
        vehicle_reg: &str,
    ) -> Result<Vec<PreRegisteredVehicle>, StoreError> {
        query_pre_registrations(&self.lock(), "WHERE vehicle_reg = ?1", params![vehicle_reg])
    }

    fn pre_registrations(&self) -> Result<Vec<PreRegisteredVehicle>, StoreError> {
        query_pre_registrations(&self.lock(), "", params![])
    }

    fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        query_transactions(&self.lock(), "", params![])
    }

    fn append(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        let extra = serde_json::to_string(&tx.extra_fields)?;
        let conn = self.lock();
        immediate(&conn, |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO transactions ({TRANSACTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    tx.id,
                    tx.ticket_number,
                    tx.vehicle_reg,
                    tx.material,
                    tx.destination,
                    tx.first_weight,
                    tx.second_weight,
                    tx.net_weight,
                    format_timestamp(&tx.timestamp),
                    tx.operator_name,
                    tx.status.as_str(),
                    tx.notes,
                    tx.material_rate,
                    tx.total_value,
                    extra,
                ],
            )
            .map_err(|e| map_write_error(e, &tx.vehicle_reg))?;
            Ok(())
        })
    }

    fn replace(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        let extra = serde_json::to_string(&tx.extra_fields)?;
        let conn = self.lock();
        immediate(&conn, |conn| {
            let changed = conn
                .execute(
                    "UPDATE transactions SET
                        ticket_number = ?2, vehicle_reg = ?3, material = ?4, destination = ?5,
                        first_weight = ?6, second_weight = ?7, net_weight = ?8, timestamp = ?9,
                        operator_name = ?10, status = ?11, notes = ?12, material_rate = ?13,
                        total_value = ?14, extra_fields = ?15
                     WHERE id = ?1",
                    params![
                        tx.id,
                        tx.ticket_number,
                        tx.vehicle_reg,
                        tx.material,
                        tx.destination,
                        tx.first_weight,
                        tx.second_weight,
                        tx.net_weight,
                        format_timestamp(&tx.timestamp),
                        tx.operator_name,
                        tx.status.as_str(),
                        tx.notes,
                        tx.material_rate,
                        tx.total_value,
                        extra,
                    ],
                )
                .map_err(|e| map_write_error(e, &tx.vehicle_reg))?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("transaction {}", tx.id)));
            }
            Ok(())
        })
    }

    fn delete_transaction(&mut self, id: &str) -> Result<bool, StoreError> {
        let changed = self
            .lock()
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn add_pre_registration(&mut self, record: &PreRegisteredVehicle) -> Result<(), StoreError> {
        self.lock().execute(
            &format!(
                "INSERT INTO pre_registrations ({PRE_REGISTRATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                record.id,
                record.vehicle_reg,
                record.material,
                record.destination,
                record.first_weight,
                record.operator_name,
                format_timestamp(&record.timestamp),
            ],
        )?;
        Ok(())
    }

    fn delete_pre_registration(&mut self, id: &str) -> Result<bool, StoreError> {
        let changed = self
            .lock()
            .execute("DELETE FROM pre_registrations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

/// Transactions with `start <= timestamp <= end`, oldest first.
pub fn transactions_between(
    conn: &Connection,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Transaction>, StoreError> {
    let (start, end) = (format_timestamp(&start), format_timestamp(&end));
    query_transactions(
        conn,
        "WHERE timestamp >= ?1 AND timestamp <= ?2",
        params![start, end],
    )
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

pub fn load_catalog(conn: &Connection) -> Result<Catalog, StoreError> {
    Ok(Catalog {
        fields: list_field_configs(conn)?,
        materials: list_materials(conn)?,
        destinations: list_destinations(conn)?,
    })
}

pub fn list_materials(conn: &Connection) -> Result<Vec<Material>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, name, unit, price_per_unit FROM materials ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Material {
            id: row.get(0)?,
            name: row.get(1)?,
            unit: row.get(2)?,
            price_per_unit: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Add a material, or update unit and price when the name exists.
pub fn upsert_material(
    conn: &Connection,
    name: &str,
    unit: &str,
    price_per_unit: f64,
) -> Result<Material, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Invalid("material name is empty".into()));
    }
    if !price_per_unit.is_finite() || price_per_unit < 0.0 {
        return Err(StoreError::Invalid(format!(
            "price for {name} must be non-negative, got {price_per_unit}"
        )));
    }
    conn.execute(
        "INSERT INTO materials (id, name, unit, price_per_unit) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET unit = excluded.unit, price_per_unit = excluded.price_per_unit",
        params![uuid::Uuid::new_v4().to_string(), name, unit, price_per_unit],
    )?;
    let material = conn.query_row(
        "SELECT id, name, unit, price_per_unit FROM materials WHERE name = ?1",
        params![name],
        |row| {
            Ok(Material {
                id: row.get(0)?,
                name: row.get(1)?,
                unit: row.get(2)?,
                price_per_unit: row.get(3)?,
            })
        },
    )?;
    info!(material = %material.name, price = material.price_per_unit, "Material saved");
    Ok(material)
}

pub fn delete_material(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    Ok(conn.execute("DELETE FROM materials WHERE name = ?1", params![name.trim()])? > 0)
}

pub fn list_destinations(conn: &Connection) -> Result<Vec<Destination>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name FROM destinations ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Destination {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn add_destination(conn: &Connection, name: &str) -> Result<Destination, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Invalid("destination name is empty".into()));
    }
    let destination = Destination {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
    };
    conn.execute(
        "INSERT INTO destinations (id, name) VALUES (?1, ?2)",
        params![destination.id, destination.name],
    )?;
    Ok(destination)
}

pub fn delete_destination(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    Ok(conn.execute("DELETE FROM destinations WHERE name = ?1", params![name.trim()])? > 0)
}

pub fn list_field_configs(conn: &Connection) -> Result<Vec<FieldConfig>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, label, field_type, required, options, display_order
         FROM field_configs ORDER BY display_order, name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, bool>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, name, label, kind, required, options, order) = row?;
        out.push(FieldConfig {
            id,
            name,
            label,
            kind: kind.parse::<FieldKind>().map_err(StoreError::Corrupt)?,
            required,
            options: serde_json::from_str(&options)?,
            order,
        });
    }
    Ok(out)
}

fn insert_field_config(conn: &Connection, field: &FieldConfig) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO field_configs (id, name, label, field_type, required, options, display_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(name) DO UPDATE SET
            label = excluded.label,
            field_type = excluded.field_type,
            required = excluded.required,
            options = excluded.options,
            display_order = excluded.display_order",
        params![
            field.id,
            field.name,
            field.label,
            field.kind.as_str(),
            field.required,
            serde_json::to_string(&field.options)?,
            field.order,
        ],
    )?;
    Ok(())
}

/// Add or update an operator form field.
pub fn save_field_config(conn: &Connection, field: &FieldConfig) -> Result<(), StoreError> {
    if field.name.trim().is_empty() || field.label.trim().is_empty() {
        return Err(StoreError::Invalid("field name and label are required".into()));
    }
    insert_field_config(conn, field)?;
    info!(field = %field.name, required = field.required, "Field configuration saved");
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================
