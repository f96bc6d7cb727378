//! SQLite storage layer for the order processor.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations and the [`Store`]
//! session factory: callers obtain an explicit connection via
//! [`Store::session`] and pass it into the transaction coordinator instead of
//! reaching into shared state.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::OrderError;

/// Connection provider handed to embedding code.
pub struct Store {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl Store {
    /// Acquire the transactable session the coordinator works on.
    pub fn session(&self) -> Result<MutexGuard<'_, Connection>, OrderError> {
        self.conn
            .lock()
            .map_err(|e| OrderError::Session(e.to_string()))
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 4;

/// Initialize the database at `{data_dir}/orders.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(data_dir: &Path) -> Result<Store, OrderError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| OrderError::Session(format!("create data dir: {e}")))?;

    let db_path = data_dir.join("orders.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let wal = db_path.with_extension("db-wal");
                let shm = db_path.with_extension("db-shm");
                let _ = fs::remove_file(&wal);
                let _ = fs::remove_file(&shm);
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(Store {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, OrderError> {
    let conn = Connection::open(path).map_err(OrderError::store("sqlite open"))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(OrderError::store("pragma setup"))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), OrderError> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(OrderError::store("create schema_version"))?;

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
    if current < 3 {
        migrate_v3(conn)?;
    }
    if current < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

/// Migration v1: master data, order headers, lines, and printer routing.
fn migrate_v1(conn: &Connection) -> Result<(), OrderError> {
    conn.execute_batch(
        "
        -- customers (long-lived, deduplicated by name + normalized contact;
        -- contact_alt keeps the second phone column carried over from the
        -- legacy schema, still consulted on lookup)
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            address TEXT DEFAULT '',
            contact TEXT DEFAULT '',
            contact_alt TEXT DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_customers_name ON customers(name);

        -- dining_tables (occupancy recomputed after seat mutations)
        CREATE TABLE IF NOT EXISTS dining_tables (
            id INTEGER PRIMARY KEY,
            floor TEXT DEFAULT '',
            code TEXT DEFAULT '',
            name TEXT NOT NULL,
            capacity INTEGER NOT NULL DEFAULT 0,
            remarks TEXT DEFAULT '',
            status TEXT NOT NULL DEFAULT 'free' CHECK(status IN ('free','partial','full')),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- seats (status: 0 = free, 1 = occupied)
        CREATE TABLE IF NOT EXISTS seats (
            id INTEGER PRIMARY KEY,
            table_id INTEGER NOT NULL REFERENCES dining_tables(id) ON DELETE CASCADE,
            label TEXT NOT NULL,
            remarks TEXT DEFAULT '',
            status INTEGER NOT NULL DEFAULT 0 CHECK(status IN (0,1)),
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_seats_table ON seats(table_id);

        -- menu_items (printer column drives line routing; empty = unconfigured)
        CREATE TABLE IF NOT EXISTS menu_items (
            code INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            localized_name TEXT DEFAULT '',
            printer TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );

        -- orders (header; order_no is allocated by the processor)
        CREATE TABLE IF NOT EXISTS orders (
            order_no INTEGER PRIMARY KEY,
            order_date TEXT NOT NULL,
            order_time TEXT NOT NULL,
            order_type INTEGER NOT NULL CHECK(order_type IN (1,2,3)),
            customer_id INTEGER NOT NULL DEFAULT 0,
            flat_no TEXT DEFAULT '',
            address TEXT DEFAULT '',
            contact TEXT DEFAULT '',
            delivery_agent_id INTEGER NOT NULL DEFAULT 0,
            table_id INTEGER NOT NULL DEFAULT 0,
            table_label TEXT DEFAULT '',
            seat_id INTEGER,
            remarks TEXT DEFAULT '',
            total REAL NOT NULL DEFAULT 0,
            sold INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'open',
            prefix TEXT DEFAULT '',
            prefixed_no TEXT DEFAULT '',
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_orders_date_customer
            ON orders(order_date, order_time, customer_id);

        -- order_items (fully replaced whenever an order is rewritten)
        CREATE TABLE IF NOT EXISTS order_items (
            order_no INTEGER NOT NULL REFERENCES orders(order_no) ON DELETE CASCADE,
            sl_no INTEGER NOT NULL,
            item_code INTEGER NOT NULL,
            item_name TEXT NOT NULL,
            qty REAL NOT NULL DEFAULT 0,
            rate REAL NOT NULL DEFAULT 0,
            amount REAL NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            vat REAL NOT NULL DEFAULT 0,
            vat_amount REAL NOT NULL DEFAULT 0,
            tax_ledger INTEGER NOT NULL DEFAULT 0,
            notes TEXT DEFAULT '',
            created_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (order_no, sl_no)
        );

        -- printer_assignments (no FK on order_no: KOT routing may precede
        -- the billing header)
        CREATE TABLE IF NOT EXISTS printer_assignments (
            order_no INTEGER NOT NULL,
            sl_no INTEGER NOT NULL,
            item_code INTEGER NOT NULL,
            printer TEXT NOT NULL DEFAULT '',
            created_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (order_no, sl_no)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        OrderError::store("migration v1")(e)
    })?;

    info!("Applied migration v1 (master data + order tables)");
    Ok(())
}

/// Migration v2: seat claims, counter-staged selections, and draft staging.
fn migrate_v2(conn: &Connection) -> Result<(), OrderError> {
    conn.execute_batch(
        "
        -- order_seats (labels copied from the seat master rows, never
        -- taken from the client)
        CREATE TABLE IF NOT EXISTS order_seats (
            order_no INTEGER NOT NULL,
            seat_id INTEGER NOT NULL,
            seat_label TEXT NOT NULL DEFAULT '',
            table_id INTEGER NOT NULL DEFAULT 0,
            counter TEXT NOT NULL DEFAULT '',
            created_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (order_no, seat_id)
        );
        CREATE INDEX IF NOT EXISTS idx_order_seats_table ON order_seats(table_id);

        -- staged_seats (terminal-scoped selections made before the order exists;
        -- consumed when converted into order_seats rows)
        CREATE TABLE IF NOT EXISTS staged_seats (
            counter TEXT NOT NULL,
            seat_id INTEGER NOT NULL,
            table_id INTEGER NOT NULL DEFAULT 0,
            staged_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (counter, seat_id)
        );

        -- held_orders (draft staging purged when the draft becomes a NEW order)
        CREATE TABLE IF NOT EXISTS held_orders (
            id INTEGER PRIMARY KEY,
            label TEXT DEFAULT '',
            customer_name TEXT DEFAULT '',
            table_id INTEGER NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );
        CREATE TABLE IF NOT EXISTS held_order_items (
            held_id INTEGER NOT NULL REFERENCES held_orders(id) ON DELETE CASCADE,
            sl_no INTEGER NOT NULL,
            item_code INTEGER NOT NULL,
            qty REAL NOT NULL DEFAULT 0,
            rate REAL NOT NULL DEFAULT 0,
            amount REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (held_id, sl_no)
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        OrderError::store("migration v2")(e)
    })?;

    info!("Applied migration v2 (seat assignments + staging tables)");
    Ok(())
}

/// Migration v3: kitchen-ticket snapshots and localized item names.
///
/// KOT headers/lines mirror the order shape but record what was sent to the
/// kitchen at a point in time; the live order keeps its own lines. Also adds
/// `localized_name` to order lines and a `kind` marker to the header.
fn migrate_v3(conn: &Connection) -> Result<(), OrderError> {
    if !column_exists(conn, "order_items", "localized_name")? {
        conn.execute_batch("ALTER TABLE order_items ADD COLUMN localized_name TEXT DEFAULT '';")
            .map_err(OrderError::store("migration v3 add localized_name"))?;
    }

    if !column_exists(conn, "orders", "kind")? {
        conn.execute_batch("ALTER TABLE orders ADD COLUMN kind TEXT NOT NULL DEFAULT 'order';")
            .map_err(OrderError::store("migration v3 add kind"))?;
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kot_orders (
            kot_no INTEGER PRIMARY KEY AUTOINCREMENT,
            order_no INTEGER NOT NULL,
            kot_date TEXT NOT NULL,
            kot_time TEXT NOT NULL,
            order_type INTEGER NOT NULL DEFAULT 2,
            customer_id INTEGER NOT NULL DEFAULT 0,
            contact TEXT DEFAULT '',
            table_id INTEGER NOT NULL DEFAULT 0,
            table_label TEXT DEFAULT '',
            seat_id INTEGER,
            remarks TEXT DEFAULT '',
            total REAL NOT NULL DEFAULT 0,
            created_at TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_kot_orders_order ON kot_orders(order_no);

        CREATE TABLE IF NOT EXISTS kot_items (
            kot_no INTEGER NOT NULL REFERENCES kot_orders(kot_no) ON DELETE CASCADE,
            sl_no INTEGER NOT NULL,
            item_code INTEGER NOT NULL,
            item_name TEXT NOT NULL,
            localized_name TEXT DEFAULT '',
            qty REAL NOT NULL DEFAULT 0,
            rate REAL NOT NULL DEFAULT 0,
            amount REAL NOT NULL DEFAULT 0,
            notes TEXT DEFAULT '',
            PRIMARY KEY (kot_no, sl_no)
        );

        INSERT INTO schema_version (version) VALUES (3);
        ",
    )
    .map_err(|e| {
        error!("Migration v3 failed: {e}");
        OrderError::store("migration v3")(e)
    })?;

    info!("Applied migration v3 (KOT snapshots + localized names)");
    Ok(())
}

/// Migration v4: dedicated order-number sequence.
///
/// Replaces MAX+1 scans over `orders` with a single-row counter read and
/// bumped inside the submission transaction, so two submissions can no
/// longer compute the same candidate number. Seeded past the highest
/// existing order so numbering continues an existing dataset.
fn migrate_v4(conn: &Connection) -> Result<(), OrderError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS order_sequence (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            next_no INTEGER NOT NULL
        );
        INSERT INTO order_sequence (id, next_no)
        SELECT 1, COALESCE(MAX(order_no), 0) + 1 FROM orders
        WHERE NOT EXISTS (SELECT 1 FROM order_sequence WHERE id = 1);

        INSERT INTO schema_version (version) VALUES (4);
        ",
    )
    .map_err(|e| {
        error!("Migration v4 failed: {e}");
        OrderError::store("migration v4")(e)
    })?;

    info!("Applied migration v4 (order_sequence counter)");
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, OrderError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(OrderError::store("table_info prepare"))?;
    let mut rows = stmt
        .query([])
        .map_err(OrderError::store("table_info query"))?;
    while let Some(row) = rows.next().map_err(OrderError::store("table_info next"))? {
        let name: String = row.get(1).map_err(OrderError::store("table_info name"))?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================
