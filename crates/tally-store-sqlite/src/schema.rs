//! SQL schema for the Tally SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- First-writer-wins dedupe markers. One row per dedupe key, inserted once
-- and never updated; the PRIMARY KEY makes the race resolve to one winner.
-- `owner` is the file id whose validation created the marker, so a
-- redelivery of that same event can be told apart from a true duplicate.
CREATE TABLE IF NOT EXISTS dedupe_markers (
    key        TEXT PRIMARY KEY,
    owner      TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Monthly ledger rows, append-only. `seq` preserves append order within a
-- month; `image_hash` is the idempotency boundary for whole receipts.
CREATE TABLE IF NOT EXISTS ledger_rows (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    month_key      TEXT NOT NULL,
    date           TEXT,
    vendor         TEXT,
    item           TEXT,
    qty            REAL,
    unit_price     REAL,
    line_total     REAL,
    subtotal       REAL,
    tax            REAL,
    total          REAL,
    currency       TEXT NOT NULL,
    payment_method TEXT,
    receipt_id     TEXT,
    image_hash     TEXT,
    status         TEXT NOT NULL,   -- 'OK' | 'NEEDS_REVIEW'
    notes          TEXT NOT NULL DEFAULT '',
    file_link      TEXT NOT NULL DEFAULT ''
);

-- One aggregate per month. Always overwritten with a fresh recompute from
-- ledger_rows, never incremented.
CREATE TABLE IF NOT EXISTS ledger_totals (
    month_key  TEXT PRIMARY KEY,
    total      REAL NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS ledger_rows_month_idx ON ledger_rows(month_key);
CREATE INDEX IF NOT EXISTS ledger_rows_hash_idx  ON ledger_rows(month_key, image_hash);

PRAGMA user_version = 1;
";
