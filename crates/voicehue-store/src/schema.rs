//! Database schema.

use rusqlite_migration::{M, Migrations};

const CREATE_COLORS: &str = "
CREATE TABLE colors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    red REAL NOT NULL CHECK (red BETWEEN 0 AND 255),
    green REAL NOT NULL CHECK (green BETWEEN 0 AND 255),
    blue REAL NOT NULL CHECK (blue BETWEEN 0 AND 255),
    created_at INTEGER NOT NULL
);
CREATE INDEX colors_created_at ON colors (created_at, id);
";

pub(crate) fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(CREATE_COLORS)])
}
