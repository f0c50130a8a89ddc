use anyhow::{bail, Context, Result};
use rusqlite::{params, types::Type, Connection};
use tracing::info;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
        }
    }

    fn from_sql(declared: &str) -> Option<&'static SqlType> {
        match declared {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            _ => None,
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<S>,
    pub foreign_key: Option<&'a ForeignKey>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    fn create_sql(&self) -> String {
        let mut column_defs = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            let mut def = format!("{} {}", column.name, column.sql_type.as_sql());
            if column.is_primary_key {
                def.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                def.push_str(" NOT NULL");
            }
            if column.is_unique {
                def.push_str(" UNIQUE");
            }
            if let Some(default_value) = column.default_value {
                def.push_str(&format!(" DEFAULT {}", default_value));
            }
            if let Some(foreign_key) = column.foreign_key {
                def.push_str(&format!(
                    " REFERENCES {}({}) ON DELETE {}",
                    foreign_key.foreign_table,
                    foreign_key.foreign_column,
                    foreign_key.on_delete.as_sql()
                ));
            }
            column_defs.push(def);
        }
        for unique_constraint in self.unique_constraints {
            column_defs.push(format!("UNIQUE ({})", unique_constraint.join(", ")));
        }
        format!("CREATE TABLE {} ({});", self.name, column_defs.join(", "))
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])
            .with_context(|| format!("Failed to create table {}", self.name))?;
        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                params![],
            )?;
        }
        Ok(())
    }

    fn validate_columns(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns = stmt
            .query_map(params![], |row| {
                let declared: String = row.get(2)?;
                let sql_type = SqlType::from_sql(&declared).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(2, declared.clone(), Type::Text)
                })?;
                Ok(Column {
                    name: row.get::<_, String>(1)?,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                    is_unique: false,
                    foreign_key: None,
                })
            })?
            .collect::<rusqlite::Result<Vec<Column<'_, String>>>>()
            .with_context(|| format!("Failed to read columns of table {}", self.name))?;

        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != expected.sql_type
                || actual.non_null != expected.non_null
                || actual.is_primary_key != expected.is_primary_key
            {
                bail!(
                    "Table {} column {} definition mismatch: expected {:?} non_null={} pk={}, got {:?} non_null={} pk={}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    expected.non_null,
                    expected.is_primary_key,
                    actual.sql_type,
                    actual.non_null,
                    actual.is_primary_key
                );
            }
            // Default values might be wrapped in parentheses
            if actual.default_value.as_deref().map(strip_parentheses)
                != expected.default_value.map(strip_parentheses)
            {
                bail!(
                    "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection) -> Result<()> {
        for (index_name, _columns) in self.indices {
            let index_exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }

    /// SQLite stores unique constraints as indices flagged unique in `PRAGMA index_list`.
    fn validate_unique_constraints(&self, conn: &Connection) -> Result<()> {
        if self.unique_constraints.is_empty() {
            return Ok(());
        }
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
            .filter_map(|r| r.ok())
            .filter(|(_, is_unique)| *is_unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut unique_column_sets: Vec<Vec<String>> = Vec::with_capacity(unique_indices.len());
        for index_name in &unique_indices {
            let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut cols: Vec<String> = idx_stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            cols.sort();
            unique_column_sets.push(cols);
        }

        for expected_columns in self.unique_constraints {
            let mut expected: Vec<&str> = expected_columns.to_vec();
            expected.sort();
            let found = unique_column_sets
                .iter()
                .any(|actual| actual.iter().map(String::as_str).eq(expected.iter().copied()));
            if !found {
                bail!(
                    "Table {} is missing unique constraint on columns ({})",
                    self.name,
                    expected_columns.join(", ")
                );
            }
        }
        Ok(())
    }

    fn validate_foreign_keys(&self, conn: &Connection) -> Result<()> {
        // PRAGMA foreign_key_list returns: id, seq, table, from, to, on_update, on_delete, match
        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", self.name))?;
        let actual_fks: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(3)?, row.get(2)?, row.get(4)?, row.get(6)?)))?
            .filter_map(|r| r.ok())
            .collect();

        for column in self.columns {
            let Some(expected) = column.foreign_key else {
                continue;
            };
            let on_delete = expected.on_delete.as_sql();
            let matches = actual_fks.iter().any(|(from, table, to, action)| {
                from == column.name
                    && table == expected.foreign_table
                    && to == expected.foreign_column
                    && action == on_delete
            });
            if matches {
                continue;
            }
            match actual_fks.iter().find(|(from, ..)| from == column.name) {
                Some((_, table, to, action)) => bail!(
                    "Table {} column {} has foreign key mismatch: expected REFERENCES {}({}) ON DELETE {}, got REFERENCES {}({}) ON DELETE {}",
                    self.name,
                    column.name,
                    expected.foreign_table,
                    expected.foreign_column,
                    on_delete,
                    table,
                    to,
                    action
                ),
                None => bail!(
                    "Table {} column {} is missing foreign key: expected REFERENCES {}({}) ON DELETE {}",
                    self.name,
                    column.name,
                    expected.foreign_table,
                    expected.foreign_column,
                    on_delete
                ),
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_parentheses(s: &str) -> String {
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate_columns(conn)?;
            table.validate_indices(conn)?;
            table.validate_unique_constraints(conn)?;
            table.validate_foreign_keys(conn)?;
        }
        Ok(())
    }
}

pub const BASE_DB_VERSION: usize = 99999;

/// Brings `conn` to the last schema of `schemas`.
///
/// An empty database is created at the latest version directly. An existing
/// one is validated against the schema matching its `user_version` and then
/// migrated forward inside a single transaction.
pub fn open_versioned(conn: &mut Connection, schemas: &[VersionedSchema], label: &str) -> Result<()> {
    let latest = schemas
        .last()
        .with_context(|| format!("No schema defined for {} database", label))?;

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;
    if table_count == 0 {
        info!("Creating {} database at schema version {}", label, latest.version);
        return latest.create(conn);
    }

    let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let db_version = raw_version - BASE_DB_VERSION as i64;
    if db_version < 1 {
        bail!(
            "{} database version {} is invalid (expected >= 1)",
            label,
            db_version
        );
    }
    let db_version = db_version as usize;

    schemas
        .iter()
        .find(|s| s.version == db_version)
        .with_context(|| format!("Unknown {} database version {}", label, db_version))?
        .validate(conn)
        .with_context(|| {
            format!(
                "{} database schema validation failed for version {}",
                label, db_version
            )
        })?;

    if db_version >= latest.version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut current = db_version;
    for schema in schemas.iter().filter(|s| s.version > db_version) {
        info!(
            "Migrating {} database from version {} to {}",
            label, current, schema.version
        );
        if let Some(migration_fn) = schema.migration {
            migration_fn(&tx).with_context(|| {
                format!("Failed to run migration to version {}", schema.version)
            })?;
        }
        current = schema.version;
    }
    tx.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + current),
        [],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKS_TABLE: Table = Table {
        name: "tracks",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("external_id", &SqlType::Text, non_null = true, is_unique = true),
        ],
        indices: &[],
        unique_constraints: &[],
    };

    const TRACK_FK: ForeignKey = ForeignKey {
        foreign_table: "tracks",
        foreign_column: "id",
        on_delete: ForeignKeyOnChange::Cascade,
    };

    const PLAYS_TABLE: Table = Table {
        name: "plays",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!(
                "track_id",
                &SqlType::Integer,
                non_null = true,
                foreign_key = Some(&TRACK_FK)
            ),
            sqlite_column!("played_at", &SqlType::Text, non_null = true),
            sqlite_column!("source", &SqlType::Text, default_value = Some("'api'")),
        ],
        indices: &[("idx_plays_played_at", "played_at")],
        unique_constraints: &[&["track_id", "played_at"]],
    };

    const SCHEMA_V1: VersionedSchema = VersionedSchema {
        version: 1,
        tables: &[TRACKS_TABLE, PLAYS_TABLE],
        migration: None,
    };

    fn create_tracks(conn: &Connection) {
        conn.execute(
            "CREATE TABLE tracks (id INTEGER PRIMARY KEY, external_id TEXT NOT NULL UNIQUE)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_created_schema_validates() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMA_V1.create(&conn).unwrap();
        SCHEMA_V1.validate(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version as usize, BASE_DB_VERSION + 1);
    }

    #[test]
    fn test_validate_detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        create_tracks(&conn);
        conn.execute(
            "CREATE TABLE plays (
                id INTEGER PRIMARY KEY,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                played_at TEXT NOT NULL,
                source TEXT DEFAULT 'api',
                UNIQUE (track_id, played_at)
            )",
            [],
        )
        .unwrap();

        let err = SCHEMA_V1.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
        assert!(err.contains("idx_plays_played_at"));
    }

    #[test]
    fn test_validate_detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        create_tracks(&conn);
        conn.execute(
            "CREATE TABLE plays (
                id INTEGER PRIMARY KEY,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                played_at TEXT NOT NULL,
                source TEXT DEFAULT 'api'
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_plays_played_at ON plays(played_at)", [])
            .unwrap();

        let err = SCHEMA_V1.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing unique constraint"));
        assert!(err.contains("track_id, played_at"));
    }

    #[test]
    fn test_unique_constraint_column_order_independent() {
        let conn = Connection::open_in_memory().unwrap();
        create_tracks(&conn);
        conn.execute(
            "CREATE TABLE plays (
                id INTEGER PRIMARY KEY,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                played_at TEXT NOT NULL,
                source TEXT DEFAULT 'api',
                UNIQUE (played_at, track_id)
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_plays_played_at ON plays(played_at)", [])
            .unwrap();

        SCHEMA_V1.validate(&conn).unwrap();
    }

    #[test]
    fn test_validate_detects_wrong_on_delete_action() {
        let conn = Connection::open_in_memory().unwrap();
        create_tracks(&conn);
        conn.execute(
            "CREATE TABLE plays (
                id INTEGER PRIMARY KEY,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE RESTRICT,
                played_at TEXT NOT NULL,
                source TEXT DEFAULT 'api',
                UNIQUE (track_id, played_at)
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_plays_played_at ON plays(played_at)", [])
            .unwrap();

        let err = SCHEMA_V1.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("foreign key mismatch"));
        assert!(err.contains("CASCADE"));
        assert!(err.contains("RESTRICT"));
    }

    #[test]
    fn test_validate_detects_default_value_mismatch() {
        let conn = Connection::open_in_memory().unwrap();
        create_tracks(&conn);
        conn.execute(
            "CREATE TABLE plays (
                id INTEGER PRIMARY KEY,
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                played_at TEXT NOT NULL,
                source TEXT DEFAULT 'import',
                UNIQUE (track_id, played_at)
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE INDEX idx_plays_played_at ON plays(played_at)", [])
            .unwrap();

        let err = SCHEMA_V1.validate(&conn).unwrap_err().to_string();
        assert!(err.contains("default value mismatch"));
    }

    fn add_notes_table(conn: &Connection) -> Result<()> {
        conn.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", [])?;
        Ok(())
    }

    const NOTES_TABLE: Table = Table {
        name: "notes",
        columns: &[
            sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
            sqlite_column!("body", &SqlType::Text),
        ],
        indices: &[],
        unique_constraints: &[],
    };

    const SCHEMAS: &[VersionedSchema] = &[
        SCHEMA_V1,
        VersionedSchema {
            version: 2,
            tables: &[TRACKS_TABLE, PLAYS_TABLE, NOTES_TABLE],
            migration: Some(add_notes_table),
        },
    ];

    #[test]
    fn test_open_versioned_migrates_forward() {
        let mut conn = Connection::open_in_memory().unwrap();
        SCHEMA_V1.create(&conn).unwrap();

        open_versioned(&mut conn, SCHEMAS, "test").unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version as usize, BASE_DB_VERSION + 2);
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn test_open_versioned_creates_latest_on_empty_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        open_versioned(&mut conn, SCHEMAS, "test").unwrap();
        SCHEMAS[1].validate(&conn).unwrap();
    }

    #[test]
    fn test_open_versioned_rejects_unversioned_db() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_tracks(&conn);
        let err = open_versioned(&mut conn, SCHEMAS, "test")
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid"));
    }
}
