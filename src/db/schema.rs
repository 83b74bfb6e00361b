//! Versioned schema migrations, tracked in `schema_migrations`.

use anyhow::{Context, Result};
use rusqlite::Connection;

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "001",
    name: "initial",
    sql: include_str!("migrations/001_initial.sql"),
}];

/// Bring the schema up to date. Safe to call on every start.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let applied = get_applied_migrations(conn)?;
    let pending = MIGRATIONS
        .iter()
        .filter(|m| !applied.iter().any(|v| v == m.version));

    for migration in pending {
        apply_migration(conn, migration)?;
    }
    Ok(())
}

fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

/// The migration and its `schema_migrations` row commit together or not at all.
fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let label = format!("{} ({})", migration.version, migration.name);
    tracing::info!("Applying migration {}", label);

    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)
        .with_context(|| format!("Failed to apply migration {}", label))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (
            migration.version,
            migration.name,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    tx.commit()
        .with_context(|| format!("Failed to commit migration {}", label))?;

    tracing::info!("Migration {} applied", migration.version);
    Ok(())
}
