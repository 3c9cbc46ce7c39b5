use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const SCHEMAS: &[(&str, &str)] = &[(
    "schema_v1.sql",
    include_str!("schemas/schema_v1.sql"),
)];

fn current_version() -> i32 {
    SCHEMAS.len() as i32
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let stored: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;
    let target = current_version();

    if stored > target {
        bail!("database version ({stored}) is newer than supported schema ({target})");
    }

    let pending = &SCHEMAS[stored.max(0) as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;
    for (name, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to execute {name}"))?;
    }
    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}
