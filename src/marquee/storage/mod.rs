//! PostgreSQL access. Every value is bound as a parameter; the only text ever
//! formatted into SQL is a fixed `ORDER BY` clause or an identifier that has
//! already passed the validator's identifier check.

pub mod favorites;
pub mod movies;
pub mod sessions;
pub mod users;

use crate::marquee::validator::UniqueLookup;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::future::Future;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Create tables and indexes if they do not exist yet.
///
/// # Errors
/// Returns an error if any schema statement fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .context("failed to apply database schema")?;
    Ok(())
}

impl UniqueLookup for PgPool {
    fn count_matching(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send {
        let sql = format!(r#"SELECT COUNT(*) FROM "{table}" WHERE "{column}" = $1"#);
        let value = value.to_string();
        async move {
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(value)
                .fetch_one(self)
                .await
        }
    }
}

/// `23505`, e.g. a second account for the same email.
#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
