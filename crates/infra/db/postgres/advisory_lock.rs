use anyhow::Result;
use diesel::{
    PgConnection, QueryableByName, RunQueryDsl,
    sql_query,
    sql_types::{BigInt, Bool},
};

#[derive(QueryableByName)]
struct LockResult {
    #[diesel(sql_type = Bool)]
    acquired: bool,
}

/// Session-level advisory lock. Held until [`release`] or until the connection closes,
/// so callers must keep the same pooled connection for the whole critical section.
pub fn try_acquire(conn: &mut PgConnection, key: i64) -> Result<bool> {
    let result = sql_query("SELECT pg_try_advisory_lock($1) AS acquired")
        .bind::<BigInt, _>(key)
        .get_result::<LockResult>(conn)?;
    Ok(result.acquired)
}

pub fn release(conn: &mut PgConnection, key: i64) -> Result<bool> {
    let result = sql_query("SELECT pg_advisory_unlock($1) AS acquired")
        .bind::<BigInt, _>(key)
        .get_result::<LockResult>(conn)?;
    Ok(result.acquired)
}
