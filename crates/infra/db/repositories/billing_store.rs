use diesel::{Connection, PgConnection};
use std::sync::Arc;

use crate::{
    domain::repositories::transaction::TransactionManager,
    infra::db::postgres::postgres_connection::PgPoolSquad,
};

pub struct BillingPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl BillingPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Lets a closure's own error type travel through `Connection::transaction`, which insists
/// on `From<diesel::result::Error>`.
enum TxError<E> {
    Domain(E),
    Diesel(diesel::result::Error),
}

impl<E> From<diesel::result::Error> for TxError<E> {
    fn from(value: diesel::result::Error) -> Self {
        TxError::Diesel(value)
    }
}

impl TransactionManager for BillingPostgres {
    type Tx = PgConnection;

    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut pooled = Arc::clone(&self.db_pool)
            .get()
            .map_err(|err| E::from(anyhow::Error::from(err)))?;
        let conn: &mut PgConnection = &mut pooled;

        conn.transaction::<T, TxError<E>, _>(|tx| f(tx).map_err(TxError::Domain))
            .map_err(|err| match err {
                TxError::Domain(err) => err,
                TxError::Diesel(err) => E::from(anyhow::Error::from(err)),
            })
    }
}
