use anyhow::Result;
use diesel::{
    Connection, PgConnection,
    connection::{CacheSize, SimpleConnection},
    r2d2::{ConnectionManager, CustomizeConnection, Error as R2d2Error, Pool},
};

#[derive(Debug)]
struct SessionSetup {
    lock_timeout_ms: u64,
}

impl CustomizeConnection<PgConnection, R2d2Error> for SessionSetup {
    fn on_acquire(&self, conn: &mut PgConnection) -> std::result::Result<(), R2d2Error> {
        conn.set_prepared_statement_cache_size(CacheSize::Disabled);
        // A contested payment/user row must surface as a retryable conflict instead of
        // blocking a request forever.
        conn.batch_execute(&format!("SET lock_timeout = '{}ms'", self.lock_timeout_ms))
            .map_err(R2d2Error::QueryError)?;
        Ok(())
    }
}

pub type PgPoolSquad = Pool<ConnectionManager<PgConnection>>;

pub fn establish_connection(database_url: &str, lock_timeout_ms: u64) -> Result<PgPoolSquad> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .connection_customizer(Box::new(SessionSetup { lock_timeout_ms }))
        .build(manager)?;
    Ok(pool)
}
