use diesel_async::pooled_connection::deadpool::{BuildError, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

pub type DbPool = Pool<AsyncPgConnection>;

/// Maximum number of pooled Postgres connections shared by all chat sockets.
const MAX_POOL_SIZE: usize = 20;

/// Create a Diesel async connection pool.
///
/// Connections are established lazily, so this only fails on a bad builder
/// configuration, never on an unreachable database.
pub fn connect(database_url: &str) -> Result<DbPool, BuildError> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager).max_size(MAX_POOL_SIZE).build()?;

    tracing::info!(max_size = MAX_POOL_SIZE, "database pool created");

    Ok(pool)
}
