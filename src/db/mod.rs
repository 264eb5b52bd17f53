pub mod accounts;
pub mod models;
pub mod reports;
pub mod schema;


use std::time::Duration;

use diesel::{
    connection::SimpleConnection,
    r2d2::{self, ConnectionManager, CustomizeConnection, PooledConnection},
    sqlite::SqliteConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::error::{AppError, AppResult};


pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type Pool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;


#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(r2d2::Error::QueryError)
    }
}


#[derive(Clone)]
pub struct Db {
    pool: Pool,
}

impl Db {
    pub fn open(database_url: &str, pool_size: u32) -> AppResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|err| AppError::Init(format!("Error connecting to {}: {}", database_url, err)))?;

        let db = Db { pool };

        let mut conn = db.conn()?;
        let applied = conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| AppError::Init(format!("Migration failed: {}", err)))?
            .len();
        drop(conn);
        info!("Database ready at {} ({} migrations applied)", database_url, applied);

        Ok(db)
    }

    pub fn conn(&self) -> AppResult<Conn> {
        Ok(self.pool.get()?)
    }
}
