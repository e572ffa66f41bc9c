use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// The single SQLite pool every vault component shares (spec §5: "a single
/// database"). Callers connect once at process startup and clone the pool
/// into each worker.
#[derive(Debug, Clone)]
pub struct VaultPool {
	pool: SqlitePool,
}

impl VaultPool {
	/// Connects to `database_url`, creating the file if missing, and applies
	/// every pending migration.
	pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
		let options = SqliteConnectOptions::from_str(database_url)?
			.create_if_missing(true)
			.foreign_keys(true)
			.journal_mode(SqliteJournalMode::Wal);
		let pool = SqlitePool::connect_with(options).await?;
		sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
		Ok(Self { pool })
	}

	/// An in-memory pool for tests: migrated, empty, discarded on drop. Pinned
	/// to a single connection, since each new SQLite in-memory connection is
	/// otherwise its own independent (and immediately useless) database.
	pub async fn connect_in_memory() -> Result<Self, sqlx::Error> {
		let options = SqliteConnectOptions::from_str("sqlite::memory:")?.create_if_missing(true).foreign_keys(true);
		let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
		sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
		Ok(Self { pool })
	}

	pub fn raw(&self) -> &SqlitePool {
		&self.pool
	}
}
