//! Database layer
//!
//! SQLite is the default (single-binary deployment); MySQL is supported for
//! larger installs. Both sit behind the `DatabasePool` trait.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
