use log::*;

use crate::SqliteDatabase;

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    info!("🚀️ Test database ready at {url}");
    db
}

/// A fresh database file in the system temp directory. `new_pool` creates it if it does not exist.
pub fn random_db_path() -> String {
    let path = std::env::temp_dir().join(format!("paygate_test_{}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}
