pub mod breaks;
pub mod clock;
pub mod config;
pub mod plan;
pub mod schedule;
pub mod status;
pub mod watch;

use std::error::Error;
use std::sync::Arc;

use serde::Serialize;
use shiftwatch_core::storage::data_dir;
use shiftwatch_core::{EngineConfig, FileScheduleStore, ShiftEngine, SqliteRepository, SystemClock};

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// The schedule file named in the config, inside the data directory.
pub fn schedule_store(config: &EngineConfig) -> CliResult<FileScheduleStore> {
    Ok(FileScheduleStore::new(data_dir()?.join(&config.schedule_file)))
}

/// An engine over the on-disk database and schedule file.
pub fn open_engine() -> CliResult<Arc<ShiftEngine>> {
    let config = EngineConfig::load()?;
    let repo = Arc::new(SqliteRepository::open(&config.database_file)?);
    let schedules = Arc::new(schedule_store(&config)?);
    Ok(Arc::new(ShiftEngine::new(
        config,
        repo,
        schedules,
        Arc::new(SystemClock),
    )))
}

/// Run one engine call, then stop the engine whatever the outcome.
pub async fn with_engine<T, F, Fut>(call: F) -> CliResult<T>
where
    F: FnOnce(Arc<ShiftEngine>) -> Fut,
    Fut: std::future::Future<Output = shiftwatch_core::error::Result<T>>,
{
    let engine = open_engine()?;
    let result = call(Arc::clone(&engine)).await;
    engine.shutdown().await;
    Ok(result?)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
