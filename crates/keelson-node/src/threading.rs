//! SQLite threading mode.
//!
//! SQLite only accepts a threading mode before the library is initialised,
//! so [`init`] has to run before any engine opens a database. Calling it
//! later fails with [`KsError::ThreadingMode`].

use std::os::raw::c_int;

use keelson_proto::constants::KS_MULTITHREAD_ENV;
use keelson_proto::{KsError, KsResult};
use rusqlite::ffi;
use tracing::{debug, info, warn};

/// Configure single-thread mode unless `KEELSON_MULTITHREAD=1`.
pub fn init() -> KsResult<()> {
    let value = std::env::var(KS_MULTITHREAD_ENV).ok();
    if multithread_requested(value.as_deref()) {
        debug!("{}=1, keeping SQLite default threading mode", KS_MULTITHREAD_ENV);
        return Ok(());
    }
    configure(ffi::SQLITE_CONFIG_SINGLETHREAD, "single-thread")
}

/// Switch SQLite to multi-thread mode.
pub fn config_multi_thread() -> KsResult<()> {
    configure(ffi::SQLITE_CONFIG_MULTITHREAD, "multi-thread")
}

fn multithread_requested(value: Option<&str>) -> bool {
    value == Some("1")
}

fn configure(option: c_int, mode: &str) -> KsResult<()> {
    // SAFETY: the threading options take no extra arguments and only touch
    // SQLite's global configuration, which SQLite itself guards against use
    // after initialisation by returning SQLITE_MISUSE.
    let rc = unsafe { ffi::sqlite3_config(option) };
    if rc != ffi::SQLITE_OK {
        warn!("failed to set SQLite {} mode (rc={})", mode, rc);
        return Err(KsError::ThreadingMode);
    }
    info!("SQLite threading mode: {}", mode);
    Ok(())
}
