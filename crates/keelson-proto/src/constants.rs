//! keelson protocol and system constants.

/// Default listen port for node connections.
pub const KS_LISTEN_PORT: u16 = 9000;

/// Server ID used by tools that are not cluster members (e.g. a connector
/// opened by `keelctl`).
pub const KS_ANONYMOUS_ID: u64 = 0;

/// Suffix of the write-ahead log image that accompanies a database file.
pub const KS_WAL_SUFFIX: &str = "-wal";

/// Name of the persisted node identity file inside the data directory.
pub const KS_INFO_FILE: &str = "info";

/// Environment variable that keeps SQLite out of single-thread mode.
pub const KS_MULTITHREAD_ENV: &str = "KEELSON_MULTITHREAD";
