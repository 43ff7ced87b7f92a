//! Dump a database and its WAL to a local directory.

use std::fmt;
use std::io;
use std::path::Path;

use keelson_proto::constants::KS_WAL_SUFFIX;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::engine::Engine;
use crate::error::ServerError;

/// Which of the two dumped files an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFile {
    Database,
    Wal,
}

impl fmt::Display for DumpFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpFile::Database => f.write_str("database file"),
            DumpFile::Wal => f.write_str("WAL file"),
        }
    }
}

/// Write `<dir>/<name>` and `<dir>/<name>-wal` with the engine's content.
///
/// Existing files are overwritten; new files are readable by the owner only.
pub async fn dump_to_dir(engine: &dyn Engine, name: &str, dir: &Path) -> Result<(), ServerError> {
    let wal = format!("{}{}", name, KS_WAL_SUFFIX);

    for (file, file_name) in [(DumpFile::Database, name), (DumpFile::Wal, wal.as_str())] {
        let bytes = engine
            .dump(file_name)
            .await
            .map_err(|source| ServerError::DumpRead { file, source })?;

        let path = dir.join(file_name);
        write_private(&path, &bytes)
            .await
            .map_err(|source| ServerError::DumpWrite { file, source })?;
        debug!("dumped {} ({} bytes) to {}", file, bytes.len(), path.display());
    }
    Ok(())
}

async fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}
