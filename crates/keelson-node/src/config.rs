//! Node identity persistence.
//!
//! The daemon stores its [`ServerInfo`] in the data directory so that a
//! restarted node comes back with the same id.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use keelson_proto::constants::{KS_ANONYMOUS_ID, KS_INFO_FILE};
use keelson_proto::{KsError, KsResult, ServerInfo};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Save the node identity to the info file.
pub async fn save_info(dir: &Path, info: &ServerInfo) -> KsResult<()> {
    let path = dir.join(KS_INFO_FILE);
    let data = bincode::serialize(info).map_err(|_| KsError::Encode)?;
    fs::write(&path, &data).await.map_err(|e| {
        error!("failed to write node info to {}: {}", path.display(), e);
        KsError::Eio
    })?;
    debug!("saved node info: {}", info);
    Ok(())
}

/// Load the node identity from the info file.
pub async fn load_info(dir: &Path) -> KsResult<ServerInfo> {
    let path = dir.join(KS_INFO_FILE);
    if !path.exists() {
        return Err(KsError::NotFound);
    }
    let data = fs::read(&path).await.map_err(|e| {
        error!("failed to read node info from {}: {}", path.display(), e);
        KsError::Eio
    })?;
    bincode::deserialize(&data).map_err(|_| {
        error!("corrupt node info file: {}", path.display());
        KsError::Decode
    })
}

/// Load the stored identity, or create one on first start.
///
/// A stored id always wins; asking for a different one is an error. The
/// address may change between runs and is updated in place.
pub async fn load_or_create_info(
    dir: &Path,
    id: Option<u64>,
    address: &str,
) -> KsResult<ServerInfo> {
    match load_info(dir).await {
        Ok(mut stored) => {
            if let Some(id) = id {
                if id != stored.id {
                    error!("requested id {} but {} is stored in {}", id, stored.id, dir.display());
                    return Err(KsError::InvalidParms);
                }
            }
            if stored.address != address {
                warn!("address changed from {} to {}", stored.address, address);
                stored.address = address.to_string();
                save_info(dir, &stored).await?;
            }
            Ok(stored)
        }
        Err(KsError::NotFound) => {
            let id = match id {
                Some(KS_ANONYMOUS_ID) => return Err(KsError::InvalidParms),
                Some(id) => id,
                None => generate_id(address),
            };
            let info = ServerInfo::new(id, address);
            save_info(dir, &info).await?;
            info!("created node identity {}", info);
            Ok(info)
        }
        Err(e) => Err(e),
    }
}

/// Derive a fresh, non-zero id from the address and the current time.
pub fn generate_id(address: &str) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = DefaultHasher::new();
    address.hash(&mut hasher);
    nanos.hash(&mut hasher);
    match hasher.finish() {
        KS_ANONYMOUS_ID => 1,
        id => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_info(dir.path()).await, Err(KsError::NotFound));

        let info = ServerInfo::new(42, "127.0.0.1:9000");
        save_info(dir.path(), &info).await.unwrap();
        assert_eq!(load_info(dir.path()).await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_identity_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create_info(dir.path(), None, "127.0.0.1:9000")
            .await
            .unwrap();
        assert_ne!(first.id, KS_ANONYMOUS_ID);

        let again = load_or_create_info(dir.path(), None, "127.0.0.1:9100")
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.address, "127.0.0.1:9100");
        assert_eq!(load_info(dir.path()).await.unwrap(), again);
    }

    #[tokio::test]
    async fn test_explicit_id() {
        let dir = tempfile::tempdir().unwrap();
        let info = load_or_create_info(dir.path(), Some(7), "127.0.0.1:9000")
            .await
            .unwrap();
        assert_eq!(info.id, 7);

        let conflict = load_or_create_info(dir.path(), Some(8), "127.0.0.1:9000").await;
        assert_eq!(conflict, Err(KsError::InvalidParms));
    }

    #[tokio::test]
    async fn test_anonymous_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_or_create_info(dir.path(), Some(KS_ANONYMOUS_ID), "127.0.0.1:9000").await;
        assert_eq!(result, Err(KsError::InvalidParms));
    }

    #[test]
    fn test_generate_id_is_not_anonymous() {
        assert_ne!(generate_id("127.0.0.1:9000"), KS_ANONYMOUS_ID);
    }
}
