//! Lifecycle and dump errors.
//!
//! Membership operations return [`KsError`] unchanged so that a remote
//! rejection reaches the caller verbatim. Errors raised while running or
//! stopping the node carry the phase that failed.

use std::time::Duration;

use keelson_proto::KsError;

use crate::dump::DumpFile;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server already started")]
    AlreadyStarted,

    #[error("failed to close listener: {0}")]
    Listener(#[source] std::io::Error),

    #[error("accept loop failed: {0}")]
    AcceptLoop(#[source] KsError),

    #[error("accept loop did not stop within {0:?}")]
    AcceptTimeout(Duration),

    #[error("server failed to stop: {0}")]
    Stop(#[source] KsError),

    #[error("failed to get {file} content: {source}")]
    DumpRead {
        file: DumpFile,
        #[source]
        source: KsError,
    },

    #[error("failed to write {file}: {source}")]
    DumpWrite {
        file: DumpFile,
        #[source]
        source: std::io::Error,
    },
}
