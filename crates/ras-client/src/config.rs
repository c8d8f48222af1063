//! Client configuration.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::file::SnapshotFileSource;
use crate::source::{RasCredentials, RasSource};

/// Connection settings for the remote administration server.
#[derive(Clone, Serialize, Deserialize)]
pub struct RasClientConfig {
    /// Server address as `host:port`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Cluster administrator name.
    #[serde(default)]
    pub user: String,

    /// Cluster administrator password.
    #[serde(default)]
    pub password: String,

    /// When set, metrics are replayed from this JSON snapshot instead of a
    /// live server.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_endpoint() -> String {
    "localhost:1545".to_string()
}

impl Default for RasClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user: String::new(),
            password: String::new(),
            snapshot_path: None,
        }
    }
}

impl RasClientConfig {
    pub fn credentials(&self) -> RasCredentials {
        RasCredentials::new(self.user.clone(), self.password.clone())
    }
}

/// Build the [`RasSource`] described by `config`.
///
/// Only snapshot replay is available; without `snapshot_path` this fails
/// with [`ClientError::Connection`].
pub fn open_source(config: &RasClientConfig) -> ClientResult<Arc<dyn RasSource>> {
    match &config.snapshot_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "replaying telemetry from snapshot");
            Ok(Arc::new(SnapshotFileSource::new(path.clone())))
        }
        None => Err(ClientError::Connection(format!(
            "no live protocol client for {}; set ras.snapshot_path",
            config.endpoint
        ))),
    }
}

impl std::fmt::Debug for RasClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasClientConfig")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("snapshot_path", &self.snapshot_path)
            .finish()
    }
}
