//! Client-side interface to a RAS (remote administration server) endpoint.
//!
//! The telemetry collector only needs two read calls from the remote side:
//! list the clusters, and list the working processes of one cluster. The
//! [`RasSource`] trait captures exactly that (plus authentication and close).
//! This crate also provides [`MockRasSource`] for unit testing and
//! [`SnapshotFileSource`], which replays a JSON snapshot from disk.

pub mod config;
pub mod error;
pub mod file;
pub mod mock;
pub mod source;

pub use config::{open_source, RasClientConfig};
pub use error::{ClientError, ClientResult};
pub use file::SnapshotFileSource;
pub use mock::MockRasSource;
pub use source::{ClusterInfo, ProcessInfo, RasCredentials, RasSource};
