//! Copying acquired movies to remote storage

pub mod monitor;
pub mod remote;

pub use monitor::{gzip_file, TransferMonitor, TransferSummary};
pub use remote::{CommandLine, RemoteCopy, RemoteTarget, SshRemoteCopy, TransferError};
