use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error;

use crate::loader::LoadError;
use crate::monitoring::TransportError;

/// Failures that stop the observer before its pipeline is running.
///
/// Anything that goes wrong once probing has started is logged instead.
#[derive(Debug, Error)]
pub enum ObserveError {
    #[error(transparent)]
    Definitions(#[from] LoadError),
    #[error("failed to open results destination {}", path.display())]
    Results {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}
