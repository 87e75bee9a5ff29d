use crate::types::{RenderId, ViewId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Container is not mounted")]
    ContainerNotMounted,
    #[error("Shared canvas is not mounted")]
    SharedCanvasNotMounted,
    #[error("Unknown view: {0}")]
    UnknownView(ViewId),
    #[error("View {0} does not draw into a shared canvas")]
    NotSharedCanvas(ViewId),
    #[error("Animation {0} is destroyed")]
    Destroyed(RenderId),
    #[error("Animation size is unknown: pass `size` or use a container with a layout size")]
    MissingSize,
    #[error("Failed to allocate a {0}x{1} surface")]
    SurfaceAllocation(u32, u32),
    #[error("Worker pool has no workers")]
    NoWorkers,
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectorError {
    /// The worker reported an error outside of any request.
    #[error("Worker fault: {0}")]
    WorkerFault(String),
    #[error("Channel '{0}' is closed")]
    Closed(String),
}
