//! Error type shared by every layer of the driver.
//!
//! Errors surfacing from the dispatch loop describe an unusable environment:
//! the loop stops on the first one it sees and the process is expected to exit
//! with a diagnostic. [`DriverError::SessionClosed`] only means quit already ran.

use crate::geometry::Size;
use crate::protocol::{BufferId, WindowId};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("cannot connect to Wayland display: {0}")]
    Connect(#[from] wayland_client::ConnectError),

    #[error("cannot dispatch Wayland events: {0}")]
    Dispatch(#[from] wayland_client::DispatchError),

    #[error("Wayland connection error: {0}")]
    Backend(#[from] wayland_client::backend::WaylandError),

    #[error("compositor does not advertise required global {0}")]
    MissingGlobal(&'static str),

    #[error("{context}: {source}")]
    SharedMemory {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("canvas size {size} needs {bytes} bytes which overflows int32")]
    BufferTooLarge { size: Size, bytes: u64 },

    #[error("invalid canvas size {0}")]
    InvalidSize(Size),

    #[error("server sent unknown keymap format {0}")]
    UnknownKeymapFormat(u32),

    #[error("cannot parse keymap from Wayland server: {0}")]
    Keymap(String),

    #[error("unknown window {0:?}")]
    UnknownWindow(WindowId),

    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    #[error("Wayland session has already been destroyed")]
    SessionClosed,

    #[error("run called more than once")]
    AlreadyRunning,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub(crate) fn shm(context: &'static str, source: std::io::Error) -> Self {
        DriverError::SharedMemory { context, source }
    }
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;
