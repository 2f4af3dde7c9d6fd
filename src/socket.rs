//! Status contract for the streaming socket connection.
//!
//! The socket service itself lives outside this crate; the engine and the
//! application only depend on this surface.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::Result;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SocketStatus {
    #[default]
    NotInitialized,
    Initialized,
    Connected,
    Closed,
}

#[async_trait]
pub trait SocketService: Send + Sync {
    /// Observable connection status.
    fn status(&self) -> watch::Receiver<SocketStatus>;

    async fn open_connection(&self) -> Result<()>;

    async fn close_connection(&self) -> Result<()>;
}
