//! Transport seam: how serialized messages leave the process.

use crate::error::{RpcError, RpcResult};
use tokio::sync::mpsc;

/// Sends one serialized message to the remote peer.
///
/// Inbound text enters through [`Dispatcher::on_message`](crate::rpc::Dispatcher::on_message).
pub trait MessageSender: Send + Sync {
    fn send(&self, message: String) -> RpcResult<()>;
}

impl MessageSender for mpsc::UnboundedSender<String> {
    fn send(&self, message: String) -> RpcResult<()> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| RpcError::TransportClosed)
    }
}

/// One side of an in-memory connection.
pub struct Endpoint {
    /// Messages written here arrive at the other endpoint's `inbound`.
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Two connected in-memory endpoints.
pub fn duplex() -> (Endpoint, Endpoint) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Endpoint {
            outbound: a_tx,
            inbound: b_rx,
        },
        Endpoint {
            outbound: b_tx,
            inbound: a_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplex_delivers_both_ways() {
        let (mut left, mut right) = duplex();

        MessageSender::send(&left.outbound, "ping".to_string()).unwrap();
        assert_eq!(right.inbound.recv().await.as_deref(), Some("ping"));

        MessageSender::send(&right.outbound, "pong".to_string()).unwrap();
        assert_eq!(left.inbound.recv().await.as_deref(), Some("pong"));
    }

    #[test]
    fn test_send_after_close_fails() {
        let (left, right) = duplex();
        drop(right);

        let result = MessageSender::send(&left.outbound, "lost".to_string());
        assert!(matches!(result, Err(RpcError::TransportClosed)));
    }
}
