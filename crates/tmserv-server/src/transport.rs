//! TCP transport.
//!
//! The legacy client speaks plain TCP with the protocol's own payload
//! cipher; there is no TLS layer to negotiate. This wrapper owns the
//! listener; per-connection stream handling lives in the runtime.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;

/// Listening TCP endpoint.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind the listener.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("TCP transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        let (stream, peer) = self.listener.accept().await?;
        // The protocol is many small packets; coalescing hurts latency
        // more than it saves bytes.
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    /// Local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_on_ephemeral_port() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.expect("bind");
        assert_ne!(transport.local_addr().expect("addr").port(), 0);
    }

    #[tokio::test]
    async fn rejects_unparseable_address() {
        assert!(TcpTransport::bind("not-an-address").await.is_err());
    }
}
