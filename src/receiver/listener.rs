//! Bound TCP listeners for the protocol servers.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

use crate::core::config::{NetAddr, Transport};
use crate::core::{ReceiverError, Result};

/// A socket that is bound and listening, ready to accept connections.
///
/// Binding happens before a server task is spawned so that bind failures
/// surface to the caller and the bound address is known up front.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `addr`, trying each resolved address allowed by its transport.
    pub async fn bind(addr: &NetAddr) -> Result<Self> {
        let endpoint = resolvable(addr);
        let candidates: Vec<SocketAddr> = tokio::net::lookup_host(endpoint.as_str())
            .await
            .map_err(|e| ReceiverError::bind(&addr.endpoint, e))?
            .filter(|sa| match addr.transport {
                Transport::Tcp => true,
                Transport::Tcp4 => sa.is_ipv4(),
                Transport::Tcp6 => sa.is_ipv6(),
            })
            .collect();

        let mut last_err = format!("no {} address found", addr.transport.as_str());
        for candidate in candidates {
            match TcpListener::bind(candidate).await {
                Ok(inner) => {
                    let local_addr = inner
                        .local_addr()
                        .map_err(|e| ReceiverError::bind(&addr.endpoint, e))?;
                    return Ok(Self { inner, local_addr });
                },
                Err(e) => last_err = e.to_string(),
            }
        }
        Err(ReceiverError::bind(&addr.endpoint, last_err))
    }

    /// The address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The underlying tokio listener
    pub fn into_inner(self) -> TcpListener {
        self.inner
    }

    /// Stream of accepted connections
    pub fn into_stream(self) -> TcpListenerStream {
        TcpListenerStream::new(self.inner)
    }
}

/// An empty host means every interface of the transport's family.
fn resolvable(addr: &NetAddr) -> String {
    match addr.endpoint.strip_prefix(':') {
        Some(port) if addr.transport == Transport::Tcp6 => format!("[::]:{}", port),
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.endpoint.clone(),
    }
}
