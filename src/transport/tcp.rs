use std::{net::SocketAddr, time::Duration};

use tokio::{net::TcpStream, sync::Mutex};
use tracing::debug;

use crate::{
    codec,
    transport::{BoxFuture, Transport, TransportError, WireRequest, WireResponse},
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTransportConfig {
    pub addr: SocketAddr,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl TcpTransportConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// PBC over a single lazily opened TCP connection.
///
/// Requests are serialized on the connection. Any failure discards the
/// connection so the next request (or retry) reconnects.
#[derive(Debug)]
pub struct TcpTransport {
    cfg: TcpTransportConfig,
    conn: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    pub fn new(cfg: TcpTransportConfig) -> Self {
        Self {
            cfg,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.cfg.addr
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let addr = self.cfg.addr;
        match tokio::time::timeout(self.cfg.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                if let Err(error) = stream.set_nodelay(true) {
                    debug!(%addr, %error, "could not disable nagle on pbc connection");
                }
                debug!(%addr, "pbc connection established");
                Ok(stream)
            }
            Ok(Err(source)) => Err(TransportError::Connect { addr, source }),
            Err(_) => Err(TransportError::Timeout {
                after: self.cfg.connect_timeout,
            }),
        }
    }

    async fn round_trip(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let mut conn = self.conn.lock().await;
        let mut stream = match conn.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        let exchange = async {
            codec::write_frame(&mut stream, request.code.as_u8(), &request.payload).await?;
            codec::read_frame(&mut stream).await
        };
        let result = tokio::time::timeout(self.cfg.request_timeout, exchange).await;

        match result {
            Ok(Ok((code, payload))) => {
                *conn = Some(stream);
                Ok(WireResponse { code, payload })
            }
            Ok(Err(e)) => {
                debug!(addr = %self.cfg.addr, error = %e, "dropping pbc connection");
                Err(TransportError::Frame(e))
            }
            Err(_) => {
                debug!(addr = %self.cfg.addr, "request timed out; dropping pbc connection");
                Err(TransportError::Timeout {
                    after: self.cfg.request_timeout,
                })
            }
        }
    }
}

impl Transport for TcpTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, TransportError>> {
        Box::pin(self.round_trip(request))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{command::CommandKind, pb::MessageCode};

    fn request() -> WireRequest {
        WireRequest {
            kind: CommandKind::FetchSchema,
            code: MessageCode::YokozunaSchemaGetReq,
            payload: bytes::Bytes::from_static(b"\x0a\x01s"),
        }
    }

    #[tokio::test]
    async fn reuses_connection_between_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            for _ in 0..2 {
                let (code, payload) = codec::read_frame(&mut socket).await.unwrap();
                assert_eq!(code, MessageCode::YokozunaSchemaGetReq.as_u8());
                codec::write_frame(&mut socket, MessageCode::YokozunaSchemaGetResp.as_u8(), &payload)
                    .await
                    .unwrap();
            }
        });

        let transport = TcpTransport::new(TcpTransportConfig::new(addr));
        for _ in 0..2 {
            let resp = transport.send(request()).await.unwrap();
            assert_eq!(resp.code, MessageCode::YokozunaSchemaGetResp.as_u8());
            assert_eq!(&resp.payload[..], b"\x0a\x01s");
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn peer_close_is_retryable_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection: read the request and hang up without answering.
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = codec::read_frame(&mut socket).await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = codec::read_frame(&mut socket).await.unwrap();
            codec::write_frame(&mut socket, MessageCode::YokozunaSchemaGetResp.as_u8(), &[])
                .await
                .unwrap();
        });

        let transport = TcpTransport::new(TcpTransportConfig::new(addr));
        let err = transport.send(request()).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");

        let resp = transport.send(request()).await.unwrap();
        assert_eq!(resp.code, MessageCode::YokozunaSchemaGetResp.as_u8());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn request_timeout_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            let _ = done_rx.await;
        });

        let transport = TcpTransport::new(TcpTransportConfig {
            addr,
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_millis(50),
        });
        let err = transport.send(request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(err.is_retryable());

        let _ = done_tx.send(());
        server.await.unwrap();
    }
}
