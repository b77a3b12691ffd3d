#![forbid(unsafe_code)]

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

use crate::transport::{Broker, TransportError};

/// TCP front end: one tokio task per accepted connection, frames processed
/// sequentially per connection so pipelined responses keep arrival order.
pub struct BrokerServer {
    listener: TcpListener,
    broker: Arc<Broker>,
}

impl BrokerServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A, broker: Broker) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| TransportError::io("bind", err))?;
        Ok(Self {
            listener,
            broker: Arc::new(broker),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(|err| TransportError::io("local_addr", err))
    }

    /// Accept connections forever. Accept failures are logged and the loop
    /// keeps going; per-connection failures never affect other connections.
    pub async fn serve(self) -> Result<(), TransportError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    let broker = self.broker.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, broker).await {
                            Ok(()) => debug!(%peer, "connection closed"),
                            Err(err) => debug!(%peer, error = %err, "connection aborted"),
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    }
}

/// Read length-prefixed frames and answer them in order until the peer
/// hangs up or a framing error makes the stream unusable. Dispatch runs on
/// the blocking pool because the handlers do synchronous file I/O.
async fn handle_connection(
    mut stream: TcpStream,
    broker: Arc<Broker>,
) -> Result<(), TransportError> {
    // Small responses should not wait out Nagle's algorithm.
    stream
        .set_nodelay(true)
        .map_err(|err| TransportError::io("set_nodelay", err))?;

    loop {
        let mut len_buf = [0_u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::UnexpectedEof
                        | ErrorKind::ConnectionReset
                        | ErrorKind::BrokenPipe
                        | ErrorKind::ConnectionAborted
                ) =>
            {
                return Ok(());
            }
            Err(err) => return Err(TransportError::io("read_frame_size", err)),
        }

        let frame_size = Broker::validate_frame_size(i32::from_be_bytes(len_buf))?;
        let mut frame = vec![0_u8; frame_size];
        stream
            .read_exact(&mut frame)
            .await
            .map_err(|err| TransportError::io("read_frame", err))?;

        let worker = broker.clone();
        let response = tokio::task::spawn_blocking(move || worker.process_frame(&frame))
            .await
            .map_err(|err| TransportError::Io {
                operation: "join_dispatch",
                message: err.to_string(),
            })??;

        stream
            .write_all(&response)
            .await
            .map_err(|err| TransportError::io("write_response", err))?;
        stream
            .flush()
            .await
            .map_err(|err| TransportError::io("flush", err))?;
    }
}
