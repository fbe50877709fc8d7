//! # TCP Listener and Accept Loop

use crate::conn::handle_connection;
use crate::constants::{CONNECTION_PERMIT_TIMEOUT_MS, DEFAULT_BACKLOG, MIN_BACKLOG};
use crate::errors::ServerError;
use crate::keyspace::Keyspace;
use crate::log_and_stderr;
use log::{info, warn};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

/// Accepts inbound connections and spawns one task per connection against
/// a bounded connection-count semaphore.
///
/// A plain `TcpListener::bind` can't express `SO_REUSEADDR` or an explicit
/// backlog, so the listening socket is built through `socket2` and handed
/// to tokio afterwards.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    max_conn: Arc<Semaphore>,
    keyspace: Arc<Keyspace>,
    shutdown: Arc<Notify>,
}

impl Server {
    /// Binds a listener at `addr` with `SO_REUSEADDR` set and a backlog of
    /// at least [`MIN_BACKLOG`], admitting at most `max_connections`
    /// concurrent connections.
    pub async fn bind(addr: SocketAddr, max_connections: usize, keyspace: Arc<Keyspace>) -> Result<Self, ServerError> {
        let domain = Domain::for_address(addr);
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(DEFAULT_BACKLOG.max(MIN_BACKLOG))?;

        let listener = TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;
        log_and_stderr!(info, "Listening on", local_addr);

        Ok(Self {
            listener,
            max_conn: Arc::new(Semaphore::new(max_connections)),
            keyspace,
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// A handle that, when notified, ends [`Self::run`]'s accept loop
    /// after its current iteration.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// The address actually bound, useful when `addr`'s port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("listener is always bound")
    }

    /// Runs the accept loop until `shutdown_handle()` is notified.
    ///
    /// Already-accepted connections are left to finish on their own —
    /// this only stops admitting *new* ones, a graceful drain rather than
    /// an abort.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!("waiting for connections...");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                permit = self.acquire_connection_permit() => {
                    match permit {
                        Ok((socket, permit)) => self.spawn_connection(socket, permit),
                        Err(e) => warn!("failed to accept a connection: {e}"),
                    }
                }
            }
        }
    }

    fn spawn_connection(&self, socket: TcpStream, permit: OwnedSemaphorePermit) {
        let keyspace = Arc::clone(&self.keyspace);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &keyspace).await {
                warn!("connection ended with an error: {e}");
            }
            drop(permit);
        });
    }

    /// Waits for both an available semaphore permit and a new inbound
    /// connection, bounding the permit wait so a saturated server doesn't
    /// stall the accept loop indefinitely.
    async fn acquire_connection_permit(&self) -> Result<(TcpStream, OwnedSemaphorePermit), ServerError> {
        let permit = timeout(
            Duration::from_millis(CONNECTION_PERMIT_TIMEOUT_MS),
            self.max_conn.clone().acquire_owned(),
        )
        .await
        .map_err(|_| ServerError::PermitTimeout(CONNECTION_PERMIT_TIMEOUT_MS))??;
        let (socket, _) = self.listener.accept().await?;
        Ok((socket, permit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::{decode_one, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn accepts_and_serves_one_connection() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let keyspace = Arc::new(Keyspace::new());
        let server = Server::bind(addr, 10, keyspace).await.unwrap();
        let local_addr = server.listener.local_addr().unwrap();
        let shutdown = server.shutdown_handle();

        let run_handle = tokio::spawn(async move { server.run().await });

        let mut client = TcpStream::connect(local_addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        let (value, _) = decode_one(&buf[..n]).unwrap().unwrap();
        assert_eq!(value, Value::simple("PONG"));

        shutdown.notify_one();
        run_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn saturated_semaphore_times_out_quickly() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let keyspace = Arc::new(Keyspace::new());
        // Hold the only permit so acquire_connection_permit cannot succeed.
        let server = Server::bind(addr, 1, keyspace).await.unwrap();
        let _permit = server.max_conn.clone().try_acquire_owned().unwrap();

        let result = timeout(Duration::from_secs(10), server.acquire_connection_permit()).await;
        assert!(result.is_ok(), "acquire_connection_permit must respect its own timeout");
    }
}
