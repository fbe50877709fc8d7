//! # Connection Handler
//!
//! Per-connection read loop: feeds incoming bytes to the [`resp::Decoder`],
//! dispatches each complete command frame to [`command::dispatch`] in the
//! order its frame finished decoding, and writes replies back in that same
//! order — this is what makes
//! [pipelining](https://redis.io/docs/latest/develop/reference/protocol-spec/#multiple-commands-and-pipelining)
//! correct: a client may write several commands in one `write()` call and
//! expect the matching replies in order, without reading in between.

use crate::command;
use crate::constants::READ_CHUNK_LEN;
use crate::errors::{ConnectionError, RespError};
use crate::keyspace::Keyspace;
use crate::resp::{Decoder, Value};
use bytes::BytesMut;
use log::{debug, trace, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Handles one accepted connection until EOF, a transport error, or a
/// protocol decode error.
pub async fn handle_connection(mut stream: TcpStream, keyspace: &Keyspace) -> Result<(), ConnectionError> {
    let peer_addr = stream.peer_addr()?;
    trace!("start handling requests from {peer_addr}");

    let mut decoder = Decoder::new();
    let mut read_buf = vec![0u8; READ_CHUNK_LEN];
    let mut out = BytesMut::new();

    loop {
        let n = match stream.read(&mut read_buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                debug!("transport error from {peer_addr}: {err}");
                return Err(ConnectionError::from(err));
            }
        };
        decoder.feed(&read_buf[..n]);

        out.clear();
        let decode_err = drain_frames(&mut decoder, keyspace, &mut out);

        if !out.is_empty() {
            stream.write_all(&out).await?;
            stream.flush().await?;
        }

        if let Some(err) = decode_err {
            warn!("protocol error from {peer_addr}: {err}");
            // Best-effort notice; the client may already have gone away.
            let _ = stream
                .write_all(&Value::error("ERR Protocol error").to_bytes())
                .await;
            let _ = stream.flush().await;
            return Err(ConnectionError::from(err));
        }
    }

    trace!("stop handling requests from {peer_addr}");
    Ok(())
}

/// Decodes and dispatches every complete frame currently buffered,
/// appending each reply to `out` in order. Returns the decode error, if
/// any, that ends the batch — frames that decoded cleanly before it have
/// already been dispatched and their replies appended.
fn drain_frames(decoder: &mut Decoder, keyspace: &Keyspace, out: &mut BytesMut) -> Option<RespError> {
    loop {
        match decoder.decode_one() {
            Ok(None) => return None,
            Ok(Some(value)) => {
                let reply = match command::frame_from_value(value) {
                    Ok(frame) => command::dispatch(frame, keyspace),
                    Err(e) => Value::error(e.reply_text()),
                };
                reply.encode(out);
            }
            Err(e) => return Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::decode_one;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn pipelined_commands_reply_in_order() {
        let (mut client, server) = pair().await;
        let keyspace = Box::leak(Box::new(Keyspace::new()));
        let handle = tokio::spawn(async move {
            handle_connection(server, keyspace).await.unwrap();
        });

        client
            .write_all(b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$5\r\nHello\r\n")
            .await
            .unwrap();

        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let mut offset = 0;
        let (first, c1) = decode_one(&buf[offset..n]).unwrap().unwrap();
        offset += c1;
        let (second, _) = decode_one(&buf[offset..n]).unwrap().unwrap();
        assert_eq!(first, Value::simple("PONG"));
        assert_eq!(second, Value::simple("Hello"));

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn fragmented_frame_across_reads_still_completes() {
        let (mut client, server) = pair().await;
        let keyspace = Box::leak(Box::new(Keyspace::new()));
        let handle = tokio::spawn(async move {
            handle_connection(server, keyspace).await.unwrap();
        });

        client.write_all(b"*2\r\n$3\r\nGET").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.write_all(b"\r\n$5\r\nmykey\r\n").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        let (value, _) = decode_one(&buf[..n]).unwrap().unwrap();
        assert_eq!(value, Value::nil_bulk());

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn protocol_error_closes_connection_with_notice() {
        let (mut client, server) = pair().await;
        let keyspace = Box::leak(Box::new(Keyspace::new()));
        let handle = tokio::spawn(async move { handle_connection(server, keyspace).await });

        client.write_all(b"%1\r\n").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"-ERR Protocol error"));

        let result = handle.await.unwrap();
        assert!(result.is_err());
    }
}
