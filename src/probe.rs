//! Short-lived probe requests (§4.8).
//!
//! A probe connects, sends one control frame, and closes. `Info` is the
//! only tag that waits for a reply; `Kill`/`DetachAll` fire the frame and
//! return without reading anything back. A probe that never gets an
//! `Info` response within the deadline is classified exactly like a
//! stale socket (§4.8, §5).

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{ConnectError, StaleSocketError};
use crate::protocol::codec::{self, Decoder, Tag};
use crate::protocol::transport;

/// Connect, send a single empty control frame, and close without waiting
/// for a response. Used for `Kill` and `DetachAll`.
pub async fn fire_and_forget(path: &Path, tag: Tag) -> Result<(), ConnectError> {
    let mut stream = transport::connect_or_stale(path).await?;
    let frame = codec::encode(tag, Bytes::new());
    let _ = stream.write_all(&frame).await;
    Ok(())
}

/// Connect, send an `Info` request, and wait up to `deadline` for the
/// response frame.
pub async fn request_info(path: &Path, deadline: Duration) -> Result<(u32, i32), ConnectError> {
    let stale = || {
        ConnectError::Stale(StaleSocketError {
            path: path.to_path_buf(),
        })
    };

    let mut stream = transport::connect_or_stale(path).await?;
    let frame = codec::encode(Tag::Info, Bytes::new());
    stream.write_all(&frame).await.map_err(|_| stale())?;

    let recv = async {
        let mut decoder = Decoder::new();
        let mut buf = [0u8; 256];
        loop {
            if let Ok(Some(f)) = decoder.decode() {
                if f.known_tag() == Some(Tag::Info) {
                    return codec::decode_info(&f.payload).ok();
                }
                continue;
            }
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => decoder.feed(&buf[..n]),
            }
        }
    };

    match tokio::time::timeout(deadline, recv).await {
        Ok(Some(info)) => Ok(info),
        Ok(None) | Err(_) => Err(stale()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::Frame;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn request_info_round_trips_through_a_fake_supervisor() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("demo");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await.unwrap();
            let payload = codec::encode_info(2, 4242);
            let mut out = bytes::BytesMut::new();
            Frame::new(Tag::Info, payload).encode(&mut out);
            stream.write_all(&out).await.unwrap();
        });

        let (clients, pid) = request_info(&path, Duration::from_millis(500)).await.unwrap();
        assert_eq!(clients, 2);
        assert_eq!(pid, 4242);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn request_info_times_out_on_an_unresponsive_peer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("demo");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Accept and hold the connection open, but never reply.
            tokio::time::sleep(Duration::from_millis(200)).await;
            drop(stream);
        });

        let result = request_info(&path, Duration::from_millis(50)).await;
        assert!(result.is_err());
        server.await.unwrap();
    }
}
