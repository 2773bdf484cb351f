//! Length-prefixed frames over a byte stream.
//!
//! Each envelope travels as a 4-byte big-endian length followed by its
//! bincode payload, so one read yields exactly one message regardless of
//! how TCP splits the bytes.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single frame. A full board snapshot is a few KiB.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame too large: {} bytes", payload.len()),
            )
        })?;

    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one frame. A clean close before the length prefix surfaces as
/// `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", len),
        ));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        for msg in [&b"create"[..], b"", b"join 1"] {
            assert_ok!(write_frame(&mut client, msg).await);
        }

        assert_eq!(read_frame(&mut server).await.unwrap(), b"create");
        assert_eq!(read_frame(&mut server).await.unwrap(), b"");
        assert_eq!(read_frame(&mut server).await.unwrap(), b"join 1");
    }

    #[tokio::test]
    async fn test_frame_split_across_writes() {
        let (mut client, mut server) = tokio::io::duplex(4);

        let writer = tokio::spawn(async move {
            write_frame(&mut client, b"a longer payload than the pipe").await
        });

        let payload = read_frame(&mut server).await.unwrap();
        assert_eq!(payload, b"a longer payload than the pipe");
        assert_ok!(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_oversized_write() {
        let (mut client, _server) = tokio::io::duplex(64);
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];

        let err = assert_err!(write_frame(&mut client, &big).await);
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_rejects_oversized_read() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(MAX_FRAME_SIZE + 1).await.unwrap();

        let err = assert_err!(read_frame(&mut server).await);
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_eof_before_frame() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let err = assert_err!(read_frame(&mut server).await);
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
