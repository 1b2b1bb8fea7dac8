//! Length-delimited packet framing over a byte stream.
//!
//! Each frame is a 4-byte big-endian payload length followed by the
//! bincode-encoded `Packet`. TCP gives us ordering but no message boundaries,
//! so every read first pulls the prefix and then exactly that many bytes.
//!
//! Rosters have no size limit, so outgoing frames are only bounded by what the
//! prefix can express. Readers pick their own limit: the server bounds the
//! requests it accepts, while clients read rosters of any size.

use crate::{Packet, SyncError};
use bincode::{deserialize, serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a request frame read by the server. Requests carry a single
/// player, so anything near this size is malformed.
pub const MAX_REQUEST_SIZE: u32 = 1024 * 1024;

/// Payload bytes preallocated before any of them have arrived.
const READ_CHUNK: u32 = 64 * 1024;

/// Encodes `packet` into one complete frame, prefix included.
///
/// Fails only when the payload does not fit a 4-byte length prefix.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, SyncError> {
    let payload = serialize(packet)?;
    let len = u32::try_from(payload.len()).map_err(|_| SyncError::FrameTooLarge(u32::MAX))?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writes one frame and flushes.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), SyncError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    write_frame(writer, &frame).await
}

/// Writes a frame produced by `encode_frame` and flushes.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), SyncError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame of any size.
///
/// A stream that closes before or inside a frame yields a transport error
/// for which `SyncError::is_closed` is true.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, SyncError>
where
    R: AsyncRead + Unpin,
{
    read_packet_limited(reader, u32::MAX).await
}

/// Reads one frame, refusing payloads longer than `max_len`.
///
/// The buffer grows with the bytes actually received, so a corrupt prefix
/// cannot force a large allocation up front.
pub async fn read_packet_limited<R>(reader: &mut R, max_len: u32) -> Result<Packet, SyncError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len > max_len {
        return Err(SyncError::FrameTooLarge(len));
    }

    let mut payload = Vec::with_capacity(len.min(READ_CHUNK) as usize);
    let read = (&mut *reader)
        .take(u64::from(len))
        .read_to_end(&mut payload)
        .await?;
    if read < len as usize {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    Ok(deserialize(&payload)?)
}
