//! Authenticated wire framing
//!
//! One frame per logical message on the TCP stream, no outer length prefix:
//!
//! ```text
//! offset  size  field
//! 0       4     magic = "UDPC"
//! 4       1     version = 1
//! 5       1     flags (bit0=DATA, bit1=KEEPALIVE)
//! 6       8     session id (big-endian u64)
//! 14      2     destination port (big-endian u16)
//! 16      2     payload length L (big-endian u16, L <= 1200)
//! 18      L     payload bytes
//! 18+L    1     tag length = 32
//! 19+L    32    HMAC-SHA-256 over bytes [0, 18+L)
//! ```
//!
//! The version byte is a hard gate, not a negotiation: any mismatch fails
//! the decode.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::FrameError;

/// Wire format magic bytes
pub const MAGIC: [u8; 4] = *b"UDPC";

/// Current wire format version
pub const VERSION: u8 = 1;

/// Fixed header length in bytes
pub const HEADER_LEN: usize = 18;

/// HMAC-SHA-256 tag length in bytes
pub const TAG_LEN: usize = 32;

/// Maximum payload carried by a single frame
pub const MAX_PAYLOAD: usize = 1200;

type HmacSha256 = Hmac<Sha256>;

bitflags! {
    /// Frame type flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const DATA = 0x01;
        const KEEPALIVE = 0x02;
    }
}

/// Fixed-size frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    /// Opaque 64-bit session id multiplexing UDP peers over one connection
    pub session_id: u64,
    pub dst_port: u16,
    pub payload_len: u16,
}

/// A frame plus its payload. Created per datagram or keepalive tick, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a DATA frame carrying one datagram.
    pub fn data(session_id: u64, dst_port: u16, payload: Vec<u8>) -> Self {
        Self {
            header: FrameHeader {
                flags: FrameFlags::DATA,
                session_id,
                dst_port,
                payload_len: payload.len() as u16,
            },
            payload,
        }
    }

    /// Create a keepalive frame. Carries no payload; dst_port 1 keeps the
    /// header encodable.
    pub fn keepalive() -> Self {
        Self {
            header: FrameHeader {
                flags: FrameFlags::KEEPALIVE,
                session_id: 0,
                dst_port: 1,
                payload_len: 0,
            },
            payload: Vec::new(),
        }
    }

    pub fn is_data(&self) -> bool {
        self.header.flags.contains(FrameFlags::DATA)
    }
}

fn mac_keyed(token: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(token.as_bytes()).expect("hmac accepts any key length")
}

/// Encode a frame, appending an HMAC-SHA-256 tag keyed by `token`.
pub fn encode(frame: &Frame, token: &str) -> Result<Bytes, FrameError> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: frame.payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    if frame.header.dst_port == 0 {
        return Err(FrameError::InvalidPort);
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.payload.len() + 1 + TAG_LEN);
    buf.put_slice(&MAGIC);
    buf.put_u8(VERSION);
    buf.put_u8(frame.header.flags.bits());
    buf.put_u64(frame.header.session_id);
    buf.put_u16(frame.header.dst_port);
    buf.put_u16(frame.payload.len() as u16);
    buf.put_slice(&frame.payload);

    let mut mac = mac_keyed(token);
    mac.update(&buf);
    buf.put_u8(TAG_LEN as u8);
    buf.put_slice(&mac.finalize().into_bytes());

    Ok(buf.freeze())
}

/// Decode one frame from a byte stream, verifying the authentication tag.
///
/// Reads exactly one frame's worth of bytes. The tag comparison is
/// constant-time (`Mac::verify_slice`). A stream that ends before the frame
/// is complete yields `FrameError::Truncated`.
pub async fn decode_from<R>(reader: &mut R, token: &str) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;

    if header[..4] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }
    if header[4] != VERSION {
        return Err(FrameError::InvalidVersion(header[4]));
    }

    let mut rest = &header[5..];
    let flags = FrameFlags::from_bits_retain(rest.get_u8());
    let session_id = rest.get_u64();
    let dst_port = rest.get_u16();
    let payload_len = rest.get_u16();

    if payload_len as usize > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            len: payload_len as usize,
            max: MAX_PAYLOAD,
        });
    }

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;

    let mut tag_len = [0u8; 1];
    reader.read_exact(&mut tag_len).await?;
    if tag_len[0] as usize != TAG_LEN {
        return Err(FrameError::InvalidTagLength(tag_len[0]));
    }

    let mut tag = [0u8; TAG_LEN];
    reader.read_exact(&mut tag).await?;

    let mut mac = mac_keyed(token);
    mac.update(&header);
    mac.update(&payload);
    mac.verify_slice(&tag).map_err(|_| FrameError::AuthFailed)?;

    Ok(Frame {
        header: FrameHeader {
            flags,
            session_id,
            dst_port,
            payload_len,
        },
        payload,
    })
}
