//! RCON packet model and the pure frame encoder / decoder.
//!
//! ```text
//! [i32 length][i32 request_id][i32 type][UTF-8 body][0x00][0x00]
//! ```
//!
//! All integers are little-endian. `length` counts every byte after
//! itself, so a well-formed packet always satisfies
//! `length == 8 + body.len() + 2`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WardenError;

/// Size of the leading length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// `request_id` + `type` + the two NUL terminators.
pub const MIN_PACKET_LENGTH: usize = 10;

/// Upper bound on a declared packet length. Servers cap response bodies
/// at 4 KiB; anything far beyond that is a corrupt stream.
pub const MAX_PACKET_LENGTH: usize = 64 * 1024;

/// Request id the server puts in an auth response to reject a password.
pub const AUTH_FAILURE_ID: i32 = -1;

/// Largest request id before the counter wraps back to 1.
pub const MAX_REQUEST_ID: i32 = 0x7FFF_FFFF;

// ── PacketType ───────────────────────────────────────────────────

/// Logical packet kinds.
///
/// The protocol reuses the wire value `2` for both `AuthResponse` and
/// `Exec`; a decoded `2` is reported as `Exec` and the channel
/// interprets it by context. Values outside the protocol are kept as
/// `Other` so a frame is never rejected for its type alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Login request carrying the password (`3`).
    Auth,
    /// Server verdict on a login request (`2`).
    AuthResponse,
    /// Command execution request (`2`).
    Exec,
    /// Plain response carrying command output (`0`).
    Response,
    /// Any other value a server chose to send.
    Other(i32),
}

impl PacketType {
    /// The value written to the `type` field on the wire.
    pub fn wire_value(self) -> i32 {
        match self {
            PacketType::Auth => 3,
            PacketType::AuthResponse | PacketType::Exec => 2,
            PacketType::Response => 0,
            PacketType::Other(value) => value,
        }
    }
}

impl From<i32> for PacketType {
    fn from(value: i32) -> Self {
        match value {
            3 => PacketType::Auth,
            2 => PacketType::Exec,
            0 => PacketType::Response,
            other => PacketType::Other(other),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Auth => write!(f, "Auth"),
            PacketType::AuthResponse => write!(f, "AuthResponse"),
            PacketType::Exec => write!(f, "Exec"),
            PacketType::Response => write!(f, "Response"),
            PacketType::Other(value) => write!(f, "Other({value})"),
        }
    }
}

// ── Packet ───────────────────────────────────────────────────────

/// A single RCON frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    request_id: i32,
    kind: PacketType,
    body: String,
}

impl Packet {
    /// Build a packet. Client-originated packets must carry a positive
    /// 31-bit id (see [`RequestIdCounter`]); `0` is reserved.
    pub fn new(request_id: i32, kind: PacketType, body: impl Into<String>) -> Self {
        Self {
            request_id,
            kind,
            body: body.into(),
        }
    }

    pub fn auth(request_id: i32, password: &str) -> Self {
        Self::new(request_id, PacketType::Auth, password)
    }

    pub fn exec(request_id: i32, command: &str) -> Self {
        Self::new(request_id, PacketType::Exec, command)
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub fn kind(&self) -> PacketType {
        self.kind
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }

    /// Value of the length prefix for this packet.
    pub fn length(&self) -> usize {
        8 + self.body.len() + 2
    }

    /// Returns `true` if this is an auth response rejecting the password.
    pub fn is_auth_failure(&self) -> bool {
        self.request_id == AUTH_FAILURE_ID
    }

    /// Serialize into a complete frame, length prefix included.
    ///
    /// Exactly two NUL bytes are appended regardless of the body content.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + self.length());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub(crate) fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(LENGTH_PREFIX_SIZE + self.length());
        dst.put_i32_le(self.length() as i32);
        dst.put_i32_le(self.request_id);
        dst.put_i32_le(self.kind.wire_value());
        dst.put_slice(self.body.as_bytes());
        dst.put_slice(&[0, 0]);
    }

    /// Parse a frame from its 4-byte length prefix and the bytes that
    /// follow it.
    ///
    /// `body` must be exactly as long as the prefix declares. Body text
    /// that is not valid UTF-8 is decoded lossily rather than rejected.
    pub fn decode(header: [u8; LENGTH_PREFIX_SIZE], body: &[u8]) -> Result<Self, WardenError> {
        let length = declared_length(header)?;
        if body.len() != length {
            return Err(WardenError::Protocol(format!(
                "frame body is {} bytes, length prefix declares {}",
                body.len(),
                length
            )));
        }

        let request_id = i32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        let kind = PacketType::from(i32::from_le_bytes([body[4], body[5], body[6], body[7]]));
        let text = String::from_utf8_lossy(&body[8..length - 2]).into_owned();

        Ok(Self {
            request_id,
            kind,
            body: text,
        })
    }
}

/// Validate a length prefix and return the number of bytes that follow.
pub fn declared_length(header: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize, WardenError> {
    let length = i32::from_le_bytes(header);
    if length < MIN_PACKET_LENGTH as i32 {
        return Err(WardenError::Protocol(format!(
            "declared packet length {length} is below the minimum of {MIN_PACKET_LENGTH}"
        )));
    }
    let length = length as usize;
    if length > MAX_PACKET_LENGTH {
        return Err(WardenError::Protocol(format!(
            "declared packet length {length} exceeds {MAX_PACKET_LENGTH}"
        )));
    }
    Ok(length)
}

// ── RequestIdCounter ─────────────────────────────────────────────

/// Monotonic request id allocator.
///
/// Starts at 1 and wraps back to 1 after [`MAX_REQUEST_ID`]; it never
/// yields 0 or a negative id.
#[derive(Debug, Clone, Default)]
pub struct RequestIdCounter {
    last: i32,
}

impl RequestIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting after `last`. Used to test wrap-around.
    pub fn starting_after(last: i32) -> Self {
        Self {
            last: last.clamp(0, MAX_REQUEST_ID),
        }
    }

    pub fn next_id(&mut self) -> i32 {
        self.last = (self.last % MAX_REQUEST_ID) + 1;
        self.last
    }

    /// The most recently allocated id, or 0 if none was allocated yet.
    pub fn last(&self) -> i32 {
        self.last
    }
}
