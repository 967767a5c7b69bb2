//! Wire framing: `[type byte][MessagePack body]`, at most 64 KiB per frame.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::messages::{HostMessage, MessageType, PeerMessage};

pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on a whole frame, type byte included.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub enum ProtocolError {
    Empty,
    UnknownType(u8),
    /// A known type travelling the wrong way, e.g. `EndGame` sent to the host.
    WrongDirection(MessageType),
    TooLarge { size: usize },
    Encode(rmp_serde::encode::Error),
    Decode(rmp_serde::decode::Error),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("empty frame"),
            Self::UnknownType(b) => write!(f, "unknown message type 0x{b:02x}"),
            Self::WrongDirection(t) => write!(f, "{t:?} is not valid in this direction"),
            Self::TooLarge { size } => {
                write!(f, "frame of {size} bytes exceeds {MAX_MESSAGE_SIZE}")
            },
            Self::Encode(e) => write!(f, "encode failed: {e}"),
            Self::Decode(e) => write!(f, "decode failed: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

fn frame<T: Serialize>(kind: MessageType, body: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = vec![kind as u8];
    rmp_serde::encode::write(&mut buf, body).map_err(ProtocolError::Encode)?;
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge { size: buf.len() });
    }
    Ok(buf)
}

/// Split a frame into its type and body, checking size and type byte.
pub fn split_frame(data: &[u8]) -> Result<(MessageType, &[u8]), ProtocolError> {
    let (&first, body) = data.split_first().ok_or(ProtocolError::Empty)?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge { size: data.len() });
    }
    let kind = MessageType::from_byte(first).ok_or(ProtocolError::UnknownType(first))?;
    Ok((kind, body))
}

fn body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    rmp_serde::from_slice(bytes).map_err(ProtocolError::Decode)
}

pub fn encode_peer_message(msg: &PeerMessage) -> Result<Vec<u8>, ProtocolError> {
    let kind = msg.message_type();
    match msg {
        PeerMessage::ConfirmConnection(m) => frame(kind, m),
        PeerMessage::RequestRoleChange(m) => frame(kind, m),
        PeerMessage::ReportContact(m) => frame(kind, m),
        PeerMessage::RequestDespawn(m) => frame(kind, m),
    }
}

pub fn encode_host_message(msg: &HostMessage) -> Result<Vec<u8>, ProtocolError> {
    let kind = msg.message_type();
    match msg {
        HostMessage::VerifyConnection(m) => frame(kind, m),
        HostMessage::ConnectionResult(m) => frame(kind, m),
        HostMessage::BeginGame(m) => frame(kind, m),
        HostMessage::RoleChanged(m) => frame(kind, m),
        HostMessage::Teleport(m) => frame(kind, m),
        HostMessage::PlayerDespawned(m) => frame(kind, m),
        HostMessage::TuningChanged(m) => frame(kind, m),
        HostMessage::EndGame(m) => frame(kind, m),
    }
}

/// Decode a frame read by the host.
pub fn decode_peer_message(data: &[u8]) -> Result<PeerMessage, ProtocolError> {
    let (kind, bytes) = split_frame(data)?;
    match kind {
        MessageType::ConfirmConnection => body(bytes).map(PeerMessage::ConfirmConnection),
        MessageType::RequestRoleChange => body(bytes).map(PeerMessage::RequestRoleChange),
        MessageType::ReportContact => body(bytes).map(PeerMessage::ReportContact),
        MessageType::RequestDespawn => body(bytes).map(PeerMessage::RequestDespawn),
        other => Err(ProtocolError::WrongDirection(other)),
    }
}

/// Decode a frame read by a peer.
pub fn decode_host_message(data: &[u8]) -> Result<HostMessage, ProtocolError> {
    let (kind, bytes) = split_frame(data)?;
    match kind {
        MessageType::VerifyConnection => body(bytes).map(HostMessage::VerifyConnection),
        MessageType::ConnectionResult => body(bytes).map(HostMessage::ConnectionResult),
        MessageType::BeginGame => body(bytes).map(HostMessage::BeginGame),
        MessageType::RoleChanged => body(bytes).map(HostMessage::RoleChanged),
        MessageType::Teleport => body(bytes).map(HostMessage::Teleport),
        MessageType::PlayerDespawned => body(bytes).map(HostMessage::PlayerDespawned),
        MessageType::TuningChanged => body(bytes).map(HostMessage::TuningChanged),
        MessageType::EndGame => body(bytes).map(HostMessage::EndGame),
        other => Err(ProtocolError::WrongDirection(other)),
    }
}
