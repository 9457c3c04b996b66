use crate::error::{AmReduceError, Result};
use crate::protocol::header::{FrameKind, HEADER_SIZE, Header, WIRE_VERSION};
use crate::protocol::message::StepMessage;

/// Encode a `StepMessage` into a framed byte buffer: `[header][rkyv payload]`.
pub fn encode_frame(msg: &StepMessage) -> Result<Vec<u8>> {
    let payload = rkyv::to_bytes::<rkyv::rancor::Error>(msg)
        .map_err(|e| AmReduceError::EncodeFailed(e.to_string()))?;

    if payload.len() > u32::MAX as usize {
        return Err(AmReduceError::EncodeFailed(format!(
            "payload too large for framed header: {} bytes exceeds u32::MAX",
            payload.len()
        )));
    }

    let header = Header {
        payload_length: payload.len() as u32,
        version: WIRE_VERSION,
        kind: FrameKind::Step,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a framed byte buffer back into a `StepMessage`.
pub fn decode_frame(buf: &[u8]) -> Result<StepMessage> {
    if buf.len() < HEADER_SIZE {
        return Err(AmReduceError::DecodeFailed(format!(
            "buffer too short: {} < {HEADER_SIZE}",
            buf.len()
        )));
    }

    let header_bytes: &[u8; HEADER_SIZE] = buf[..HEADER_SIZE]
        .try_into()
        .map_err(|_| AmReduceError::DecodeFailed("header slice length mismatch".into()))?;

    let header = Header::decode(header_bytes)
        .ok_or_else(|| AmReduceError::DecodeFailed("invalid header: unknown frame kind".into()))?;

    if header.version != WIRE_VERSION {
        return Err(AmReduceError::DecodeFailed(format!(
            "wire version mismatch: local={WIRE_VERSION}, remote={}",
            header.version
        )));
    }

    let payload_end = HEADER_SIZE + header.payload_length as usize;
    if buf.len() < payload_end {
        return Err(AmReduceError::DecodeFailed(format!(
            "buffer too short for payload: {} < {payload_end}",
            buf.len()
        )));
    }

    // Archived fields need their natural alignment; the frame offset gives no
    // such guarantee.
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(header.payload_length as usize);
    aligned.extend_from_slice(&buf[HEADER_SIZE..payload_end]);

    rkyv::from_bytes::<StepMessage, rkyv::rancor::Error>(&aligned)
        .map_err(|e| AmReduceError::DecodeFailed(e.to_string()))
}
