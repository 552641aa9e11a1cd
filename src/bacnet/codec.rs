//! Minimal BACnet/IP wire codec for confirmed ReadProperty.
//!
//! Encodes the one request shape the bridge sends (present-value of a single
//! object) and decodes the reply APDUs a device can answer with: ComplexAck,
//! Error, Reject, Abort.

use super::PointId;

const BVLC_TYPE: u8 = 0x81;
const BVLC_ORIGINAL_UNICAST: u8 = 0x0a;
const BVLC_ORIGINAL_BROADCAST: u8 = 0x0b;

const NPDU_VERSION: u8 = 0x01;
const NPDU_EXPECTING_REPLY: u8 = 0x04;

const PDU_CONFIRMED_REQUEST: u8 = 0x00;
const PDU_COMPLEX_ACK: u8 = 0x30;
const PDU_ERROR: u8 = 0x50;
const PDU_REJECT: u8 = 0x60;
const PDU_ABORT: u8 = 0x70;

const MAX_APDU_1476: u8 = 0x05;
const SERVICE_READ_PROPERTY: u8 = 0x0c;
const PROP_PRESENT_VALUE: u8 = 0x55; // property identifier 85

/// Build a confirmed ReadProperty request for a point's present-value.
pub fn encode_read_property(invoke_id: u8, point: &PointId) -> Vec<u8> {
    let object_id = (point.kind.type_number() << 22) | (point.index & super::MAX_INSTANCE);

    let mut frame = Vec::with_capacity(17);
    frame.extend_from_slice(&[BVLC_TYPE, BVLC_ORIGINAL_UNICAST, 0x00, 0x11]);
    frame.extend_from_slice(&[NPDU_VERSION, NPDU_EXPECTING_REPLY]);
    frame.extend_from_slice(&[
        PDU_CONFIRMED_REQUEST,
        MAX_APDU_1476,
        invoke_id,
        SERVICE_READ_PROPERTY,
    ]);
    // context tag 0: object identifier
    frame.push(0x0c);
    frame.extend_from_slice(&object_id.to_be_bytes());
    // context tag 1: property identifier
    frame.extend_from_slice(&[0x19, PROP_PRESENT_VALUE]);
    frame
}

/// An application-tagged value as decoded off the wire, before any
/// kind-specific mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum AppValue {
    Null,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f32),
    Double(f64),
    Enumerated(u64),
    Text(String),
}

/// Outcome of decoding one reply frame.
#[derive(Debug, PartialEq)]
pub enum Reply {
    /// ComplexAck carrying the requested present value.
    Ack { invoke_id: u8, value: AppValue },
    /// Error PDU with BACnet error class and code.
    ErrorPdu { invoke_id: u8, class: u64, code: u64 },
    Reject { invoke_id: u8, reason: u8 },
    Abort { invoke_id: u8, reason: u8 },
}

impl Reply {
    pub fn invoke_id(&self) -> u8 {
        match self {
            Reply::Ack { invoke_id, .. }
            | Reply::ErrorPdu { invoke_id, .. }
            | Reply::Reject { invoke_id, .. }
            | Reply::Abort { invoke_id, .. } => *invoke_id,
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame truncated")]
    Truncated,
    #[error("not a BACnet/IP frame")]
    NotBvlc,
    #[error("unsupported NPDU")]
    BadNpdu,
    #[error("unexpected PDU type {0:#04x}")]
    UnexpectedPdu(u8),
    #[error("unexpected tag {0:#04x}")]
    UnexpectedTag(u8),
    #[error("unsupported application tag {0}")]
    UnsupportedTag(u8),
}

/// Decode one datagram received from the device.
pub fn decode_reply(frame: &[u8]) -> Result<Reply, DecodeError> {
    let mut cur = Cursor { buf: frame, pos: 0 };

    if cur.u8()? != BVLC_TYPE {
        return Err(DecodeError::NotBvlc);
    }
    let function = cur.u8()?;
    if function != BVLC_ORIGINAL_UNICAST && function != BVLC_ORIGINAL_BROADCAST {
        return Err(DecodeError::NotBvlc);
    }
    cur.skip(2)?; // BVLC length; the datagram boundary is authoritative

    if cur.u8()? != NPDU_VERSION {
        return Err(DecodeError::BadNpdu);
    }
    let control = cur.u8()?;
    if control & 0x80 != 0 {
        // network-layer message, not an application reply
        return Err(DecodeError::BadNpdu);
    }
    if control & 0x20 != 0 {
        // DNET / DLEN / DADR
        cur.skip(2)?;
        let dlen = cur.u8()? as usize;
        cur.skip(dlen)?;
    }
    if control & 0x08 != 0 {
        // SNET / SLEN / SADR, present when the reply was routed
        cur.skip(2)?;
        let slen = cur.u8()? as usize;
        cur.skip(slen)?;
    }
    if control & 0x20 != 0 {
        cur.skip(1)?; // hop count
    }

    let pdu = cur.u8()?;
    match pdu & 0xf0 {
        PDU_COMPLEX_ACK => {
            if pdu & 0x08 != 0 {
                // segmented replies are never requested
                return Err(DecodeError::UnexpectedPdu(pdu));
            }
            let invoke_id = cur.u8()?;
            if cur.u8()? != SERVICE_READ_PROPERTY {
                return Err(DecodeError::UnexpectedPdu(pdu));
            }
            // context tag 0: object identifier, echoed back
            expect_tag(&mut cur, 0x0c)?;
            cur.skip(4)?;
            // context tag 1: property identifier
            match cur.u8()? {
                0x19 => cur.skip(1)?,
                0x1a => cur.skip(2)?,
                other => return Err(DecodeError::UnexpectedTag(other)),
            }
            // optional context tag 2: array index
            let mut tag = cur.u8()?;
            if tag & 0xf8 == 0x28 {
                cur.skip((tag & 0x07) as usize)?;
                tag = cur.u8()?;
            }
            // opening tag 3 wraps the property value
            if tag != 0x3e {
                return Err(DecodeError::UnexpectedTag(tag));
            }
            let value = decode_app_value(&mut cur)?;
            Ok(Reply::Ack { invoke_id, value })
        }
        PDU_ERROR => {
            let invoke_id = cur.u8()?;
            cur.skip(1)?; // service choice
            let class = decode_enumerated(&mut cur)?;
            let code = decode_enumerated(&mut cur)?;
            Ok(Reply::ErrorPdu {
                invoke_id,
                class,
                code,
            })
        }
        PDU_REJECT => {
            let invoke_id = cur.u8()?;
            let reason = cur.u8()?;
            Ok(Reply::Reject { invoke_id, reason })
        }
        PDU_ABORT => {
            let invoke_id = cur.u8()?;
            let reason = cur.u8()?;
            Ok(Reply::Abort { invoke_id, reason })
        }
        other => Err(DecodeError::UnexpectedPdu(other)),
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }
}

fn expect_tag(cur: &mut Cursor<'_>, want: u8) -> Result<(), DecodeError> {
    let tag = cur.u8()?;
    if tag != want {
        return Err(DecodeError::UnexpectedTag(tag));
    }
    Ok(())
}

fn decode_app_value(cur: &mut Cursor<'_>) -> Result<AppValue, DecodeError> {
    let tag = cur.u8()?;
    if tag & 0x08 != 0 {
        // context-specific where an application tag is required
        return Err(DecodeError::UnexpectedTag(tag));
    }
    let tag_num = tag >> 4;
    let mut len = (tag & 0x07) as usize;
    if len == 0x05 {
        len = cur.u8()? as usize;
    }

    match tag_num {
        0 => Ok(AppValue::Null),
        // boolean carries its value in the tag byte itself
        1 => Ok(AppValue::Bool(tag & 0x01 != 0)),
        2 => {
            if len > 8 {
                return Err(DecodeError::UnsupportedTag(tag_num));
            }
            Ok(AppValue::Unsigned(be_uint(cur.take(len)?)))
        }
        3 => {
            if len > 8 {
                return Err(DecodeError::UnsupportedTag(tag_num));
            }
            Ok(AppValue::Signed(be_int(cur.take(len)?)))
        }
        4 => {
            let bytes: [u8; 4] = cur.take(4)?.try_into().map_err(|_| DecodeError::Truncated)?;
            Ok(AppValue::Real(f32::from_be_bytes(bytes)))
        }
        5 => {
            if len != 8 {
                return Err(DecodeError::UnsupportedTag(tag_num));
            }
            let bytes: [u8; 8] = cur.take(8)?.try_into().map_err(|_| DecodeError::Truncated)?;
            Ok(AppValue::Double(f64::from_be_bytes(bytes)))
        }
        7 => {
            let bytes = cur.take(len)?;
            if bytes.is_empty() {
                return Ok(AppValue::Text(String::new()));
            }
            // first byte selects the character set; only ANSI X3.4 / UTF-8
            if bytes[0] != 0 {
                return Err(DecodeError::UnsupportedTag(tag_num));
            }
            Ok(AppValue::Text(
                String::from_utf8_lossy(&bytes[1..]).into_owned(),
            ))
        }
        9 => {
            if len > 8 {
                return Err(DecodeError::UnsupportedTag(tag_num));
            }
            Ok(AppValue::Enumerated(be_uint(cur.take(len)?)))
        }
        other => Err(DecodeError::UnsupportedTag(other)),
    }
}

fn decode_enumerated(cur: &mut Cursor<'_>) -> Result<u64, DecodeError> {
    match decode_app_value(cur)? {
        AppValue::Enumerated(v) | AppValue::Unsigned(v) => Ok(v),
        _ => Err(DecodeError::UnexpectedTag(0x91)),
    }
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn be_int(bytes: &[u8]) -> i64 {
    let Some(&first) = bytes.first() else {
        return 0;
    };
    let mut acc: i64 = if first & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        acc = (acc << 8) | i64::from(b);
    }
    acc
}
