//! Legacy wire codec.
//!
//! The hotel client speaks a text-safe binary dialect: message headers and
//! string length prefixes are fixed-width base-64 digits ("B64"), integers
//! are a variable-length base-64 encoding ("VL64"), and free text inside the
//! static furniture map runs up to a NUL or STX delimiter. The composer is an
//! append-only writer; it owns no socket I/O.

use bytes::{Bytes, BytesMut};

/// Frame terminator appended to every finished message.
const FRAME_END: u8 = 0x01;

/// Delimiters terminating a text field inside legacy binary streams.
const TEXT_DELIMITERS: [u8; 2] = [0x00, 0x02];

/// Encode `value` as `len` fixed-width base-64 digits (offset 64).
pub fn b64_encode(value: u32, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    for (i, slot) in out.iter_mut().enumerate() {
        let shift = 6 * (len - 1 - i);
        *slot = 64 + ((value >> shift) & 63) as u8;
    }
    out
}

pub fn b64_decode(data: &[u8]) -> Option<u32> {
    let mut value = 0u32;
    for &b in data {
        if b < 64 {
            return None;
        }
        value = (value << 6) | u32::from(b - 64);
    }
    Some(value)
}

/// Encode an integer as VL64: the first digit carries the byte count, the
/// sign, and the two low bits; later digits carry six bits each.
pub fn vl64_encode(value: i32) -> Vec<u8> {
    let abs = value.unsigned_abs();
    let mut out = vec![64 | (abs & 3) as u8];
    if value < 0 {
        out[0] |= 4;
    }
    let mut rest = abs >> 2;
    while rest > 0 {
        out.push(64 | (rest & 63) as u8);
        rest >>= 6;
    }
    out[0] |= (out.len() as u8) << 3;
    out
}

/// Decode a VL64 integer from the front of `data`, returning the value and
/// the number of bytes consumed. `None` on a truncated or corrupt prefix.
pub fn vl64_decode(data: &[u8]) -> Option<(i32, usize)> {
    let first = *data.first()?;
    if first < 64 {
        return None;
    }
    let len = ((first >> 3) & 7) as usize;
    if len == 0 || data.len() < len {
        return None;
    }
    let negative = first & 4 != 0;
    let mut value = i64::from(first & 3);
    let mut shift = 2;
    for &b in &data[1..len] {
        if b < 64 {
            return None;
        }
        value |= i64::from((b - 64) & 63) << shift;
        shift += 6;
    }
    let value = if negative { -value } else { value };
    Some((value as i32, len))
}

/// Append-only builder for one outbound message.
#[derive(Debug)]
pub struct MessageComposer {
    buf: BytesMut,
}

impl MessageComposer {
    pub fn new(header: u16) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.extend_from_slice(&b64_encode(u32::from(header), 2));
        Self { buf }
    }

    pub fn append_uint(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&vl64_encode(value as i32));
        self
    }

    pub fn append_int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&vl64_encode(value));
        self
    }

    pub fn append_bool(&mut self, value: bool) -> &mut Self {
        self.append_int(i32::from(value))
    }

    /// Length-prefixed string: two B64 digits of byte length, then the bytes.
    pub fn append_string(&mut self, value: &str) -> &mut Self {
        self.buf.extend_from_slice(&b64_encode(value.len() as u32, 2));
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn append_raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn into_bytes(mut self) -> Bytes {
        self.buf.extend_from_slice(&[FRAME_END]);
        self.buf.freeze()
    }
}

/// Resilient cursor over a legacy binary stream. Every read returns `Option`;
/// a truncated stream reads as `None` so callers can keep whatever prefix
/// they already decoded (the documented contract for the static furniture
/// map, see `rooms::template`).
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    pub fn read_vl64(&mut self) -> Option<i32> {
        let (value, used) = vl64_decode(&self.data[self.pos..])?;
        self.pos += used;
        Some(value)
    }

    /// Read text up to (and consuming) a NUL or STX delimiter. A run that
    /// hits end-of-stream without a delimiter counts as truncated.
    pub fn read_text(&mut self) -> Option<String> {
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|b| TEXT_DELIMITERS.contains(b))?;
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Some(text)
    }
}

/// Outbound message headers. These mirror the legacy client's opcode table;
/// only the ones the room core emits are listed.
pub mod opcodes {
    pub const KICK: u16 = 18;
    pub const CHAT: u16 = 24;
    pub const WHISPER: u16 = 25;
    pub const SHOUT: u16 = 26;
    pub const ROOM_USERS: u16 = 28;
    pub const USER_REMOVED: u16 = 29;
    pub const USER_STATUS: u16 = 34;
    pub const ROOM_INFO: u16 = 54;
    pub const ITEM_PLACED: u16 = 93;
    pub const ITEM_REMOVED: u16 = 94;
    pub const WALL_ITEM_PLACED: u16 = 83;
    pub const SLEEP: u16 = 229;
    pub const TRADE_OPEN: u16 = 104;
    pub const TRADE_ITEMS: u16 = 108;
    pub const TRADE_CONFIRM: u16 = 109;
    pub const TRADE_COMPLETED: u16 = 110;
    pub const TRADE_CLOSE: u16 = 112;
}
