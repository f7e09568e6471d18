//! Utilities to encode/decode simple type-length-value records
//! (one byte type, one byte length, value) as used by Thread MeshCoP datasets.

use anyhow::Result;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Buffer to encode tlv records. Create buffer, write records then use data member which contains encoded tlv.
/// ```
/// # use matpair::tlv;
/// # use anyhow::Result;
/// # fn main() -> Result<()> {
/// let mut tlv = tlv::TlvBuffer::new();
/// tlv.write_uint16(1, 0x1234)?;
/// tlv.write_bytes(2, &[1, 2, 3])?;
/// assert_eq!(tlv.data, vec![1, 2, 0x12, 0x34, 2, 3, 1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub struct TlvBuffer {
    pub data: Vec<u8>,
}

impl TlvBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(64),
        }
    }
    fn write_header(&mut self, typ: u8, len: usize) -> Result<()> {
        if len > u8::MAX as usize {
            anyhow::bail!("tlv value too long for type {}: {} bytes", typ, len);
        }
        self.data.write_u8(typ)?;
        self.data.write_u8(len as u8)?;
        Ok(())
    }
    pub fn write_bytes(&mut self, typ: u8, value: &[u8]) -> Result<()> {
        self.write_header(typ, value.len())?;
        self.data.write_all(value)?;
        Ok(())
    }
    /// big-endian, as all MeshCoP integers are
    pub fn write_uint16(&mut self, typ: u8, value: u16) -> Result<()> {
        self.write_header(typ, 2)?;
        self.data.write_u16::<BigEndian>(value)?;
        Ok(())
    }
}

impl Default for TlvBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded tlv record returned by [decode_tlv]
#[derive(Debug, Clone, PartialEq)]
pub struct TlvItem {
    pub typ: u8,
    pub value: Vec<u8>,
}

/// decode raw buffer with tlv records
pub fn decode_tlv(data: &[u8]) -> Result<Vec<TlvItem>> {
    let mut cursor = Cursor::new(data);
    let mut out = Vec::new();
    while cursor.position() < data.len() as u64 {
        let typ = cursor.read_u8()?;
        let len = cursor
            .read_u8()
            .map_err(|_| anyhow::anyhow!("truncated tlv header for type {}", typ))?;
        let mut value = vec![0; len as usize];
        cursor.read_exact(&mut value).map_err(|_| {
            anyhow::anyhow!("truncated tlv value for type {}: expected {} bytes", typ, len)
        })?;
        out.push(TlvItem { typ, value });
    }
    Ok(out)
}

/// Find first record of given type
pub fn find(items: &[TlvItem], typ: u8) -> Option<&TlvItem> {
    items.iter().find(|i| i.typ == typ)
}
