//! Thread operational dataset.
//!
//! Dataset handed to the device controller is sequence of MeshCoP tlv records in fixed order:
//! Channel, PAN ID, Extended PAN ID, Network Master Key.
//! ```
//! # use matpair::dataset;
//! # fn main() -> anyhow::Result<()> {
//! let xpan = hex::decode("1122334455667788")?;
//! let key = hex::decode("00112233445566778899aabbccddeeff")?;
//! let encoded = dataset::encode(15, 0xffff, &xpan, &key)?;
//! assert_eq!(encoded.len(), 37);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;

use crate::{error::PairingError, tlv};

pub const TYPE_CHANNEL: u8 = 0;
pub const TYPE_PANID: u8 = 1;
pub const TYPE_XPANID: u8 = 2;
pub const TYPE_MASTER_KEY: u8 = 5;

pub const NUM_CHANNEL_BYTES: usize = 3;
pub const NUM_PANID_BYTES: usize = 2;
pub const NUM_XPANID_BYTES: usize = 8;
pub const NUM_MASTER_KEY_BYTES: usize = 16;

const CHANNEL_PAGE_0: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationalDataset {
    pub channel: u16,
    pub pan_id: u16,
    pub extended_pan_id: [u8; NUM_XPANID_BYTES],
    pub master_key: [u8; NUM_MASTER_KEY_BYTES],
}

fn malformed(msg: String) -> anyhow::Error {
    PairingError::MalformedCredentials(msg).into()
}

fn fixed<const N: usize>(name: &str, data: &[u8]) -> Result<[u8; N]> {
    data.try_into()
        .map_err(|_| malformed(format!("{} must be {} bytes, got {}", name, N, data.len())))
}

fn decode_hex(name: &str, value: Option<&str>) -> Result<Vec<u8>> {
    hex::decode(value.unwrap_or_default())
        .map_err(|e| malformed(format!("{} is not valid hex: {}", name, e)))
}

impl OperationalDataset {
    pub fn new(channel: u16, pan_id: u16, extended_pan_id: &[u8], master_key: &[u8]) -> Result<Self> {
        Ok(Self {
            channel,
            pan_id,
            extended_pan_id: fixed("extended pan id", extended_pan_id)?,
            master_key: fixed("master key", master_key)?,
        })
    }

    /// Create dataset from hex strings as supplied by host application.
    /// Missing value is treated as empty string, which is then rejected for wrong length.
    pub fn from_hex(
        channel: u16,
        pan_id: u16,
        extended_pan_id: Option<&str>,
        master_key: Option<&str>,
    ) -> Result<Self> {
        let xpan = decode_hex("extended pan id", extended_pan_id)?;
        let key = decode_hex("master key", master_key)?;
        Self::new(channel, pan_id, &xpan, &key)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut tlv = tlv::TlvBuffer::new();
        let [ch_hi, ch_lo] = self.channel.to_be_bytes();
        tlv.write_bytes(TYPE_CHANNEL, &[CHANNEL_PAGE_0, ch_hi, ch_lo])?;
        tlv.write_uint16(TYPE_PANID, self.pan_id)?;
        tlv.write_bytes(TYPE_XPANID, &self.extended_pan_id)?;
        tlv.write_bytes(TYPE_MASTER_KEY, &self.master_key)?;
        log::trace!("operational dataset {}", hex::encode(&tlv.data));
        Ok(tlv.data)
    }

    /// Parse dataset. Unknown record types are skipped.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let items = tlv::decode_tlv(data).map_err(|e| malformed(e.to_string()))?;
        let channel = find_record(&items, TYPE_CHANNEL, "channel", NUM_CHANNEL_BYTES)?;
        if channel[0] != CHANNEL_PAGE_0 {
            return Err(malformed(format!("unsupported channel page {}", channel[0])));
        }
        let pan_id = find_record(&items, TYPE_PANID, "pan id", NUM_PANID_BYTES)?;
        Self::new(
            u16::from_be_bytes([channel[1], channel[2]]),
            u16::from_be_bytes([pan_id[0], pan_id[1]]),
            find_record(&items, TYPE_XPANID, "extended pan id", NUM_XPANID_BYTES)?,
            find_record(&items, TYPE_MASTER_KEY, "master key", NUM_MASTER_KEY_BYTES)?,
        )
    }
}

fn find_record<'a>(items: &'a [tlv::TlvItem], typ: u8, name: &str, len: usize) -> Result<&'a [u8]> {
    let item = tlv::find(items, typ).ok_or_else(|| malformed(format!("{} record missing", name)))?;
    if item.value.len() != len {
        return Err(malformed(format!(
            "{} record has length {}, expected {}",
            name,
            item.value.len(),
            len
        )));
    }
    Ok(&item.value)
}

/// Encode Thread operational dataset. Extended PAN ID must be 8 bytes and master key 16 bytes,
/// otherwise [PairingError::MalformedCredentials] is returned.
pub fn encode(channel: u16, pan_id: u16, extended_pan_id: &[u8], master_key: &[u8]) -> Result<Vec<u8>> {
    OperationalDataset::new(channel, pan_id, extended_pan_id, master_key)?.encode()
}

#[cfg(test)]
mod tests {
    use super::{encode, OperationalDataset};
    use crate::error::PairingError;

    const XPAN: &str = "1122334455667788";
    const KEY: &str = "00112233445566778899aabbccddeeff";

    fn is_malformed(e: &anyhow::Error) -> bool {
        matches!(
            e.downcast_ref::<PairingError>(),
            Some(PairingError::MalformedCredentials(_))
        )
    }

    #[test]
    fn test_layout() {
        let xpan = hex::decode(XPAN).unwrap();
        let key = hex::decode(KEY).unwrap();
        let out = encode(0x1234, 0xabcd, &xpan, &key).unwrap();
        assert_eq!(out.len(), 37);
        assert_eq!(&out[0..5], &[0, 3, 0x00, 0x12, 0x34]);
        assert_eq!(&out[5..9], &[1, 2, 0xab, 0xcd]);
        assert_eq!(&out[9..11], &[2, 8]);
        assert_eq!(&out[11..19], xpan.as_slice());
        assert_eq!(&out[19..21], &[5, 16]);
        assert_eq!(&out[21..37], key.as_slice());
    }

    #[test]
    fn test_channel_15() {
        let ds = OperationalDataset::from_hex(15, 0xffff, Some(XPAN), Some(KEY)).unwrap();
        let out = ds.encode().unwrap();
        assert_eq!(
            hex::encode(out),
            format!("000300000f0102ffff0208{}0510{}", XPAN, KEY)
        );
    }

    #[test]
    fn test_decode_back() {
        let ds = OperationalDataset::from_hex(26, 0x1a2b, Some(XPAN), Some(KEY)).unwrap();
        let decoded = OperationalDataset::decode(&ds.encode().unwrap()).unwrap();
        assert_eq!(decoded, ds);
    }

    #[test]
    fn test_decode_skips_unknown_and_any_order() {
        // active timestamp (type 14) first, records reordered
        let data = hex::decode(concat!(
            "0e080000000000010000",
            "051000112233445566778899aabbccddeeff",
            "0102beef",
            "0003000019",
            "02081122334455667788"
        ))
        .unwrap();
        let ds = OperationalDataset::decode(&data).unwrap();
        assert_eq!(ds.channel, 25);
        assert_eq!(ds.pan_id, 0xbeef);
        assert_eq!(hex::encode(ds.extended_pan_id), XPAN);
    }

    #[test]
    fn test_decode_errors() {
        let ds = OperationalDataset::from_hex(11, 1, Some(XPAN), Some(KEY)).unwrap();
        let good = ds.encode().unwrap();
        assert!(is_malformed(&OperationalDataset::decode(&good[..36]).unwrap_err()));
        assert!(is_malformed(&OperationalDataset::decode(&good[5..]).unwrap_err()));
        let mut bad_page = good.clone();
        bad_page[2] = 1;
        assert!(is_malformed(&OperationalDataset::decode(&bad_page).unwrap_err()));
    }

    #[test]
    fn test_empty_hex_rejected() {
        assert_eq!(hex::decode("").unwrap(), Vec::<u8>::new());
        let e = OperationalDataset::from_hex(15, 1, None, Some(KEY)).unwrap_err();
        assert!(is_malformed(&e));
        let e = OperationalDataset::from_hex(15, 1, Some(XPAN), Some("")).unwrap_err();
        assert!(is_malformed(&e));
        let e = encode(15, 1, &[], &[]).unwrap_err();
        assert!(is_malformed(&e));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let e = encode(15, 1, &[0; 9], &[0; 16]).unwrap_err();
        assert!(is_malformed(&e));
        let e = encode(15, 1, &[0; 8], &[0; 15]).unwrap_err();
        assert!(is_malformed(&e));
        // 33 hex digits
        let e = OperationalDataset::from_hex(15, 1, Some(XPAN), Some("00112233445566778899aabbccddeeff0"))
            .unwrap_err();
        assert!(is_malformed(&e));
        let e = OperationalDataset::from_hex(15, 1, Some("zz22334455667788"), Some(KEY)).unwrap_err();
        assert!(is_malformed(&e));
    }
}
