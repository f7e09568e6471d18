//! Setup payload decoding - QR code (`MT:` prefix, base38) and manual pairing code.

use anyhow::{Context, Result};

use crate::error::PairingError;

pub const RENDEZVOUS_SOFT_AP: u8 = 1;
pub const RENDEZVOUS_BLE: u8 = 2;
pub const RENDEZVOUS_ON_NETWORK: u8 = 4;

const QR_PREFIX: &str = "MT:";
const QR_PAYLOAD_BYTES: usize = 11;
const BASE38_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.";
const MAX_PASSCODE: u32 = 99999998;
const INVALID_PASSCODES: [u32; 12] = [
    0, 11111111, 22222222, 33333333, 44444444, 55555555, 66666666, 77777777, 88888888, 99999999,
    12345678, 87654321,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupPayload {
    pub version: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub commissioning_flow: u8,
    /// bit set of RENDEZVOUS_* values. Manual codes do not carry it and report 0.
    pub rendezvous: u8,
    /// 12 bit discriminator. When short_discriminator is set only upper 4 bits are known.
    pub discriminator: u16,
    pub short_discriminator: bool,
    pub passcode: u32,
}

/// Discriminator used to find device during scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discriminator {
    pub value: u16,
    /// only upper 4 bits of value are significant
    pub short: bool,
}

impl Discriminator {
    /// Check whether discriminator advertised by device matches.
    pub fn matches(&self, advertised: u16) -> bool {
        if self.short {
            (advertised & 0xf00) == (self.value & 0xf00)
        } else {
            (advertised & 0xfff) == self.value
        }
    }
}

impl std::fmt::Display for Discriminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.short {
            write!(f, "{}(short)", self.value >> 8)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

impl SetupPayload {
    pub fn discriminator_filter(&self) -> Discriminator {
        Discriminator {
            value: self.discriminator,
            short: self.short_discriminator,
        }
    }

    pub fn matches_discriminator(&self, advertised: u16) -> bool {
        self.discriminator_filter().matches(advertised)
    }

    fn validate(self) -> Result<Self> {
        if self.passcode > MAX_PASSCODE || INVALID_PASSCODES.contains(&self.passcode) {
            anyhow::bail!("invalid passcode {}", self.passcode);
        }
        Ok(self)
    }
}

/// Parser of barcodes scanned from device label.
pub trait SetupPayloadParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<SetupPayload>;
}

/// Parser accepting QR codes and 11/21 digit manual pairing codes.
/// Any failure is reported as [PairingError::UnrecognizedBarcode].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParser;

impl SetupPayloadParser for DefaultParser {
    fn parse(&self, text: &str) -> Result<SetupPayload> {
        let text = text.trim();
        let res = if text.starts_with(QR_PREFIX) {
            decode_qr_code(text)
        } else {
            decode_manual_pairing_code(text)
        };
        res.map_err(|e| {
            log::debug!("unrecognized barcode {:?}: {:#}", text, e);
            PairingError::UnrecognizedBarcode.into()
        })
    }
}

/// Returns true if barcode can be parsed as setup payload.
pub fn check_barcode(barcode: &str) -> bool {
    DefaultParser.parse(barcode).is_ok()
}

fn base38_decode(data: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 3 / 5 + 2);
    for chunk in data.as_bytes().chunks(5) {
        let nbytes = match chunk.len() {
            5 => 3,
            4 => 2,
            2 => 1,
            n => anyhow::bail!("invalid base38 chunk length {}", n),
        };
        let mut value: u32 = 0;
        for c in chunk.iter().rev() {
            let digit = BASE38_CHARS
                .iter()
                .position(|b| b == c)
                .context(format!("invalid base38 character {:?}", *c as char))?;
            value = value * 38 + digit as u32;
        }
        if value >> (8 * nbytes) != 0 {
            anyhow::bail!("base38 chunk out of range");
        }
        out.extend_from_slice(&value.to_le_bytes()[..nbytes]);
    }
    Ok(out)
}

struct BitReader {
    bits: u128,
}

impl BitReader {
    fn take(&mut self, n: u32) -> u32 {
        let v = (self.bits & ((1u128 << n) - 1)) as u32;
        self.bits >>= n;
        v
    }
}

/// Decode QR code payload. Only first payload of concatenated (`*` separated) code is used.
pub fn decode_qr_code(code: &str) -> Result<SetupPayload> {
    let data = code
        .strip_prefix(QR_PREFIX)
        .context("qr code prefix missing")?;
    let data = data.split('*').next().unwrap_or_default();
    let bytes = base38_decode(data)?;
    if bytes.len() < QR_PAYLOAD_BYTES {
        anyhow::bail!("qr payload too short: {} bytes", bytes.len());
    }
    let mut bits = 0u128;
    for (i, b) in bytes[..QR_PAYLOAD_BYTES].iter().enumerate() {
        bits |= (*b as u128) << (8 * i);
    }
    let mut r = BitReader { bits };
    let payload = SetupPayload {
        version: r.take(3) as u8,
        vendor_id: r.take(16) as u16,
        product_id: r.take(16) as u16,
        commissioning_flow: r.take(2) as u8,
        rendezvous: r.take(8) as u8,
        discriminator: r.take(12) as u16,
        short_discriminator: false,
        passcode: r.take(27),
    };
    if payload.version != 0 {
        anyhow::bail!("unsupported qr payload version {}", payload.version);
    }
    if r.take(4) != 0 {
        anyhow::bail!("qr payload padding not zero");
    }
    payload.validate()
}

const VERHOEFF_D: [[u8; 10]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
    [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
    [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
    [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
    [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
    [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
    [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
    [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];
const VERHOEFF_P: [[u8; 10]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
    [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
    [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
    [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
    [9, 4, 5, 3, 1, 2, 7, 6, 8, 0],
    [4, 2, 8, 6, 5, 7, 0, 3, 9, 1],
    [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
    [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
];

/// digits including check digit
fn verhoeff_valid(digits: &[u8]) -> bool {
    let mut c = 0u8;
    for (i, d) in digits.iter().rev().enumerate() {
        c = VERHOEFF_D[c as usize][VERHOEFF_P[i % 8][*d as usize] as usize];
    }
    c == 0
}

pub fn decode_manual_pairing_code(code: &str) -> Result<SetupPayload> {
    let norm: String = code
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();
    if !norm.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("manual pairing code contains non-digit characters");
    }
    let digits: Vec<u8> = norm.bytes().map(|b| b - b'0').collect();
    let first = digits.first().context("manual pairing code is empty")?;
    if (first & 8) != 0 {
        anyhow::bail!("manual pairing code version {} not supported", first >> 3);
    }
    let long = (first & 4) != 0;
    let expected_len = if long { 21 } else { 11 };
    if digits.len() != expected_len {
        anyhow::bail!(
            "manual pairing code has {} digits, expected {}",
            digits.len(),
            expected_len
        );
    }
    if !verhoeff_valid(&digits) {
        anyhow::bail!("manual pairing code check digit mismatch");
    }
    let first = (*first & 3) as u32;
    let second = norm[1..6].parse::<u32>()?;
    let third = norm[6..10].parse::<u32>()?;
    let (vendor_id, product_id) = if long {
        (norm[10..15].parse::<u16>()?, norm[15..20].parse::<u16>()?)
    } else {
        (0, 0)
    };
    let passcode = second & 0x3fff | (third << 14);
    let discriminator = ((first << 10) | (second >> 6) & 0x300) as u16;
    SetupPayload {
        version: 0,
        vendor_id,
        product_id,
        commissioning_flow: if long { 2 } else { 0 },
        rendezvous: 0,
        discriminator,
        short_discriminator: true,
        passcode,
    }
    .validate()
}

#[cfg(test)]
mod tests {
    use super::{
        check_barcode, decode_manual_pairing_code, decode_qr_code, DefaultParser,
        SetupPayloadParser, RENDEZVOUS_BLE, RENDEZVOUS_ON_NETWORK,
    };
    use crate::error::PairingError;

    #[test]
    pub fn test_1() {
        let res = decode_manual_pairing_code("2585-103-3238").unwrap();
        assert_eq!(res.discriminator, 2816);
        assert_eq!(res.passcode, 54453390);
        assert!(res.short_discriminator);
    }

    #[test]
    pub fn test_2() {
        let res = decode_manual_pairing_code("34970112332").unwrap();
        assert_eq!(res.discriminator, 3840);
        assert_eq!(res.passcode, 20202021);
        assert!(res.matches_discriminator(3840));
        assert!(res.matches_discriminator(0xf42));
        assert!(!res.matches_discriminator(0xe00));
        assert_eq!(res.discriminator_filter().to_string(), "15(short)");
    }

    #[test]
    pub fn test_manual_bad_check_digit() {
        assert!(decode_manual_pairing_code("34970112331").is_err());
        assert!(decode_manual_pairing_code("3497011233").is_err());
        assert!(decode_manual_pairing_code("3497x112332").is_err());
        // check digit is valid, version bit is not
        assert!(decode_manual_pairing_code("84970112331").is_err());
        assert!(!check_barcode("84970112331"));
    }

    #[test]
    pub fn test_qr() {
        let res = decode_qr_code("MT:Y.K9042C00KA0648G00").unwrap();
        assert_eq!(res.vendor_id, 0xfff1);
        assert_eq!(res.product_id, 0x8000);
        assert_eq!(res.rendezvous, RENDEZVOUS_BLE);
        assert_eq!(res.discriminator, 3840);
        assert_eq!(res.passcode, 20202021);
        assert!(!res.short_discriminator);
        assert!(res.matches_discriminator(3840));
        assert!(!res.matches_discriminator(3841));

        let res = decode_qr_code("MT:-24J0AFN00KA0648G00").unwrap();
        assert_eq!(res.product_id, 0x8001);
        assert_eq!(res.rendezvous, RENDEZVOUS_ON_NETWORK);

        let res = decode_qr_code("MT:06PS0KQS02MGVH7SR00").unwrap();
        assert_eq!(res.product_id, 0x8002);
        assert_eq!(res.discriminator, 1234);
        assert_eq!(res.passcode, 34567890);
    }

    #[test]
    pub fn test_qr_invalid() {
        assert!(decode_qr_code("MT:").is_err());
        assert!(decode_qr_code("MT:Y.K9042C00KA0648G0").is_err());
        assert!(decode_qr_code("MT:y.K9042C00KA0648G00").is_err());
        assert!(decode_qr_code("MT:.........KA0648G00").is_err());
    }

    #[test]
    pub fn test_parser() {
        let p = DefaultParser;
        assert_eq!(p.parse(" MT:Y.K9042C00KA0648G00\n").unwrap().passcode, 20202021);
        let e = p.parse("hello").unwrap_err();
        assert_eq!(e.downcast_ref::<PairingError>(), Some(&PairingError::UnrecognizedBarcode));
    }

    #[test]
    pub fn test_check_barcode() {
        assert!(check_barcode("MT:Y.K9042C00KA0648G00"));
        assert!(check_barcode("3497-011-2332"));
        assert!(!check_barcode(""));
        assert!(!check_barcode("-"));
        assert!(!check_barcode("MT"));
        assert!(!check_barcode("random text"));
        assert!(!check_barcode("MT:%%%%%"));
        assert!(!check_barcode("🦀🦀🦀🦀🦀🦀🦀🦀🦀🦀🦀"));
        assert!(!check_barcode("00000000000"));
    }
}
