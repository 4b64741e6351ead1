//! DS18B20 scratchpad handling.
//!
//! The MCU firmware runs the 1-Wire transaction and forwards the raw 9-byte
//! scratchpad; the host checks its CRC and converts the temperature register.

use super::{CentiCelsius, HardwareError};

pub const SCRATCHPAD_LEN: usize = 9;

/// Temperature register content at power-on, before the first conversion.
pub const POWER_ON_RAW: i16 = 0x0550;

/// 12-bit resolution configuration byte.
const CONFIG_12_BIT: u8 = 0x7F;

/// Dallas/Maxim 1-Wire CRC-8 (x^8 + x^5 + x^4 + 1, reflected).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}

/// Convert the signed 1/16 degree register value, truncating toward zero.
pub fn raw_to_centi(raw: i16) -> CentiCelsius {
    raw as i32 * 100 / 16
}

pub fn centi_to_raw(centi: CentiCelsius) -> i16 {
    (centi * 16 / 100).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

pub fn decode_scratchpad(scratchpad: &[u8; SCRATCHPAD_LEN]) -> Result<CentiCelsius, HardwareError> {
    let actual = crc8(&scratchpad[..8]);
    let expected = scratchpad[8];
    if actual != expected {
        return Err(HardwareError::Crc { expected, actual });
    }
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    if raw == POWER_ON_RAW {
        tracing::debug!("DS18B20 returned its power-on value; conversion may not have run");
    }
    Ok(raw_to_centi(raw))
}

/// Build the scratchpad a sensor would return for `centi`.
pub fn encode_scratchpad(centi: CentiCelsius) -> [u8; SCRATCHPAD_LEN] {
    let [lsb, msb] = centi_to_raw(centi).to_le_bytes();
    let mut scratchpad = [lsb, msb, 0x4B, 0x46, CONFIG_12_BIT, 0xFF, 0x01, 0x10, 0];
    scratchpad[8] = crc8(&scratchpad[..8]);
    scratchpad
}

pub fn parse_hex(text: &str) -> Result<[u8; SCRATCHPAD_LEN], HardwareError> {
    let text = text.trim();
    if text.len() != SCRATCHPAD_LEN * 2 || !text.is_ascii() {
        return Err(HardwareError::Protocol(format!("bad scratchpad '{}'", text)));
    }
    let mut out = [0u8; SCRATCHPAD_LEN];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16)
            .map_err(|_| HardwareError::Protocol(format!("bad scratchpad '{}'", text)))?;
    }
    Ok(out)
}

pub fn to_hex(scratchpad: &[u8; SCRATCHPAD_LEN]) -> String {
    scratchpad.iter().map(|b| format!("{:02X}", b)).collect()
}
