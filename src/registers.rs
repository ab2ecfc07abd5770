//! Register decoding for the ZBM battery controller
//!
//! Raw holding-register words are either unsigned or two's-complement signed
//! 16-bit integers. Physical quantities are kept as scaled integers (fixed
//! point with a power-of-ten factor) and only divided when exposed. Decoding
//! never fails: every 16-bit pattern is a valid input.

/// Stored voltages are in 0.1 V
pub const VOLTS_SCALE: i32 = 10;
/// Stored currents are in 0.1 A
pub const AMPS_SCALE: i32 = 10;
/// Stored battery temperature is in 0.1 °C
pub const TEMP_SCALE: i32 = 10;
/// Stored state of charge is in 0.01 %
pub const SOC_SCALE: i32 = 100;

/// Single-register device identity
pub const REG_DEVICE: u16 = 0x000D;
/// Two-register serial number
pub const REG_SERIAL: u16 = 0x0005;
/// Two-register firmware version, first word is the version
pub const REG_FIRMWARE_VERSION: u16 = 0x0003;
/// Two-register application mode, first word is the application code
pub const REG_APPLICATION: u16 = 0x1101;

/// Interpret a register word as an unsigned integer
pub fn decode_unsigned16(word: u16) -> i32 {
    i32::from(word)
}

/// Interpret a register word as a two's-complement signed integer
pub fn decode_signed16(word: u16) -> i32 {
    i32::from(word as i16)
}

/// Encode a signed value as it would appear on the wire (inverse of [`decode_signed16`])
pub fn encode_signed16(value: i16) -> u16 {
    value as u16
}

/// Convert a physical value to its stored fixed-point representation
pub fn scale(value: f64, factor: i32) -> i32 {
    (value * f64::from(factor)).round() as i32
}

/// Convert a stored fixed-point value back to its physical value
pub fn unscale(raw: i32, factor: i32) -> f64 {
    f64::from(raw) / f64::from(factor)
}

/// Compose the serial number string from the two serial-number registers.
///
/// The high word is masked to 16 bits *after* being shifted, which discards
/// it entirely; the reported serial is therefore the low word.
// TODO: confirm with Redflow whether the mask was meant to apply to the high
// word before the shift; existing installations are keyed on this value.
pub fn compose_serial(hi: u16, lo: u16) -> String {
    let hi = (u32::from(hi) << 16) & 0xFFFF;
    (hi + u32::from(lo)).to_string()
}
