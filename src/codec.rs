//! Field codec: bounds-checked big-endian readers over a byte window.
//!
//! Every ITCH field is read through one of these functions. A read whose
//! `offset + width` exceeds the window returns [`ItchError::TruncatedField`];
//! no read touches bytes past the window and none of them allocate.
//!
//! Integers are unsigned big-endian (`byteorder::BigEndian`). Prices are
//! 4-byte integers with 4 implied decimals, except MWCB decline levels which
//! are 8-byte integers with 8 implied decimals. Alpha fields are returned as
//! raw space-padded bytes.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{ItchError, Result};
use crate::types::{Alpha, Price, Price8, Side, Timestamp};

/// Borrow `width` bytes at `offset`, or report how short the window is.
#[inline(always)]
fn window(buf: &[u8], offset: usize, width: usize) -> Result<&[u8]> {
    match offset.checked_add(width) {
        Some(end) if end <= buf.len() => Ok(&buf[offset..end]),
        _ => Err(ItchError::TruncatedField {
            offset,
            width,
            available: buf.len(),
        }),
    }
}

/// Read a single byte.
#[inline]
pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(window(buf, offset, 1)?[0])
}

/// Read a 2-byte big-endian integer.
#[inline]
pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(BigEndian::read_u16(window(buf, offset, 2)?))
}

/// Read a 4-byte big-endian integer.
#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(BigEndian::read_u32(window(buf, offset, 4)?))
}

/// Read a 6-byte big-endian integer (ITCH timestamps).
#[inline]
pub fn read_u48(buf: &[u8], offset: usize) -> Result<u64> {
    Ok(BigEndian::read_uint(window(buf, offset, 6)?, 6))
}

/// Read an 8-byte big-endian integer.
#[inline]
pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    Ok(BigEndian::read_u64(window(buf, offset, 8)?))
}

/// Read a 6-byte nanoseconds-since-midnight timestamp.
#[inline]
pub fn read_timestamp(buf: &[u8], offset: usize) -> Result<Timestamp> {
    read_u48(buf, offset).map(Timestamp::from_nanos)
}

/// Read an `N`-byte alpha field without trimming.
#[inline]
pub fn read_alpha<const N: usize>(buf: &[u8], offset: usize) -> Result<Alpha<N>> {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(window(buf, offset, N)?);
    Ok(Alpha::from_bytes(bytes))
}

/// Read a 4-byte price with 4 implied decimals.
#[inline]
pub fn read_price4(buf: &[u8], offset: usize) -> Result<Price> {
    read_u32(buf, offset).map(|raw| Price::from_raw(i64::from(raw)))
}

/// Read an 8-byte price with 8 implied decimals.
///
/// The raw value is reinterpreted as signed; real decline levels fit easily.
#[inline]
pub fn read_price8(buf: &[u8], offset: usize) -> Result<Price8> {
    read_u64(buf, offset).map(|raw| Price8::from_raw(raw as i64))
}

/// Read a single-character code field.
#[inline]
pub fn read_char(buf: &[u8], offset: usize) -> Result<char> {
    read_u8(buf, offset).map(char::from)
}

/// Read a buy/sell indicator.
///
/// `tag` identifies the message for the error; bytes other than `B`/`S` are
/// rejected as [`ItchError::InvalidField`].
#[inline]
pub fn read_side(buf: &[u8], offset: usize, tag: u8) -> Result<Side> {
    let byte = read_u8(buf, offset)?;
    Side::from_byte(byte).ok_or(ItchError::InvalidField {
        tag,
        field: "side",
        value: byte,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_big_endian() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u8(&buf, 0).unwrap(), 0x01);
        assert_eq!(read_u16(&buf, 0).unwrap(), 0x0102);
        assert_eq!(read_u32(&buf, 2).unwrap(), 0x0304_0506);
        assert_eq!(read_u48(&buf, 0).unwrap(), 0x0102_0304_0506);
        assert_eq!(read_u64(&buf, 0).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_timestamp_is_six_bytes() {
        // 09:30:00 = 34_200_000_000_000 ns = 0x1F1A_CED9_F000
        let mut buf = [0u8; 8];
        buf[1..7].copy_from_slice(&[0x1F, 0x1A, 0xCE, 0xD9, 0xF0, 0x00]);
        let ts = read_timestamp(&buf, 1).unwrap();
        assert_eq!(ts.nanos(), 34_200_000_000_000);
        assert_eq!(ts.to_string(), "09:30:00.000000000");
    }

    #[test]
    fn test_read_past_window_is_truncated_field() {
        let buf = [0u8; 5];
        assert_eq!(
            read_u32(&buf, 2),
            Err(ItchError::TruncatedField {
                offset: 2,
                width: 4,
                available: 5
            })
        );
        assert!(read_u8(&buf, 5).is_err());
        assert!(read_u64(&buf, 0).is_err());
        assert!(read_alpha::<8>(&buf, 0).is_err());
        // Offset overflow must not panic
        assert!(read_u16(&buf, usize::MAX).is_err());
    }

    #[test]
    fn test_exact_fit_reads_succeed() {
        let buf = [0u8; 4];
        assert!(read_u32(&buf, 0).is_ok());
        assert!(read_u16(&buf, 2).is_ok());
        assert!(read_u8(&buf, 3).is_ok());
    }

    #[test]
    fn test_alpha_is_untrimmed() {
        let buf = *b"xMSFT    y";
        let sym: Alpha<8> = read_alpha(&buf, 1).unwrap();
        assert_eq!(sym.raw(), b"MSFT    ");
        assert_eq!(sym.as_str(), Some("MSFT"));
    }

    #[test]
    fn test_prices() {
        let buf = 1_000_000u32.to_be_bytes();
        assert_eq!(read_price4(&buf, 0).unwrap().to_string(), "100.0000");

        let buf = 312_500_000_000u64.to_be_bytes();
        assert_eq!(read_price8(&buf, 0).unwrap().to_string(), "3125.00000000");
    }

    #[test]
    fn test_side_validation() {
        assert_eq!(read_side(b"B", 0, b'A').unwrap(), Side::Buy);
        assert_eq!(read_side(b"S", 0, b'A').unwrap(), Side::Sell);
        assert_eq!(
            read_side(b"Z", 0, b'A'),
            Err(ItchError::InvalidField {
                tag: b'A',
                field: "side",
                value: b'Z'
            })
        );
        assert_eq!(read_char(b"Q", 0).unwrap(), 'Q');
    }
}
