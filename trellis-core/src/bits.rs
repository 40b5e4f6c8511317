//! Bit, BCD and scaling helpers shared by register-level drivers

/// Set bit `pos` of `value`
#[inline]
pub const fn set_bit(value: u8, pos: u8) -> u8 {
    value | (1 << pos)
}

/// Clear bit `pos` of `value`
#[inline]
pub const fn clear_bit(value: u8, pos: u8) -> u8 {
    value & !(1 << pos)
}

/// Set or clear bit `pos` of `value`
#[inline]
pub const fn with_bit(value: u8, pos: u8, on: bool) -> u8 {
    if on {
        set_bit(value, pos)
    } else {
        clear_bit(value, pos)
    }
}

/// Whether bit `pos` of `value` is set
#[inline]
pub const fn is_bit_set(value: u8, pos: u8) -> bool {
    value & (1 << pos) != 0
}

/// Encode 0..=99 as packed BCD
///
/// Values above 99 clamp to 0x99 so the result is always a valid BCD byte.
pub fn bcd_encode(value: u8) -> u8 {
    let value = if value > 99 {
        log::warn!("BCD value {} out of range, clamped to 99", value);
        99
    } else {
        value
    };
    ((value / 10) << 4) | (value % 10)
}

/// Decode a packed BCD byte
///
/// Nibbles above 9 are read as 9.
pub fn bcd_decode(bcd: u8) -> u8 {
    let tens = (bcd >> 4).min(9);
    let ones = (bcd & 0x0F).min(9);
    tens * 10 + ones
}

/// Interpret the low `bits` of `value` as two's complement
pub fn twos_complement(value: u32, bits: u8) -> i32 {
    debug_assert!((1..=32).contains(&bits));
    let shift = 32 - u32::from(bits);
    ((value << shift) as i32) >> shift
}

/// Map `input` from `[min, max]` onto `[0.0, 1.0]`, clamped
pub fn from_scale(input: f64, min: f64, max: f64) -> f64 {
    ((input - min) / (max - min)).clamp(0.0, 1.0)
}

/// Map `input` from `[0.0, 1.0]` onto `[min, max]`, clamped
pub fn to_scale(input: f64, min: f64, max: f64) -> f64 {
    (input * (max - min) + min).clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bit_helpers() {
        assert_eq!(set_bit(0x00, 7), 0x80);
        assert_eq!(clear_bit(0xFF, 0), 0xFE);
        assert_eq!(with_bit(0x7F, 7, true), 0xFF);
        assert_eq!(with_bit(0x80, 7, false), 0x00);
        assert!(is_bit_set(0x20, 5));
        assert!(!is_bit_set(0x20, 4));
    }

    #[test]
    fn test_bcd_known_values() {
        assert_eq!(bcd_encode(0), 0x00);
        assert_eq!(bcd_encode(21), 0x21);
        assert_eq!(bcd_encode(99), 0x99);
        assert_eq!(bcd_decode(0x59), 59);
    }

    #[test]
    fn test_bcd_clamps() {
        assert_eq!(bcd_encode(150), 0x99);
        assert_eq!(bcd_decode(0xAF), 99);
    }

    #[test]
    fn test_twos_complement_12bit() {
        assert_eq!(twos_complement(0x7FF, 12), 2047);
        assert_eq!(twos_complement(0x800, 12), -2048);
        assert_eq!(twos_complement(0xFFF, 12), -1);
    }

    #[test]
    fn test_scale() {
        assert_eq!(from_scale(90.0, 0.0, 180.0), 0.5);
        assert_eq!(to_scale(0.5, 200.0, 500.0), 350.0);
        assert_eq!(to_scale(2.0, 0.0, 4095.0), 4095.0);
        assert_eq!(from_scale(-5.0, 0.0, 255.0), 0.0);
    }

    proptest! {
        #[test]
        fn test_bcd_roundtrip(v in 0u8..=99) {
            let bcd = bcd_encode(v);
            prop_assert!(bcd <= 0x99);
            prop_assert_eq!(bcd_decode(bcd), v);
        }

        #[test]
        fn test_bcd_always_valid(v in any::<u8>()) {
            let bcd = bcd_encode(v);
            prop_assert!(bcd >> 4 <= 9 && bcd & 0x0F <= 9);
        }
    }
}
