//! Property-based tests for the volume and gain math.
//! Verifies invariants hold for ALL valid inputs, not just fixed examples.

#![allow(clippy::unwrap_used)]

use tas58xx::config::{volume_db_to_raw, VOLUME_RAW_MUTE};
use tas58xx::{AnalogGain, DeviceConfig};

proptest::proptest! {
    /// Clamping always lands inside the configured window and is idempotent,
    /// for any window with the required 9 dB span and any i8 request.
    #[test]
    fn clamp_is_total_and_idempotent(
        min in -103i8..=15i8,
        span in 9i8..=60i8,
        db in -128i8..=127i8,
    ) {
        let max = min.saturating_add(span).min(24);
        let config = DeviceConfig { volume_min_db: min, volume_max_db: max, ..DeviceConfig::default() };
        config.validate().unwrap();

        let once = config.clamp_volume_db(db);
        assert!((min..=max).contains(&once));
        assert_eq!(config.clamp_volume_db(once), once);
    }

    /// The register encoding never produces the mute code for a clamped
    /// volume — mute is a separate control bit, not a volume value.
    #[test]
    fn encoding_never_hits_the_mute_code(db in -103i8..=24i8) {
        let raw = volume_db_to_raw(db);
        assert!(raw <= 0xFE);
        assert_ne!(raw, VOLUME_RAW_MUTE);
    }

    /// Lower dB means more attenuation steps (monotone inverse), one raw
    /// step per half dB.
    #[test]
    fn encoding_is_monotone_inverse(a in -103i8..=24i8, b in -103i8..=24i8) {
        let ra = volume_db_to_raw(a);
        let rb = volume_db_to_raw(b);
        if a > b {
            assert!(ra < rb);
            assert_eq!(u16::from(rb) - u16::from(ra), 2 * (i16::from(a) - i16::from(b)) as u16);
        } else if a < b {
            assert!(ra > rb);
        } else {
            assert_eq!(ra, rb);
        }
    }

    /// The encoding round-trips through its defining formula.
    #[test]
    fn encoding_round_trips(db in -103i8..=24i8) {
        let raw = volume_db_to_raw(db);
        let back = 24 - i16::from(raw) / 2;
        assert_eq!(back, i16::from(db));
    }

    /// Out-of-range dB saturates at the chip limits before encoding.
    #[test]
    fn encoding_saturates_at_chip_limits(db in -128i8..=127i8) {
        let raw = volume_db_to_raw(db);
        assert!(raw <= volume_db_to_raw(-103));
        assert!(raw >= volume_db_to_raw(24));
    }

    /// Gain codes 0..=31 round-trip through dB and back.
    #[test]
    fn analog_gain_codes_round_trip(code in 0u8..=31u8) {
        let gain = AnalogGain::from_code(code).unwrap();
        let again = AnalogGain::from_db(gain.db()).unwrap();
        assert_eq!(again.code(), code);
    }

    /// Codes past the 5-bit field never construct.
    #[test]
    fn analog_gain_rejects_wide_codes(code in 32u8..=255u8) {
        assert!(AnalogGain::from_code(code).is_err());
    }
}
