//! Device configuration.
//!
//! [`DeviceConfig`] is built once by the wiring layer from validated input
//! and never mutated afterwards. The cross-field invariants are re-checked
//! here ([`DeviceConfig::validate`]) as a defensive contract boundary —
//! they must fail before a single byte goes over the bus, never mid-write.

use crate::registers::DacVariant;

/// Digital volume floor supported by the chip, in dB.
pub const VOLUME_DB_MIN: i8 = -103;
/// Digital volume ceiling supported by the chip, in dB.
pub const VOLUME_DB_MAX: i8 = 24;
/// Minimum usable span between `volume_max_db` and `volume_min_db`, in dB.
pub const VOLUME_SPAN_MIN_DB: i8 = 9;
/// Upper bound of the crossover frequency range, in Hz.
pub const CROSSOVER_HZ_MAX: u16 = 25_000;
/// Raw volume-register value that mutes both channels.
pub const VOLUME_RAW_MUTE: u8 = 0xFF;

/// Amplifier output bridging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DacMode {
    /// Bridge-tied load — stereo, one bridge per channel.
    Btl,
    /// Parallel bridge-tied load — both bridges drive a single load.
    Pbtl,
}

/// How the stereo input channels are combined before amplification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixerMode {
    /// Left to left, right to right.
    Stereo,
    /// Channels swapped.
    StereoInverse,
    /// Both channels summed at −6 dB into both outputs.
    Mono,
    /// Right input to both outputs.
    Right,
    /// Left input to both outputs.
    Left,
}

/// Source feeding the mono mix. Only meaningful when the mixer mode is
/// [`MixerMode::Mono`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MonoMixerMode {
    /// Left input only.
    Left,
    /// Right input only.
    Right,
    /// Both inputs summed.
    #[default]
    Stereo,
    /// Left channel, post-EQ.
    EqLeft,
    /// Right channel, post-EQ.
    EqRight,
}

impl MonoMixerMode {
    /// Register code for the mono mix source select.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Stereo => 2,
            Self::EqLeft => 3,
            Self::EqRight => 4,
        }
    }
}

/// Chip-reported fault bits deliberately ignored as known-benign.
///
/// Clock faults are an expected transient on hardware where the I²S clock
/// starts after the amplifier — masking them keeps the poller from cycling
/// the device through recovery on every track change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IgnoreFaultMode {
    /// Every reported fault bit is acted on.
    None,
    /// The clock-fault bit is masked out of fault evaluation.
    #[default]
    ClockFault,
}

/// When the deferred routing refresh (mixer/crossbar re-write after the I²S
/// clock has stabilised) is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AutoRefreshMode {
    /// The first gain change after initialisation triggers the refresh.
    #[default]
    ByGain,
    /// Only an explicit EQ switch-on or profile change triggers it.
    BySwitch,
}

/// Analog gain setting — one of 32 discrete half-dB steps.
///
/// Code 0 = 0 dB (29.5 V peak), code 31 = −15.5 dB. Values between steps do
/// not exist in hardware and are rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogGain(u8);

impl AnalogGain {
    /// Number of gain steps the chip supports.
    pub const STEPS: u8 = 32;

    /// Build from a gain in dB. The value must lie on a half-dB step within
    /// −15.5..=0.0 dB.
    ///
    /// # Errors
    ///
    /// [`ConfigError::GainNotOnStep`] if the value is out of range or falls
    /// between two steps.
    pub fn from_db(db: f32) -> Result<Self, ConfigError> {
        let doubled = db * -2.0;
        #[allow(clippy::cast_possible_truncation)]
        let code = doubled as i32;
        #[allow(clippy::cast_precision_loss)]
        let on_step = code as f32 == doubled;
        if !(0.0..=31.0).contains(&doubled) || !on_step {
            return Err(ConfigError::GainNotOnStep);
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(Self(code as u8))
    }

    /// Build from a raw 5-bit gain code.
    ///
    /// # Errors
    ///
    /// [`ConfigError::GainNotOnStep`] if the code exceeds 31.
    pub fn from_code(code: u8) -> Result<Self, ConfigError> {
        if code >= Self::STEPS {
            return Err(ConfigError::GainNotOnStep);
        }
        Ok(Self(code))
    }

    /// Raw register code (0..=31).
    #[must_use]
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Gain in dB.
    #[must_use]
    pub fn db(self) -> f32 {
        f32::from(self.0) * -0.5
    }
}

impl Default for AnalogGain {
    /// −15.5 dB — the quietest step, the safe default for unknown speakers.
    fn default() -> Self {
        Self(31)
    }
}

/// One of the twelve output crossbar routes: an input channel
/// (left/right/mono) connected to an amplifier or digital output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CrossbarRoute {
    /// Left input → left amplifier.
    LeftToAmpLeft = 0,
    /// Right input → left amplifier.
    RightToAmpLeft = 1,
    /// Mono mix → left amplifier.
    MonoToAmpLeft = 2,
    /// Left input → right amplifier.
    LeftToAmpRight = 3,
    /// Right input → right amplifier.
    RightToAmpRight = 4,
    /// Mono mix → right amplifier.
    MonoToAmpRight = 5,
    /// Left input → I²S out, left slot.
    LeftToI2sLeft = 6,
    /// Right input → I²S out, left slot.
    RightToI2sLeft = 7,
    /// Mono mix → I²S out, left slot.
    MonoToI2sLeft = 8,
    /// Left input → I²S out, right slot.
    LeftToI2sRight = 9,
    /// Right input → I²S out, right slot.
    RightToI2sRight = 10,
    /// Mono mix → I²S out, right slot.
    MonoToI2sRight = 11,
}

impl CrossbarRoute {
    /// Number of routes in the crossbar.
    pub const COUNT: usize = 12;

    /// The route's bit within the 12-bit routing mask.
    #[must_use]
    pub const fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

/// The 12-bit output signal-routing matrix.
///
/// The default is the chip's power-on routing — straight-through to the
/// amplifiers with an I²S monitor tap — **not** all-zero; an all-zero
/// crossbar would disconnect every output. A configuration that routes
/// explicitly starts from [`Crossbar::empty`] and describes the full matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crossbar(u16);

impl Crossbar {
    /// Power-on routing: L→amp-L, R→amp-R, L→I²S-L, R→I²S-R.
    pub const POWER_ON: Self = Self(
        CrossbarRoute::LeftToAmpLeft.bit()
            | CrossbarRoute::RightToAmpRight.bit()
            | CrossbarRoute::LeftToI2sLeft.bit()
            | CrossbarRoute::RightToI2sRight.bit(),
    );

    /// No routes connected. Only useful as the base of an explicit routing.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builder: connect one route.
    #[must_use]
    pub const fn with(self, route: CrossbarRoute) -> Self {
        Self(self.0 | route.bit())
    }

    /// Whether a route is connected.
    #[must_use]
    pub const fn is_routed(self, route: CrossbarRoute) -> bool {
        self.0 & route.bit() != 0
    }

    /// The raw 12-bit routing mask.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0 & 0x0FFF
    }
}

impl Default for Crossbar {
    fn default() -> Self {
        Self::POWER_ON
    }
}

/// Configuration violates a cross-field invariant. Detected before any
/// hardware I/O; fatal to driver construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// PBTL bridges both amplifiers into one load; a stereo mixer mode
    /// would drive them with different signals.
    PbtlStereoMixer,
    /// `volume_max_db` must exceed `volume_min_db` by at least 9 dB to
    /// leave a usable control range.
    VolumeRangeTooNarrow,
    /// Analog gain does not match one of the 32 half-dB steps.
    GainNotOnStep,
    /// Crossover frequency above 25 kHz.
    CrossoverOutOfRange,
    /// A crossover filter only makes sense on a bridged (PBTL) output.
    CrossoverRequiresPbtl,
    /// Compiled register program exceeded its fixed capacity.
    ProgramTooLong,
}

/// Immutable device configuration, constructed once by the wiring layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    /// Chip generation — selects bus address and register-map variant.
    pub variant: DacVariant,
    /// Analog gain step.
    pub analog_gain: AnalogGain,
    /// Output bridging mode.
    pub dac_mode: DacMode,
    /// Input mixer topology.
    pub mixer_mode: MixerMode,
    /// Mono mix source (used when `mixer_mode` is [`MixerMode::Mono`]).
    pub mono_mixer_mode: MonoMixerMode,
    /// Crossover corner frequency in Hz; 0 disables the filter.
    pub crossover_hz: u16,
    /// Fault bits to ignore during polling.
    pub ignore_fault: IgnoreFaultMode,
    /// Deferred-refresh trigger policy.
    pub auto_refresh: AutoRefreshMode,
    /// Software volume floor in dB.
    pub volume_min_db: i8,
    /// Software volume ceiling in dB.
    pub volume_max_db: i8,
    /// Output signal routing.
    pub crossbar: Crossbar,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            variant: DacVariant::Tas5805m,
            analog_gain: AnalogGain::default(),
            dac_mode: DacMode::Btl,
            mixer_mode: MixerMode::Stereo,
            mono_mixer_mode: MonoMixerMode::default(),
            crossover_hz: 0,
            ignore_fault: IgnoreFaultMode::default(),
            auto_refresh: AutoRefreshMode::default(),
            volume_min_db: VOLUME_DB_MIN,
            volume_max_db: VOLUME_DB_MAX,
            crossbar: Crossbar::default(),
        }
    }
}

impl DeviceConfig {
    /// Re-check the cross-field invariants.
    ///
    /// Single-field ranges are the schema front-end's job; this only guards
    /// the combinations no schema can express.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dac_mode == DacMode::Pbtl
            && matches!(self.mixer_mode, MixerMode::Stereo | MixerMode::StereoInverse)
        {
            return Err(ConfigError::PbtlStereoMixer);
        }
        if i16::from(self.volume_max_db) - i16::from(self.volume_min_db)
            < i16::from(VOLUME_SPAN_MIN_DB)
        {
            return Err(ConfigError::VolumeRangeTooNarrow);
        }
        if self.crossover_hz > CROSSOVER_HZ_MAX {
            return Err(ConfigError::CrossoverOutOfRange);
        }
        if self.crossover_hz != 0 && self.dac_mode != DacMode::Pbtl {
            return Err(ConfigError::CrossoverRequiresPbtl);
        }
        Ok(())
    }

    /// Clamp a requested volume into the configured window.
    #[must_use]
    pub fn clamp_volume_db(&self, db: i8) -> i8 {
        db.clamp(self.volume_min_db, self.volume_max_db)
    }
}

/// Map a dB volume to the chip's raw register encoding.
///
/// The register counts −0.5 dB steps down from +24 dB:
/// `raw = (24 − dB) × 2`, so +24 dB → 0x00, 0 dB → 0x30, −103 dB → 0xFE.
#[must_use]
pub fn volume_db_to_raw(db: i8) -> u8 {
    let clamped = db.clamp(VOLUME_DB_MIN, VOLUME_DB_MAX);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        ((i16::from(VOLUME_DB_MAX) - i16::from(clamped)) * 2) as u8
    }
}
