//! Configuration-to-register compilation.
//!
//! [`compile`] turns an immutable [`DeviceConfig`] into the ordered
//! [`RegisterProgram`] the state machine executes at initialisation.
//! Execution order is significant and must never be reordered: the chip
//! latches its routing from DEVICE_CTRL_1 at the moment the mixer and
//! crossbar registers are written, so the mode byte is always the first
//! write of the program.
//!
//! The program records its section boundaries so the driver can re-execute
//! sub-ranges later: the mode+mixer prefix during fault recovery, and the
//! mixer/crossbar/crossover routing during a settings refresh.

use heapless::Vec;

use crate::config::{volume_db_to_raw, ConfigError, DacMode, DeviceConfig, MixerMode};
use crate::crossover::nearest_bucket;
use crate::registers::{
    BOOK_CONTROL_PORT, BOOK_MIXER, CTRL1_PBTL, CTRL_PLAY, DSP_MISC_EQ_BYPASS,
    DSP_MISC_XOVER_BYPASS, MIXER_VALUE_0DB, MIXER_VALUE_MINUS_6DB, MIXER_VALUE_MUTE, PAGE_CROSSBAR,
    PAGE_CROSSOVER_COEF, PAGE_MIXER, PAGE_ZERO, REG_AGAIN, REG_BOOK_SET, REG_CROSSOVER_COEF_BASE,
    REG_DEVICE_CTRL_1, REG_DEVICE_CTRL_2, REG_DIG_VOL_CTRL, REG_DSP_MISC, REG_MIXER_L_TO_L,
    REG_MIXER_L_TO_R, REG_MIXER_R_TO_L, REG_MIXER_R_TO_R, REG_MONO_MIX_SEL, REG_PAGE_SET,
};

/// One register write of a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegWrite {
    /// Register address.
    pub addr: u8,
    /// Byte value.
    pub value: u8,
}

/// Fixed program capacity — sized for the largest configuration (PBTL mono
/// with crossover enabled).
pub const MAX_PROGRAM_LEN: usize = 64;

/// An ordered sequence of register writes with recorded section
/// boundaries. Produced by [`compile`]; executed, in order, by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterProgram {
    writes: Vec<RegWrite, MAX_PROGRAM_LEN>,
    mode_end: usize,
    mixer_end: usize,
    gain_end: usize,
    volume_end: usize,
    crossbar_end: usize,
    crossover_end: usize,
}

impl RegisterProgram {
    /// The complete program, in execution order.
    #[must_use]
    pub fn all(&self) -> &[RegWrite] {
        &self.writes
    }

    /// Mode + mixer prefix — re-executed as the fault recovery cycle.
    #[must_use]
    pub fn recovery(&self) -> &[RegWrite] {
        self.writes.get(..self.mixer_end).unwrap_or(&[])
    }

    /// Mixer section (book/page selects, gains, mono mix source).
    #[must_use]
    pub fn mixer(&self) -> &[RegWrite] {
        self.writes.get(self.mode_end..self.mixer_end).unwrap_or(&[])
    }

    /// Analog gain section.
    #[must_use]
    pub fn gain(&self) -> &[RegWrite] {
        self.writes.get(self.mixer_end..self.gain_end).unwrap_or(&[])
    }

    /// Initial volume section.
    #[must_use]
    pub fn volume(&self) -> &[RegWrite] {
        self.writes.get(self.gain_end..self.volume_end).unwrap_or(&[])
    }

    /// Crossbar routing section.
    #[must_use]
    pub fn crossbar(&self) -> &[RegWrite] {
        self.writes
            .get(self.volume_end..self.crossbar_end)
            .unwrap_or(&[])
    }

    /// Crossover filter section (bypass byte, plus coefficients when the
    /// filter is active).
    #[must_use]
    pub fn crossover(&self) -> &[RegWrite] {
        self.writes
            .get(self.crossbar_end..self.crossover_end)
            .unwrap_or(&[])
    }
}

struct ProgramBuilder {
    writes: Vec<RegWrite, MAX_PROGRAM_LEN>,
}

impl ProgramBuilder {
    fn push(&mut self, addr: u8, value: u8) -> Result<(), ConfigError> {
        self.writes
            .push(RegWrite { addr, value })
            .map_err(|_| ConfigError::ProgramTooLong)
    }

    /// Switch the register window: page 0, book select, target page.
    fn select_book_page(&mut self, book: u8, page: u8) -> Result<(), ConfigError> {
        self.push(REG_PAGE_SET, PAGE_ZERO)?;
        self.push(REG_BOOK_SET, book)?;
        self.push(REG_PAGE_SET, page)
    }

    /// Back to the control port.
    fn restore_control_port(&mut self) -> Result<(), ConfigError> {
        self.select_book_page(BOOK_CONTROL_PORT, PAGE_ZERO)
    }

    /// A 4-byte coefficient, MSB first, at consecutive addresses.
    fn push_coefficient(&mut self, base: u8, value: u32) -> Result<(), ConfigError> {
        for (offset, byte) in value.to_be_bytes().iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            self.push(base.wrapping_add(offset as u8), *byte)?;
        }
        Ok(())
    }
}

/// Input mixer gains (l→l, r→l, l→r, r→r) for a mixer mode.
const fn mixer_gains(mode: MixerMode) -> [u32; 4] {
    match mode {
        MixerMode::Stereo => [
            MIXER_VALUE_0DB,
            MIXER_VALUE_MUTE,
            MIXER_VALUE_MUTE,
            MIXER_VALUE_0DB,
        ],
        MixerMode::StereoInverse => [
            MIXER_VALUE_MUTE,
            MIXER_VALUE_0DB,
            MIXER_VALUE_0DB,
            MIXER_VALUE_MUTE,
        ],
        // Sum at −6 dB so a full-scale correlated signal cannot clip.
        MixerMode::Mono => [
            MIXER_VALUE_MINUS_6DB,
            MIXER_VALUE_MINUS_6DB,
            MIXER_VALUE_MINUS_6DB,
            MIXER_VALUE_MINUS_6DB,
        ],
        MixerMode::Left => [
            MIXER_VALUE_0DB,
            MIXER_VALUE_MUTE,
            MIXER_VALUE_0DB,
            MIXER_VALUE_MUTE,
        ],
        MixerMode::Right => [
            MIXER_VALUE_MUTE,
            MIXER_VALUE_0DB,
            MIXER_VALUE_MUTE,
            MIXER_VALUE_0DB,
        ],
    }
}

/// Initial volume setpoint: the midpoint of the configured window.
#[must_use]
pub fn initial_volume_db(config: &DeviceConfig) -> i8 {
    let min = i16::from(config.volume_min_db);
    let max = i16::from(config.volume_max_db);
    #[allow(clippy::cast_possible_truncation)]
    {
        (min + (max - min) / 2) as i8
    }
}

/// Compile a validated configuration into its register program.
///
/// Re-validates the cross-field invariants first — an invalid configuration
/// must fail here, never mid-write.
///
/// # Errors
///
/// [`ConfigError`] when an invariant is violated.
pub fn compile(config: &DeviceConfig) -> Result<RegisterProgram, ConfigError> {
    config.validate()?;

    let variant = config.variant;
    let mut b = ProgramBuilder { writes: Vec::new() };

    // Mode byte — must be the first write of the program; routing writes
    // below latch against it.
    let mode = match config.dac_mode {
        DacMode::Btl => 0x00,
        DacMode::Pbtl => CTRL1_PBTL,
    };
    b.push(REG_DEVICE_CTRL_1, mode)?;
    let mode_end = b.writes.len();

    // Input mixer gains, then the mono mix source when it matters.
    b.select_book_page(BOOK_MIXER, PAGE_MIXER)?;
    let gains = mixer_gains(config.mixer_mode);
    for (reg, gain) in [
        REG_MIXER_L_TO_L,
        REG_MIXER_R_TO_L,
        REG_MIXER_L_TO_R,
        REG_MIXER_R_TO_R,
    ]
    .into_iter()
    .zip(gains)
    {
        b.push_coefficient(reg, gain)?;
    }
    b.restore_control_port()?;
    if config.mixer_mode == MixerMode::Mono {
        b.push(REG_MONO_MIX_SEL, config.mono_mixer_mode.code())?;
    }
    let mixer_end = b.writes.len();

    // Analog gain — reserved bits 7:5 are written as zero, their power-on
    // value.
    b.push(REG_AGAIN, config.analog_gain.code())?;
    let gain_end = b.writes.len();

    // Initial volume setpoint.
    b.push(REG_DIG_VOL_CTRL, volume_db_to_raw(initial_volume_db(config)))?;
    let volume_end = b.writes.len();

    // Output crossbar — 12-bit field, MSB byte then LSB byte.
    let (msb, lsb) = variant.crossbar_bytes(config.crossbar.bits());
    b.select_book_page(BOOK_MIXER, PAGE_CROSSBAR)?;
    b.push(variant.crossbar_base(), msb)?;
    b.push(variant.crossbar_base().wrapping_add(1), lsb)?;
    b.restore_control_port()?;
    let crossbar_end = b.writes.len();

    // Crossover filter. The DSP misc byte also carries the EQ bypass bit;
    // the device starts with the EQ off until a profile is selected.
    if config.crossover_hz == 0 {
        b.push(REG_DSP_MISC, DSP_MISC_EQ_BYPASS | DSP_MISC_XOVER_BYPASS)?;
    } else {
        b.push(REG_DSP_MISC, DSP_MISC_EQ_BYPASS)?;
        let bucket = nearest_bucket(config.crossover_hz);
        b.select_book_page(variant.eq_book(), PAGE_CROSSOVER_COEF)?;
        for (offset, byte) in bucket.coef.bytes().iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            b.push(REG_CROSSOVER_COEF_BASE.wrapping_add(offset as u8), *byte)?;
        }
        b.restore_control_port()?;
    }
    let crossover_end = b.writes.len();

    // Out of reset and into play.
    b.push(REG_DEVICE_CTRL_2, CTRL_PLAY)?;

    Ok(RegisterProgram {
        writes: b.writes,
        mode_end,
        mixer_end,
        gain_end,
        volume_end,
        crossbar_end,
        crossover_end,
    })
}
