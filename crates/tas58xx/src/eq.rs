//! EQ profile selection.
//!
//! A profile is a named preset reprogramming a small register subset — the
//! EQ bypass bit, the active coefficient bank, and (for the BIAMP
//! profiles) the mono mix source — without touching volume, mute or the
//! crossbar. The set is closed; a select-style UI entity binds to it
//! through [`platform::OptionSelect`].

use heapless::Vec;

use crate::config::MonoMixerMode;
use crate::program::RegWrite;
use crate::registers::{
    DacVariant, BOOK_CONTROL_PORT, DSP_MISC_EQ_BYPASS, DSP_MISC_EQ_ON, DSP_MISC_XOVER_BYPASS,
    PAGE_ZERO, REG_BOOK_SET, REG_DSP_MISC, REG_EQ_BANK_SEL, REG_MONO_MIX_SEL, REG_PAGE_SET,
};

/// Maximum number of writes a profile subset can emit.
pub const MAX_PROFILE_WRITES: usize = 16;

/// EQ coefficient bank: 15-band single-amp flow.
const BANK_15_BAND: u8 = 0x00;
/// EQ coefficient bank: 15-band bi-amplified flow.
const BANK_15_BAND_BIAMP: u8 = 0x01;
/// EQ coefficient bank: factory bi-amp presets.
const BANK_BIAMP_PRESETS: u8 = 0x02;

/// A named EQ preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EqProfile {
    /// EQ bypassed.
    #[default]
    Off,
    /// 15-band graphic EQ.
    Eq15Band,
    /// 15-band EQ on a bi-amplified output.
    Eq15BandBiamp,
    /// Factory presets for bi-amplified outputs.
    EqBiampPresets,
}

impl EqProfile {
    /// Every profile, in presentation order.
    pub const ALL: [Self; 4] = [
        Self::Off,
        Self::Eq15Band,
        Self::Eq15BandBiamp,
        Self::EqBiampPresets,
    ];

    /// Display names, index-aligned with [`ALL`].
    ///
    /// [`ALL`]: EqProfile::ALL
    pub const NAMES: [&'static str; 4] =
        ["Off", "EQ 15 Band", "EQ 15 Band BIAMP", "EQ BIAMP Presets"];

    /// The profile's display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Eq15Band => "EQ 15 Band",
            Self::Eq15BandBiamp => "EQ 15 Band BIAMP",
            Self::EqBiampPresets => "EQ BIAMP Presets",
        }
    }

    /// Index into [`ALL`] / [`NAMES`].
    ///
    /// [`ALL`]: EqProfile::ALL
    /// [`NAMES`]: EqProfile::NAMES
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look a profile up by its display name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Look a profile up by its index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The EQ coefficient bank backing this profile, if any.
    const fn bank(self) -> Option<u8> {
        match self {
            Self::Off => None,
            Self::Eq15Band => Some(BANK_15_BAND),
            Self::Eq15BandBiamp => Some(BANK_15_BAND_BIAMP),
            Self::EqBiampPresets => Some(BANK_BIAMP_PRESETS),
        }
    }

    /// Whether this profile adjusts the mono mix for a bi-amplified output.
    const fn is_biamp(self) -> bool {
        matches!(self, Self::Eq15BandBiamp | Self::EqBiampPresets)
    }
}

/// Compile a profile's register subset.
///
/// `crossover_active` preserves the crossover bypass bit that shares the
/// DSP misc register with the EQ bypass bit.
#[must_use]
pub fn profile_writes(
    profile: EqProfile,
    variant: DacVariant,
    crossover_active: bool,
) -> Vec<RegWrite, MAX_PROFILE_WRITES> {
    let mut writes: Vec<RegWrite, MAX_PROFILE_WRITES> = Vec::new();
    let xover_bit = if crossover_active {
        0x00
    } else {
        DSP_MISC_XOVER_BYPASS
    };
    let eq_bit = if profile == EqProfile::Off {
        DSP_MISC_EQ_BYPASS
    } else {
        DSP_MISC_EQ_ON
    };
    // Capacity is static and sufficient; dropped pushes cannot happen.
    let mut push = |addr: u8, value: u8| {
        let _ = writes.push(RegWrite { addr, value });
    };
    push(REG_DSP_MISC, eq_bit | xover_bit);

    if let Some(bank) = profile.bank() {
        push(REG_PAGE_SET, PAGE_ZERO);
        push(REG_BOOK_SET, variant.eq_book());
        push(REG_PAGE_SET, PAGE_ZERO);
        push(REG_EQ_BANK_SEL, bank);
        push(REG_PAGE_SET, PAGE_ZERO);
        push(REG_BOOK_SET, BOOK_CONTROL_PORT);
        push(REG_PAGE_SET, PAGE_ZERO);
    }
    if profile.is_biamp() {
        push(REG_MONO_MIX_SEL, MonoMixerMode::EqLeft.code());
    }
    writes
}
