//! Audio DAC capability contract

/// Generic audio-DAC control surface.
///
/// A media-player layer drives volume and mute through this trait without
/// knowing which amplifier chip sits behind it. Implementations clamp
/// out-of-range volume requests rather than rejecting them — a continuous
/// UI slider is allowed to overshoot.
pub trait AudioDac {
    /// Error type
    type Error: core::fmt::Debug;

    /// Set the output volume in dB. Out-of-range values are clamped to the
    /// device's configured volume window, never rejected.
    async fn set_volume(&mut self, db: i8) -> Result<(), Self::Error>;

    /// Mute or unmute the output without disturbing the volume setpoint.
    ///
    /// Must stay usable in every device state — muting a misbehaving
    /// amplifier is the one control that may never be refused.
    async fn set_mute(&mut self, mute: bool) -> Result<(), Self::Error>;

    /// Current mute flag.
    fn is_muted(&self) -> bool;
}
