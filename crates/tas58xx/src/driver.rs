//! TAS58xx device state machine.
//!
//! Owns the injected bus transport and enable line, executes the compiled
//! register program, and tracks the device's runtime phase. All register
//! traffic goes through this one type, so a multi-register group can never
//! interleave with another operation — callers that share the driver
//! between tasks wrap it in an `embassy_sync::Mutex` (see
//! [`crate::poller`]).
//!
//! Phase transitions:
//!
//! ```text
//! Uninitialized → Configuring → Running ⇄ Faulted
//! ```
//!
//! `Faulted` self-heals through [`Tas58xx::poll_faults`] for chip-reported
//! and transport faults alike; it is only terminal when the bus never
//! recovers, in which case every subsequent poll keeps reporting it.

use embassy_time::Timer;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::i2c::I2c;
use platform::{AudioDac, OptionSelect};

use crate::config::{
    volume_db_to_raw, AutoRefreshMode, ConfigError, DeviceConfig,
};
use crate::eq::{profile_writes, EqProfile};
use crate::fault::FaultStatus;
use crate::program::{compile, initial_volume_db, RegWrite, RegisterProgram};
use crate::registers::{
    ANALOG_FAULT_CLEAR, CTRL2_MUTE, CTRL_DEEP_SLEEP, CTRL_PLAY, DSP_MISC_EQ_BYPASS,
    DSP_MISC_EQ_ON, DSP_MISC_XOVER_BYPASS, REG_CHAN_FAULT, REG_DEVICE_CTRL_2, REG_DIG_VOL_CTRL,
    REG_DSP_MISC, REG_FAULT_CLEAR, REG_GLOBAL_FAULT1, REG_GLOBAL_FAULT2, REG_OT_WARNING,
};

/// Why the device is in [`PowerPhase::Faulted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultReason {
    /// A register write or read failed on the bus.
    Bus {
        /// The register whose transaction failed.
        register: u8,
    },
    /// The chip reported unmasked fault bits.
    Chip(FaultStatus),
}

/// Driver power phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerPhase {
    /// Constructed, hardware untouched. The chip may still hold register
    /// state from before our restart — nothing is assumed about it.
    #[default]
    Uninitialized,
    /// The initial register program is executing.
    Configuring,
    /// Fully configured and playing.
    Running,
    /// A fault is active; cleared by the poller once the cause is gone.
    Faulted(FaultReason),
}

/// Driver operation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError<E> {
    /// Transport-level failure on one register transaction.
    Bus {
        /// The register whose transaction failed.
        register: u8,
        /// The underlying bus error.
        source: E,
    },
    /// The enable line could not be driven.
    EnablePin,
    /// Operation not allowed in the current phase.
    InvalidState {
        /// The phase that rejected the operation.
        phase: PowerPhase,
    },
    /// Unknown EQ profile name or index.
    InvalidArgument,
}

/// Mutable runtime state, owned exclusively by the driver instance.
#[derive(Debug, Clone, Copy)]
struct DeviceState {
    phase: PowerPhase,
    faults: FaultStatus,
    volume_db: i8,
    muted: bool,
    control_state: u8,
    eq_profile: EqProfile,
    eq_enabled: bool,
    refresh_armed: bool,
    faults_cleared: u32,
}

/// A re-executable slice of the compiled register program.
#[derive(Clone, Copy)]
enum Section {
    Full,
    Recovery,
    Mixer,
    Crossbar,
    Crossover,
}

/// TAS5805M / TAS5825M driver.
#[derive(Debug)]
pub struct Tas58xx<I2C, P> {
    i2c: I2C,
    enable: P,
    address: u8,
    config: DeviceConfig,
    program: RegisterProgram,
    state: DeviceState,
}

impl<I2C: I2c, P: OutputPin> Tas58xx<I2C, P> {
    /// Create a driver around an injected bus transport and enable line.
    ///
    /// Compiles the register program up front — an invalid configuration
    /// fails here, before any hardware I/O.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a cross-field invariant is violated.
    pub fn new(i2c: I2C, enable: P, config: DeviceConfig) -> Result<Self, ConfigError> {
        let program = compile(&config)?;
        Ok(Self {
            i2c,
            enable,
            address: config.variant.i2c_address(),
            config,
            program,
            state: DeviceState {
                phase: PowerPhase::Uninitialized,
                faults: FaultStatus::default(),
                volume_db: initial_volume_db(&config),
                muted: false,
                control_state: CTRL_DEEP_SLEEP,
                eq_profile: EqProfile::Off,
                eq_enabled: false,
                refresh_armed: false,
                faults_cleared: 0,
            },
        })
    }

    /// Assert the enable line and execute the full register program.
    ///
    /// On success the device is `Running` and in play state. The first
    /// failed write aborts the remaining program and leaves the device
    /// `Faulted` with the failing register recorded.
    ///
    /// # Errors
    ///
    /// [`DriverError::Bus`] / [`DriverError::EnablePin`].
    pub async fn initialize(&mut self) -> Result<(), DriverError<I2C::Error>> {
        self.state.phase = PowerPhase::Configuring;

        // Reset edge on the enable line. The chip may retain registers
        // from before our restart; the edge puts it back in a known state.
        self.enable.set_low().map_err(|_| DriverError::EnablePin)?;
        Timer::after_millis(10).await;
        self.enable.set_high().map_err(|_| DriverError::EnablePin)?;
        Timer::after_millis(5).await;

        self.exec_section(Section::Full).await?;

        self.state.control_state = CTRL_PLAY;
        self.state.volume_db = initial_volume_db(&self.config);
        self.state.muted = false;
        self.state.eq_profile = EqProfile::Off;
        self.state.eq_enabled = false;
        // The routing registers want a re-write once the I²S clock has
        // stabilised; arm the deferred refresh.
        self.state.refresh_armed = true;
        self.state.phase = PowerPhase::Running;
        #[cfg(feature = "defmt")]
        defmt::info!("tas58xx: initialised, {} register writes", self.program.all().len());
        Ok(())
    }

    /// Set the output volume in dB, silently clamped into the configured
    /// window — overshoot from a continuous UI control is normal input,
    /// not an error. Best-effort in every phase, including `Faulted`.
    ///
    /// # Errors
    ///
    /// [`DriverError::Bus`] when the write fails. A single-register
    /// failure does not latch `Faulted`; the poller owns that transition.
    pub async fn set_volume(&mut self, db: i8) -> Result<(), DriverError<I2C::Error>> {
        let clamped = self.config.clamp_volume_db(db);
        self.write_reg(REG_DIG_VOL_CTRL, volume_db_to_raw(clamped)).await?;
        self.state.volume_db = clamped;

        // A gain change is the deferred-refresh trigger in ByGain mode.
        if self.state.refresh_armed
            && self.config.auto_refresh == AutoRefreshMode::ByGain
            && self.state.phase == PowerPhase::Running
        {
            self.refresh_settings().await?;
        }
        Ok(())
    }

    /// Mute or unmute without disturbing the volume register or control
    /// state. Works in every phase — silencing a misbehaving amplifier
    /// must never be refused.
    ///
    /// # Errors
    ///
    /// [`DriverError::Bus`] when the write fails.
    pub async fn set_mute(&mut self, mute: bool) -> Result<(), DriverError<I2C::Error>> {
        if self.state.muted == mute {
            return Ok(());
        }
        let value = if mute {
            self.state.control_state | CTRL2_MUTE
        } else {
            self.state.control_state
        };
        self.write_reg(REG_DEVICE_CTRL_2, value).await?;
        self.state.muted = mute;
        Ok(())
    }

    /// Select an EQ profile. Only valid while `Running`.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] outside `Running`;
    /// [`DriverError::Bus`] when a write of the profile subset fails.
    pub async fn set_eq_profile(
        &mut self,
        profile: EqProfile,
    ) -> Result<(), DriverError<I2C::Error>> {
        if self.state.phase != PowerPhase::Running {
            return Err(DriverError::InvalidState {
                phase: self.state.phase,
            });
        }
        // A profile change is an explicit switch — the refresh trigger in
        // BySwitch mode.
        if self.state.refresh_armed && self.config.auto_refresh == AutoRefreshMode::BySwitch {
            self.refresh_settings().await?;
        }
        let writes = profile_writes(profile, self.config.variant, self.crossover_active());
        self.exec_group(&writes).await?;
        self.state.eq_profile = profile;
        self.state.eq_enabled = profile != EqProfile::Off;
        #[cfg(feature = "defmt")]
        defmt::info!("tas58xx: eq profile {}", profile.name());
        Ok(())
    }

    /// Select an EQ profile by display name.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidArgument`] for an unknown name, with no state
    /// change and no bus traffic; otherwise as [`Tas58xx::set_eq_profile`].
    pub async fn select_profile_by_name(
        &mut self,
        name: &str,
    ) -> Result<(), DriverError<I2C::Error>> {
        let profile = EqProfile::from_name(name).ok_or(DriverError::InvalidArgument)?;
        self.set_eq_profile(profile).await
    }

    /// Enable or bypass the EQ without changing the selected profile.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] outside `Running`;
    /// [`DriverError::Bus`] when the write fails.
    pub async fn set_eq_enabled(&mut self, enabled: bool) -> Result<(), DriverError<I2C::Error>> {
        if self.state.phase != PowerPhase::Running {
            return Err(DriverError::InvalidState {
                phase: self.state.phase,
            });
        }
        // Switching the EQ on is the refresh trigger in BySwitch mode.
        if enabled
            && self.state.refresh_armed
            && self.config.auto_refresh == AutoRefreshMode::BySwitch
        {
            self.refresh_settings().await?;
        }
        let eq_bit = if enabled { DSP_MISC_EQ_ON } else { DSP_MISC_EQ_BYPASS };
        self.write_reg(REG_DSP_MISC, eq_bit | self.xover_bypass_bit()).await?;
        self.state.eq_enabled = enabled;
        Ok(())
    }

    /// Re-write the routing registers (mixer, crossbar, crossover) and the
    /// DSP bypass byte. The chip drops these on a clock loss, so the
    /// wiring layer calls this once the I²S clock is known stable — or
    /// lets the configured [`AutoRefreshMode`] trigger it.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidState`] outside `Running`;
    /// [`DriverError::Bus`] when a write fails (the device latches
    /// `Faulted` and the poller takes over).
    pub async fn refresh_settings(&mut self) -> Result<(), DriverError<I2C::Error>> {
        if self.state.phase != PowerPhase::Running {
            return Err(DriverError::InvalidState {
                phase: self.state.phase,
            });
        }
        // Disarm first — a failing refresh must not re-fire on every
        // subsequent trigger.
        self.state.refresh_armed = false;
        self.exec_section(Section::Mixer).await?;
        self.exec_section(Section::Crossbar).await?;
        self.exec_section(Section::Crossover).await?;

        let eq_bit = if self.state.eq_enabled {
            DSP_MISC_EQ_ON
        } else {
            DSP_MISC_EQ_BYPASS
        };
        self.write_reg(REG_DSP_MISC, eq_bit | self.xover_bypass_bit()).await?;
        Ok(())
    }

    /// One fault-poll tick.
    ///
    /// No-op before initialisation. Reads the fault block, applies the
    /// configured ignore-mask, and on an unmasked fault transitions to
    /// `Faulted` and runs one recovery cycle (fault clear + mode/mixer
    /// re-write). A clean read-back returns the device to `Running`;
    /// otherwise it stays `Faulted` and is retried on the next tick.
    ///
    /// # Errors
    ///
    /// [`DriverError::Bus`] when the bus itself fails; the phase latches
    /// `Faulted` and the next tick retries. The poll loop never propagates
    /// this further.
    pub async fn poll_faults(&mut self) -> Result<FaultStatus, DriverError<I2C::Error>> {
        match self.state.phase {
            PowerPhase::Uninitialized | PowerPhase::Configuring => {
                return Ok(FaultStatus::default())
            }
            PowerPhase::Running | PowerPhase::Faulted(_) => {}
        }

        let status = match self.read_fault_block().await {
            Ok(status) => status,
            Err(err) => {
                self.latch_bus_fault(&err);
                return Err(err);
            }
        };
        self.state.faults = status;

        let active = status.masked(self.config.ignore_fault);
        if !active.any() {
            // Self-heal: whatever put us in Faulted is gone.
            if matches!(self.state.phase, PowerPhase::Faulted(_)) {
                #[cfg(feature = "defmt")]
                defmt::info!("tas58xx: fault cleared, running again");
                self.state.phase = PowerPhase::Running;
            }
            return Ok(status);
        }

        #[cfg(feature = "defmt")]
        defmt::warn!(
            "tas58xx: fault chan={} global={} otsd={}",
            active.channel,
            active.global,
            active.over_temp
        );
        self.state.phase = PowerPhase::Faulted(FaultReason::Chip(active));

        // One recovery cycle: release the fault latch, re-run the
        // mode+mixer prefix of the program.
        if let Err(err) = self.write_reg(REG_FAULT_CLEAR, ANALOG_FAULT_CLEAR).await {
            self.latch_bus_fault(&err);
            return Err(err);
        }
        self.state.faults_cleared = self.state.faults_cleared.saturating_add(1);
        self.exec_section(Section::Recovery).await?;

        let after = match self.read_fault_block().await {
            Ok(status) => status,
            Err(err) => {
                self.latch_bus_fault(&err);
                return Err(err);
            }
        };
        self.state.faults = after;
        let still = after.masked(self.config.ignore_fault);
        if still.any() {
            self.state.phase = PowerPhase::Faulted(FaultReason::Chip(still));
            #[cfg(feature = "defmt")]
            defmt::warn!("tas58xx: fault persists after recovery");
        } else {
            self.state.phase = PowerPhase::Running;
            #[cfg(feature = "defmt")]
            defmt::info!("tas58xx: recovery successful");
        }
        Ok(after)
    }

    /// Deassert the enable line. The only place it ever goes low after
    /// [`Tas58xx::initialize`].
    ///
    /// # Errors
    ///
    /// [`DriverError::EnablePin`].
    pub fn teardown(&mut self) -> Result<(), DriverError<I2C::Error>> {
        self.enable.set_low().map_err(|_| DriverError::EnablePin)?;
        self.state.phase = PowerPhase::Uninitialized;
        Ok(())
    }

    /// Current power phase.
    #[must_use]
    pub fn phase(&self) -> PowerPhase {
        self.state.phase
    }

    /// Current volume setpoint in dB — always within the configured window.
    #[must_use]
    pub fn volume_db(&self) -> i8 {
        self.state.volume_db
    }

    /// Current mute flag.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.state.muted
    }

    /// Last fault-register snapshot (unmasked).
    #[must_use]
    pub fn fault_status(&self) -> FaultStatus {
        self.state.faults
    }

    /// Currently selected EQ profile.
    #[must_use]
    pub fn eq_profile(&self) -> EqProfile {
        self.state.eq_profile
    }

    /// Whether the EQ is active (not bypassed).
    #[must_use]
    pub fn eq_enabled(&self) -> bool {
        self.state.eq_enabled
    }

    /// How many times the poller has released the fault latch.
    #[must_use]
    pub fn times_faults_cleared(&self) -> u32 {
        self.state.faults_cleared
    }

    /// The device configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The compiled register program.
    #[must_use]
    pub fn program(&self) -> &RegisterProgram {
        &self.program
    }

    fn crossover_active(&self) -> bool {
        self.config.crossover_hz != 0
    }

    fn xover_bypass_bit(&self) -> u8 {
        if self.crossover_active() {
            0x00
        } else {
            DSP_MISC_XOVER_BYPASS
        }
    }

    fn section(&self, section: Section) -> &[RegWrite] {
        match section {
            Section::Full => self.program.all(),
            Section::Recovery => self.program.recovery(),
            Section::Mixer => self.program.mixer(),
            Section::Crossbar => self.program.crossbar(),
            Section::Crossover => self.program.crossover(),
        }
    }

    fn latch_bus_fault(&mut self, err: &DriverError<I2C::Error>) {
        if let DriverError::Bus { register, .. } = err {
            self.state.phase = PowerPhase::Faulted(FaultReason::Bus {
                register: *register,
            });
        }
    }

    /// Execute a program section in order. The first failure aborts the
    /// remaining writes and latches the `Faulted` phase.
    async fn exec_section(&mut self, section: Section) -> Result<(), DriverError<I2C::Error>> {
        let mut index = 0;
        while let Some(write) = self.section(section).get(index).copied() {
            if let Err(err) = self.write_reg(write.addr, write.value).await {
                self.latch_bus_fault(&err);
                return Err(err);
            }
            index = index.wrapping_add(1);
        }
        Ok(())
    }

    /// Execute an ad-hoc write group (EQ profile subset) with the same
    /// abort-and-latch behavior as a program section.
    async fn exec_group(&mut self, writes: &[RegWrite]) -> Result<(), DriverError<I2C::Error>> {
        for write in writes {
            if let Err(err) = self.write_reg(write.addr, write.value).await {
                self.latch_bus_fault(&err);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn write_reg(&mut self, register: u8, value: u8) -> Result<(), DriverError<I2C::Error>> {
        self.i2c
            .write(self.address, &[register, value])
            .await
            .map_err(|source| DriverError::Bus { register, source })
    }

    async fn read_reg(&mut self, register: u8) -> Result<u8, DriverError<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .await
            .map_err(|source| DriverError::Bus { register, source })?;
        Ok(buf[0])
    }

    async fn read_fault_block(&mut self) -> Result<FaultStatus, DriverError<I2C::Error>> {
        Ok(FaultStatus {
            channel: self.read_reg(REG_CHAN_FAULT).await?,
            global: self.read_reg(REG_GLOBAL_FAULT1).await?,
            over_temp: self.read_reg(REG_GLOBAL_FAULT2).await?,
            ot_warning: self.read_reg(REG_OT_WARNING).await?,
        })
    }
}

impl<I2C: I2c, P: OutputPin> AudioDac for Tas58xx<I2C, P> {
    type Error = DriverError<I2C::Error>;

    async fn set_volume(&mut self, db: i8) -> Result<(), Self::Error> {
        Tas58xx::set_volume(self, db).await
    }

    async fn set_mute(&mut self, mute: bool) -> Result<(), Self::Error> {
        Tas58xx::set_mute(self, mute).await
    }

    fn is_muted(&self) -> bool {
        self.state.muted
    }
}

impl<I2C: I2c, P: OutputPin> OptionSelect for Tas58xx<I2C, P> {
    type Error = DriverError<I2C::Error>;

    fn options(&self) -> &'static [&'static str] {
        &EqProfile::NAMES
    }

    fn selected(&self) -> usize {
        self.state.eq_profile.index()
    }

    async fn select(&mut self, index: usize) -> Result<(), Self::Error> {
        let profile = EqProfile::from_index(index).ok_or(DriverError::InvalidArgument)?;
        self.set_eq_profile(profile).await
    }
}
