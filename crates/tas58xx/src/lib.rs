//! TAS5805M / TAS5825M class-D amplifier driver.
//!
//! Controls the chip over I²C via the `embedded_hal_async::i2c::I2c` trait
//! so it is HAL-agnostic while remaining async. The audio stream itself is
//! delivered over I²S and never passes through this driver — only the
//! control registers do.
//!
//! # Architecture
//!
//! A declarative [`DeviceConfig`] is compiled once into an ordered
//! [`RegisterProgram`]; the [`Tas58xx`] state machine executes it, serves
//! volume/mute/EQ operations, and a periodic [`poller`] tick watches the
//! fault registers and drives recovery.
//!
//! ```text
//! DeviceConfig ──compile──▶ RegisterProgram ──execute──▶ chip registers
//!                                 ▲                          │
//!                  recovery/refresh sections            fault block
//!                                 └───────── poll tick ◀─────┘
//! ```
//!
//! # I²C Address
//!
//! | Variant  | Address |
//! |----------|---------|
//! | TAS5805M | `0x2D`  |
//! | TAS5825M | `0x4C`  |
//!
//! # Features
//!
//! - `defmt`: log at state-machine milestones and derive `defmt::Format`
//!   on public types

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // errors documented on the enums
#![allow(clippy::doc_markdown)] // register and chip names in doc comments
#![allow(clippy::must_use_candidate)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod config;
pub mod crossover;
pub mod driver;
pub mod eq;
pub mod fault;
pub mod poller;
pub mod program;
pub mod registers;

pub use config::{
    AnalogGain, AutoRefreshMode, ConfigError, Crossbar, CrossbarRoute, DacMode, DeviceConfig,
    IgnoreFaultMode, MixerMode, MonoMixerMode,
};
pub use driver::{DriverError, FaultReason, PowerPhase, Tas58xx};
pub use eq::EqProfile;
pub use fault::FaultStatus;
pub use program::{compile, RegWrite, RegisterProgram};
pub use registers::DacVariant;
