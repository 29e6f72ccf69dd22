//! Integration tests for the fault poll / recovery cycle: ignore-mask
//! behavior, the single recovery attempt per tick, and self-healing from
//! both chip-reported and bus faults.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

mod common;

use common::new_driver;
use tas58xx::{
    AutoRefreshMode, DeviceConfig, FaultReason, IgnoreFaultMode, PowerPhase,
};

const REG_DEVICE_CTRL_1: u8 = 0x02;
const REG_CHAN_FAULT: u8 = 0x70;
const REG_FAULT_CLEAR: u8 = 0x78;
const GLOBAL_CLOCK_FAULT: u8 = 1 << 2;
const CHAN_LEFT_DC: u8 = 1 << 3;

fn config(ignore: IgnoreFaultMode) -> DeviceConfig {
    DeviceConfig {
        ignore_fault: ignore,
        auto_refresh: AutoRefreshMode::BySwitch,
        ..DeviceConfig::default()
    }
}

#[tokio::test]
async fn poll_is_a_noop_before_initialisation() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::ClockFault));

    let status = driver.poll_faults().await.unwrap();
    assert!(!status.any());
    assert!(i2c.state().addresses.is_empty(), "nothing to poll yet");
    assert_eq!(driver.phase(), PowerPhase::Uninitialized);
}

#[tokio::test]
async fn ignored_clock_fault_never_leaves_running() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::ClockFault));
    driver.initialize().await.unwrap();

    i2c.state_mut().set_faults(0, GLOBAL_CLOCK_FAULT, 0, 0);
    let status = driver.poll_faults().await.unwrap();

    assert_eq!(driver.phase(), PowerPhase::Running);
    // The raw snapshot still reports the bit for observability.
    assert!(status.clock_fault());
    assert!(driver.fault_status().clock_fault());
    // No recovery was attempted.
    assert!(i2c.state().writes_to(REG_FAULT_CLEAR).is_empty());
}

#[tokio::test]
async fn unmasked_clock_fault_triggers_recovery() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::None));
    driver.initialize().await.unwrap();

    // Fault persists across the recovery read-back.
    i2c.state_mut().set_faults(0, GLOBAL_CLOCK_FAULT, 0, 0);
    driver.poll_faults().await.unwrap();

    match driver.phase() {
        PowerPhase::Faulted(FaultReason::Chip(status)) => assert!(status.clock_fault()),
        other => panic!("expected chip fault, got {other:?}"),
    }
    // One recovery cycle ran: fault clear strobe + mode/mixer re-write.
    assert_eq!(i2c.state().writes_to(REG_FAULT_CLEAR).len(), 1);
    assert_eq!(i2c.state().writes_to(REG_DEVICE_CTRL_1).len(), 2);
    assert_eq!(driver.times_faults_cleared(), 1);
}

#[tokio::test]
async fn transient_fault_recovers_within_one_tick() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::ClockFault));
    driver.initialize().await.unwrap();

    // The latch releases when the driver strobes the clear register.
    i2c.state_mut().clear_faults_on_strobe = true;
    i2c.state_mut().set_faults(CHAN_LEFT_DC, 0, 0, 0);

    let status = driver.poll_faults().await.unwrap();
    assert!(!status.any(), "read-back after recovery is clean");
    assert_eq!(driver.phase(), PowerPhase::Running);
    assert_eq!(driver.times_faults_cleared(), 1);
}

#[tokio::test]
async fn persistent_fault_is_retried_every_tick() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::ClockFault));
    driver.initialize().await.unwrap();

    i2c.state_mut().set_faults(CHAN_LEFT_DC, 0, 0, 0);

    driver.poll_faults().await.unwrap();
    assert!(matches!(
        driver.phase(),
        PowerPhase::Faulted(FaultReason::Chip(_))
    ));
    driver.poll_faults().await.unwrap();
    assert_eq!(driver.times_faults_cleared(), 2, "each tick retries recovery");

    // The cause disappears; the next tick heals the phase.
    i2c.state_mut().set_faults(0, 0, 0, 0);
    driver.poll_faults().await.unwrap();
    assert_eq!(driver.phase(), PowerPhase::Running);
}

#[tokio::test]
async fn bus_failure_during_poll_latches_and_heals() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::ClockFault));
    driver.initialize().await.unwrap();

    i2c.state_mut().fail_reads = true;
    let err = driver.poll_faults().await.unwrap_err();
    assert!(matches!(err, tas58xx::DriverError::Bus { register, .. }
        if register == REG_CHAN_FAULT));
    assert!(matches!(
        driver.phase(),
        PowerPhase::Faulted(FaultReason::Bus { .. })
    ));

    // Bus comes back, registers are clean: the next tick self-heals.
    i2c.state_mut().fail_reads = false;
    driver.poll_faults().await.unwrap();
    assert_eq!(driver.phase(), PowerPhase::Running);
}

#[tokio::test]
async fn mute_stays_available_while_faulted() {
    let (mut driver, i2c, _pin) = new_driver(config(IgnoreFaultMode::ClockFault));
    driver.initialize().await.unwrap();

    i2c.state_mut().set_faults(CHAN_LEFT_DC, 0, 0, 0);
    driver.poll_faults().await.unwrap();
    assert!(matches!(driver.phase(), PowerPhase::Faulted(_)));

    // Muting a misbehaving amp must still work; volume stays best-effort.
    driver.set_mute(true).await.unwrap();
    assert!(driver.is_muted());
    driver.set_volume(-40).await.unwrap();
    assert_eq!(driver.volume_db(), -40);
}
