//! Shared test doubles: a scriptable async I²C bus and a recording enable
//! pin. Handles are `Rc`-shared so tests keep inspecting the bus after the
//! driver has taken ownership of its half.

#![allow(dead_code)] // not every test binary uses every helper
#![allow(clippy::expect_used, clippy::indexing_slicing)]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource, Operation};
use tas58xx::{DeviceConfig, Tas58xx};

/// Inner bus state shared between the driver and the test.
#[derive(Debug)]
pub struct BusState {
    /// Recorded (register, value) pairs from write transactions, in order.
    pub writes: Vec<(u8, u8)>,
    /// Device address of every transaction.
    pub addresses: Vec<u8>,
    /// Register file returned by read transactions.
    pub regs: [u8; 256],
    /// Fail the Nth write transaction (0-based), then recover.
    pub fail_write_at: Option<usize>,
    /// Fail every read transaction while set.
    pub fail_reads: bool,
    /// Model the fault latch: a write to 0x78 zeroes the fault block.
    pub clear_faults_on_strobe: bool,
    write_count: usize,
}

impl Default for BusState {
    fn default() -> Self {
        Self {
            writes: Vec::new(),
            addresses: Vec::new(),
            regs: [0; 256],
            fail_write_at: None,
            fail_reads: false,
            clear_faults_on_strobe: false,
            write_count: 0,
        }
    }
}

impl BusState {
    /// Writes to one register, in order.
    pub fn writes_to(&self, register: u8) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(reg, _)| *reg == register)
            .map(|(_, value)| *value)
            .collect()
    }

    /// Seed the four fault registers.
    pub fn set_faults(&mut self, channel: u8, global: u8, over_temp: u8, ot_warning: u8) {
        self.regs[0x70] = channel;
        self.regs[0x71] = global;
        self.regs[0x72] = over_temp;
        self.regs[0x73] = ot_warning;
    }
}

/// Cloneable handle implementing the async I²C trait over [`BusState`].
#[derive(Clone, Default, Debug)]
pub struct SharedI2c(pub Rc<RefCell<BusState>>);

impl SharedI2c {
    pub fn state(&self) -> std::cell::Ref<'_, BusState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, BusState> {
        self.0.borrow_mut()
    }
}

impl embedded_hal::i2c::ErrorType for SharedI2c {
    type Error = ErrorKind;
}

impl embedded_hal_async::i2c::I2c for SharedI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bus = self.0.borrow_mut();
        bus.addresses.push(address);

        let is_read = operations.iter().any(|op| matches!(op, Operation::Read(_)));
        if is_read {
            if bus.fail_reads {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            let mut pointer = 0usize;
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(data) => {
                        pointer = usize::from(data.first().copied().unwrap_or(0));
                    }
                    Operation::Read(buf) => {
                        for (i, byte) in buf.iter_mut().enumerate() {
                            *byte = bus.regs[(pointer + i) % 256];
                        }
                    }
                }
            }
            return Ok(());
        }

        let failing = bus.fail_write_at == Some(bus.write_count);
        bus.write_count += 1;
        if failing {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }
        for op in operations.iter() {
            if let Operation::Write(data) = op {
                if let [register, value] = **data {
                    bus.writes.push((register, value));
                    if register == 0x78 && bus.clear_faults_on_strobe {
                        bus.regs[0x70] = 0;
                        bus.regs[0x71] = 0;
                        bus.regs[0x72] = 0;
                        bus.regs[0x73] = 0;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Inner pin state.
#[derive(Default, Debug)]
pub struct PinState {
    pub level: bool,
    /// Every edge driven, in order (false = low, true = high).
    pub edges: Vec<bool>,
}

/// Cloneable handle implementing `OutputPin` over [`PinState`].
#[derive(Clone, Default, Debug)]
pub struct SharedPin(pub Rc<RefCell<PinState>>);

impl SharedPin {
    pub fn state(&self) -> std::cell::Ref<'_, PinState> {
        self.0.borrow()
    }
}

impl embedded_hal::digital::ErrorType for SharedPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for SharedPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        let mut pin = self.0.borrow_mut();
        pin.level = false;
        pin.edges.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        let mut pin = self.0.borrow_mut();
        pin.level = true;
        pin.edges.push(true);
        Ok(())
    }
}

/// Build a driver on fresh shared mocks, returning the inspection handles.
pub fn new_driver(
    config: DeviceConfig,
) -> (Tas58xx<SharedI2c, SharedPin>, SharedI2c, SharedPin) {
    let i2c = SharedI2c::default();
    let pin = SharedPin::default();
    let driver = Tas58xx::new(i2c.clone(), pin.clone(), config)
        .expect("valid configuration must construct");
    (driver, i2c, pin)
}
