// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub struct MockI2cError(&'static str);

impl fmt::Display for MockI2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct MockBus {
    unavailable: bool,
    slave_address: Option<u16>,
    registers: HashMap<u8, u8>,
}

thread_local! {
    static MOCK_BUS: RefCell<MockBus> = RefCell::new(MockBus::default());
}

pub struct I2c;

impl I2c {
    pub fn new() -> Result<Self, MockI2cError> {
        MOCK_BUS.with(|bus| {
            if bus.borrow().unavailable {
                Err(MockI2cError("Permission denied (os error 13)"))
            } else {
                Ok(I2c)
            }
        })
    }

    pub fn set_slave_address(&mut self, address: u16) -> Result<(), MockI2cError> {
        MOCK_BUS.with(|bus| bus.borrow_mut().slave_address = Some(address));
        Ok(())
    }

    pub fn smbus_read_byte(&self, register: u8) -> Result<u8, MockI2cError> {
        Ok(get_register(register))
    }

    pub fn smbus_write_byte(&self, register: u8, value: u8) -> Result<(), MockI2cError> {
        set_register(register, value);
        Ok(())
    }
}

// test helper to preload a register
pub fn set_register(register: u8, value: u8) {
    MOCK_BUS.with(|bus| {
        bus.borrow_mut().registers.insert(register, value);
    });
}

pub fn get_register(register: u8) -> u8 {
    MOCK_BUS.with(|bus| *bus.borrow().registers.get(&register).unwrap_or(&0))
}

pub fn slave_address() -> Option<u16> {
    MOCK_BUS.with(|bus| bus.borrow().slave_address)
}

pub fn set_bus_available(available: bool) {
    MOCK_BUS.with(|bus| bus.borrow_mut().unavailable = !available);
}

// test helper to reset the whole bus
pub fn reset_mock_bus() {
    MOCK_BUS.with(|bus| *bus.borrow_mut() = MockBus::default());
}
