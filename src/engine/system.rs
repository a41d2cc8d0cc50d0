//! Data space layout of the supported AVR devices.
//!
//! The data space starts with the 32 general purpose registers, followed by the 64 I/O
//! registers and the internal SRAM. Addresses in this module are data space addresses
//! unless noted otherwise.

pub const NUMBER_OF_REGISTERS: usize = 32;
pub const IO_SIZE: usize = 64;
pub const IO_BASE: u16 = NUMBER_OF_REGISTERS as u16;

/// I/O space addresses as used by `IN`, `OUT`, `SBI` and friends.
pub mod io {
    pub const PINB: u8 = 0x16;
    pub const SPL: u8 = 0x3d;
    pub const SPH: u8 = 0x3e;
    pub const SREG: u8 = 0x3f;
}

/// Bit positions inside the status register.
pub mod sreg {
    pub const C: u8 = 0;
    pub const Z: u8 = 1;
    pub const N: u8 = 2;
    pub const V: u8 = 3;
    pub const S: u8 = 4;
    pub const H: u8 = 5;
    pub const T: u8 = 6;
    pub const I: u8 = 7;

    pub const NAMES: [char; 8] = ['C', 'Z', 'N', 'V', 'S', 'H', 'T', 'I'];
}

pub const fn io_to_data(address: u8) -> u16 {
    IO_BASE + address as u16
}

pub const PINB_ADDRESS: u16 = io_to_data(io::PINB);
pub const SPL_ADDRESS: u16 = io_to_data(io::SPL);
pub const SPH_ADDRESS: u16 = io_to_data(io::SPH);
pub const SREG_ADDRESS: u16 = io_to_data(io::SREG);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Device {
    pub name: &'static str,
    /// Program memory in bytes.
    pub flash_size: usize,
    /// Internal SRAM in bytes.
    pub sram_size: usize,
}

impl Device {
    pub const ATTINY25: Device = Device {
        name: "attiny25",
        flash_size: 2 * 1024,
        sram_size: 128,
    };

    pub const ATTINY45: Device = Device {
        name: "attiny45",
        flash_size: 4 * 1024,
        sram_size: 256,
    };

    pub const ATTINY85: Device = Device {
        name: "attiny85",
        flash_size: 8 * 1024,
        sram_size: 512,
    };

    pub fn by_name(name: &str) -> Option<Device> {
        DEVICES
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .copied()
    }

    /// Number of addressable bytes in the data space.
    pub fn data_size(&self) -> usize {
        NUMBER_OF_REGISTERS + IO_SIZE + self.sram_size
    }

    /// Highest data space address, the value firmware loads into the stack pointer.
    pub fn ramend(&self) -> u16 {
        (self.data_size() - 1) as u16
    }

    /// Program memory in 16-bit words.
    pub fn flash_words(&self) -> usize {
        self.flash_size / 2
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::ATTINY85
    }
}

pub const DEVICES: [Device; 3] = [Device::ATTINY25, Device::ATTINY45, Device::ATTINY85];

pub const DEVICE_NAMES: [&str; 3] = [
    Device::ATTINY25.name,
    Device::ATTINY45.name,
    Device::ATTINY85.name,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attiny85_layout() {
        let device = Device::ATTINY85;

        assert_eq!(device.data_size(), 608);
        assert_eq!(device.ramend(), 0x25f);
        assert_eq!(device.flash_words(), 4096);
        assert_eq!(SPL_ADDRESS, 0x5d);
        assert_eq!(SPH_ADDRESS, 0x5e);
        assert_eq!(SREG_ADDRESS, 0x5f);
        assert_eq!(PINB_ADDRESS, 0x36);
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Device::by_name("ATtiny45"), Some(Device::ATTINY45));
        assert_eq!(Device::by_name("atmega328p"), None);
    }
}
