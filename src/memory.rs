use crate::cpu_bus::{DebugBus, ADDRESS_MASK};

const MEMORY_SIZE: usize = 0x100_0000;

/// Flat 16 MiB view of the 65C816 address space with no mirroring.
///
/// Hosts that already have a bus implement [`DebugBus`] directly; this is
/// for replaying memory images and for tests.
pub struct FlatMemory {
    pub(crate) bytes: Vec<u8>,
}

impl FlatMemory {
    pub fn new() -> Self {
        FlatMemory {
            bytes: vec![0; MEMORY_SIZE],
        }
    }

    pub fn read(&self, addr: u32) -> u8 {
        self.bytes[(addr & ADDRESS_MASK) as usize]
    }

    pub fn write(&mut self, addr: u32, data: u8) {
        self.bytes[(addr & ADDRESS_MASK) as usize] = data;
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) {
        self.write(addr, (value & 0xFF) as u8);
        self.write(addr.wrapping_add(1), (value >> 8) as u8);
    }

    /// Copies `program` starting at `start`, wrapping at the top of the address space.
    pub fn load(&mut self, start: u32, program: &[u8]) {
        for (i, &byte) in program.iter().enumerate() {
            self.write(start.wrapping_add(i as u32), byte);
        }
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugBus for FlatMemory {
    fn peek_u8(&self, addr: u32) -> u8 {
        self.read(addr)
    }
}
