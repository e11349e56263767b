//! Register snapshot handed to the tracer once per instruction.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0x01;
        const ZERO = 0x02;
        const IRQ_DISABLE = 0x04;
        const DECIMAL = 0x08;
        const INDEX_8BIT = 0x10;
        const MEMORY_8BIT = 0x20;
        const OVERFLOW = 0x40;
        const NEGATIVE = 0x80;
    }
}

/// Bank-0 addresses of the hardware vector cells.
pub mod vector_cell {
    pub const NATIVE_NMI: u16 = 0xFFEA;
    pub const NATIVE_IRQ: u16 = 0xFFEE;
    pub const EMULATION_NMI: u16 = 0xFFFA;
    pub const RESET: u16 = 0xFFFC;
    pub const EMULATION_IRQ: u16 = 0xFFFE;
}

/// CPU state at instruction fetch: `pc` points at the opcode and the
/// instruction has not yet touched the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub pc: u16,
    pub pb: u8,
    pub sp: u16,
    pub dp: u16,
    pub db: u8,
    pub x: u16,
    pub y: u16,
    pub p: StatusFlags,
    pub emulation_mode: bool,
    /// Vector cell the CPU most recently fetched a handler address through.
    pub vector: u16,
}

impl CpuRegisters {
    /// Power-on state: emulation mode, 8-bit registers, stack in page 1,
    /// servicing the reset vector.
    pub fn new() -> Self {
        Self {
            pc: 0,
            pb: 0,
            sp: 0x01FF,
            dp: 0,
            db: 0,
            x: 0,
            y: 0,
            p: StatusFlags::MEMORY_8BIT | StatusFlags::INDEX_8BIT | StatusFlags::IRQ_DISABLE,
            emulation_mode: true,
            vector: vector_cell::RESET,
        }
    }

    /// Native mode with 16-bit accumulator and index registers.
    pub fn native() -> Self {
        Self {
            p: StatusFlags::IRQ_DISABLE,
            emulation_mode: false,
            ..Self::new()
        }
    }

    #[inline]
    pub fn full_pc(&self) -> u32 {
        ((self.pb as u32) << 16) | (self.pc as u32)
    }

    #[inline]
    pub fn accumulator_8bit(&self) -> bool {
        self.emulation_mode || self.p.contains(StatusFlags::MEMORY_8BIT)
    }

    #[inline]
    pub fn index_8bit(&self) -> bool {
        self.emulation_mode || self.p.contains(StatusFlags::INDEX_8BIT)
    }

    /// Convenience for hosts and tests that jump the snapshot to a new PC.
    pub fn at(mut self, full_pc: u32) -> Self {
        self.pb = (full_pc >> 16) as u8;
        self.pc = (full_pc & 0xFFFF) as u16;
        self
    }
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self::new()
    }
}
