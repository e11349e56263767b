//! Memoized instruction decoding.
//!
//! Each code address is decoded once, with the register widths in force on
//! that first visit. Later visits reuse the record even when the M/X flags
//! have changed since; code that runs under several widths keeps the
//! operand length of its first decode.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu_bus::{DebugBus, ADDRESS_MASK};
use crate::opcodes::{self, AddressingMode, Opcode};
use crate::registers::CpuRegisters;

/// Decoded instruction at a 24-bit address. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: u32,
    pub opcode: u8,
    pub operand: u32,
    pub operand_len: u8,
    pub accumulator_8bit: bool,
    pub index_8bit: bool,
}

impl Instruction {
    #[inline]
    pub fn info(&self) -> &'static Opcode {
        opcodes::lookup(self.opcode)
    }

    #[inline]
    pub fn mode(&self) -> AddressingMode {
        self.info().mode
    }

    /// Encoded length including the opcode byte.
    #[inline]
    pub fn byte_len(&self) -> u8 {
        1 + self.operand_len
    }

    #[inline]
    pub fn bank(&self) -> u8 {
        (self.address >> 16) as u8
    }

    /// Address of the byte after this instruction; wraps inside the bank
    /// like the program counter does.
    #[inline]
    pub fn next_address(&self) -> u32 {
        let offset = (self.address as u16).wrapping_add(self.byte_len() as u16);
        ((self.bank() as u32) << 16) | offset as u32
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operand = self.mode().format_operand(self.operand, self.operand_len);
        if operand.is_empty() {
            write!(f, "{}", self.info().mnemonic)
        } else {
            write!(f, "{} {}", self.info().mnemonic, operand)
        }
    }
}

/// Decodes the instruction at `address` using the widths in `regs`.
pub fn decode<B: DebugBus + ?Sized>(address: u32, regs: &CpuRegisters, bus: &B) -> Instruction {
    let address = address & ADDRESS_MASK;
    let opcode = bus.peek_u8(address);
    let accumulator_8bit = regs.accumulator_8bit();
    let index_8bit = regs.index_8bit();
    let operand_len = opcodes::lookup(opcode)
        .mode
        .operand_len(accumulator_8bit, index_8bit);

    let operand_addr = address.wrapping_add(1) & ADDRESS_MASK;
    let operand = match operand_len {
        1 => bus.peek_u8(operand_addr) as u32,
        2 => bus.peek_u16(operand_addr) as u32,
        3 => bus.peek_u24(operand_addr),
        _ => 0,
    };

    Instruction {
        address,
        opcode,
        operand,
        operand_len,
        accumulator_8bit,
        index_8bit,
    }
}

/// First-visit-wins map from address to decoded instruction.
#[derive(Debug, Default, Clone)]
pub struct InstructionCache {
    records: HashMap<u32, Instruction>,
}

impl InstructionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached record at `address`, decoding it on a miss.
    /// The flag is `true` when the record was created by this call.
    pub fn decode<B: DebugBus + ?Sized>(
        &mut self,
        address: u32,
        regs: &CpuRegisters,
        bus: &B,
    ) -> (Instruction, bool) {
        match self.records.entry(address & ADDRESS_MASK) {
            Entry::Occupied(e) => (*e.get(), false),
            Entry::Vacant(e) => (*e.insert(decode(address, regs, bus)), true),
        }
    }

    pub fn get(&self, address: u32) -> Option<&Instruction> {
        self.records.get(&(address & ADDRESS_MASK))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.records.values()
    }

    pub(crate) fn insert(&mut self, insn: Instruction) {
        self.records.insert(insn.address, insn);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
