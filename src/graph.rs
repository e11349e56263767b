//! Deterministic, address-ordered view of an accumulated trace.

use std::fmt;

use crate::decoder::Instruction;
use crate::opcodes::{self, AddressingMode};
use crate::references::{Reference, ReferenceKind};
use crate::vectors::VectorId;

/// One row of the `instructions` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionRow {
    pub address: u32,
    pub opcode: u8,
    pub operand: u32,
    pub operand_len: u8,
    pub mode: AddressingMode,
}

impl InstructionRow {
    #[inline]
    pub fn is_call(&self) -> bool {
        opcodes::lookup(self.opcode).is_call()
    }
}

impl From<&Instruction> for InstructionRow {
    fn from(insn: &Instruction) -> Self {
        Self {
            address: insn.address,
            opcode: insn.opcode,
            operand: insn.operand,
            operand_len: insn.operand_len,
            mode: insn.mode(),
        }
    }
}

impl fmt::Display for InstructionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = opcodes::lookup(self.opcode).mnemonic;
        let operand = self.mode.format_operand(self.operand, self.operand_len);
        if operand.is_empty() {
            write!(f, "{}", mnemonic)
        } else {
            write!(f, "{} {}", mnemonic, operand)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceGraph {
    /// Sorted by address.
    pub instructions: Vec<InstructionRow>,
    /// Sorted by (origin, target, kind).
    pub references: Vec<Reference>,
    /// Sorted, unique.
    pub subroutines: Vec<u32>,
    /// Sorted by vector id.
    pub vectors: Vec<(VectorId, u32)>,
}

impl TraceGraph {
    /// Builds a graph from unordered parts and derives the subroutine set.
    pub fn from_parts(
        instructions: impl IntoIterator<Item = InstructionRow>,
        references: impl IntoIterator<Item = Reference>,
        vectors: impl IntoIterator<Item = (VectorId, u32)>,
    ) -> Self {
        let mut graph = TraceGraph {
            instructions: instructions.into_iter().collect(),
            references: references.into_iter().collect(),
            subroutines: Vec::new(),
            vectors: vectors.into_iter().collect(),
        };
        graph.instructions.sort_by_key(|row| row.address);
        graph.instructions.dedup_by_key(|row| row.address);
        graph.references.sort();
        graph.references.dedup();
        graph.vectors.sort();

        let mut subroutines: Vec<u32> = graph
            .references
            .iter()
            .filter(|r| graph.is_subroutine_edge(r))
            .map(|r| r.target)
            .collect();
        subroutines.sort_unstable();
        subroutines.dedup();
        graph.subroutines = subroutines;
        graph
    }

    pub fn instruction(&self, address: u32) -> Option<&InstructionRow> {
        self.instructions
            .binary_search_by_key(&address, |row| row.address)
            .ok()
            .map(|i| &self.instructions[i])
    }

    /// True when `r` leaves a call instruction and lands on traced code.
    pub fn is_subroutine_edge(&self, r: &Reference) -> bool {
        r.kind != ReferenceKind::NonStandardReturn
            && self.instruction(r.origin).is_some_and(|row| row.is_call())
            && self.instruction(r.target).is_some()
    }

    pub fn references_from(&self, origin: u32) -> &[Reference] {
        let start = self.references.partition_point(|r| r.origin < origin);
        let end = self.references.partition_point(|r| r.origin <= origin);
        &self.references[start..end]
    }

    pub fn nonstandard_returns(&self) -> impl Iterator<Item = &Reference> {
        self.references
            .iter()
            .filter(|r| r.kind == ReferenceKind::NonStandardReturn)
    }

    pub fn vector(&self, id: VectorId) -> Option<u32> {
        self.vectors
            .iter()
            .find(|(v, _)| *v == id)
            .map(|&(_, pc)| pc)
    }
}
