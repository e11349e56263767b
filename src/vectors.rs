//! Interrupt and reset handler discovery.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpu_bus::DebugBus;
use crate::registers::{vector_cell, CpuRegisters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum VectorId {
    Reset = 0,
    Nmi = 1,
    Irq = 2,
}

impl VectorId {
    /// Tracked vector serviced through `cell`, in either CPU mode.
    pub fn from_cell(cell: u16) -> Option<Self> {
        match cell {
            vector_cell::RESET => Some(VectorId::Reset),
            vector_cell::NATIVE_NMI | vector_cell::EMULATION_NMI => Some(VectorId::Nmi),
            vector_cell::NATIVE_IRQ | vector_cell::EMULATION_IRQ => Some(VectorId::Irq),
            _ => None,
        }
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(VectorId::Reset),
            1 => Some(VectorId::Nmi),
            2 => Some(VectorId::Irq),
            _ => None,
        }
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            VectorId::Reset => "RESET",
            VectorId::Nmi => "NMI",
            VectorId::Irq => "IRQ",
        })
    }
}

/// Most recently confirmed handler entry per vector.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMap {
    handlers: BTreeMap<VectorId, u32>,
}

impl VectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current PC as a handler entry when it equals the word
    /// stored in the vector cell being serviced. Returns the vector on a hit.
    pub fn watch<B: DebugBus + ?Sized>(
        &mut self,
        regs: &CpuRegisters,
        bus: &B,
    ) -> Option<VectorId> {
        let pc = regs.full_pc();
        if pc != bus.peek_u16(regs.vector as u32) as u32 {
            return None;
        }
        let id = VectorId::from_cell(regs.vector)?;
        self.handlers.insert(id, pc);
        Some(id)
    }

    pub fn get(&self, id: VectorId) -> Option<u32> {
        self.handlers.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VectorId, u32)> + '_ {
        self.handlers.iter().map(|(&id, &pc)| (id, pc))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
