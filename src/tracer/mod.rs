//! Per-session execution tracer.
//!
//! The host owns a [`Tracer`] and calls [`Tracer::trace`] once per
//! instruction, with the registers as they stand at the opcode fetch.
//! Nothing is persisted until [`Tracer::flush`]; dropping or clearing the
//! tracer at any point discards the session.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use rusqlite::Connection;

use crate::call_stack::ShadowStack;
use crate::checkpoint::{Checkpoint, CHECKPOINT_VERSION};
use crate::cpu_bus::DebugBus;
use crate::debug_flags;
use crate::decoder::{Instruction, InstructionCache};
use crate::error::Result;
use crate::graph::{InstructionRow, TraceGraph};
use crate::references::{self, Reference};
use crate::registers::CpuRegisters;
use crate::snapshot::{self, SnapshotSummary};
use crate::vectors::VectorMap;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceStats {
    pub steps: u64,
    pub instructions: usize,
    pub references: usize,
    pub pending_calls: usize,
    pub vectors: usize,
}

impl fmt::Display for TraceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trace: {} steps | Instructions: {} | References: {} | Pending calls: {} | Vectors: {}",
            self.steps, self.instructions, self.references, self.pending_calls, self.vectors
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct Tracer {
    instructions: InstructionCache,
    references: HashSet<Reference>,
    shadow: ShadowStack,
    vectors: VectorMap,
    steps: u64,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-instruction hook. Reads `bus`, never writes it.
    pub fn trace<B: DebugBus + ?Sized>(&mut self, regs: &CpuRegisters, bus: &B) {
        self.steps += 1;

        let (insn, fresh) = self.instructions.decode(regs.full_pc(), regs, bus);
        if fresh && debug_flags::trace() {
            log::trace!("{:06X}: {}", insn.address, insn);
        }

        let edges = references::extract_references(&insn, regs, bus, &mut self.shadow);
        for edge in edges.iter() {
            if self.references.insert(edge) && debug_flags::trace_edges() {
                log::debug!(
                    "edge {:06X} -> {:06X} ({})",
                    edge.origin,
                    edge.target,
                    edge.kind
                );
            }
        }

        // Only on first decode, so a later jump into a handler cannot move it.
        if fresh {
            if let Some(id) = self.vectors.watch(regs, bus) {
                log::info!("{} handler at {:06X}", id, insn.address);
            }
        }
    }

    pub fn instruction(&self, address: u32) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter()
    }

    pub fn vectors(&self) -> &VectorMap {
        &self.vectors
    }

    /// Calls still waiting for their return.
    pub fn pending_calls(&self) -> usize {
        self.shadow.len()
    }

    pub fn stats(&self) -> TraceStats {
        TraceStats {
            steps: self.steps,
            instructions: self.instructions.len(),
            references: self.references.len(),
            pending_calls: self.shadow.len(),
            vectors: self.vectors.len(),
        }
    }

    /// Ordered view of everything accumulated so far.
    pub fn graph(&self) -> TraceGraph {
        TraceGraph::from_parts(
            self.instructions.iter().map(InstructionRow::from),
            self.references.iter().copied(),
            self.vectors.iter(),
        )
    }

    /// Writes the session snapshot. Re-flushing without new trace activity
    /// writes identical tables.
    pub fn flush(&self, conn: &mut Connection) -> Result<SnapshotSummary> {
        log::debug!("{}", self.stats());
        snapshot::write(conn, &self.graph())
    }

    pub fn flush_to_path(&self, path: impl AsRef<Path>) -> Result<SnapshotSummary> {
        let mut conn = Connection::open(path)?;
        self.flush(&mut conn)
    }

    /// Flushes to `TRACE_DB` (default `trace.db`).
    pub fn flush_default(&self) -> Result<SnapshotSummary> {
        self.flush_to_path(debug_flags::snapshot_path())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        let mut instructions: Vec<Instruction> = self.instructions.iter().copied().collect();
        instructions.sort_by_key(|insn| insn.address);
        let mut references: Vec<Reference> = self.references.iter().copied().collect();
        references.sort();
        Checkpoint {
            version: CHECKPOINT_VERSION,
            steps: self.steps,
            instructions,
            references,
            vectors: self.vectors.clone(),
        }
    }

    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        let mut tracer = Tracer::new();
        for insn in checkpoint.instructions {
            tracer.instructions.insert(insn);
        }
        tracer.references.extend(checkpoint.references);
        tracer.vectors = checkpoint.vectors;
        tracer.steps = checkpoint.steps;
        tracer
    }

    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        self.checkpoint().save_to_file(path)
    }

    pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_checkpoint(Checkpoint::load_from_file(path)?))
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
        self.references.clear();
        self.shadow.clear();
        self.vectors.clear();
        self.steps = 0;
    }
}
