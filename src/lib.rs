//! Execution tracer for 65816 programs.
//!
//! An emulator calls [`Tracer::trace`] before each instruction executes. The
//! tracer decodes each address once, records control-flow references, tracks
//! calls against a shadow stack to spot non-standard returns, and learns the
//! entry points of the reset, NMI and IRQ handlers. [`Tracer::flush`] writes
//! the accumulated graph to SQLite.

pub mod call_stack;
pub mod checkpoint;
pub mod cpu_bus;
pub mod debug_flags;
pub mod decoder;
pub mod error;
pub mod graph;
pub mod memory;
pub mod opcodes;
pub mod references;
pub mod registers;
pub mod snapshot;
pub mod tracer;
pub mod vectors;

pub use cpu_bus::DebugBus;
pub use decoder::Instruction;
pub use error::{Result, TraceError};
pub use graph::{InstructionRow, TraceGraph};
pub use memory::FlatMemory;
pub use opcodes::AddressingMode;
pub use references::{Reference, ReferenceKind};
pub use registers::{CpuRegisters, StatusFlags};
pub use snapshot::SnapshotSummary;
pub use tracer::{TraceStats, Tracer};
pub use vectors::VectorId;
