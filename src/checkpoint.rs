//! Binary checkpoint of a trace session, stored next to emulator save states.
//!
//! Shadow call-stack tags are not part of a checkpoint: a restored session
//! starts with no pending calls.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decoder::Instruction;
use crate::error::{Result, TraceError};
use crate::references::Reference;
use crate::vectors::VectorMap;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub steps: u64,
    pub instructions: Vec<Instruction>,
    pub references: Vec<Reference>,
    pub vectors: VectorMap,
}

impl Checkpoint {
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = bincode::serialize(self)?;
        std::fs::write(path.as_ref(), data)?;
        log::info!("trace checkpoint written to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Checkpoint> {
        let data = std::fs::read(path.as_ref())?;
        let checkpoint: Checkpoint = bincode::deserialize(&data)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(TraceError::InvalidSnapshot(format!(
                "checkpoint version {} (expected {})",
                checkpoint.version, CHECKPOINT_VERSION
            )));
        }
        log::info!("trace checkpoint loaded from {}", path.as_ref().display());
        Ok(checkpoint)
    }
}
