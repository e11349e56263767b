//! Relational snapshot of a trace session.
//!
//! The writer replaces all four tables inside one transaction; a reader
//! opening the database sees either the previous snapshot or the new one,
//! never a partial graph.

use std::path::Path;
use std::time::Instant;

use rusqlite::{params, Connection, Transaction};

use crate::error::{Result, TraceError};
use crate::graph::{InstructionRow, TraceGraph};
use crate::opcodes::AddressingMode;
use crate::references::{Reference, ReferenceKind};
use crate::vectors::VectorId;

const SCHEMA: &str = "
    DROP TABLE IF EXISTS subroutines;
    DROP TABLE IF EXISTS \"references\";
    DROP TABLE IF EXISTS vectors;
    DROP TABLE IF EXISTS instructions;

    CREATE TABLE instructions(
        address        INTEGER NOT NULL,
        opcode         INTEGER NOT NULL,
        operand        INTEGER NOT NULL,
        operand_length INTEGER NOT NULL,
        mode_category  INTEGER NOT NULL,
        PRIMARY KEY (address)
    );

    CREATE TABLE subroutines(
        address INTEGER NOT NULL,
        PRIMARY KEY (address),
        FOREIGN KEY (address) REFERENCES instructions(address)
    );

    CREATE TABLE \"references\"(
        origin INTEGER NOT NULL,
        target INTEGER NOT NULL,
        kind   INTEGER NOT NULL,
        PRIMARY KEY (origin, target, kind),
        FOREIGN KEY (origin) REFERENCES instructions(address)
    );

    CREATE TABLE vectors(
        vector_id       INTEGER NOT NULL,
        handler_address INTEGER NOT NULL,
        PRIMARY KEY (vector_id)
    );
";

/// Row counts of a committed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotSummary {
    pub instructions: usize,
    pub references: usize,
    pub subroutines: usize,
    pub vectors: usize,
}

/// Replaces the snapshot in `conn` with `graph` as one transaction.
pub fn write(conn: &mut Connection, graph: &TraceGraph) -> Result<SnapshotSummary> {
    let started = Instant::now();
    conn.pragma_update(None, "foreign_keys", true)?;

    let tx = conn.transaction()?;
    let summary = write_tables(&tx, graph)?;
    tx.commit()?;

    log::info!(
        "snapshot written: {} instructions, {} references, {} subroutines, {} vectors in {:?}",
        summary.instructions,
        summary.references,
        summary.subroutines,
        summary.vectors,
        started.elapsed()
    );
    Ok(summary)
}

fn write_tables(tx: &Transaction<'_>, graph: &TraceGraph) -> Result<SnapshotSummary> {
    tx.execute_batch(SCHEMA)?;
    let mut summary = SnapshotSummary::default();

    {
        let mut insert = tx.prepare(
            "INSERT INTO instructions(address, opcode, operand, operand_length, mode_category)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in &graph.instructions {
            insert.execute(params![
                row.address,
                row.opcode,
                row.operand,
                row.operand_len,
                row.mode.code()
            ])?;
            summary.instructions += 1;
        }
    }

    {
        let mut insert_ref =
            tx.prepare("INSERT INTO \"references\"(origin, target, kind) VALUES (?1, ?2, ?3)")?;
        let mut insert_sub =
            tx.prepare("INSERT OR IGNORE INTO subroutines(address) VALUES (?1)")?;
        for r in &graph.references {
            if graph.is_subroutine_edge(r) {
                summary.subroutines += insert_sub.execute(params![r.target])?;
            }
            insert_ref.execute(params![r.origin, r.target, r.kind.code()])?;
            summary.references += 1;
        }
    }

    {
        let mut insert =
            tx.prepare("INSERT INTO vectors(vector_id, handler_address) VALUES (?1, ?2)")?;
        for &(id, handler) in &graph.vectors {
            insert.execute(params![id.code(), handler])?;
            summary.vectors += 1;
        }
    }

    Ok(summary)
}

/// Reads a committed snapshot back, in the same order the writer uses.
pub fn load(conn: &Connection) -> Result<TraceGraph> {
    let mut graph = TraceGraph::default();

    let mut stmt = conn.prepare(
        "SELECT address, opcode, operand, operand_length, mode_category
         FROM instructions ORDER BY address",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let code: u8 = row.get(4)?;
        let mode = AddressingMode::from_code(code)
            .ok_or_else(|| TraceError::InvalidSnapshot(format!("unknown mode category {}", code)))?;
        graph.instructions.push(InstructionRow {
            address: row.get(0)?,
            opcode: row.get(1)?,
            operand: row.get(2)?,
            operand_len: row.get(3)?,
            mode,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT origin, target, kind FROM \"references\" ORDER BY origin, target, kind",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let code: u8 = row.get(2)?;
        let kind = ReferenceKind::from_code(code)
            .ok_or_else(|| TraceError::InvalidSnapshot(format!("unknown reference kind {}", code)))?;
        graph
            .references
            .push(Reference::new(row.get(0)?, row.get(1)?, kind));
    }

    let mut stmt = conn.prepare("SELECT address FROM subroutines ORDER BY address")?;
    graph.subroutines = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<u32>>>()?;

    let mut stmt =
        conn.prepare("SELECT vector_id, handler_address FROM vectors ORDER BY vector_id")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let code: u8 = row.get(0)?;
        let id = VectorId::from_code(code)
            .ok_or_else(|| TraceError::InvalidSnapshot(format!("unknown vector id {}", code)))?;
        graph.vectors.push((id, row.get(1)?));
    }

    Ok(graph)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<TraceGraph> {
    let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    load(&conn)
}
