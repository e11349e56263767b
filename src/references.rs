//! Control-flow edge extraction.
//!
//! Runs on every visit of an instruction, cached or not: indirect targets
//! and return addresses live in mutable memory and change between visits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::call_stack::{ReturnCheck, ShadowStack};
use crate::cpu_bus::{DebugBus, ADDRESS_MASK};
use crate::decoder::Instruction;
use crate::opcodes::AddressingMode;
use crate::registers::CpuRegisters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReferenceKind {
    Direct = 0,
    Indirect = 1,
    NonStandardReturn = 2,
}

impl ReferenceKind {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ReferenceKind::Direct),
            1 => Some(ReferenceKind::Indirect),
            2 => Some(ReferenceKind::NonStandardReturn),
            _ => None,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferenceKind::Direct => "direct",
            ReferenceKind::Indirect => "indirect",
            ReferenceKind::NonStandardReturn => "non-standard return",
        })
    }
}

/// Ordering is (origin, target, kind), which is also the snapshot row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub origin: u32,
    pub target: u32,
    pub kind: ReferenceKind,
}

impl Reference {
    pub fn new(origin: u32, target: u32, kind: ReferenceKind) -> Self {
        Self {
            origin,
            target,
            kind,
        }
    }
}

/// Edges produced by one visit: at most one structural edge and at most
/// one non-standard return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extracted {
    pub flow: Option<Reference>,
    pub nonstandard_return: Option<Reference>,
}

impl Extracted {
    pub fn iter(&self) -> impl Iterator<Item = Reference> {
        self.flow.into_iter().chain(self.nonstandard_return)
    }
}

#[inline]
fn bank0(addr: u16) -> u32 {
    addr as u32
}

#[inline]
fn with_bank(bank: u8, offset: u32) -> u32 {
    ((bank as u32) << 16).wrapping_add(offset)
}

/// Effective address of `mode` with operand `operand` under the current
/// registers. Pointer modes read their pointer from bank 0.
pub fn resolve_target<B: DebugBus + ?Sized>(
    mode: AddressingMode,
    operand: u32,
    regs: &CpuRegisters,
    bus: &B,
) -> u32 {
    use AddressingMode::*;
    let op16 = (operand & 0xFFFF) as u16;
    let op8 = (operand & 0xFF) as u16;
    let direct = regs.dp.wrapping_add(op8);
    let stack = regs.sp.wrapping_add(op8);

    let target = match mode {
        Implied | Accumulator | Immediate8 | ImmediateM | ImmediateX | BlockMove => 0,
        Direct => bank0(direct),
        DirectX => bank0(direct.wrapping_add(regs.x)),
        DirectY => bank0(direct.wrapping_add(regs.y)),
        DirectIndirect => with_bank(regs.db, bus.peek_u16(bank0(direct)) as u32),
        DirectIndexedIndirect => {
            let ptr = bank0(direct.wrapping_add(regs.x));
            with_bank(regs.db, bus.peek_u16(ptr) as u32)
        }
        DirectIndirectIndexed => {
            with_bank(regs.db, bus.peek_u16(bank0(direct)) as u32).wrapping_add(regs.y as u32)
        }
        DirectIndirectLong => bus.peek_u24(bank0(direct)),
        DirectIndirectLongIndexed => bus.peek_u24(bank0(direct)).wrapping_add(regs.y as u32),
        Absolute => with_bank(regs.db, op16 as u32),
        AbsoluteX => with_bank(regs.db, op16 as u32).wrapping_add(regs.x as u32),
        AbsoluteY => with_bank(regs.db, op16 as u32).wrapping_add(regs.y as u32),
        AbsoluteProgram | AbsoluteIndirect => with_bank(regs.pb, op16 as u32),
        AbsoluteIndexedIndirect => with_bank(regs.pb, op16.wrapping_add(regs.x) as u32),
        AbsoluteIndirectLong => bank0(op16),
        Long => operand,
        LongX => operand.wrapping_add(regs.x as u32),
        StackRelative => bank0(stack),
        StackRelativeIndirectIndexed => {
            with_bank(regs.db, bus.peek_u16(bank0(stack)) as u32).wrapping_add(regs.y as u32)
        }
        Relative8 => {
            let offset = regs.pc.wrapping_add(2).wrapping_add(operand as u8 as i8 as u16);
            with_bank(regs.pb, offset as u32)
        }
        Relative16 => {
            let offset = regs.pc.wrapping_add(3).wrapping_add(op16);
            with_bank(regs.pb, offset as u32)
        }
    };
    target & ADDRESS_MASK
}

/// Structural edge for `insn` under the current memory contents.
pub fn flow_reference<B: DebugBus + ?Sized>(
    insn: &Instruction,
    regs: &CpuRegisters,
    bus: &B,
) -> Option<Reference> {
    use AddressingMode::*;
    let mode = insn.mode();
    let (target, kind) = match mode {
        Implied | Accumulator | Immediate8 | ImmediateM | ImmediateX => return None,
        // Local operands, not graph edges.
        Direct | DirectX | DirectY | StackRelative => return None,
        // Block moves are left unresolved.
        BlockMove => return None,
        DirectIndirect
        | DirectIndexedIndirect
        | DirectIndirectIndexed
        | StackRelativeIndirectIndexed
        | DirectIndirectLong
        | DirectIndirectLongIndexed => (
            resolve_target(mode, insn.operand, regs, bus),
            ReferenceKind::Indirect,
        ),
        AbsoluteIndirect | AbsoluteIndexedIndirect => {
            let pointer = resolve_target(mode, insn.operand, regs, bus);
            (
                with_bank(regs.pb, bus.peek_u16(pointer) as u32),
                ReferenceKind::Indirect,
            )
        }
        AbsoluteIndirectLong => {
            let pointer = resolve_target(mode, insn.operand, regs, bus);
            (bus.peek_u24(pointer), ReferenceKind::Indirect)
        }
        Absolute | AbsoluteX | AbsoluteY | AbsoluteProgram | Long | LongX | Relative8
        | Relative16 => (
            resolve_target(mode, insn.operand, regs, bus),
            ReferenceKind::Direct,
        ),
    };
    Some(Reference::new(insn.address, target & ADDRESS_MASK, kind))
}

/// Stack address `offset` bytes above S. JSR/RTS keep the stack inside
/// page 1 in emulation mode; JSL/RTL use the full 16-bit pointer.
#[inline]
fn stack_slot(regs: &CpuRegisters, offset: u16, long: bool) -> u16 {
    let slot = regs.sp.wrapping_add(offset);
    if regs.emulation_mode && !long {
        0x0100 | (slot & 0x00FF)
    } else {
        slot
    }
}

/// Return address a return instruction will pull from the stack.
pub fn pulled_return_address<B: DebugBus + ?Sized>(
    long: bool,
    regs: &CpuRegisters,
    bus: &B,
) -> u32 {
    let lo = bus.peek_u8(bank0(stack_slot(regs, 1, long))) as u16;
    let hi = bus.peek_u8(bank0(stack_slot(regs, 2, long))) as u16;
    let pushed = (hi << 8) | lo;
    let bank = if long {
        bus.peek_u8(bank0(stack_slot(regs, 3, long)))
    } else {
        regs.pb
    };
    with_bank(bank, pushed.wrapping_add(1) as u32)
}

/// Stack slot a return reads first, i.e. `S + 1`.
#[inline]
pub fn return_slot(long: bool, regs: &CpuRegisters) -> u16 {
    stack_slot(regs, 1, long)
}

/// Stack slot holding the low byte of the return address a call is about to push.
#[inline]
pub fn call_tag_slot(insn: &Instruction, regs: &CpuRegisters) -> u16 {
    let offset = 1u16.wrapping_sub(insn.operand_len as u16);
    stack_slot(regs, offset, insn.info().is_long())
}

/// All edges for one visit of `insn`, updating the shadow call stack.
pub fn extract_references<B: DebugBus + ?Sized>(
    insn: &Instruction,
    regs: &CpuRegisters,
    bus: &B,
    shadow: &mut ShadowStack,
) -> Extracted {
    let flow = flow_reference(insn, regs, bus);
    let info = insn.info();

    let mut nonstandard_return = None;
    if info.is_call() {
        shadow.record_call(call_tag_slot(insn, regs), insn.next_address());
    } else if info.is_return() {
        let actual = pulled_return_address(info.is_long(), regs, bus);
        match shadow.check_return(return_slot(info.is_long(), regs), actual) {
            ReturnCheck::Matched => {}
            check => {
                log::debug!(
                    "non-standard return at {:06X} -> {:06X} ({:?})",
                    insn.address,
                    actual,
                    check
                );
                nonstandard_return = Some(Reference::new(
                    insn.address,
                    actual,
                    ReferenceKind::NonStandardReturn,
                ));
            }
        }
    }

    Extracted {
        flow,
        nonstandard_return,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::memory::FlatMemory;

    fn setup(program: &[u8], pc: u32) -> (CpuRegisters, FlatMemory) {
        let mut bus = FlatMemory::new();
        bus.load(pc, program);
        (CpuRegisters::native().at(pc), bus)
    }

    fn flow_of(regs: &CpuRegisters, bus: &FlatMemory) -> Option<Reference> {
        let insn = decode(regs.full_pc(), regs, bus);
        flow_reference(&insn, regs, bus)
    }

    #[test]
    fn test_immediate_and_direct_page_produce_nothing() {
        // LDA #$1234 ; LDA $10 ; LDA $10,X ; LDA $03,S
        for program in [&[0xA9, 0x34, 0x12][..], &[0xA5, 0x10][..], &[0xB5, 0x10][..], &[0xA3, 0x03][..]] {
            let (regs, bus) = setup(program, 0x8000);
            assert_eq!(flow_of(&regs, &bus), None);
        }
    }

    #[test]
    fn test_absolute_call_is_direct() {
        // JSR $8005 in bank $01
        let (regs, mut bus) = setup(&[0x20, 0x05, 0x80], 0x01_8000);
        let expected = Some(Reference::new(0x01_8000, 0x01_8005, ReferenceKind::Direct));
        assert_eq!(flow_of(&regs, &bus), expected);

        // Unrelated memory does not matter.
        bus.load(0x00_0000, &[0xFF; 64]);
        assert_eq!(flow_of(&regs, &bus), expected);
    }

    #[test]
    fn test_absolute_data_uses_data_bank() {
        // LDA $2000,X with DB=$7E
        let (mut regs, bus) = setup(&[0xBD, 0x00, 0x20], 0x8000);
        regs.db = 0x7E;
        regs.x = 0x0010;
        assert_eq!(
            flow_of(&regs, &bus),
            Some(Reference::new(0x8000, 0x7E_2010, ReferenceKind::Direct))
        );
    }

    #[test]
    fn test_branches_resolve_relative_to_next_instruction() {
        // BRA -4
        let (regs, bus) = setup(&[0x80, 0xFC], 0x8010);
        assert_eq!(flow_of(&regs, &bus).map(|r| r.target), Some(0x800E));

        // BRL +$0100
        let (regs, bus) = setup(&[0x82, 0x00, 0x01], 0x02_8000);
        assert_eq!(flow_of(&regs, &bus).map(|r| r.target), Some(0x02_8103));
    }

    #[test]
    fn test_direct_page_indirect_is_indirect() {
        // LDA ($20),Y with D=$0100, pointer $0120 -> $4000, DB=$7F, Y=2
        let (mut regs, mut bus) = setup(&[0xB1, 0x20], 0x8000);
        regs.dp = 0x0100;
        regs.db = 0x7F;
        regs.y = 2;
        bus.write_u16(0x0120, 0x4000);
        assert_eq!(
            flow_of(&regs, &bus),
            Some(Reference::new(0x8000, 0x7F_4002, ReferenceKind::Indirect))
        );
    }

    #[test]
    fn test_direct_page_indirect_long() {
        // JML-style data pointer: LDA [$30]
        let (regs, mut bus) = setup(&[0xA7, 0x30], 0x8000);
        bus.load(0x0030, &[0x56, 0x34, 0xC2]);
        assert_eq!(flow_of(&regs, &bus).map(|r| r.target), Some(0xC2_3456));
    }

    #[test]
    fn test_stack_relative_indirect_indexed() {
        // LDA ($03,S),Y with S=$1FF0
        let (mut regs, mut bus) = setup(&[0xB3, 0x03], 0x8000);
        regs.sp = 0x1FF0;
        regs.db = 0x01;
        regs.y = 0x10;
        bus.write_u16(0x1FF3, 0x9000);
        assert_eq!(
            flow_of(&regs, &bus),
            Some(Reference::new(0x8000, 0x01_9010, ReferenceKind::Indirect))
        );
    }

    #[test]
    fn test_jump_table_dereferences_program_bank() {
        // JMP ($9000,X) in bank $03 with X=4; table entry -> $A000
        let (mut regs, mut bus) = setup(&[0x7C, 0x00, 0x90], 0x03_8000);
        regs.x = 4;
        bus.write_u16(0x03_9004, 0xA000);
        assert_eq!(
            flow_of(&regs, &bus),
            Some(Reference::new(0x03_8000, 0x03_A000, ReferenceKind::Indirect))
        );

        // Same origin, new table contents, new edge.
        bus.write_u16(0x03_9004, 0xB000);
        assert_eq!(flow_of(&regs, &bus).map(|r| r.target), Some(0x03_B000));
    }

    #[test]
    fn test_indirect_long_jump_reads_bank0_pointer() {
        // JML [$0200]
        let (regs, mut bus) = setup(&[0xDC, 0x00, 0x02], 0x05_8000);
        bus.load(0x00_0200, &[0x00, 0x90, 0xC1]);
        assert_eq!(
            flow_of(&regs, &bus),
            Some(Reference::new(0x05_8000, 0xC1_9000, ReferenceKind::Indirect))
        );
    }

    #[test]
    fn test_block_move_is_unresolved() {
        // MVN $7E,$7F
        let (regs, bus) = setup(&[0x54, 0x7F, 0x7E], 0x8000);
        assert_eq!(flow_of(&regs, &bus), None);
    }

    #[test]
    fn test_call_tag_matches_slot_read_by_return() {
        // JSL $C08000 with S=$1FFF pushes bank, high, low: low byte at $1FFD
        let (mut regs, bus) = setup(&[0x22, 0x00, 0x80, 0xC0], 0x8000);
        regs.sp = 0x1FFF;
        let insn = decode(regs.full_pc(), &regs, &bus);
        let slot = call_tag_slot(&insn, &regs);
        assert_eq!(slot, 0x1FFD);

        // RTL reads its first byte at S+1 after the three pushes.
        let sp_after_call = regs.sp.wrapping_sub(3);
        assert_eq!(sp_after_call.wrapping_add(1), slot);
    }

    #[test]
    fn test_pulled_return_address_for_rtl_and_rts() {
        let mut bus = FlatMemory::new();
        bus.load(0x01FE, &[0x02, 0x80, 0xC0]);
        let mut regs = CpuRegisters::native().at(0x05_9000);
        regs.sp = 0x01FD;

        assert_eq!(pulled_return_address(false, &regs, &bus), 0x05_8003);
        assert_eq!(pulled_return_address(true, &regs, &bus), 0xC0_8003);
    }

    #[test]
    fn test_unmatched_return_is_reported() {
        // RTS with $1234 on the stack and no recorded call
        let (mut regs, mut bus) = setup(&[0x60], 0x9000);
        regs.sp = 0x01FD;
        bus.write_u16(0x01FE, 0x1234);
        let insn = decode(regs.full_pc(), &regs, &bus);
        let mut shadow = ShadowStack::new();

        let edges = extract_references(&insn, &regs, &bus, &mut shadow);
        assert_eq!(edges.flow, None);
        assert_eq!(
            edges.nonstandard_return,
            Some(Reference::new(0x9000, 0x1235, ReferenceKind::NonStandardReturn))
        );
    }

    #[test]
    fn test_emulation_stack_wraps_inside_page_one() {
        // JSR $8010 with S=$0100 pushes $80 at $0100 and $02 at $01FF.
        let (mut regs, mut bus) = setup(&[0x20, 0x10, 0x80], 0x8000);
        regs.emulation_mode = true;
        regs.sp = 0x0100;
        let insn = decode(regs.full_pc(), &regs, &bus);
        let slot = call_tag_slot(&insn, &regs);
        assert_eq!(slot, 0x01FF);

        bus.write(0x0100, 0x80);
        bus.write(0x01FF, 0x02);
        regs.sp = 0x01FE;
        assert_eq!(return_slot(false, &regs), slot);
        assert_eq!(pulled_return_address(false, &regs, &bus), 0x8003);
    }

    #[test]
    fn test_long_call_ignores_emulation_page_wrap() {
        let (mut regs, bus) = setup(&[0x22, 0x00, 0x80, 0xC0], 0x8000);
        regs.emulation_mode = true;
        regs.sp = 0x0101;
        let insn = decode(regs.full_pc(), &regs, &bus);
        assert_eq!(call_tag_slot(&insn, &regs), 0x00FF);
    }
}
