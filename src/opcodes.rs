//! Static 65C816 opcode table: addressing mode, mnemonic and control-flow
//! capabilities for all 256 opcode values.

use bitflags::bitflags;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate8,
    /// `#const` sized by the M flag.
    ImmediateM,
    /// `#const` sized by the X flag.
    ImmediateX,
    Direct,
    DirectX,
    DirectY,
    DirectIndirect,
    DirectIndexedIndirect,
    DirectIndirectIndexed,
    DirectIndirectLong,
    DirectIndirectLongIndexed,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    AbsoluteIndexedIndirect,
    AbsoluteIndirectLong,
    Long,
    LongX,
    StackRelative,
    StackRelativeIndirectIndexed,
    /// `abs` resolved against the program bank (JMP/JSR).
    AbsoluteProgram,
    /// `(abs)` with the pointer read from the program bank.
    AbsoluteIndirect,
    Relative8,
    Relative16,
    BlockMove,
}

impl AddressingMode {
    pub const ALL: [AddressingMode; 27] = [
        AddressingMode::Implied,
        AddressingMode::Accumulator,
        AddressingMode::Immediate8,
        AddressingMode::ImmediateM,
        AddressingMode::ImmediateX,
        AddressingMode::Direct,
        AddressingMode::DirectX,
        AddressingMode::DirectY,
        AddressingMode::DirectIndirect,
        AddressingMode::DirectIndexedIndirect,
        AddressingMode::DirectIndirectIndexed,
        AddressingMode::DirectIndirectLong,
        AddressingMode::DirectIndirectLongIndexed,
        AddressingMode::Absolute,
        AddressingMode::AbsoluteX,
        AddressingMode::AbsoluteY,
        AddressingMode::AbsoluteIndexedIndirect,
        AddressingMode::AbsoluteIndirectLong,
        AddressingMode::Long,
        AddressingMode::LongX,
        AddressingMode::StackRelative,
        AddressingMode::StackRelativeIndirectIndexed,
        AddressingMode::AbsoluteProgram,
        AddressingMode::AbsoluteIndirect,
        AddressingMode::Relative8,
        AddressingMode::Relative16,
        AddressingMode::BlockMove,
    ];

    /// Stable category code used in persisted snapshots.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Operand length for every mode except the two register-width immediates.
    pub const fn fixed_len(self) -> Option<u8> {
        use AddressingMode::*;
        match self {
            Implied | Accumulator => Some(0),
            ImmediateM | ImmediateX => None,
            Immediate8 | Direct | DirectX | DirectY | DirectIndirect | DirectIndexedIndirect
            | DirectIndirectIndexed | DirectIndirectLong | DirectIndirectLongIndexed
            | StackRelative | StackRelativeIndirectIndexed | Relative8 => Some(1),
            Absolute | AbsoluteX | AbsoluteY | AbsoluteIndexedIndirect | AbsoluteIndirectLong
            | AbsoluteProgram | AbsoluteIndirect | Relative16 | BlockMove => Some(2),
            Long | LongX => Some(3),
        }
    }

    #[inline]
    pub fn operand_len(self, accumulator_8bit: bool, index_8bit: bool) -> u8 {
        match self {
            AddressingMode::ImmediateM => {
                if accumulator_8bit {
                    1
                } else {
                    2
                }
            }
            AddressingMode::ImmediateX => {
                if index_8bit {
                    1
                } else {
                    2
                }
            }
            mode => mode.fixed_len().unwrap_or(0),
        }
    }

    /// Operand in assembler syntax, without the mnemonic.
    pub fn format_operand(self, operand: u32, len: u8) -> String {
        use AddressingMode::*;
        let value = match len {
            1 => format!("${:02X}", operand & 0xFF),
            2 => format!("${:04X}", operand & 0xFFFF),
            3 => format!("${:06X}", operand & 0xFF_FFFF),
            _ => String::new(),
        };
        let mut out = String::new();
        let _ = match self {
            Implied => Ok(()),
            Accumulator => write!(out, "A"),
            Immediate8 | ImmediateM | ImmediateX => write!(out, "#{}", value),
            Direct | Absolute | AbsoluteProgram | Long | Relative8 | Relative16 => {
                write!(out, "{}", value)
            }
            DirectX | AbsoluteX | LongX => write!(out, "{},X", value),
            DirectY | AbsoluteY => write!(out, "{},Y", value),
            DirectIndirect | AbsoluteIndirect => write!(out, "({})", value),
            DirectIndexedIndirect | AbsoluteIndexedIndirect => write!(out, "({},X)", value),
            DirectIndirectIndexed => write!(out, "({}),Y", value),
            DirectIndirectLong | AbsoluteIndirectLong => write!(out, "[{}]", value),
            DirectIndirectLongIndexed => write!(out, "[{}],Y", value),
            StackRelative => write!(out, "{},S", value),
            StackRelativeIndirectIndexed => write!(out, "({},S),Y", value),
            // Encoded destination bank first, assembler order is source first.
            BlockMove => write!(out, "${:02X},${:02X}", (operand >> 8) & 0xFF, operand & 0xFF),
        };
        out
    }
}

bitflags! {
    /// Control-flow capabilities of an opcode, independent of its mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flow: u8 {
        /// Pushes a return address and transfers control (JSR/JSL).
        const CALL = 0x01;
        /// Pulls a return address pushed by a call (RTS/RTL).
        const RETURN = 0x02;
        /// Return address includes the bank byte.
        const LONG = 0x04;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub flow: Flow,
}

impl Opcode {
    #[inline]
    pub fn is_call(&self) -> bool {
        self.flow.contains(Flow::CALL)
    }

    #[inline]
    pub fn is_return(&self) -> bool {
        self.flow.contains(Flow::RETURN)
    }

    #[inline]
    pub fn is_long(&self) -> bool {
        self.flow.contains(Flow::LONG)
    }
}

#[inline]
pub fn lookup(opcode: u8) -> &'static Opcode {
    &OPCODES[opcode as usize]
}

pub static OPCODES: [Opcode; 256] = build_table();

const fn build_table() -> [Opcode; 256] {
    let mut table = [Opcode {
        mnemonic: "",
        mode: AddressingMode::Implied,
        flow: Flow::empty(),
    }; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = Opcode {
            mnemonic: MNEMONICS[i],
            mode: MODES[i],
            flow: flow_of(i as u8),
        };
        i += 1;
    }
    table
}

const fn flow_of(opcode: u8) -> Flow {
    match opcode {
        0x20 | 0xFC => Flow::CALL,
        0x22 => Flow::CALL.union(Flow::LONG),
        0x60 => Flow::RETURN,
        0x6B => Flow::RETURN.union(Flow::LONG),
        _ => Flow::empty(),
    }
}

#[rustfmt::skip]
const MNEMONICS: [&str; 256] = [
    "BRK", "ORA", "COP", "ORA", "TSB", "ORA", "ASL", "ORA", "PHP", "ORA", "ASL", "PHD", "TSB", "ORA", "ASL", "ORA", // $00
    "BPL", "ORA", "ORA", "ORA", "TRB", "ORA", "ASL", "ORA", "CLC", "ORA", "INC", "TCS", "TRB", "ORA", "ASL", "ORA", // $10
    "JSR", "AND", "JSL", "AND", "BIT", "AND", "ROL", "AND", "PLP", "AND", "ROL", "PLD", "BIT", "AND", "ROL", "AND", // $20
    "BMI", "AND", "AND", "AND", "BIT", "AND", "ROL", "AND", "SEC", "AND", "DEC", "TSC", "BIT", "AND", "ROL", "AND", // $30
    "RTI", "EOR", "WDM", "EOR", "MVP", "EOR", "LSR", "EOR", "PHA", "EOR", "LSR", "PHK", "JMP", "EOR", "LSR", "EOR", // $40
    "BVC", "EOR", "EOR", "EOR", "MVN", "EOR", "LSR", "EOR", "CLI", "EOR", "PHY", "TCD", "JML", "EOR", "LSR", "EOR", // $50
    "RTS", "ADC", "PER", "ADC", "STZ", "ADC", "ROR", "ADC", "PLA", "ADC", "ROR", "RTL", "JMP", "ADC", "ROR", "ADC", // $60
    "BVS", "ADC", "ADC", "ADC", "STZ", "ADC", "ROR", "ADC", "SEI", "ADC", "PLY", "TDC", "JMP", "ADC", "ROR", "ADC", // $70
    "BRA", "STA", "BRL", "STA", "STY", "STA", "STX", "STA", "DEY", "BIT", "TXA", "PHB", "STY", "STA", "STX", "STA", // $80
    "BCC", "STA", "STA", "STA", "STY", "STA", "STX", "STA", "TYA", "STA", "TXS", "TXY", "STZ", "STA", "STZ", "STA", // $90
    "LDY", "LDA", "LDX", "LDA", "LDY", "LDA", "LDX", "LDA", "TAY", "LDA", "TAX", "PLB", "LDY", "LDA", "LDX", "LDA", // $A0
    "BCS", "LDA", "LDA", "LDA", "LDY", "LDA", "LDX", "LDA", "CLV", "LDA", "TSX", "TYX", "LDY", "LDA", "LDX", "LDA", // $B0
    "CPY", "CMP", "REP", "CMP", "CPY", "CMP", "DEC", "CMP", "INY", "CMP", "DEX", "WAI", "CPY", "CMP", "DEC", "CMP", // $C0
    "BNE", "CMP", "CMP", "CMP", "PEI", "CMP", "DEC", "CMP", "CLD", "CMP", "PHX", "STP", "JML", "CMP", "DEC", "CMP", // $D0
    "CPX", "SBC", "SEP", "SBC", "CPX", "SBC", "INC", "SBC", "INX", "SBC", "NOP", "XBA", "CPX", "SBC", "INC", "SBC", // $E0
    "BEQ", "SBC", "SBC", "SBC", "PEA", "SBC", "INC", "SBC", "SED", "SBC", "PLX", "XCE", "JSR", "SBC", "INC", "SBC", // $F0
];

const IMP: AddressingMode = AddressingMode::Implied;
const ACC: AddressingMode = AddressingMode::Accumulator;
const IM8: AddressingMode = AddressingMode::Immediate8;
const IMM: AddressingMode = AddressingMode::ImmediateM;
const IMX: AddressingMode = AddressingMode::ImmediateX;
const DP_: AddressingMode = AddressingMode::Direct;
const DPX: AddressingMode = AddressingMode::DirectX;
const DPY: AddressingMode = AddressingMode::DirectY;
const IDP: AddressingMode = AddressingMode::DirectIndirect;
const IDX: AddressingMode = AddressingMode::DirectIndexedIndirect;
const IDY: AddressingMode = AddressingMode::DirectIndirectIndexed;
const ILD: AddressingMode = AddressingMode::DirectIndirectLong;
const ILY: AddressingMode = AddressingMode::DirectIndirectLongIndexed;
const ABS: AddressingMode = AddressingMode::Absolute;
const ABX: AddressingMode = AddressingMode::AbsoluteX;
const ABY: AddressingMode = AddressingMode::AbsoluteY;
const IAX: AddressingMode = AddressingMode::AbsoluteIndexedIndirect;
const ILA: AddressingMode = AddressingMode::AbsoluteIndirectLong;
const LNG: AddressingMode = AddressingMode::Long;
const LNX: AddressingMode = AddressingMode::LongX;
const SR_: AddressingMode = AddressingMode::StackRelative;
const ISY: AddressingMode = AddressingMode::StackRelativeIndirectIndexed;
const ABP: AddressingMode = AddressingMode::AbsoluteProgram;
const IAB: AddressingMode = AddressingMode::AbsoluteIndirect;
const RL8: AddressingMode = AddressingMode::Relative8;
const R16: AddressingMode = AddressingMode::Relative16;
const MOV: AddressingMode = AddressingMode::BlockMove;

#[rustfmt::skip]
const MODES: [AddressingMode; 256] = [
    IM8, IDX, IM8, SR_, DP_, DP_, DP_, ILD, IMP, IMM, ACC, IMP, ABS, ABS, ABS, LNG, // $00
    RL8, IDY, IDP, ISY, DP_, DPX, DPX, ILY, IMP, ABY, ACC, IMP, ABS, ABX, ABX, LNX, // $10
    ABP, IDX, LNG, SR_, DP_, DP_, DP_, ILD, IMP, IMM, ACC, IMP, ABS, ABS, ABS, LNG, // $20
    RL8, IDY, IDP, ISY, DPX, DPX, DPX, ILY, IMP, ABY, ACC, IMP, ABX, ABX, ABX, LNX, // $30
    IMP, IDX, IM8, SR_, MOV, DP_, DP_, ILD, IMP, IMM, ACC, IMP, ABP, ABS, ABS, LNG, // $40
    RL8, IDY, IDP, ISY, MOV, DPX, DPX, ILY, IMP, ABY, IMP, IMP, LNG, ABX, ABX, LNX, // $50
    IMP, IDX, R16, SR_, DP_, DP_, DP_, ILD, IMP, IMM, ACC, IMP, IAB, ABS, ABS, LNG, // $60
    RL8, IDY, IDP, ISY, DPX, DPX, DPX, ILY, IMP, ABY, IMP, IMP, IAX, ABX, ABX, LNX, // $70
    RL8, IDX, R16, SR_, DP_, DP_, DP_, ILD, IMP, IMM, IMP, IMP, ABS, ABS, ABS, LNG, // $80
    RL8, IDY, IDP, ISY, DPX, DPX, DPY, ILY, IMP, ABY, IMP, IMP, ABS, ABX, ABX, LNX, // $90
    IMX, IDX, IMX, SR_, DP_, DP_, DP_, ILD, IMP, IMM, IMP, IMP, ABS, ABS, ABS, LNG, // $A0
    RL8, IDY, IDP, ISY, DPX, DPX, DPY, ILY, IMP, ABY, IMP, IMP, ABX, ABX, ABY, LNX, // $B0
    IMX, IDX, IM8, SR_, DP_, DP_, DP_, ILD, IMP, IMM, IMP, IMP, ABS, ABS, ABS, LNG, // $C0
    RL8, IDY, IDP, ISY, IDP, DPX, DPX, ILY, IMP, ABY, IMP, IMP, ILA, ABX, ABX, LNX, // $D0
    IMX, IDX, IM8, SR_, DP_, DP_, DP_, ILD, IMP, IMM, IMP, IMP, ABS, ABS, ABS, LNG, // $E0
    RL8, IDY, IDP, ISY, ABS, DPX, DPX, ILY, IMP, ABY, IMP, IMP, IAX, ABX, ABX, LNX, // $F0
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_has_mode_and_mnemonic() {
        for op in 0..=255u8 {
            let info = lookup(op);
            assert_eq!(info.mnemonic.len(), 3, "opcode ${:02X}", op);
            assert_eq!(AddressingMode::from_code(info.mode.code()), Some(info.mode));
        }
    }

    #[test]
    fn test_mode_codes_are_dense() {
        for (i, mode) in AddressingMode::ALL.iter().enumerate() {
            assert_eq!(mode.code() as usize, i);
        }
        assert_eq!(AddressingMode::from_code(27), None);
    }

    #[test]
    fn test_variable_width_immediates() {
        assert_eq!(AddressingMode::ImmediateM.operand_len(true, false), 1);
        assert_eq!(AddressingMode::ImmediateM.operand_len(false, true), 2);
        assert_eq!(AddressingMode::ImmediateX.operand_len(false, true), 1);
        assert_eq!(AddressingMode::ImmediateX.operand_len(true, false), 2);
        for mode in AddressingMode::ALL {
            if let Some(len) = mode.fixed_len() {
                assert_eq!(mode.operand_len(true, true), len);
                assert_eq!(mode.operand_len(false, false), len);
            }
        }
    }

    #[test]
    fn test_known_encodings() {
        assert_eq!(lookup(0xA9).mode, AddressingMode::ImmediateM); // LDA #
        assert_eq!(lookup(0xA2).mode, AddressingMode::ImmediateX); // LDX #
        assert_eq!(lookup(0xC2).mode, AddressingMode::Immediate8); // REP #
        assert_eq!(lookup(0x20).mode, AddressingMode::AbsoluteProgram); // JSR abs
        assert_eq!(lookup(0x22).mode, AddressingMode::Long); // JSL
        assert_eq!(lookup(0x6C).mode, AddressingMode::AbsoluteIndirect); // JMP (abs)
        assert_eq!(lookup(0x7C).mode, AddressingMode::AbsoluteIndexedIndirect); // JMP (abs,X)
        assert_eq!(lookup(0xDC).mode, AddressingMode::AbsoluteIndirectLong); // JML [abs]
        assert_eq!(lookup(0x54).mode, AddressingMode::BlockMove); // MVN
        assert_eq!(lookup(0x82).mode, AddressingMode::Relative16); // BRL
    }

    #[test]
    fn test_call_and_return_capabilities() {
        let calls: Vec<u8> = (0..=255u8).filter(|&op| lookup(op).is_call()).collect();
        let returns: Vec<u8> = (0..=255u8).filter(|&op| lookup(op).is_return()).collect();
        assert_eq!(calls, vec![0x20, 0x22, 0xFC]);
        assert_eq!(returns, vec![0x60, 0x6B]);
        assert!(lookup(0x22).is_long());
        assert!(lookup(0x6B).is_long());
        assert!(!lookup(0x60).is_long());
        // RTI is not tracked as a subroutine return
        assert!(!lookup(0x40).is_return());
    }

    #[test]
    fn test_operand_formatting() {
        assert_eq!(AddressingMode::ImmediateM.format_operand(0x1234, 2), "#$1234");
        assert_eq!(AddressingMode::DirectIndirectIndexed.format_operand(0x10, 1), "($10),Y");
        assert_eq!(AddressingMode::LongX.format_operand(0x7E2000, 3), "$7E2000,X");
        assert_eq!(AddressingMode::BlockMove.format_operand(0x7E7F, 2), "$7E,$7F");
        assert_eq!(AddressingMode::Implied.format_operand(0, 0), "");
    }
}
