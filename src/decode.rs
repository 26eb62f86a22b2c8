//! Instruction decoding for RV64I and Zicsr.
//!
//! Decoding is a pure function from the raw 32 bit word to [`Instruction`]. Field extraction
//! works directly on the word; bit positions follow the ISA manual (bit 0 is the LSB).

use thiserror::Error;

use crate::Ixlen;

/// Unsigned value of the `len` bits of `instr` starting at bit `lo`.
pub fn extract_unsigned(instr: u32, lo: u32, len: u32) -> u64 {
    debug_assert!(len >= 1 && lo + len <= 32);
    (instr as u64 >> lo) & ((1u64 << len) - 1)
}

/// Two's complement value of the `len` bits of `instr` starting at bit `lo`. The top bit of the
/// range is the sign bit, the rest of the word is ignored.
pub fn extract_signed(instr: u32, lo: u32, len: u32) -> Ixlen {
    sign_extend(extract_unsigned(instr, lo, len), len)
}

/// Sign extends the low `bits` bits of `value`.
pub fn sign_extend(value: u64, bits: u32) -> Ixlen {
    let shift = 64 - bits;
    ((value << shift) as Ixlen) >> shift
}

pub(crate) struct RType {
    pub funct3: u8,
    pub funct7: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub rd: u8,
}

impl From<u32> for RType {
    fn from(instr: u32) -> RType {
        RType {
            funct3: funct3(instr),
            funct7: extract_unsigned(instr, 25, 7) as u8,
            rs1: rs1(instr),
            rs2: rs2(instr),
            rd: rd(instr),
        }
    }
}

pub(crate) struct IType {
    pub funct3: u8,
    pub rs1: u8,
    pub rd: u8,
    pub imm: Ixlen,
}

impl From<u32> for IType {
    fn from(instr: u32) -> IType {
        IType {
            funct3: funct3(instr),
            rs1: rs1(instr),
            rd: rd(instr),
            imm: extract_signed(instr, 20, 12),
        }
    }
}

pub(crate) struct SType {
    pub funct3: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: Ixlen,
}

impl From<u32> for SType {
    fn from(instr: u32) -> SType {
        // imm[11:5] lives in funct7's place, imm[4:0] in rd's.
        let imm = (extract_unsigned(instr, 25, 7) << 5) | extract_unsigned(instr, 7, 5);
        SType {
            funct3: funct3(instr),
            rs1: rs1(instr),
            rs2: rs2(instr),
            imm: sign_extend(imm, 12),
        }
    }
}

pub(crate) struct UType {
    pub rd: u8,
    pub imm: Ixlen,
}

impl From<u32> for UType {
    fn from(instr: u32) -> UType {
        UType {
            rd: rd(instr),
            // Upper 20 bits in place, sign extended to 64 bits.
            imm: (instr & 0xff_ff_f0_00) as i32 as Ixlen,
        }
    }
}

pub(crate) struct JType {
    pub rd: u8,
    pub imm: Ixlen,
}

impl From<u32> for JType {
    fn from(instr: u32) -> JType {
        // Unlike `UType` the bits are somewhat mangled. They encode bit 20 to bit 1 of the
        // offset, with bit 0 being 0.
        let offset = (extract_unsigned(instr, 21, 10) << 1)
            | (extract_unsigned(instr, 20, 1) << 11)
            | (extract_unsigned(instr, 12, 8) << 12)
            | (extract_unsigned(instr, 31, 1) << 20);
        JType {
            rd: rd(instr),
            imm: sign_extend(offset, 21),
        }
    }
}

pub(crate) struct BType {
    pub funct3: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: Ixlen,
}

impl From<u32> for BType {
    fn from(instr: u32) -> BType {
        // Demangle bits. Bit 31 is the sign, bit 0 of the offset is always 0.
        let offset = (extract_unsigned(instr, 8, 4) << 1)
            | (extract_unsigned(instr, 25, 6) << 5)
            | (extract_unsigned(instr, 7, 1) << 11)
            | (extract_unsigned(instr, 31, 1) << 12);
        BType {
            funct3: funct3(instr),
            rs1: rs1(instr),
            rs2: rs2(instr),
            imm: sign_extend(offset, 13),
        }
    }
}

// From Chapter 24
pub mod opcode {
    pub const LOAD: u8 = 0b00_000_11;
    pub const MISC_MEM: u8 = 0b00_011_11;
    pub const OP_IMM: u8 = 0b00_100_11;
    pub const AUIPC: u8 = 0b00_101_11;
    pub const OP_IMM_32: u8 = 0b00_110_11;

    pub const STORE: u8 = 0b01_000_11;
    pub const OP: u8 = 0b01_100_11;
    pub const LUI: u8 = 0b01_101_11;
    pub const OP_32: u8 = 0b01_110_11;

    pub const BRANCH: u8 = 0b11_000_11;
    pub const JALR: u8 = 0b11_001_11;
    pub const JAL: u8 = 0b11_011_11;
    pub const SYSTEM: u8 = 0b11_100_11;
}

pub fn get_opcode(instr: u32) -> u8 {
    (instr & 0b111_1111) as u8
}

fn funct3(instr: u32) -> u8 {
    extract_unsigned(instr, 12, 3) as u8
}

fn rd(instr: u32) -> u8 {
    extract_unsigned(instr, 7, 5) as u8
}

fn rs1(instr: u32) -> u8 {
    extract_unsigned(instr, 15, 5) as u8
}

fn rs2(instr: u32) -> u8 {
    extract_unsigned(instr, 20, 5) as u8
}

/// Register specifier, always `< 32`.
pub type Specifier = u8;

/// A fully decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Lui {
        dest: Specifier,
        immediate: Ixlen,
    },
    Auipc {
        dest: Specifier,
        immediate: Ixlen,
    },
    Jal {
        dest: Specifier,
        offset: Ixlen,
    },
    Jalr {
        dest: Specifier,
        base: Specifier,
        offset: Ixlen,
    },
    Branch {
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: Ixlen,
    },
    Load {
        width: LoadWidth,
        dest: Specifier,
        base: Specifier,
        offset: Ixlen,
    },
    Store {
        width: StoreWidth,
        src: Specifier,
        base: Specifier,
        offset: Ixlen,
    },
    OpImm {
        op: RegImmOp,
        dest: Specifier,
        src: Specifier,
        immediate: Ixlen,
    },
    OpShiftImm {
        op: ShiftOp,
        dest: Specifier,
        src: Specifier,
        shift_amount: u32,
    },
    Op {
        op: RegRegOp,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    /// `ADDIW`, the only non-shift OP-IMM-32 instruction.
    Addiw {
        dest: Specifier,
        src: Specifier,
        immediate: Ixlen,
    },
    OpShiftImm32 {
        op: ShiftOp,
        dest: Specifier,
        src: Specifier,
        shift_amount: u32,
    },
    Op32 {
        op: RegRegOp32,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
    },
    Fence,
    Csr {
        op: CsrOp,
        dest: Specifier,
        csr: u16,
        source: CsrSource,
    },
    Ecall,
    Ebreak,
    Mret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegImmOp {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRegOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRegOp32 {
    Addw,
    Subw,
    Sllw,
    Srlw,
    Sraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCondition {
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadWidth {
    Lb,
    Lh,
    Lw,
    Ld,
    Lbu,
    Lhu,
    Lwu,
}

impl LoadWidth {
    /// Access size in bytes, which is also the required alignment.
    pub fn size(self) -> u64 {
        match self {
            LoadWidth::Lb | LoadWidth::Lbu => 1,
            LoadWidth::Lh | LoadWidth::Lhu => 2,
            LoadWidth::Lw | LoadWidth::Lwu => 4,
            LoadWidth::Ld => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, LoadWidth::Lb | LoadWidth::Lh | LoadWidth::Lw | LoadWidth::Ld)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWidth {
    Sb,
    Sh,
    Sw,
    Sd,
}

impl StoreWidth {
    /// Access size in bytes, which is also the required alignment.
    pub fn size(self) -> u64 {
        match self {
            StoreWidth::Sb => 1,
            StoreWidth::Sh => 2,
            StoreWidth::Sw => 4,
            StoreWidth::Sd => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrOp {
    ReadWrite,
    ReadSet,
    ReadClear,
}

/// Operand of a Zicsr instruction. The immediate forms reuse the `rs1` field as a zero
/// extended 5 bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrSource {
    Register(Specifier),
    Immediate(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported opcode in instruction {0:#010x}")]
    UnsupportedOpcode(u32),
    #[error("unsupported function code in instruction {0:#010x}")]
    UnsupportedFunction(u32),
}

impl DecodeError {
    /// The raw word that failed to decode.
    pub fn instruction(&self) -> u32 {
        match *self {
            DecodeError::UnsupportedOpcode(instr) | DecodeError::UnsupportedFunction(instr) => {
                instr
            }
        }
    }
}

impl Instruction {
    pub fn decode(instr: u32) -> Result<Self, DecodeError> {
        let unsupported = DecodeError::UnsupportedFunction(instr);

        let decoded = match get_opcode(instr) {
            opcode::LUI => {
                let u: UType = instr.into();
                Instruction::Lui {
                    dest: u.rd,
                    immediate: u.imm,
                }
            }
            opcode::AUIPC => {
                let u: UType = instr.into();
                Instruction::Auipc {
                    dest: u.rd,
                    immediate: u.imm,
                }
            }
            opcode::JAL => {
                let j: JType = instr.into();
                Instruction::Jal {
                    dest: j.rd,
                    offset: j.imm,
                }
            }
            opcode::JALR => {
                let i: IType = instr.into();
                if i.funct3 != 0b000 {
                    return Err(unsupported);
                }
                Instruction::Jalr {
                    dest: i.rd,
                    base: i.rs1,
                    offset: i.imm,
                }
            }
            opcode::BRANCH => {
                let b: BType = instr.into();
                let condition = match b.funct3 {
                    0b000 => BranchCondition::Beq,
                    0b001 => BranchCondition::Bne,
                    0b100 => BranchCondition::Blt,
                    0b101 => BranchCondition::Bge,
                    0b110 => BranchCondition::Bltu,
                    0b111 => BranchCondition::Bgeu,
                    _ => return Err(unsupported),
                };
                Instruction::Branch {
                    condition,
                    src1: b.rs1,
                    src2: b.rs2,
                    offset: b.imm,
                }
            }
            opcode::LOAD => {
                let i: IType = instr.into();
                let width = match i.funct3 {
                    0b000 => LoadWidth::Lb,
                    0b001 => LoadWidth::Lh,
                    0b010 => LoadWidth::Lw,
                    0b011 => LoadWidth::Ld,
                    0b100 => LoadWidth::Lbu,
                    0b101 => LoadWidth::Lhu,
                    0b110 => LoadWidth::Lwu,
                    _ => return Err(unsupported),
                };
                Instruction::Load {
                    width,
                    dest: i.rd,
                    base: i.rs1,
                    offset: i.imm,
                }
            }
            opcode::STORE => {
                let s: SType = instr.into();
                let width = match s.funct3 {
                    0b000 => StoreWidth::Sb,
                    0b001 => StoreWidth::Sh,
                    0b010 => StoreWidth::Sw,
                    0b011 => StoreWidth::Sd,
                    _ => return Err(unsupported),
                };
                Instruction::Store {
                    width,
                    src: s.rs2,
                    base: s.rs1,
                    offset: s.imm,
                }
            }
            opcode::OP_IMM => {
                let i: IType = instr.into();
                let op = match i.funct3 {
                    0b000 => RegImmOp::Addi,
                    0b010 => RegImmOp::Slti,
                    0b011 => RegImmOp::Sltiu,
                    0b100 => RegImmOp::Xori,
                    0b110 => RegImmOp::Ori,
                    0b111 => RegImmOp::Andi,
                    // RV64 shifts: 6 bit shamt, funct6 in bits 31:26
                    funct3 => {
                        let op = match (funct3, extract_unsigned(instr, 26, 6)) {
                            (0b001, 0b000000) => ShiftOp::Sll,
                            (0b101, 0b000000) => ShiftOp::Srl,
                            (0b101, 0b010000) => ShiftOp::Sra,
                            _ => return Err(unsupported),
                        };
                        return Ok(Instruction::OpShiftImm {
                            op,
                            dest: i.rd,
                            src: i.rs1,
                            shift_amount: extract_unsigned(instr, 20, 6) as u32,
                        });
                    }
                };
                Instruction::OpImm {
                    op,
                    dest: i.rd,
                    src: i.rs1,
                    immediate: i.imm,
                }
            }
            opcode::OP_IMM_32 => {
                let r: RType = instr.into();
                let op = match (r.funct3, r.funct7) {
                    (0b000, _) => {
                        let i: IType = instr.into();
                        return Ok(Instruction::Addiw {
                            dest: i.rd,
                            src: i.rs1,
                            immediate: i.imm,
                        });
                    }
                    (0b001, 0b000_0000) => ShiftOp::Sll,
                    (0b101, 0b000_0000) => ShiftOp::Srl,
                    (0b101, 0b010_0000) => ShiftOp::Sra,
                    _ => return Err(unsupported),
                };
                Instruction::OpShiftImm32 {
                    op,
                    dest: r.rd,
                    src: r.rs1,
                    // shamt occupies the rs2 field
                    shift_amount: r.rs2 as u32,
                }
            }
            opcode::OP => {
                let r: RType = instr.into();
                let op = match (r.funct3, r.funct7) {
                    (0b000, 0b000_0000) => RegRegOp::Add,
                    (0b000, 0b010_0000) => RegRegOp::Sub,
                    (0b001, 0b000_0000) => RegRegOp::Sll,
                    (0b010, 0b000_0000) => RegRegOp::Slt,
                    (0b011, 0b000_0000) => RegRegOp::Sltu,
                    (0b100, 0b000_0000) => RegRegOp::Xor,
                    (0b101, 0b000_0000) => RegRegOp::Srl,
                    (0b101, 0b010_0000) => RegRegOp::Sra,
                    (0b110, 0b000_0000) => RegRegOp::Or,
                    (0b111, 0b000_0000) => RegRegOp::And,
                    _ => return Err(unsupported),
                };
                Instruction::Op {
                    op,
                    dest: r.rd,
                    src1: r.rs1,
                    src2: r.rs2,
                }
            }
            opcode::OP_32 => {
                let r: RType = instr.into();
                let op = match (r.funct3, r.funct7) {
                    (0b000, 0b000_0000) => RegRegOp32::Addw,
                    (0b000, 0b010_0000) => RegRegOp32::Subw,
                    (0b001, 0b000_0000) => RegRegOp32::Sllw,
                    (0b101, 0b000_0000) => RegRegOp32::Srlw,
                    (0b101, 0b010_0000) => RegRegOp32::Sraw,
                    _ => return Err(unsupported),
                };
                Instruction::Op32 {
                    op,
                    dest: r.rd,
                    src1: r.rs1,
                    src2: r.rs2,
                }
            }
            // FENCE and FENCE.I, both no-ops on a single in-order hart.
            opcode::MISC_MEM => Instruction::Fence,
            opcode::SYSTEM => {
                let i: IType = instr.into();
                let csr = extract_unsigned(instr, 20, 12) as u16;
                let (op, source) = match i.funct3 {
                    0b000 => {
                        return match csr {
                            0x000 => Ok(Instruction::Ecall),
                            0x001 => Ok(Instruction::Ebreak),
                            0x302 => Ok(Instruction::Mret),
                            _ => Err(unsupported),
                        };
                    }
                    0b001 => (CsrOp::ReadWrite, CsrSource::Register(i.rs1)),
                    0b010 => (CsrOp::ReadSet, CsrSource::Register(i.rs1)),
                    0b011 => (CsrOp::ReadClear, CsrSource::Register(i.rs1)),
                    0b101 => (CsrOp::ReadWrite, CsrSource::Immediate(i.rs1)),
                    0b110 => (CsrOp::ReadSet, CsrSource::Immediate(i.rs1)),
                    0b111 => (CsrOp::ReadClear, CsrSource::Immediate(i.rs1)),
                    _ => return Err(unsupported),
                };
                Instruction::Csr {
                    op,
                    dest: i.rd,
                    csr,
                    source,
                }
            }
            _ => {
                if ((instr & 0b11) != 0b11) || ((instr & 0b11100) == 0b11100) {
                    log::debug!("Non 32 bit instruction encoding not supported: {instr:#010x}");
                }
                return Err(DecodeError::UnsupportedOpcode(instr));
            }
        };

        Ok(decoded)
    }
}
