//! Shared harness for the integration tests: a tiny assembler and hart setup.

#![allow(dead_code)]

use rv64_hart::{Hart, SparseMemory};

/// Programs are loaded here.
pub const BASE: u64 = 0x8000_0000;
/// Scratch data, far away from any program.
pub const DATA: u64 = 0x8001_0000;
/// Trap handlers are placed here.
pub const HANDLER: u64 = 0x8000_1000;

pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

/// Hart in machine mode with `program` loaded and the PC at [`BASE`].
pub fn hart_with(program: &[u32]) -> Hart<SparseMemory> {
    init_logger();
    let mut memory = SparseMemory::new();
    memory.store_words(BASE, program);
    let mut hart = Hart::new(memory);
    hart.set_pc(BASE);
    hart
}

pub mod asm {
    const LOAD: u32 = 0b000_0011;
    const MISC_MEM: u32 = 0b000_1111;
    const OP_IMM: u32 = 0b001_0011;
    const AUIPC: u32 = 0b001_0111;
    const OP_IMM_32: u32 = 0b001_1011;
    const STORE: u32 = 0b010_0011;
    const OP: u32 = 0b011_0011;
    const LUI: u32 = 0b011_0111;
    const OP_32: u32 = 0b011_1011;
    const BRANCH: u32 = 0b110_0011;
    const JALR: u32 = 0b110_0111;
    const JAL: u32 = 0b110_1111;
    const SYSTEM: u32 = 0b111_0011;

    pub fn r_type(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    pub fn i_type(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (((imm as u32) & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    pub fn s_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        (((imm >> 5) & 0x7f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm & 0x1f) << 7)
            | STORE
    }

    pub fn b_type(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32;
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | (((imm >> 1) & 0xf) << 8)
            | (((imm >> 11) & 1) << 7)
            | BRANCH
    }

    pub fn u_type(imm20: u32, rd: u32, opcode: u32) -> u32 {
        ((imm20 & 0xf_ffff) << 12) | (rd << 7) | opcode
    }

    pub fn j_type(imm: i32, rd: u32) -> u32 {
        let imm = imm as u32;
        (((imm >> 20) & 1) << 31)
            | (((imm >> 1) & 0x3ff) << 21)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 12) & 0xff) << 12)
            | (rd << 7)
            | JAL
    }

    pub fn lui(rd: u32, imm20: u32) -> u32 {
        u_type(imm20, rd, LUI)
    }
    pub fn auipc(rd: u32, imm20: u32) -> u32 {
        u_type(imm20, rd, AUIPC)
    }
    pub fn jal(rd: u32, offset: i32) -> u32 {
        j_type(offset, rd)
    }
    pub fn jalr(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b000, rd, JALR)
    }

    pub fn beq(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b_type(offset, rs2, rs1, 0b000)
    }
    pub fn bne(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b_type(offset, rs2, rs1, 0b001)
    }
    pub fn blt(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b_type(offset, rs2, rs1, 0b100)
    }
    pub fn bge(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b_type(offset, rs2, rs1, 0b101)
    }
    pub fn bltu(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b_type(offset, rs2, rs1, 0b110)
    }
    pub fn bgeu(rs1: u32, rs2: u32, offset: i32) -> u32 {
        b_type(offset, rs2, rs1, 0b111)
    }

    pub fn lb(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b000, rd, LOAD)
    }
    pub fn lh(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b001, rd, LOAD)
    }
    pub fn lw(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b010, rd, LOAD)
    }
    pub fn ld(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b011, rd, LOAD)
    }
    pub fn lbu(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b100, rd, LOAD)
    }
    pub fn lhu(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b101, rd, LOAD)
    }
    pub fn lwu(rd: u32, rs1: u32, offset: i32) -> u32 {
        i_type(offset, rs1, 0b110, rd, LOAD)
    }

    pub fn sb(rs2: u32, rs1: u32, offset: i32) -> u32 {
        s_type(offset, rs2, rs1, 0b000)
    }
    pub fn sh(rs2: u32, rs1: u32, offset: i32) -> u32 {
        s_type(offset, rs2, rs1, 0b001)
    }
    pub fn sw(rs2: u32, rs1: u32, offset: i32) -> u32 {
        s_type(offset, rs2, rs1, 0b010)
    }
    pub fn sd(rs2: u32, rs1: u32, offset: i32) -> u32 {
        s_type(offset, rs2, rs1, 0b011)
    }

    pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, OP_IMM)
    }
    pub fn slti(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b010, rd, OP_IMM)
    }
    pub fn sltiu(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b011, rd, OP_IMM)
    }
    pub fn xori(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b100, rd, OP_IMM)
    }
    pub fn ori(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b110, rd, OP_IMM)
    }
    pub fn andi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b111, rd, OP_IMM)
    }
    pub fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i_type(shamt as i32, rs1, 0b001, rd, OP_IMM)
    }
    pub fn srli(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i_type(shamt as i32, rs1, 0b101, rd, OP_IMM)
    }
    pub fn srai(rd: u32, rs1: u32, shamt: u32) -> u32 {
        i_type((0x400 | shamt) as i32, rs1, 0b101, rd, OP_IMM)
    }

    pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b000, rd, OP)
    }
    pub fn sub(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b010_0000, rs2, rs1, 0b000, rd, OP)
    }
    pub fn sll(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b001, rd, OP)
    }
    pub fn slt(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b010, rd, OP)
    }
    pub fn sltu(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b011, rd, OP)
    }
    pub fn xor(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b100, rd, OP)
    }
    pub fn srl(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b101, rd, OP)
    }
    pub fn sra(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b010_0000, rs2, rs1, 0b101, rd, OP)
    }
    pub fn or(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b110, rd, OP)
    }
    pub fn and(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b111, rd, OP)
    }

    pub fn addiw(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0b000, rd, OP_IMM_32)
    }
    pub fn slliw(rd: u32, rs1: u32, shamt: u32) -> u32 {
        r_type(0, shamt, rs1, 0b001, rd, OP_IMM_32)
    }
    pub fn srliw(rd: u32, rs1: u32, shamt: u32) -> u32 {
        r_type(0, shamt, rs1, 0b101, rd, OP_IMM_32)
    }
    pub fn sraiw(rd: u32, rs1: u32, shamt: u32) -> u32 {
        r_type(0b010_0000, shamt, rs1, 0b101, rd, OP_IMM_32)
    }
    pub fn addw(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b000, rd, OP_32)
    }
    pub fn subw(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b010_0000, rs2, rs1, 0b000, rd, OP_32)
    }
    pub fn sllw(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b001, rd, OP_32)
    }
    pub fn srlw(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0, rs2, rs1, 0b101, rd, OP_32)
    }
    pub fn sraw(rd: u32, rs1: u32, rs2: u32) -> u32 {
        r_type(0b010_0000, rs2, rs1, 0b101, rd, OP_32)
    }

    pub fn fence() -> u32 {
        i_type(0x0ff, 0, 0b000, 0, MISC_MEM)
    }
    pub fn ecall() -> u32 {
        i_type(0x000, 0, 0b000, 0, SYSTEM)
    }
    pub fn ebreak() -> u32 {
        i_type(0x001, 0, 0b000, 0, SYSTEM)
    }
    pub fn mret() -> u32 {
        i_type(0x302, 0, 0b000, 0, SYSTEM)
    }

    pub fn csrrw(rd: u32, csr: u16, rs1: u32) -> u32 {
        i_type(csr as i32, rs1, 0b001, rd, SYSTEM)
    }
    pub fn csrrs(rd: u32, csr: u16, rs1: u32) -> u32 {
        i_type(csr as i32, rs1, 0b010, rd, SYSTEM)
    }
    pub fn csrrc(rd: u32, csr: u16, rs1: u32) -> u32 {
        i_type(csr as i32, rs1, 0b011, rd, SYSTEM)
    }
    pub fn csrrwi(rd: u32, csr: u16, imm: u32) -> u32 {
        i_type(csr as i32, imm, 0b101, rd, SYSTEM)
    }
    pub fn csrrsi(rd: u32, csr: u16, imm: u32) -> u32 {
        i_type(csr as i32, imm, 0b110, rd, SYSTEM)
    }
    pub fn csrrci(rd: u32, csr: u16, imm: u32) -> u32 {
        i_type(csr as i32, imm, 0b111, rd, SYSTEM)
    }
}
