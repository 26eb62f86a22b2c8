use crate::csr::{self, Csr, CsrFile, CsrKind};
use crate::decode::{
    sign_extend, BranchCondition, CsrOp, CsrSource, Instruction, LoadWidth, RegImmOp, RegRegOp,
    RegRegOp32, ShiftOp, Specifier, StoreWidth,
};
use crate::platform::exception::Exception;
use crate::platform::AddressSpace;
use crate::{HartError, Ixlen, PrivilegeLevel, Uxlen};

/// Values fixed when the hart is created.
#[derive(Debug, Clone)]
pub struct HartConfig {
    pub mvendorid: Uxlen,
    pub marchid: Uxlen,
    pub mimpid: Uxlen,
    pub mhartid: Uxlen,
    /// RV64 with the I base and user mode.
    pub misa: Uxlen,
    pub reset_pc: Uxlen,
}

impl Default for HartConfig {
    fn default() -> Self {
        HartConfig {
            mvendorid: 0,
            marchid: 0,
            mimpid: 0x2024_0200_0000_0000,
            mhartid: 0,
            misa: 0x8000_0000_0010_0100,
            reset_pc: 0,
        }
    }
}

/// Why [`Hart::execute_steps`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All requested steps were executed.
    StepLimitReached,
    /// The PC reached the breakpoint. The instruction there was not executed.
    BreakpointHit,
}

/// How the PC moves after an instruction completed without trapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Next,
    Jump(Uxlen),
}

/// Hardware Thread
///
#[derive(Debug)]
pub struct Hart<A: AddressSpace> {
    pub address_space: A,
    pub(crate) csrs: CsrFile,

    pub(crate) reg_pc: Uxlen,
    /// x0 is always zero
    /// x1 is usually the return address
    /// x2 is usually the stack pointer
    /// # INVARIANT
    /// regs[0] is always zero!
    regs: [Uxlen; 32],
    pub(crate) privilege: PrivilegeLevel,

    instruction_count: u64,
    breakpoint: Option<Uxlen>,
    /// Word of the instruction being executed, valid during a step.
    pub(crate) current_instruction: u32,
}

impl<A: AddressSpace> Hart<A> {
    pub fn new(address_space: A) -> Self {
        Self::with_config(address_space, HartConfig::default())
    }

    pub fn with_config(address_space: A, config: HartConfig) -> Self {
        Hart {
            address_space,
            csrs: CsrFile::new(&config),
            reg_pc: config.reset_pc,
            regs: [0; 32],
            privilege: PrivilegeLevel::Machine,
            instruction_count: 0,
            breakpoint: None,
            current_instruction: 0,
        }
    }

    /// Executes up to `count` steps. With `check_breakpoint`, stops before executing the
    /// instruction at the breakpoint address.
    pub fn execute_steps(&mut self, count: u64, check_breakpoint: bool) -> StopReason {
        for _ in 0..count {
            if check_breakpoint && self.breakpoint == Some(self.reg_pc) {
                log::info!("Breakpoint reached at {:016x}", self.reg_pc);
                return StopReason::BreakpointHit;
            }
            self.step();
        }
        StopReason::StepLimitReached
    }

    /// Checks for interrupts, then fetches, decodes and executes one instruction.
    ///
    /// Backed by `execute_xxx` functions that take the decoded instruction and apply it to the
    /// architectural state. They report whether they moved the PC themselves, otherwise it is
    /// advanced by 4 here. A trapping instruction is not counted as retired.
    pub fn step(&mut self) {
        self.deliver_pending_interrupt();

        if self.reg_pc % 4 != 0 {
            self.take_exception(Exception::instruction_misaligned(self.reg_pc));
            // Detected before the fetch, so this step still counts.
            self.instruction_count += 1;
            return;
        }

        let instruction = self.fetch();
        self.current_instruction = instruction;

        let result = match Instruction::decode(instruction) {
            Ok(decoded) => {
                log::trace!("{:016x}: {instruction:08x} {decoded:?}", self.reg_pc);
                self.execute(decoded)
            }
            Err(err) => {
                log::debug!("{:016x}: {err}", self.reg_pc);
                Err(Exception::illegal_instruction(err.instruction()))
            }
        };

        match result {
            Ok(Control::Next) => {
                self.reg_pc = self.reg_pc.wrapping_add(4);
                self.instruction_count += 1;
            }
            Ok(Control::Jump(target)) => {
                self.reg_pc = target;
                self.instruction_count += 1;
            }
            Err(exception) => self.take_exception(exception),
        }
    }

    fn fetch(&self) -> u32 {
        let doubleword = self.address_space.read_doubleword(self.reg_pc);
        if self.reg_pc % 8 == 4 {
            (doubleword >> 32) as u32
        } else {
            doubleword as u32
        }
    }

    fn execute(&mut self, instr: Instruction) -> Result<Control, Exception> {
        match instr {
            Instruction::Lui { dest, immediate } => {
                self.write_reg(dest, immediate as Uxlen);
                Ok(Control::Next)
            }
            Instruction::Auipc { dest, immediate } => {
                self.write_reg(dest, self.reg_pc.wrapping_add(immediate as Uxlen));
                Ok(Control::Next)
            }
            Instruction::Jal { dest, offset } => Ok(self.execute_jal(offset, dest)),
            Instruction::Jalr { dest, base, offset } => Ok(self.execute_jalr(offset, base, dest)),
            Instruction::Branch {
                condition,
                src1,
                src2,
                offset,
            } => Ok(self.execute_branch(condition, src1, src2, offset)),
            Instruction::Load {
                width,
                dest,
                base,
                offset,
            } => self.execute_load(width, base, offset, dest),
            Instruction::Store {
                width,
                src,
                base,
                offset,
            } => self.execute_store(width, base, offset, src),
            Instruction::OpImm {
                op,
                dest,
                src,
                immediate,
            } => {
                self.execute_op_imm(op, src, immediate, dest);
                Ok(Control::Next)
            }
            Instruction::OpShiftImm {
                op,
                dest,
                src,
                shift_amount,
            } => {
                let value = shift(op, self.regs[src as usize], shift_amount);
                self.write_reg(dest, value);
                Ok(Control::Next)
            }
            Instruction::Op {
                op,
                dest,
                src1,
                src2,
            } => {
                self.execute_op(op, src1, src2, dest);
                Ok(Control::Next)
            }
            Instruction::Addiw {
                dest,
                src,
                immediate,
            } => {
                let sum = (self.regs[src as usize] as i32).wrapping_add(immediate as i32);
                self.write_reg(dest, sum as Ixlen as Uxlen);
                Ok(Control::Next)
            }
            Instruction::OpShiftImm32 {
                op,
                dest,
                src,
                shift_amount,
            } => {
                let value = shift_word(op, self.regs[src as usize], shift_amount);
                self.write_reg(dest, value);
                Ok(Control::Next)
            }
            Instruction::Op32 {
                op,
                dest,
                src1,
                src2,
            } => {
                self.execute_op_32(op, src1, src2, dest);
                Ok(Control::Next)
            }
            // Single in-order hart, nothing to order.
            Instruction::Fence => Ok(Control::Next),
            Instruction::Csr {
                op,
                dest,
                csr,
                source,
            } => self.execute_csr(op, csr, source, dest),
            Instruction::Ecall => Err(Exception::environment_call(self.privilege)),
            Instruction::Ebreak => Err(Exception::breakpoint()),
            Instruction::Mret => self.execute_mret(),
        }
    }

    /// Writes to x0 are discarded.
    fn write_reg(&mut self, dest: Specifier, value: Uxlen) {
        if dest != 0 {
            self.regs[dest as usize] = value;
        }
    }

    // Immediate operations
    fn execute_op_imm(&mut self, op: RegImmOp, src: Specifier, imm: Ixlen, dest: Specifier) {
        let lhs = self.regs[src as usize];
        let value = match op {
            RegImmOp::Addi => lhs.wrapping_add(imm as Uxlen),
            RegImmOp::Slti => ((lhs as Ixlen) < imm) as Uxlen,
            // The immediate is sign extended first, then compared unsigned
            RegImmOp::Sltiu => (lhs < imm as Uxlen) as Uxlen,
            RegImmOp::Xori => lhs ^ imm as Uxlen,
            RegImmOp::Ori => lhs | imm as Uxlen,
            RegImmOp::Andi => lhs & imm as Uxlen,
        };
        self.write_reg(dest, value);
    }

    // Register operations
    fn execute_op(&mut self, op: RegRegOp, src1: Specifier, src2: Specifier, dest: Specifier) {
        let lhs = self.regs[src1 as usize];
        let rhs = self.regs[src2 as usize];
        let value = match op {
            RegRegOp::Add => lhs.wrapping_add(rhs),
            RegRegOp::Sub => lhs.wrapping_sub(rhs),
            RegRegOp::Sll => shift(ShiftOp::Sll, lhs, (rhs & 0x3f) as u32),
            RegRegOp::Slt => ((lhs as Ixlen) < (rhs as Ixlen)) as Uxlen,
            RegRegOp::Sltu => (lhs < rhs) as Uxlen,
            RegRegOp::Xor => lhs ^ rhs,
            RegRegOp::Srl => shift(ShiftOp::Srl, lhs, (rhs & 0x3f) as u32),
            RegRegOp::Sra => shift(ShiftOp::Sra, lhs, (rhs & 0x3f) as u32),
            RegRegOp::Or => lhs | rhs,
            RegRegOp::And => lhs & rhs,
        };
        self.write_reg(dest, value);
    }

    /// Word operations compute on the low 32 bits and sign extend the result.
    fn execute_op_32(&mut self, op: RegRegOp32, src1: Specifier, src2: Specifier, dest: Specifier) {
        let lhs = self.regs[src1 as usize];
        let rhs = self.regs[src2 as usize];
        let value = match op {
            RegRegOp32::Addw => (lhs as i32).wrapping_add(rhs as i32) as Ixlen as Uxlen,
            RegRegOp32::Subw => (lhs as i32).wrapping_sub(rhs as i32) as Ixlen as Uxlen,
            RegRegOp32::Sllw => shift_word(ShiftOp::Sll, lhs, (rhs & 0x1f) as u32),
            RegRegOp32::Srlw => shift_word(ShiftOp::Srl, lhs, (rhs & 0x1f) as u32),
            RegRegOp32::Sraw => shift_word(ShiftOp::Sra, lhs, (rhs & 0x1f) as u32),
        };
        self.write_reg(dest, value);
    }

    /// Misaligned targets are not checked here, the next fetch traps on them.
    fn execute_jal(&mut self, offset: Ixlen, dest: Specifier) -> Control {
        let target = self.reg_pc.wrapping_add(offset as Uxlen);
        self.write_reg(dest, self.reg_pc.wrapping_add(4));
        Control::Jump(target)
    }

    fn execute_jalr(&mut self, offset: Ixlen, base: Specifier, dest: Specifier) -> Control {
        // Computed before the link is written, `base` may equal `dest`
        let target = self.regs[base as usize].wrapping_add(offset as Uxlen) & !0b1;
        self.write_reg(dest, self.reg_pc.wrapping_add(4));
        Control::Jump(target)
    }

    // Branches
    fn execute_branch(
        &mut self,
        condition: BranchCondition,
        src1: Specifier,
        src2: Specifier,
        offset: Ixlen,
    ) -> Control {
        let lhs = self.regs[src1 as usize];
        let rhs = self.regs[src2 as usize];
        let taken = match condition {
            BranchCondition::Beq => lhs == rhs,
            BranchCondition::Bne => lhs != rhs,
            BranchCondition::Blt => (lhs as Ixlen) < (rhs as Ixlen),
            BranchCondition::Bge => (lhs as Ixlen) >= (rhs as Ixlen),
            BranchCondition::Bltu => lhs < rhs,
            BranchCondition::Bgeu => lhs >= rhs,
        };
        if taken {
            Control::Jump(self.reg_pc.wrapping_add(offset as Uxlen))
        } else {
            Control::Next
        }
    }

    // Load/Store
    fn execute_load(
        &mut self,
        width: LoadWidth,
        base: Specifier,
        offset: Ixlen,
        dest: Specifier,
    ) -> Result<Control, Exception> {
        let addr = self.regs[base as usize].wrapping_add(offset as Uxlen);
        if addr % width.size() != 0 {
            return Err(Exception::load_misaligned(addr));
        }

        // Naturally aligned accesses never cross a doubleword
        let raw = self.address_space.read_doubleword(addr) >> ((addr % 8) * 8);
        let value = match width.size() {
            8 => raw,
            size => {
                let bits = (size * 8) as u32;
                if width.is_signed() {
                    sign_extend(raw, bits) as Uxlen
                } else {
                    raw & ((1 << bits) - 1)
                }
            }
        };
        self.write_reg(dest, value);
        Ok(Control::Next)
    }

    fn execute_store(
        &mut self,
        width: StoreWidth,
        base: Specifier,
        offset: Ixlen,
        src: Specifier,
    ) -> Result<Control, Exception> {
        let addr = self.regs[base as usize].wrapping_add(offset as Uxlen);
        if addr % width.size() != 0 {
            return Err(Exception::store_misaligned(addr));
        }

        let shift = (addr % 8) * 8;
        let mask = match width.size() {
            8 => u64::MAX,
            size => ((1 << (size * 8)) - 1) << shift,
        };
        self.address_space
            .write_doubleword(addr, self.regs[src as usize] << shift, mask);
        Ok(Control::Next)
    }

    // Zicsr: Control Status Register support.
    fn execute_csr(
        &mut self,
        op: CsrOp,
        addr: u16,
        source: CsrSource,
        dest: Specifier,
    ) -> Result<Control, Exception> {
        let (src_reg, operand) = match source {
            CsrSource::Register(src) => (Some(src), self.regs[src as usize]),
            // The immediate variants zero extend the 5 bit `rs1` field.
            CsrSource::Immediate(imm) => (None, imm as Uxlen),
        };
        let descriptor = csr::check_access(addr, self.privilege, src_reg)
            .ok_or(Exception::illegal_instruction(self.current_instruction))?;

        let prev = self.csrs.get(descriptor.csr);
        let value = match op {
            CsrOp::ReadWrite => operand,
            CsrOp::ReadSet => prev | operand,
            CsrOp::ReadClear => prev & !operand,
        };
        self.write_reg(dest, prev);
        match (descriptor.kind, descriptor.csr) {
            (CsrKind::Identification, _) => {}
            (_, Csr::Mip) => {
                self.csrs.set(Csr::Mip, value & csr::MIP_INSTRUCTION_WRITABLE);
            }
            (_, target) => {
                self.csrs.set(target, value);
            }
        }
        Ok(Control::Next)
    }

    pub fn pc(&self) -> Uxlen {
        self.reg_pc
    }

    pub fn set_pc(&mut self, pc: Uxlen) {
        self.reg_pc = pc;
    }

    pub fn registers(&self) -> &[Uxlen; 32] {
        &self.regs
    }

    pub fn reg(&self, index: usize) -> Result<Uxlen, HartError> {
        self.regs
            .get(index)
            .copied()
            .ok_or(HartError::InvalidRegister(index))
    }

    /// Writes to x0 are accepted and discarded.
    pub fn set_reg(&mut self, index: usize, value: Uxlen) -> Result<(), HartError> {
        if index >= self.regs.len() {
            return Err(HartError::InvalidRegister(index));
        }
        self.write_reg(index as Specifier, value);
        Ok(())
    }

    pub fn csr(&self, addr: u16) -> Result<Uxlen, HartError> {
        self.csrs.read(addr).ok_or(HartError::UnimplementedCsr(addr))
    }

    /// Writes through the same masks as the Zicsr instructions, but without privilege checks.
    /// Writes to read-only CSRs are ignored.
    /// Unlike the instructions, this can raise machine level interrupts through `mip`.
    pub fn set_csr(&mut self, addr: u16, value: Uxlen) -> Result<(), HartError> {
        let Some(csr) = Csr::from_address(addr) else {
            log::warn!("Ignored write of {value:#x} to unimplemented CSR {addr:#05x}");
            return Err(HartError::UnimplementedCsr(addr));
        };
        self.csrs.set(csr, value);
        Ok(())
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    /// Only 0 (user) and 3 (machine) are accepted.
    pub fn set_privilege(&mut self, level: u8) -> Result<(), HartError> {
        match PrivilegeLevel::try_from(level) {
            Ok(privilege) => {
                self.privilege = privilege;
                Ok(())
            }
            Err(_) => {
                log::warn!("Rejected privilege level {level}");
                Err(HartError::InvalidPrivilege(level))
            }
        }
    }

    pub fn breakpoint(&self) -> Option<Uxlen> {
        self.breakpoint
    }

    pub fn set_breakpoint(&mut self, addr: Uxlen) {
        self.breakpoint = Some(addr);
    }

    pub fn clear_breakpoint(&mut self) {
        self.breakpoint = None;
    }

    /// Number of retired instructions.
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Timing is not modelled.
    pub fn cycle_count(&self) -> u64 {
        0
    }

    /// Word of the most recently fetched instruction.
    pub fn current_instruction(&self) -> u32 {
        self.current_instruction
    }
}

fn shift(op: ShiftOp, value: Uxlen, shamt: u32) -> Uxlen {
    match op {
        ShiftOp::Sll => value << shamt,
        ShiftOp::Srl => value >> shamt,
        ShiftOp::Sra => ((value as Ixlen) >> shamt) as Uxlen,
    }
}

/// 32 bit shift of the low word, sign extended to 64 bits.
fn shift_word(op: ShiftOp, value: Uxlen, shamt: u32) -> Uxlen {
    let word = match op {
        ShiftOp::Sll => (value as u32) << shamt,
        ShiftOp::Srl => (value as u32) >> shamt,
        ShiftOp::Sra => ((value as i32) >> shamt) as u32,
    };
    word as i32 as Ixlen as Uxlen
}
