//! Trap entry and return. All traps are taken in machine mode.

use crate::csr::{
    Csr, MCAUSE_INTERRUPT, MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP, MSTATUS_MPP_SHIFT,
    MTVEC_BASE_MASK, MTVEC_VECTORED,
};
use crate::execute::{Control, Hart};
use crate::platform::exception::{Exception, Interrupt, SynchronousCause};
use crate::platform::AddressSpace;
use crate::{PrivilegeLevel, Uxlen};

impl<A: AddressSpace> Hart<A> {
    /// Enters the trap handler for a synchronous exception. The faulting instruction does not
    /// retire.
    pub(crate) fn take_exception(&mut self, exception: Exception) {
        if exception.cause == SynchronousCause::Breakpoint {
            self.take_breakpoint();
            return;
        }

        log::debug!(
            "{:?} at {:016x}, mtval {:#x}",
            exception.cause,
            self.reg_pc,
            exception.tval
        );
        self.csrs.set(Csr::Mepc, self.reg_pc);
        self.csrs.set(Csr::Mcause, exception.code());
        self.csrs.set(Csr::Mtval, exception.tval);
        // Exceptions always go to the base, even in vectored mode.
        self.reg_pc = self.csrs.get(Csr::Mtvec) & MTVEC_BASE_MASK;
        self.push_privilege();
    }

    /// `EBREAK` leaves `mtval` alone.
    fn take_breakpoint(&mut self) {
        log::debug!("Breakpoint exception at {:016x}", self.reg_pc);
        let cause = Exception::breakpoint().code();
        self.csrs.set(Csr::Mepc, self.reg_pc);

        let mtvec = self.csrs.get(Csr::Mtvec);
        let base = mtvec & MTVEC_BASE_MASK;
        self.reg_pc = if mtvec & MTVEC_VECTORED != 0 {
            // Offset is masked down to the sign bit, which leaves the base.
            base.wrapping_add(cause.wrapping_mul(4) & (1 << 63))
        } else {
            base
        };

        self.csrs.set(Csr::Mcause, cause);
        self.push_privilege();
    }

    /// Delivers the highest priority pending and enabled interrupt, if interrupts are globally
    /// enabled. User mode can always be interrupted.
    pub(crate) fn deliver_pending_interrupt(&mut self) {
        let enabled = self.privilege == PrivilegeLevel::User
            || self.csrs.get(Csr::Mstatus) & MSTATUS_MIE != 0;
        if !enabled {
            return;
        }
        let Some(interrupt) =
            Interrupt::highest_pending(self.csrs.get(Csr::Mip), self.csrs.get(Csr::Mie))
        else {
            return;
        };

        log::debug!("{interrupt:?} interrupt at {:016x}", self.reg_pc);
        self.csrs.set(Csr::Mepc, self.reg_pc);
        self.csrs.set(Csr::Mcause, MCAUSE_INTERRUPT | interrupt.code());

        let mtvec = self.csrs.get(Csr::Mtvec);
        let base = mtvec & MTVEC_BASE_MASK;
        self.reg_pc = if mtvec & MTVEC_VECTORED != 0 {
            base.wrapping_add(4 * interrupt.code())
        } else {
            base
        };
        self.push_privilege();
    }

    /// Saves privilege and interrupt enable into `mstatus` and switches to machine mode with
    /// interrupts disabled.
    fn push_privilege(&mut self) {
        let previous = u8::from(self.privilege) as Uxlen;
        self.csrs.update(Csr::Mstatus, |mstatus| {
            let mpie = if mstatus & MSTATUS_MIE != 0 {
                MSTATUS_MPIE
            } else {
                0
            };
            mstatus & !(MSTATUS_MIE | MSTATUS_MPIE | MSTATUS_MPP)
                | mpie
                | previous << MSTATUS_MPP_SHIFT
        });
        self.privilege = PrivilegeLevel::Machine;
    }

    /// `MRET`: returns to `mepc` in the privilege saved in MPP and restores MIE from MPIE.
    /// MPP keeps its value.
    pub(crate) fn execute_mret(&mut self) -> Result<Control, Exception> {
        if self.privilege == PrivilegeLevel::User {
            return Err(Exception::illegal_instruction(self.current_instruction));
        }

        let mstatus = self.csrs.get(Csr::Mstatus);
        self.privilege = PrivilegeLevel::from_mpp(mstatus >> MSTATUS_MPP_SHIFT);
        let mie = if mstatus & MSTATUS_MPIE != 0 {
            MSTATUS_MIE
        } else {
            0
        };
        self.csrs
            .set(Csr::Mstatus, mstatus & !(MSTATUS_MIE | MSTATUS_MPIE) | mie);

        let target = self.csrs.get(Csr::Mepc);
        log::debug!("mret to {target:016x} in {:?} mode", self.privilege);
        Ok(Control::Jump(target))
    }
}
