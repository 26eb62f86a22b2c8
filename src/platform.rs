use std::collections::HashMap;

use crate::Uxlen;

pub mod exception {
    use num_enum::{IntoPrimitive, TryFromPrimitive};

    use crate::{PrivilegeLevel, Uxlen};

    /// Exception codes of synchronous traps, as written to `mcause`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
    #[repr(u64)]
    pub enum SynchronousCause {
        InstructionAddressMisaligned = 0,
        IllegalInstruction = 2,
        Breakpoint = 3,
        LoadAddressMisaligned = 4,
        StoreAMOAddressMisaligned = 6,
        EnvironmentCallFromUMode = 8,
        EnvironmentCallFromMMode = 11,
    }

    /// An exception causes a trap into machine mode. `tval` is the value written to `mtval`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Exception {
        pub cause: SynchronousCause,
        pub tval: Uxlen,
    }

    impl Exception {
        /// `instr` is the faulting instruction word.
        pub fn illegal_instruction(instr: u32) -> Self {
            Exception {
                cause: SynchronousCause::IllegalInstruction,
                tval: instr as Uxlen,
            }
        }

        pub fn instruction_misaligned(pc: Uxlen) -> Self {
            Exception {
                cause: SynchronousCause::InstructionAddressMisaligned,
                tval: pc,
            }
        }

        pub fn load_misaligned(addr: Uxlen) -> Self {
            Exception {
                cause: SynchronousCause::LoadAddressMisaligned,
                tval: addr,
            }
        }

        pub fn store_misaligned(addr: Uxlen) -> Self {
            Exception {
                cause: SynchronousCause::StoreAMOAddressMisaligned,
                tval: addr,
            }
        }

        /// Environment calls always clear `mtval`.
        pub fn environment_call(from: PrivilegeLevel) -> Self {
            let cause = match from {
                PrivilegeLevel::User => SynchronousCause::EnvironmentCallFromUMode,
                PrivilegeLevel::Machine => SynchronousCause::EnvironmentCallFromMMode,
            };
            Exception { cause, tval: 0 }
        }

        pub fn breakpoint() -> Self {
            Exception {
                cause: SynchronousCause::Breakpoint,
                tval: 0,
            }
        }

        pub fn code(&self) -> Uxlen {
            self.cause.into()
        }
    }

    /// Interrupt codes, as written to `mcause` together with the interrupt bit. The code is
    /// also the bit index in `mip` and `mie`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
    #[repr(u64)]
    pub enum Interrupt {
        UserSoftware = 0,
        MachineSoftware = 3,
        UserTimer = 4,
        MachineTimer = 7,
        UserExternal = 8,
        MachineExternal = 11,
    }

    impl Interrupt {
        /// Highest priority first.
        pub const PRIORITY: [Interrupt; 6] = [
            Interrupt::MachineExternal,
            Interrupt::MachineSoftware,
            Interrupt::MachineTimer,
            Interrupt::UserExternal,
            Interrupt::UserSoftware,
            Interrupt::UserTimer,
        ];

        pub fn code(self) -> Uxlen {
            self.into()
        }

        /// The pending/enable bit of this interrupt in `mip`/`mie`.
        pub fn mask(self) -> Uxlen {
            1 << self.code()
        }

        /// Highest priority interrupt that is both pending and enabled.
        pub fn highest_pending(mip: Uxlen, mie: Uxlen) -> Option<Interrupt> {
            Self::PRIORITY
                .into_iter()
                .find(|interrupt| mip & mie & interrupt.mask() != 0)
        }
    }
}

/// 64 bit byte addressable address space, accessed by naturally aligned doublewords.
///
/// Little endian by design, such that instruction fetches (always LE) and data accesses work
/// the same. How addresses outside of any backing storage behave is up to the implementation.
pub trait AddressSpace {
    /// Returns the 8 byte aligned doubleword containing `addr`.
    fn read_doubleword(&self, addr: Uxlen) -> u64;

    /// Writes the bits of `val` selected by `mask` into the doubleword containing `addr`.
    /// All other bits keep their value.
    fn write_doubleword(&mut self, addr: Uxlen, val: u64, mask: u64);
}

/// Memory that only stores the doublewords that were written. Unwritten memory reads as zero.
#[derive(Debug, Default, Clone)]
pub struct SparseMemory {
    doublewords: HashMap<Uxlen, u64>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `words` little endian starting at the 4 byte aligned address `addr`.
    pub fn store_words(&mut self, addr: Uxlen, words: &[u32]) {
        debug_assert!(addr % 4 == 0, "words must be 4 byte aligned");
        for (index, &word) in words.iter().enumerate() {
            let word_addr = addr.wrapping_add(4 * index as Uxlen);
            let shift = (word_addr % 8) * 8;
            self.write_doubleword(word_addr, (word as u64) << shift, 0xffff_ffff << shift);
        }
    }

    /// Number of doublewords that hold data.
    pub fn len(&self) -> usize {
        self.doublewords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doublewords.is_empty()
    }
}

impl AddressSpace for SparseMemory {
    fn read_doubleword(&self, addr: Uxlen) -> u64 {
        self.doublewords.get(&(addr & !0b111)).copied().unwrap_or(0)
    }

    fn write_doubleword(&mut self, addr: Uxlen, val: u64, mask: u64) {
        let entry = self.doublewords.entry(addr & !0b111).or_insert(0);
        *entry = *entry & !mask | val & mask;
    }
}
