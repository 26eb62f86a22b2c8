//! Machine-level control and status registers.
//!
//! Every implemented CSR has a [`CsrDescriptor`] in a fixed table. The descriptor decides
//! whether the register can be written and which bits of a written value are kept.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::decode::Specifier;
use crate::execute::HartConfig;
use crate::{PrivilegeLevel, Uxlen};

/// Machine interrupt enable.
pub const MSTATUS_MIE: Uxlen = 1 << 3;
/// Machine previous interrupt enable.
pub const MSTATUS_MPIE: Uxlen = 1 << 7;
pub const MSTATUS_MPP_SHIFT: u32 = 11;
/// Machine previous privilege, 2 bits.
pub const MSTATUS_MPP: Uxlen = 0b11 << MSTATUS_MPP_SHIFT;
/// UXL is hardwired to 2, user mode is 64 bit.
pub const MSTATUS_UXL: Uxlen = 2 << 32;

/// Set in `mtvec` when interrupts use vectored dispatch.
pub const MTVEC_VECTORED: Uxlen = 0b1;
pub const MTVEC_BASE_MASK: Uxlen = !0b11;

/// Set in `mcause` when the trap was caused by an interrupt.
pub const MCAUSE_INTERRUPT: Uxlen = 1 << 63;

/// Bits of `mie` and `mip` that correspond to implemented interrupts.
pub const IMPLEMENTED_INTERRUPTS: Uxlen = 0x999;
/// Pending bits a Zicsr instruction may write to `mip`. The machine level bits are driven by the
/// platform only.
pub const MIP_INSTRUCTION_WRITABLE: Uxlen = 0x111;

/// Implemented CSRs, by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Csr {
    Mvendorid = 0xF11,
    Marchid = 0xF12,
    Mimpid = 0xF13,
    Mhartid = 0xF14,
    Mstatus = 0x300,
    Misa = 0x301,
    Mie = 0x304,
    Mtvec = 0x305,
    Mscratch = 0x340,
    Mepc = 0x341,
    Mcause = 0x342,
    Mtval = 0x343,
    Mip = 0x344,
}

impl Csr {
    /// Looks up an implemented CSR. `None` for every other address.
    pub fn from_address(addr: u16) -> Option<Csr> {
        Csr::try_from(addr).ok()
    }

    pub fn address(self) -> u16 {
        self.into()
    }

    pub fn descriptor(self) -> &'static CsrDescriptor {
        &DESCRIPTORS[self.slot()]
    }

    /// Index into [`DESCRIPTORS`] and the value storage.
    const fn slot(self) -> usize {
        match self {
            Csr::Mvendorid => 0,
            Csr::Marchid => 1,
            Csr::Mimpid => 2,
            Csr::Mhartid => 3,
            Csr::Mstatus => 4,
            Csr::Misa => 5,
            Csr::Mie => 6,
            Csr::Mtvec => 7,
            Csr::Mscratch => 8,
            Csr::Mepc => 9,
            Csr::Mcause => 10,
            Csr::Mtval => 11,
            Csr::Mip => 12,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum CsrKind {
    /// `mvendorid`, `marchid`, `mimpid`, `mhartid`. Read-only, a Zicsr instruction that names
    /// a non-zero source register for one of these is illegal.
    Identification,
    /// Fixed at construction. Writes are legal but ignored.
    Fixed,
    /// Writable through a register specific mask.
    Writable(fn(Uxlen) -> Uxlen),
}

#[derive(Debug)]
pub struct CsrDescriptor {
    pub csr: Csr,
    pub kind: CsrKind,
}

fn mstatus_mask(value: Uxlen) -> Uxlen {
    value & (MSTATUS_MIE | MSTATUS_MPIE | MSTATUS_MPP) | MSTATUS_UXL
}

fn interrupt_mask(value: Uxlen) -> Uxlen {
    value & IMPLEMENTED_INTERRUPTS
}

fn mtvec_mask(value: Uxlen) -> Uxlen {
    if value & MTVEC_VECTORED != 0 {
        // Vectored base must be 256 byte aligned
        value & 0xffff_ffff_ffff_ff01
    } else {
        value & MTVEC_BASE_MASK
    }
}

fn mepc_mask(value: Uxlen) -> Uxlen {
    value & !0b11
}

fn mcause_mask(value: Uxlen) -> Uxlen {
    value & (MCAUSE_INTERRUPT | 0xf)
}

fn unmasked(value: Uxlen) -> Uxlen {
    value
}

pub static DESCRIPTORS: [CsrDescriptor; 13] = [
    CsrDescriptor {
        csr: Csr::Mvendorid,
        kind: CsrKind::Identification,
    },
    CsrDescriptor {
        csr: Csr::Marchid,
        kind: CsrKind::Identification,
    },
    CsrDescriptor {
        csr: Csr::Mimpid,
        kind: CsrKind::Identification,
    },
    CsrDescriptor {
        csr: Csr::Mhartid,
        kind: CsrKind::Identification,
    },
    CsrDescriptor {
        csr: Csr::Mstatus,
        kind: CsrKind::Writable(mstatus_mask),
    },
    CsrDescriptor {
        csr: Csr::Misa,
        kind: CsrKind::Fixed,
    },
    CsrDescriptor {
        csr: Csr::Mie,
        kind: CsrKind::Writable(interrupt_mask),
    },
    CsrDescriptor {
        csr: Csr::Mtvec,
        kind: CsrKind::Writable(mtvec_mask),
    },
    CsrDescriptor {
        csr: Csr::Mscratch,
        kind: CsrKind::Writable(unmasked),
    },
    CsrDescriptor {
        csr: Csr::Mepc,
        kind: CsrKind::Writable(mepc_mask),
    },
    CsrDescriptor {
        csr: Csr::Mcause,
        kind: CsrKind::Writable(mcause_mask),
    },
    CsrDescriptor {
        csr: Csr::Mtval,
        kind: CsrKind::Writable(unmasked),
    },
    CsrDescriptor {
        csr: Csr::Mip,
        kind: CsrKind::Writable(interrupt_mask),
    },
];

/// Checks whether a Zicsr instruction may access the CSR at `addr`.
///
/// `src` is the source register of the register forms and `None` for the immediate forms.
/// No CSR is accessible from user mode.
pub fn check_access(
    addr: u16,
    privilege: PrivilegeLevel,
    src: Option<Specifier>,
) -> Option<&'static CsrDescriptor> {
    if privilege == PrivilegeLevel::User {
        return None;
    }
    let descriptor = Csr::from_address(addr)?.descriptor();
    match (descriptor.kind, src) {
        (CsrKind::Identification, Some(src)) if src != 0 => None,
        _ => Some(descriptor),
    }
}

/// Storage for all implemented CSRs.
#[derive(Debug, Clone)]
pub struct CsrFile {
    values: [Uxlen; 13],
}

impl CsrFile {
    pub fn new(config: &HartConfig) -> Self {
        let mut values = [0; 13];
        values[Csr::Mvendorid.slot()] = config.mvendorid;
        values[Csr::Marchid.slot()] = config.marchid;
        values[Csr::Mimpid.slot()] = config.mimpid;
        values[Csr::Mhartid.slot()] = config.mhartid;
        values[Csr::Misa.slot()] = config.misa;
        values[Csr::Mstatus.slot()] = MSTATUS_UXL;
        CsrFile { values }
    }

    /// Value of the CSR at `addr`, `None` if it is not implemented.
    pub fn read(&self, addr: u16) -> Option<Uxlen> {
        Csr::from_address(addr).map(|csr| self.get(csr))
    }

    pub fn get(&self, csr: Csr) -> Uxlen {
        self.values[csr.slot()]
    }

    /// Writes `value` through the register specific mask. Writes to read-only CSRs are dropped.
    /// Returns whether anything was stored.
    pub fn set(&mut self, csr: Csr, value: Uxlen) -> bool {
        match csr.descriptor().kind {
            CsrKind::Writable(mask) => {
                self.values[csr.slot()] = mask(value);
                true
            }
            CsrKind::Fixed => {
                log::debug!("{csr:?} is writable but fixed, ignored {value:#x}");
                false
            }
            CsrKind::Identification => {
                log::warn!("Ignored write of {value:#x} to read-only {csr:?}");
                false
            }
        }
    }

    /// Read-modify-write of single bits, still going through the mask.
    pub(crate) fn update(&mut self, csr: Csr, f: impl FnOnce(Uxlen) -> Uxlen) {
        let value = f(self.get(csr));
        self.set(csr, value);
    }
}
