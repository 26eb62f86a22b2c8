//! Functional simulator for a single RV64I + Zicsr hardware thread.
//!
//! https://riscv.org/technical/specifications/
//!
//! The hart executes one instruction per [`Hart::step`](execute::Hart::step). Machine and user
//! privilege are modelled, together with the machine-level trap CSRs. Memory is provided by the
//! embedder through the [`AddressSpace`](platform::AddressSpace) trait.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

pub type Uxlen = u64;
pub type Ixlen = i64;

pub mod csr;
pub mod decode;
pub mod execute;
pub mod platform;
mod trap;

pub use execute::{Hart, HartConfig, StopReason};
pub use platform::{AddressSpace, SparseMemory};

/// Privilege levels implemented by this hart.
///
/// Levels 1 (supervisor) and 2 (reserved) do not exist in this model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PrivilegeLevel {
    User = 0,
    Machine = 3,
}

impl PrivilegeLevel {
    /// Decodes the 2 bit MPP encoding. Unimplemented levels read as user mode.
    pub(crate) fn from_mpp(bits: Uxlen) -> Self {
        match bits & 0b11 {
            3 => PrivilegeLevel::Machine,
            _ => PrivilegeLevel::User,
        }
    }
}

/// Misuse of the driver interface. Architectural faults are never reported this way, they
/// trap inside the simulated hart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HartError {
    #[error("privilege level {0} is not implemented (expected 0 or 3)")]
    InvalidPrivilege(u8),
    #[error("CSR {0:#05x} is not implemented")]
    UnimplementedCsr(u16),
    #[error("there is no general purpose register x{0}")]
    InvalidRegister(usize),
}
