//! Intel VT-x building blocks: VMX instruction wrappers, VMCS field
//! encodings, capability/control flags and the packed structures the SDM
//! defines bit by bit (segment access rights, exit reasons and
//! qualifications, the EPT pointer).
//!
//! Everything here is a thin, `no_std` layer over the raw architecture.
//! Policy (which controls to set, what to do on an exit) lives in the
//! kernel.

#![cfg_attr(not(test), no_std)]

mod definitions;
pub mod ept;
pub mod flags;
mod instructions;
pub mod segmentation;
pub mod vmcs;

pub use definitions::{ExitReason, RawExitReason, VmxInstructionError};
pub use instructions::{vmclear, vmptrld, vmxoff, vmxon};
pub use vmcs::Vmcs;

/// Outcome of a VMX instruction, per SDM Vol 3C §31.2 conventions:
/// CF set means the instruction had no current/valid VMCS to report
/// through, ZF set means an error code was deposited in
/// `VM_INSTRUCTION_ERROR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmxError {
    /// VMfailInvalid: CF was set.
    InvalidVmcsPointer,
    /// VMfailValid: ZF was set; read [`Vmcs::instruction_error`] for the
    /// decoded reason.
    StatusAvailable,
}

pub type Result<T = ()> = core::result::Result<T, VmxError>;

impl From<x86::vmx::VmFail> for VmxError {
    fn from(err: x86::vmx::VmFail) -> Self {
        match err {
            x86::vmx::VmFail::VmFailInvalid => VmxError::InvalidVmcsPointer,
            x86::vmx::VmFail::VmFailValid => VmxError::StatusAvailable,
        }
    }
}
