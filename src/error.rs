use alloc::string::String;
use core::fmt::{Debug, Formatter, Result};

use vtx::{Vmcs, VmxError};

/// What went wrong, without the where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The boot-info handoff did not carry the agreed magic.
    InvalidMagic,
    /// Physical frame or heap exhaustion.
    OutOfMemory,
    /// A physical/virtual address failed a range or alignment rule.
    BadAddress,
    InvalidArgument,
    /// The CPU or firmware lacks a required capability.
    NotSupported,
    NotFound,
    /// An ACPI table failed checksum or signature validation.
    BadChecksum,
    /// A VMX instruction reported VMfailInvalid (CF set).
    InvalidVmcsPointer,
    /// A VMX instruction reported VMfailValid (ZF set); the decoded
    /// `VM_INSTRUCTION_ERROR` is attached to the message.
    VmxStatusAvailable,
}

/// An error annotated with its construction site, built by the `hv_err!`
/// macros. The hypervisor has no recovery story beyond "fail the boot and
/// say where", so the where is the valuable part.
pub struct HvError {
    kind: ErrorKind,
    loc_file: &'static str,
    loc_line: u32,
    msg: Option<String>,
}

pub type HvResult<T = ()> = core::result::Result<T, HvError>;

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match *self {
            InvalidMagic => "Boot info magic mismatch",
            OutOfMemory => "Out of memory",
            BadAddress => "Bad address",
            InvalidArgument => "Invalid argument",
            NotSupported => "Not supported",
            NotFound => "Not found",
            BadChecksum => "Checksum validation failed",
            InvalidVmcsPointer => "Invalid VMCS pointer",
            VmxStatusAvailable => "VMX instruction failed",
        }
    }
}

impl HvError {
    pub fn new(
        kind: ErrorKind,
        loc_file: &'static str,
        loc_line: u32,
        msg: Option<String>,
    ) -> Self {
        Self {
            kind,
            loc_file,
            loc_line,
            msg,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Debug for HvError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(
            f,
            "[{}:{}] {:?}: {}",
            self.loc_file,
            self.loc_line,
            self.kind,
            self.kind.as_str()
        )?;
        if let Some(ref msg) = self.msg {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! hv_err {
    ($kind: ident) => {{
        use $crate::error::{ErrorKind::*, HvError};
        HvError::new($kind, file!(), line!(), None)
    }};
    ($kind: ident, $msg: expr) => {{
        use $crate::error::{ErrorKind::*, HvError};
        HvError::new($kind, file!(), line!(), Some($msg.into()))
    }};
}

#[macro_export]
macro_rules! hv_result_err {
    ($kind: ident) => {
        Err(hv_err!($kind))
    };
    ($kind: ident, $msg: expr) => {
        Err(hv_err!($kind, $msg))
    };
}

impl From<VmxError> for HvError {
    fn from(err: VmxError) -> Self {
        match err {
            VmxError::InvalidVmcsPointer => hv_err!(InvalidVmcsPointer),
            VmxError::StatusAvailable => {
                // Best effort: the error-field read can itself fail if the
                // VMCS pointer went bad in between.
                let msg = match Vmcs::instruction_error() {
                    Ok(Ok(e)) => format!("{:?}: {}", e, e.as_str()),
                    Ok(Err(raw)) => format!("unknown error number {}", raw),
                    Err(_) => String::from("error number unavailable"),
                };
                hv_err!(VmxStatusAvailable, msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_carries_kind_and_location() {
        let err: HvError = hv_err!(InvalidMagic, "got 0");
        assert_eq!(err.kind(), ErrorKind::InvalidMagic);
        let repr = format!("{:?}", err);
        assert!(repr.contains("InvalidMagic"));
        assert!(repr.contains("got 0"));
        assert!(repr.contains("error.rs"));
    }
}
