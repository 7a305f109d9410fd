#[macro_use]
mod context;

pub mod cpu;
pub mod exception;
pub mod linux;
pub mod paging;
pub mod pic;
pub mod serial;
pub mod tables;
pub mod vmx;

pub use context::GeneralRegisters;
pub use paging::HostPageTable;
