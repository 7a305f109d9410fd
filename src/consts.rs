pub use crate::memory::PAGE_SIZE;

/// Kernel boot stack, switched to by the entry stub. A zero-filled guard
/// slot sits below it in the linker script.
pub const KERNEL_STACK_SIZE: usize = 16 * PAGE_SIZE;

/// Dedicated stack the initial VMCS `HOST_RSP` points at. Overwritten per
/// entry with the live stack, so this only has to survive until the first
/// `asm_vm_entry`.
pub const VM_EXIT_STACK_SIZE: usize = 2 * PAGE_SIZE;

/// Bytes of RAM given to the guest.
pub const GUEST_MEMORY_SIZE: usize = 128 * 1024 * 1024;

/// Guest-physical address of the Linux boot-parameter block.
pub const GUEST_BOOTPARAM_ADDR: u64 = 0x1_0000;

/// Guest-physical address of the kernel command line.
pub const GUEST_CMDLINE_ADDR: u64 = 0x2_0000;

/// Guest-physical load address of the protected-mode kernel (and the
/// guest's entry RIP).
pub const GUEST_KERNEL_BASE: u64 = 0x10_0000;

/// Command line handed to the guest.
pub const GUEST_CMDLINE: &[u8] = b"console=ttyS0";
