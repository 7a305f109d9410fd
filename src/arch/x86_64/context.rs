//! General-purpose register block shared by the exception entry and the
//! VM-entry/exit trampolines.
//!
//! Field order mirrors the push sequence in [`save_regs_to_stack!`]: the
//! last register pushed (RAX) sits at the lowest address. RSP is absent on
//! purpose — the trap frame gets it from the CPU-pushed part, and a guest
//! vCPU keeps it in VMCS `GUEST_RSP`.

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralRegisters {
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

static_assertions::const_assert_eq!(core::mem::size_of::<GeneralRegisters>(), 15 * 8);

macro_rules! save_regs_to_stack {
    () => {
        "
        push r15
        push r14
        push r13
        push r12
        push r11
        push r10
        push r9
        push r8
        push rdi
        push rsi
        push rbp
        push rbx
        push rdx
        push rcx
        push rax"
    };
}

macro_rules! restore_regs_from_stack {
    () => {
        "
        pop rax
        pop rcx
        pop rdx
        pop rbx
        pop rbp
        pop rsi
        pop rdi
        pop r8
        pop r9
        pop r10
        pop r11
        pop r12
        pop r13
        pop r14
        pop r15"
    };
}

impl GeneralRegisters {
    /// Read a register by the 0..16 encoding the SDM uses in exit
    /// qualifications. Index 4 (RSP) is not part of this block.
    pub fn get(&self, index: u8) -> u64 {
        match index {
            0 => self.rax,
            1 => self.rcx,
            2 => self.rdx,
            3 => self.rbx,
            5 => self.rbp,
            6 => self.rsi,
            7 => self.rdi,
            8 => self.r8,
            9 => self.r9,
            10 => self.r10,
            11 => self.r11,
            12 => self.r12,
            13 => self.r13,
            14 => self.r14,
            15 => self.r15,
            _ => panic!("GeneralRegisters: no slot for register {}", index),
        }
    }

    pub fn set(&mut self, index: u8, value: u64) {
        match index {
            0 => self.rax = value,
            1 => self.rcx = value,
            2 => self.rdx = value,
            3 => self.rbx = value,
            5 => self.rbp = value,
            6 => self.rsi = value,
            7 => self.rdi = value,
            8 => self.r8 = value,
            9 => self.r9 = value,
            10 => self.r10 = value,
            11 => self.r11 = value,
            12 => self.r12 = value,
            13 => self.r13 = value,
            14 => self.r14 = value,
            15 => self.r15 = value,
            _ => panic!("GeneralRegisters: no slot for register {}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdm_indexing_skips_rsp() {
        let mut regs = GeneralRegisters::default();
        regs.set(3, 0xb); // rbx
        regs.set(15, 0xf);
        assert_eq!(regs.rbx, 0xb);
        assert_eq!(regs.get(3), 0xb);
        assert_eq!(regs.get(15), 0xf);
    }

    #[test]
    #[should_panic]
    fn rsp_slot_is_rejected() {
        GeneralRegisters::default().get(4);
    }
}
