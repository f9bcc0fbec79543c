//! Register file for an AltairX K1 core.
//!
//! The K1 exposes several register files:
//!
//! - **Integer GPR**: 64 × 64-bit (`gpi`)
//! - **FP GPR**: 64 × 64-bit, holding the raw bits of the FP value (`gpf`)
//! - **MDU**: 4 × 64-bit (quotient, remainder, product-low, product-high)
//! - **EFU**: one 64-bit result register
//! - **Control**: LR, BR, LC, FR, PC, IR, CC, IC (all 32-bit)
//!
//! Some integer registers have fixed roles: r0 is the stack pointer, r31 the
//! link register, r56 the accumulator alias, r57..r62 the per-slot bypass
//! registers and r63 is hard-wired to zero. Register 63 of the FP file is
//! hard-wired to zero as well.

use std::fmt;

/// Number of integer general purpose registers.
pub const IREG_COUNT: usize = 64;

/// Number of FP general purpose registers.
pub const VREG_COUNT: usize = 64;

/// Number of MDU result registers (Q, QR, PL, PH).
pub const MDU_REG_COUNT: usize = 4;

/// Stack pointer.
pub const REG_SP: u32 = 0;
/// Link register written by CALL/CALLR.
pub const REG_LR: u32 = 31;
/// Accumulator alias; reads and writes redirect to the slot's bypass.
pub const REG_ACC: u32 = 56;
/// ALU bypass, slot 0.
pub const REG_BA1: u32 = 57;
/// ALU bypass, slot 1.
pub const REG_BA2: u32 = 58;
/// FPU bypass, slot 0.
pub const REG_BF1: u32 = 59;
/// FPU bypass, slot 1.
pub const REG_BF2: u32 = 60;
/// LSU bypass, slot 0.
pub const REG_BL1: u32 = 61;
/// LSU bypass, slot 1.
pub const REG_BL2: u32 = 62;
/// Hard-wired zero.
pub const REG_ZERO: u32 = 63;

/// Flag register bit: zero.
pub const Z_MASK: u32 = 0x01;
/// Flag register bit: carry (unsigned borrow on CMP, "less" on FCMP).
pub const C_MASK: u32 = 0x02;
/// Flag register bit: negative.
pub const N_MASK: u32 = 0x04;
/// Flag register bit: signed overflow.
pub const O_MASK: u32 = 0x08;
/// Flag register bit: unordered (FCMP with a non-real operand).
pub const U_MASK: u32 = 0x10;

/// Complete architectural register state of one core.
#[derive(Clone)]
pub struct RegisterSet {
    /// Link register.
    pub lr: u32,
    /// Branch register.
    pub br: u32,
    /// Loop counter.
    pub lc: u32,
    /// Flag register; written only by CMP/FCMP, read only by the BRU.
    pub fr: u32,
    /// Program counter, word-addressed.
    pub pc: u32,
    /// Interrupt return register, latched by SYSCALL.
    pub ir: u32,
    /// Cycle counter.
    pub cc: u32,
    /// Instruction counter.
    pub ic: u32,

    /// Integer general purpose registers.
    pub gpi: [u64; IREG_COUNT],
    /// FP general purpose registers (raw bits; use the punning helpers in
    /// [`bits`](super::bits) for typed access).
    pub gpf: [u64; VREG_COUNT],
    /// MDU registers (Q, QR, PL, PH).
    pub mdu: [u64; MDU_REG_COUNT],
    /// EFU result register.
    pub efu_q: u64,
}

impl Default for RegisterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterSet {
    /// Create a zeroed register set.
    pub const fn new() -> Self {
        Self {
            lr: 0,
            br: 0,
            lc: 0,
            fr: 0,
            pc: 0,
            ir: 0,
            cc: 0,
            ic: 0,
            gpi: [0; IREG_COUNT],
            gpf: [0; VREG_COUNT],
            mdu: [0; MDU_REG_COUNT],
            efu_q: 0,
        }
    }

    /// Whether a flag bit is set in FR.
    #[inline]
    pub const fn flag(&self, mask: u32) -> bool {
        self.fr & mask != 0
    }

    /// Set or clear a flag bit in FR.
    #[inline]
    pub fn assign_flag(&mut self, mask: u32, set: bool) {
        if set {
            self.fr |= mask;
        } else {
            self.fr &= !mask;
        }
    }
}

/// ABI name of an integer register (sp, a0..a7, s0..s10, t0..t10, lr,
/// n0..n23, acc, zero; anything else as rN).
pub fn reg_name(reg: u32) -> String {
    match reg {
        0 => "sp".to_string(),
        1..=8 => format!("a{}", reg - 1),
        9..=19 => format!("s{}", reg - 9),
        20..=30 => format!("t{}", reg - 20),
        31 => "lr".to_string(),
        32..=55 => format!("n{}", reg - 32),
        56 => "acc".to_string(),
        63 => "zero".to_string(),
        _ => format!("r{}", reg),
    }
}

impl fmt::Debug for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "RegisterSet {{ pc: {:#010X}, fr: {:#04X}, lr: {:#X}, ir: {:#X}, cc: {}, ic: {}",
            self.pc, self.fr, self.lr, self.ir, self.cc, self.ic
        )?;

        // Only show non-zero data registers
        for (reg, value) in self.gpi.iter().enumerate().filter(|(_, v)| **v != 0) {
            writeln!(f, "  {}: {:#018X}", reg_name(reg as u32), value)?;
        }
        for (reg, value) in self.gpf.iter().enumerate().filter(|(_, v)| **v != 0) {
            writeln!(f, "  v{}: {:#018X}", reg, value)?;
        }
        for (reg, value) in self.mdu.iter().enumerate().filter(|(_, v)| **v != 0) {
            let name = ["Q", "QR", "PL", "PH"][reg];
            writeln!(f, "  {}: {:#018X}", name, value)?;
        }
        if self.efu_q != 0 {
            writeln!(f, "  EFU-Q: {:#018X}", self.efu_q)?;
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let regs = RegisterSet::new();
        assert_eq!(regs.pc, 0);
        assert_eq!(regs.fr, 0);
        assert!(regs.gpi.iter().all(|v| *v == 0));
        assert!(regs.gpf.iter().all(|v| *v == 0));
        assert_eq!(regs.mdu, [0; MDU_REG_COUNT]);
        assert_eq!(regs.efu_q, 0);
    }

    #[test]
    fn test_flag_assignment() {
        let mut regs = RegisterSet::new();

        regs.assign_flag(Z_MASK, true);
        regs.assign_flag(N_MASK, true);
        assert_eq!(regs.fr, Z_MASK | N_MASK);
        assert!(regs.flag(Z_MASK));
        assert!(!regs.flag(C_MASK));

        regs.assign_flag(Z_MASK, false);
        assert_eq!(regs.fr, N_MASK);
    }

    #[test]
    fn test_reg_names() {
        assert_eq!(reg_name(0), "sp");
        assert_eq!(reg_name(1), "a0");
        assert_eq!(reg_name(8), "a7");
        assert_eq!(reg_name(9), "s0");
        assert_eq!(reg_name(20), "t0");
        assert_eq!(reg_name(31), "lr");
        assert_eq!(reg_name(32), "n0");
        assert_eq!(reg_name(55), "n23");
        assert_eq!(reg_name(56), "acc");
        assert_eq!(reg_name(57), "r57");
        assert_eq!(reg_name(63), "zero");
    }

    #[test]
    fn test_debug_shows_non_zero_registers() {
        let mut regs = RegisterSet::new();
        regs.gpi[5] = 42;
        regs.gpf[2] = 1;

        let debug = format!("{:?}", regs);
        assert!(debug.contains("a4"));
        assert!(debug.contains("v2"));
        assert!(!debug.contains("v3"));
    }
}
