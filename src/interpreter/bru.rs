//! Branch unit.
//!
//! Conditional branches test FR bits produced by an earlier CMP/FCMP and
//! add a 23-bit signed offset to the word-addressed PC. Offsets are
//! relative to the bundle's first instruction. The unsigned predicates
//! treat unordered (U set) as taken, so NaN comparisons fall through to
//! the "unsigned" side.

use super::bits::sext_bits;
use super::opcode::{BruOp, Opcode};
use super::registers::{C_MASK, N_MASK, O_MASK, REG_LR, U_MASK, Z_MASK};
use super::Core;
use crate::device::memory::Memory;

impl<M: Memory> Core<M> {
    pub(super) fn execute_bru(&mut self, op: Opcode, imm24: u64) {
        let bru_op = match BruOp::decode(op) {
            Some(bru_op) => bru_op,
            None => panic!("unknown BRU operation, opcode {:#010X}", op.raw()),
        };

        let rel23 = (sext_bits(op.bru_imm23() as u64, 23) ^ (imm24 << 22)) as i64;
        let rel24 = (sext_bits(op.bru_imm24() as u64, 24) ^ (imm24 << 23)) as i64;
        let abs24 = op.bru_imm24() as u64 | (imm24 << 24);
        let lr_value = self.regs.pc.wrapping_add(1 + op.is_bundle() as u32) as u64;

        match bru_op {
            BruOp::Beq
            | BruOp::Bne
            | BruOp::Blt
            | BruOp::Bge
            | BruOp::Bltu
            | BruOp::Bgeu
            | BruOp::Bequ
            | BruOp::Bneu => {
                if self.branch_taken(bru_op) {
                    self.add_pc(rel23);
                }
            }

            BruOp::Bra => self.add_pc(rel24),

            BruOp::Callr => {
                self.regs.gpi[REG_LR as usize] = lr_value;
                self.add_pc(rel24);
            }

            BruOp::Jump => self.regs.pc = abs24 as u32,

            BruOp::Call => {
                self.regs.gpi[REG_LR as usize] = lr_value;
                self.regs.pc = abs24 as u32;
            }

            BruOp::Indirectcallr => {
                self.regs.gpi[op.reg_a() as usize] = lr_value;
                self.add_pc(self.regs.gpi[op.reg_b() as usize] as i64);
            }

            BruOp::Indirectcall => {
                self.regs.gpi[op.reg_a() as usize] = lr_value;
                self.regs.pc = self.regs.gpi[op.reg_b() as usize] as u32;
            }
        }
    }

    /// Evaluate a conditional-branch predicate against FR.
    fn branch_taken(&self, op: BruOp) -> bool {
        let z = self.regs.flag(Z_MASK);
        let c = self.regs.flag(C_MASK);
        let n = self.regs.flag(N_MASK);
        let o = self.regs.flag(O_MASK);
        let u = self.regs.flag(U_MASK);

        match op {
            BruOp::Beq => z && !u,
            BruOp::Bne => !z && !u,
            BruOp::Blt => (n != o) && !u,
            BruOp::Bge => (z || n == o) && !u,
            BruOp::Bltu => c || u,
            BruOp::Bgeu => z || !c || u,
            BruOp::Bequ => z || u,
            BruOp::Bneu => !z || u,
            _ => unreachable!("{:?} is not a conditional branch", op),
        }
    }

    fn add_pc(&mut self, offset: i64) {
        self.regs.pc = (self.regs.pc as i64).wrapping_add(offset) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::super::opcode::{build, size, AluOp, FpuOp};
    use super::*;
    use crate::device::memory::VmMemory;
    use crate::interpreter::bits::{f32_to_bits, f64_to_bits};

    fn make_core() -> Core<VmMemory> {
        Core::new(VmMemory::new(0x1000, 0x1000))
    }

    fn run(core: &mut Core<VmMemory>, op: Opcode) -> u32 {
        core.execute(op, build::nop())
    }

    /// Run an integer CMP then a conditional branch; report whether it took.
    fn branch_after_cmp(
        core: &mut Core<VmMemory>,
        width: u32,
        left: u64,
        right: u64,
        op: BruOp,
    ) -> bool {
        core.registers_mut().gpi[1] = left;
        core.registers_mut().gpi[2] = right;
        assert_eq!(run(core, build::alu_reg(AluOp::Cmp, width, 0, 1, 2, 0)), 1);

        core.registers_mut().pc = 42;
        let retired = run(core, build::bru_branch(op, 1));
        match retired {
            0 => {
                assert_eq!(core.registers().pc, 43);
                true
            }
            1 => {
                assert_eq!(core.registers().pc, 42);
                false
            }
            _ => unreachable!(),
        }
    }

    /// Run an FCMP then a conditional branch; report whether it took.
    fn branch_after_fcmp(core: &mut Core<VmMemory>, left: f32, right: f32, op: BruOp) -> bool {
        core.registers_mut().gpf[1] = f32_to_bits(left);
        core.registers_mut().gpf[2] = f32_to_bits(right);
        run(core, build::fpu(FpuOp::Fcmp, size::SINGLE, 0, 1, 2));

        core.registers_mut().pc = 42;
        run(core, build::bru_branch(op, 1)) == 0
    }

    // ========== Signed predicates ==========

    #[test]
    fn test_signed_branches_match_comparison() {
        let mut core = make_core();

        let samples: &[(i64, i64)] = &[
            (0, 0),
            (-1, 0),
            (0, -1),
            (127, -1),
            (-1, 127),
            (i64::MIN, i64::MAX),
            (i64::MAX, i64::MIN),
            (42, 42),
        ];

        for &(l, r) in samples {
            let (lu, ru) = (l as u64, r as u64);
            assert_eq!(
                branch_after_cmp(&mut core, size::DWORD, lu, ru, BruOp::Beq),
                l == r,
                "beq {l} {r}"
            );
            assert_eq!(
                branch_after_cmp(&mut core, size::DWORD, lu, ru, BruOp::Bne),
                l != r,
                "bne {l} {r}"
            );
            assert_eq!(
                branch_after_cmp(&mut core, size::DWORD, lu, ru, BruOp::Blt),
                l < r,
                "blt {l} {r}"
            );
            assert_eq!(
                branch_after_cmp(&mut core, size::DWORD, lu, ru, BruOp::Bge),
                l >= r,
                "bge {l} {r}"
            );
        }
    }

    #[test]
    fn test_signed_branches_at_byte_width() {
        let mut core = make_core();

        // 0x7F vs 0xFF is 127 vs -1 at byte width: the subtraction overflows
        // but BLT still answers the signed question
        assert!(!branch_after_cmp(&mut core, size::BYTE, 0x7F, 0xFF, BruOp::Blt));
        assert!(branch_after_cmp(&mut core, size::BYTE, 0x7F, 0xFF, BruOp::Bge));
        assert!(branch_after_cmp(&mut core, size::BYTE, 0xFF, 0x7F, BruOp::Blt));
        assert!(!branch_after_cmp(&mut core, size::BYTE, 0xFF, 0x7F, BruOp::Bge));
    }

    // ========== Unsigned predicates ==========

    #[test]
    fn test_unsigned_branches_match_comparison() {
        let mut core = make_core();

        let samples: &[(u64, u64)] = &[
            (0, 0),
            (0, u64::MAX),
            (u64::MAX, 0),
            (1, 2),
            (2, 1),
            (7, 7),
        ];

        for &(l, r) in samples {
            assert_eq!(
                branch_after_cmp(&mut core, size::DWORD, l, r, BruOp::Bltu),
                l < r,
                "bltu {l} {r}"
            );
            assert_eq!(
                branch_after_cmp(&mut core, size::DWORD, l, r, BruOp::Bgeu),
                l >= r,
                "bgeu {l} {r}"
            );
        }
    }

    // ========== FP predicates and unordered ==========

    #[test]
    fn test_fp_branches() {
        let mut core = make_core();

        // +0.0 and -0.0 compare equal
        assert!(branch_after_fcmp(&mut core, 0.0, -0.0, BruOp::Beq));
        assert!(branch_after_fcmp(&mut core, 0.0, -0.0, BruOp::Bequ));
        assert!(!branch_after_fcmp(&mut core, 0.0, -0.0, BruOp::Bne));

        assert!(branch_after_fcmp(&mut core, 1.0, 2.0, BruOp::Blt));
        assert!(branch_after_fcmp(&mut core, 1.0, 2.0, BruOp::Bltu));
        assert!(!branch_after_fcmp(&mut core, 2.0, 1.0, BruOp::Blt));
        assert!(branch_after_fcmp(&mut core, 2.0, 1.0, BruOp::Bge));
    }

    #[test]
    fn test_unordered_takes_unsigned_side_only() {
        let mut core = make_core();

        // NaN: the ordered predicates never take, the U-tolerant ones always do
        assert!(!branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Beq));
        assert!(!branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Bne));
        assert!(!branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Blt));
        assert!(!branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Bge));
        assert!(branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Bequ));
        assert!(branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Bneu));
        assert!(branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Bltu));
        assert!(branch_after_fcmp(&mut core, f32::NAN, 1.0, BruOp::Bgeu));
    }

    // ========== Unconditional and calls ==========

    #[test]
    fn test_bra_adds_signed_offset() {
        let mut core = make_core();
        core.registers_mut().pc = 100;

        assert_eq!(run(&mut core, build::bru_relative(BruOp::Bra, -30)), 0);
        assert_eq!(core.registers().pc, 70);
    }

    #[test]
    fn test_callr_links_and_jumps() {
        let mut core = make_core();
        core.registers_mut().pc = 100;

        run(&mut core, build::bru_relative(BruOp::Callr, 20));
        assert_eq!(core.registers().pc, 120);
        assert_eq!(core.registers().gpi[REG_LR as usize], 101);

        // Inside a bundle the return address skips both words
        core.registers_mut().pc = 100;
        let [first, second] =
            build::bundle(build::bru_relative(BruOp::Callr, 20), build::moveix(0));
        core.execute(first, second);
        assert_eq!(core.registers().gpi[REG_LR as usize], 102);
    }

    #[test]
    fn test_jump_and_call_absolute() {
        let mut core = make_core();
        core.registers_mut().pc = 5;

        run(&mut core, build::bru_absolute(BruOp::Jump, 0x1234));
        assert_eq!(core.registers().pc, 0x1234);

        core.registers_mut().pc = 5;
        run(&mut core, build::bru_absolute(BruOp::Call, 0x4321));
        assert_eq!(core.registers().pc, 0x4321);
        assert_eq!(core.registers().gpi[REG_LR as usize], 6);
    }

    #[test]
    fn test_indirect_calls() {
        let mut core = make_core();
        core.registers_mut().pc = 50;
        core.registers_mut().gpi[4] = (-10i64) as u64;

        run(&mut core, build::bru_indirect(BruOp::Indirectcallr, 20, 4));
        assert_eq!(core.registers().pc, 40);
        assert_eq!(core.registers().gpi[20], 51);

        core.registers_mut().pc = 50;
        core.registers_mut().gpi[4] = 0x2000;
        run(&mut core, build::bru_indirect(BruOp::Indirectcall, 21, 4));
        assert_eq!(core.registers().pc, 0x2000);
        assert_eq!(core.registers().gpi[21], 51);
    }

    // ========== Extended targets ==========

    #[test]
    fn test_branch_offset_with_moveix() {
        let mut core = make_core();
        core.registers_mut().fr = Z_MASK;
        core.registers_mut().pc = 0;

        let offset = 0x80_0000i64; // beyond the 23-bit field
        let [first, second] = build::bundle(
            build::bru_branch(BruOp::Beq, offset),
            build::moveix(build::bru_branch_extension(offset)),
        );
        assert_eq!(core.execute(first, second), 0);
        assert_eq!(core.registers().pc, 0x80_0000);
    }

    #[test]
    fn test_absolute_target_with_moveix() {
        let mut core = make_core();

        // 0x0300_0000 needs the extension's upper bits
        let [first, second] = build::bundle(
            build::bru_absolute(BruOp::Jump, 0),
            build::moveix(0x03),
        );
        core.execute(first, second);
        assert_eq!(core.registers().pc, 0x0300_0000);
    }

    #[test]
    #[should_panic(expected = "unknown BRU operation")]
    fn test_unknown_bru_operation_panics() {
        let mut core = make_core();
        use super::super::opcode::unit;
        run(&mut core, Opcode::new((unit::BRU << 1) | (15 << 4)));
    }
}
