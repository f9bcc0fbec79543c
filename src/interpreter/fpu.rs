//! Floating-point unit.
//!
//! Size 0 is single precision, size 1 double. Size 3 turns the first eight
//! opcode ids into conversions (FADD→HTOF, FSUB→FTOH, FMUL→ITOF,
//! FNMUL→FTOI, FMIN→FTOD, FMAX→DTOF, FNEG→ITOD, FABS→DTOI); dispatch is an
//! explicit per-size match.
//!
//! Arithmetic write-backs coerce any non-real result (NaN, infinity,
//! subnormal) to a quiet NaN. Bit-copy operations (FMOVE, FCMOVE, the
//! comparison results and conversion outputs that are integers or halves)
//! write raw bits. Every write-back also lands in the slot's BF bypass.

use super::bits::{
    f32_from_bits, f32_to_bits, f64_from_bits, f64_to_bits, float_to_half, half_to_float,
    is_real_f32, is_real_f64,
};
use super::opcode::{FpuOp, Opcode};
use super::registers::{RegisterSet, C_MASK, N_MASK, O_MASK, REG_ACC, REG_BF1, U_MASK, Z_MASK};
use super::Core;
use crate::device::memory::Memory;

/// FCMP outcome: unordered when either operand is non-real, otherwise
/// Z mirrors equality and both N and C mirror "less".
fn fcmp_flags(regs: &mut RegisterSet, ordered: bool, equal: bool, less: bool) {
    if !ordered {
        regs.fr = U_MASK;
        return;
    }

    regs.assign_flag(Z_MASK, equal);
    regs.assign_flag(N_MASK, less);
    regs.assign_flag(C_MASK, less);
    regs.assign_flag(O_MASK, false);
    regs.assign_flag(U_MASK, false);
}

impl<M: Memory> Core<M> {
    pub(super) fn execute_fpu(&mut self, op: Opcode, slot: u32) {
        let fpu_op = match FpuOp::decode(op) {
            Some(fpu_op) => fpu_op,
            None => panic!("unknown FPU operation, opcode {:#010X}", op.raw()),
        };

        let size = op.size();
        let left = self.fpu_read(op.reg_b(), slot);
        let right = self.fpu_read(op.reg_c(), slot);
        let lf = f32_from_bits(left);
        let rf = f32_from_bits(right);
        let ld = f64_from_bits(left);
        let rd = f64_from_bits(right);

        match (fpu_op, size) {
            (FpuOp::Fadd, 0) => self.fpu_write_f32(op, slot, lf + rf),
            (FpuOp::Fadd, 1) => self.fpu_write_f64(op, slot, ld + rd),
            // HTOF
            (FpuOp::Fadd, 3) => self.fpu_write_f32(op, slot, half_to_float(left as u16)),

            (FpuOp::Fsub, 0) => self.fpu_write_f32(op, slot, lf - rf),
            (FpuOp::Fsub, 1) => self.fpu_write_f64(op, slot, ld - rd),
            // FTOH: the result is a 16-bit pattern, written as raw bits
            (FpuOp::Fsub, 3) => self.fpu_write_raw(op, slot, float_to_half(lf) as u64),

            (FpuOp::Fmul, 0) => self.fpu_write_f32(op, slot, lf * rf),
            (FpuOp::Fmul, 1) => self.fpu_write_f64(op, slot, ld * rd),
            // ITOF
            (FpuOp::Fmul, 3) => self.fpu_write_f32(op, slot, left as i64 as f32),

            (FpuOp::Fnmul, 0) => self.fpu_write_f32(op, slot, -lf * rf),
            (FpuOp::Fnmul, 1) => self.fpu_write_f64(op, slot, -ld * rd),
            // FTOI, truncating toward zero
            (FpuOp::Fnmul, 3) => self.fpu_write_raw(op, slot, lf as i64 as u64),

            (FpuOp::Fmin, 0) => self.fpu_write_f32(op, slot, if rf < lf { rf } else { lf }),
            (FpuOp::Fmin, 1) => self.fpu_write_f64(op, slot, if rd < ld { rd } else { ld }),
            // FTOD
            (FpuOp::Fmin, 3) => self.fpu_write_f64(op, slot, lf as f64),

            (FpuOp::Fmax, 0) => self.fpu_write_f32(op, slot, if lf < rf { rf } else { lf }),
            (FpuOp::Fmax, 1) => self.fpu_write_f64(op, slot, if ld < rd { rd } else { ld }),
            // DTOF
            (FpuOp::Fmax, 3) => self.fpu_write_f32(op, slot, ld as f32),

            (FpuOp::Fneg, 0) => self.fpu_write_f32(op, slot, -lf),
            (FpuOp::Fneg, 1) => self.fpu_write_f64(op, slot, -ld),
            // ITOD
            (FpuOp::Fneg, 3) => self.fpu_write_f64(op, slot, left as i64 as f64),

            (FpuOp::Fabs, 0) => self.fpu_write_f32(op, slot, lf.abs()),
            (FpuOp::Fabs, 1) => self.fpu_write_f64(op, slot, ld.abs()),
            // DTOI, truncating toward zero
            (FpuOp::Fabs, 3) => self.fpu_write_raw(op, slot, ld as i64 as u64),

            (FpuOp::Fmove, _) => self.fpu_write_raw(op, slot, left),

            (FpuOp::Fcmove, _) => {
                if left != 0 {
                    self.fpu_write_raw(op, slot, right);
                }
            }

            (FpuOp::Fe, 0) => self.fpu_write_raw(op, slot, (lf == rf) as u64),
            (FpuOp::Fe, 1) => self.fpu_write_raw(op, slot, (ld == rd) as u64),
            (FpuOp::Fen, 0) => self.fpu_write_raw(op, slot, (lf != rf) as u64),
            (FpuOp::Fen, 1) => self.fpu_write_raw(op, slot, (ld != rd) as u64),
            (FpuOp::Fslt, 0) => self.fpu_write_raw(op, slot, (lf < rf) as u64),
            (FpuOp::Fslt, 1) => self.fpu_write_raw(op, slot, (ld < rd) as u64),

            (FpuOp::Fcmp, 0) => fcmp_flags(
                &mut self.regs,
                is_real_f32(lf) && is_real_f32(rf),
                lf == rf,
                lf < rf,
            ),
            (FpuOp::Fcmp, 1) => fcmp_flags(
                &mut self.regs,
                is_real_f64(ld) && is_real_f64(rd),
                ld == rd,
                ld < rd,
            ),

            _ => panic!("cannot perform FPU operation {:?} with size {}", fpu_op, size),
        }
    }

    /// Read an FP register, redirecting ACC to the slot's BF bypass.
    fn fpu_read(&self, reg: u32, slot: u32) -> u64 {
        if reg == REG_ACC {
            self.regs.gpf[(REG_BF1 + slot) as usize]
        } else {
            self.regs.gpf[reg as usize]
        }
    }

    /// Write a single-precision result, coercing non-reals to a quiet NaN.
    fn fpu_write_f32(&mut self, op: Opcode, slot: u32, value: f32) {
        let value = if is_real_f32(value) { value } else { f32::NAN };
        self.fpu_write_raw(op, slot, f32_to_bits(value));
    }

    /// Write a double-precision result, coercing non-reals to a quiet NaN.
    fn fpu_write_f64(&mut self, op: Opcode, slot: u32, value: f64) {
        let value = if is_real_f64(value) { value } else { f64::NAN };
        self.fpu_write_raw(op, slot, f64_to_bits(value));
    }

    /// Write raw bits to `reg_a` and the slot's bypass; only the bypass when
    /// the destination is ACC.
    fn fpu_write_raw(&mut self, op: Opcode, slot: u32, bits: u64) {
        self.regs.gpf[(REG_BF1 + slot) as usize] = bits;
        if op.reg_a() != REG_ACC {
            self.regs.gpf[op.reg_a() as usize] = bits;
        }
    }
}
