//! Extended-function unit.
//!
//! Long-latency FP functions with a single output register, EFU-Q. Results
//! are not coerced: an infinity or NaN lands in EFU-Q as computed. SETEF and
//! GETEF move values between the FP file and EFU-Q.

use super::bits::{f32_from_bits, f32_to_bits, f64_from_bits, f64_to_bits};
use super::opcode::{EfuOp, Opcode};
use super::Core;
use crate::device::memory::Memory;

impl<M: Memory> Core<M> {
    pub(super) fn execute_efu(&mut self, op: Opcode) {
        let efu_op = match EfuOp::decode(op) {
            Some(efu_op) => efu_op,
            None => panic!("unknown EFU operation, opcode {:#010X}", op.raw()),
        };

        let left = self.regs.gpf[op.reg_b() as usize];
        let right = self.regs.gpf[op.reg_c() as usize];
        let lf = f32_from_bits(left);
        let rf = f32_from_bits(right);
        let ld = f64_from_bits(left);
        let rd = f64_from_bits(right);

        match (efu_op, op.size()) {
            (EfuOp::Fdiv, 0) => self.regs.efu_q = f32_to_bits(lf / rf),
            (EfuOp::Fdiv, 1) => self.regs.efu_q = f64_to_bits(ld / rd),

            (EfuOp::Fatan2, 0) => self.regs.efu_q = f32_to_bits(lf.atan2(rf)),
            (EfuOp::Fatan2, 1) => self.regs.efu_q = f64_to_bits(ld.atan2(rd)),

            (EfuOp::Fsqrt, 0) => self.regs.efu_q = f32_to_bits(lf.sqrt()),
            (EfuOp::Fsqrt, 1) => self.regs.efu_q = f64_to_bits(ld.sqrt()),

            (EfuOp::Fsin, 0) => self.regs.efu_q = f32_to_bits(lf.sin()),
            (EfuOp::Fsin, 1) => self.regs.efu_q = f64_to_bits(ld.sin()),

            (EfuOp::Fatan, 0) => self.regs.efu_q = f32_to_bits(lf.atan()),
            (EfuOp::Fatan, 1) => self.regs.efu_q = f64_to_bits(ld.atan()),

            (EfuOp::Fexp, 0) => self.regs.efu_q = f32_to_bits(lf.exp()),
            (EfuOp::Fexp, 1) => self.regs.efu_q = f64_to_bits(ld.exp()),

            (EfuOp::Invsqrt, 0) => self.regs.efu_q = f32_to_bits(1.0 / lf.sqrt()),
            (EfuOp::Invsqrt, 1) => self.regs.efu_q = f64_to_bits(1.0 / ld.sqrt()),

            (EfuOp::Setef, _) => self.regs.efu_q = self.regs.gpf[op.reg_a() as usize],
            (EfuOp::Getef, _) => self.regs.gpf[op.reg_a() as usize] = self.regs.efu_q,

            _ => panic!("cannot perform EFU operation {:?} with size {}", efu_op, op.size()),
        }
    }
}
