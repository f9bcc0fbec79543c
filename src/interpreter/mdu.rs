//! Multiply/divide unit.
//!
//! Results land in the four MDU registers (Q, QR, PL, PH) rather than the
//! GPR file; GETMD/SETMD move values between the two. PH is reserved for a
//! future widening multiply and is never produced here.
//!
//! The unsigned variants sign-extend the right operand before use. That
//! matches the reference hardware model and is pinned by tests.

use super::bits::{sext_bits, sext_size, trunc};
use super::opcode::{MduOp, Opcode};
use super::Core;
use crate::device::memory::Memory;

impl<M: Memory> Core<M> {
    pub(super) fn execute_mdu(&mut self, op: Opcode, imm24: u64) {
        let mdu_op = match MduOp::decode(op) {
            Some(mdu_op) => mdu_op,
            None => panic!("unknown MDU operation, opcode {:#010X}", op.raw()),
        };

        let size = op.size();
        let left = self.regs.gpi[op.reg_b() as usize];
        let right = if op.alu_has_imm() {
            sext_bits(op.alu_imm9() as u64, 9) ^ (imm24 << 8)
        } else {
            self.regs.gpi[op.reg_c() as usize] << op.alu_shift()
        };

        match mdu_op {
            MduOp::Div => {
                let l = sext_size(trunc(left, size), size) as i64;
                let r = sext_size(trunc(right, size), size) as i64;
                if r == 0 {
                    panic!("divide by zero in MDU DIV");
                }
                self.regs.mdu[0] = trunc(l.wrapping_div(r) as u64, size);
                self.regs.mdu[1] = trunc(l.wrapping_rem(r) as u64, size);
            }

            MduOp::Divu => {
                let l = trunc(left, size);
                let r = sext_size(trunc(right, size), size);
                if r == 0 {
                    panic!("divide by zero in MDU DIVU");
                }
                self.regs.mdu[0] = trunc(l / r, size);
                self.regs.mdu[1] = trunc(l % r, size);
            }

            MduOp::Mul => {
                let l = sext_size(trunc(left, size), size) as i64;
                let r = sext_size(trunc(right, size), size) as i64;
                self.regs.mdu[2] = trunc(l.wrapping_mul(r) as u64, size);
            }

            MduOp::Mulu => {
                let l = trunc(left, size);
                let r = sext_size(trunc(right, size), size);
                self.regs.mdu[2] = trunc(l.wrapping_mul(r), size);
            }

            MduOp::Getmd => {
                self.regs.gpi[op.reg_a() as usize] = self.regs.mdu[op.mdu_pq() as usize];
            }

            MduOp::Setmd => {
                self.regs.mdu[op.mdu_pq() as usize] = self.regs.gpi[op.reg_a() as usize];
            }
        }
    }
}
