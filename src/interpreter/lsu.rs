//! Load/store unit.
//!
//! Two address forms: register + scaled register (`b + (c << shift)`) and
//! register + signed immediate offset, the offset extended by a bundled
//! MOVEIX (`sext10(imm10) ^ (imm24 << 9)`).
//!
//! Integer loads zero-extend, LDS/LDIS sign-extend. FP transfers use the
//! FP register file at single/double width. All accesses delegate to the
//! memory collaborator with a byte address.

use super::bits::{sext_bits, sext_size};
use super::opcode::{LsuOp, Opcode};
use super::registers::{REG_ACC, REG_BL1};
use super::Core;
use crate::device::memory::Memory;

impl<M: Memory> Core<M> {
    pub(super) fn execute_lsu(&mut self, op: Opcode, slot: u32, imm24: u64) {
        let lsu_op = match LsuOp::decode(op) {
            Some(lsu_op) => lsu_op,
            None => panic!("unknown LSU operation, opcode {:#010X}", op.raw()),
        };

        let size = op.size();
        // Single maps to 32-bit, double to 64-bit
        let fsize = size + 2;

        let addr_reg = self
            .lsu_read(op.reg_b(), slot)
            .wrapping_add(self.lsu_read(op.reg_c(), slot) << op.lsu_shift());

        let offset = sext_bits(op.lsu_imm10() as u64, 10) ^ (imm24 << 9);
        let addr_imm = (self.lsu_read(op.reg_b(), slot) as i64).wrapping_add(offset as i64) as u64;

        match lsu_op {
            LsuOp::Ld => {
                let value = self.do_load(addr_reg, size);
                self.lsu_write(op, slot, value);
            }
            LsuOp::Lds => {
                let value = sext_size(self.do_load(addr_reg, size), size);
                self.lsu_write(op, slot, value);
            }
            LsuOp::Fld => {
                let value = self.do_load(addr_reg, fsize);
                self.lsu_write_float(op, slot, value);
            }
            LsuOp::St => self.do_store(self.regs.gpi[op.reg_a() as usize], addr_reg, size),
            LsuOp::Fst => self.do_store(self.regs.gpf[op.reg_a() as usize], addr_reg, fsize),

            LsuOp::Ldi => {
                let value = self.do_load(addr_imm, size);
                self.lsu_write(op, slot, value);
            }
            LsuOp::Ldis => {
                let value = sext_size(self.do_load(addr_imm, size), size);
                self.lsu_write(op, slot, value);
            }
            LsuOp::Fldi => {
                let value = self.do_load(addr_imm, fsize);
                self.lsu_write_float(op, slot, value);
            }
            LsuOp::Sti => self.do_store(self.regs.gpi[op.reg_a() as usize], addr_imm, size),
            LsuOp::Fsti => self.do_store(self.regs.gpf[op.reg_a() as usize], addr_imm, fsize),
        }
    }

    /// Read an integer register, redirecting ACC to the slot's LSU bypass.
    fn lsu_read(&self, reg: u32, slot: u32) -> u64 {
        if reg == REG_ACC {
            self.regs.gpi[(REG_BL1 + slot) as usize]
        } else {
            self.regs.gpi[reg as usize]
        }
    }

    /// Write a loaded value to `reg_a` and the slot's BL bypass.
    fn lsu_write(&mut self, op: Opcode, slot: u32, value: u64) {
        self.regs.gpi[op.reg_a() as usize] = value;
        self.regs.gpi[(REG_BL1 + slot) as usize] = value;
    }

    /// Write an FP load to the FP file and its slot bypass.
    fn lsu_write_float(&mut self, op: Opcode, slot: u32, value: u64) {
        self.regs.gpf[op.reg_a() as usize] = value;
        self.regs.gpf[(REG_BL1 + slot) as usize] = value;
    }
}
