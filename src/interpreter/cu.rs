//! Control unit (slot 1 only).
//!
//! SYSCALL latches the return address into IR, parks PC at the syscall
//! vector and raises the pending flag for the driver's interlock. RETI
//! returns through IR. The remaining operations are reserved.

use super::opcode::{CuOp, Opcode};
use super::{Core, SYSCALL_VECTOR};
use crate::device::memory::Memory;

impl<M: Memory> Core<M> {
    pub(super) fn execute_cu(&mut self, op: Opcode) {
        let cu_op = match CuOp::decode(op) {
            Some(cu_op) => cu_op,
            None => panic!("unknown CU operation, opcode {:#010X}", op.raw()),
        };

        match cu_op {
            CuOp::Syscall => {
                self.regs.ir = self.regs.pc.wrapping_add(1 + op.is_bundle() as u32);
                self.regs.pc = SYSCALL_VECTOR;
                self.syscall_pending = true;
            }

            CuOp::Reti => self.regs.pc = self.regs.ir,

            CuOp::Getir | CuOp::Setfr | CuOp::Mmu | CuOp::Sync => {
                panic!("CU operation {:?} is not implemented", cu_op)
            }
        }
    }
}
