//! Instruction-set interpreter for the AltairX K1.
//!
//! The K1 is a 64-bit VLIW processor: each cycle fetches a pair of 32-bit
//! words and executes them as one bundle. The second word is either the
//! slot-1 instruction or a MOVEIX extending the first word's immediate by
//! 24 bits.
//!
//! # Module Organization
//!
//! - [`bits`]: truncation, sign extension, bit punning, half conversion
//! - [`opcode`]: instruction word view, operation tables, encoders
//! - [`registers`]: architectural register state and flag masks
//! - [`Core`]: bundle dispatch, cycle loop, scratch-pad, syscall interlock
//! - `alu`/`mdu`/`lsu`/`fpu`/`efu`/`bru`/`cu`: the per-unit executors
//!
//! # Issue dispatch
//!
//! Units are dispatched on the issue id `(slot << 3) | unit`:
//!
//! | Unit | Slot 0 | Slot 1 |
//! |------|--------|--------|
//! | 0    | ALU    | ALU    |
//! | 1    | ALU    | ALU    |
//! | 2    | LSU    | LSU    |
//! | 3    | FPU    | FPU    |
//! | 5    | EFU    | CU     |
//! | 6    | MDU    | VU     |
//! | 7    | BRU    | —      |

pub mod bits;
pub mod opcode;
pub mod registers;

mod alu;
mod bru;
mod cu;
mod efu;
mod fpu;
mod lsu;
mod mdu;

use crate::debug::{Breakpoint, BreakpointSet, SymbolTable};
use crate::device::memory::Memory;

use opcode::Opcode;
use registers::{RegisterSet, REG_ZERO};

/// Scratch-pad size in bytes.
pub const SPM_SIZE: usize = 0x4000;

/// Word address PC is parked at while a syscall is pending.
pub const SYSCALL_VECTOR: u32 = 0x8000_0000;

/// Consecutive all-zero instruction pairs tolerated before a debug build
/// assumes a branch went into unmapped memory (zeroed words are no-ops).
#[cfg(debug_assertions)]
const NOP_RUN_LIMIT: u32 = 1 << 20;

/// A single K1 core bound to its memory subsystem.
///
/// The core is single-threaded: one `cycle()` at a time, no internal locks.
/// Drive it from one thread and inspect it from others only while the driver
/// is stopped or parked at a syscall.
pub struct Core<M> {
    regs: RegisterSet,
    memory: M,
    spm: Box<[u8]>,
    error: i32,
    syscall_pending: bool,
    breakpoints: BreakpointSet,
    symbols: SymbolTable,
    #[cfg(debug_assertions)]
    nop_run: u32,
}

impl<M: Memory> Core<M> {
    /// Create a core with zeroed registers and scratch-pad.
    pub fn new(memory: M) -> Self {
        Self {
            regs: RegisterSet::new(),
            memory,
            spm: vec![0; SPM_SIZE].into_boxed_slice(),
            error: 0,
            syscall_pending: false,
            breakpoints: BreakpointSet::new(),
            symbols: SymbolTable::new(),
            #[cfg(debug_assertions)]
            nop_run: 0,
        }
    }

    /// Architectural register state.
    pub fn registers(&self) -> &RegisterSet {
        &self.regs
    }

    /// Mutable register state (loaders, syscall handlers, tests).
    pub fn registers_mut(&mut self) -> &mut RegisterSet {
        &mut self.regs
    }

    /// The memory collaborator.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable access to the memory collaborator.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// The core-owned scratch-pad bytes.
    pub fn spm(&self) -> &[u8] {
        &self.spm
    }

    /// Mutable scratch-pad bytes.
    pub fn spm_mut(&mut self) -> &mut [u8] {
        &mut self.spm
    }

    /// Error code set by collaborators; non-zero stops the driver loop.
    pub fn error(&self) -> i32 {
        self.error
    }

    /// Record a collaborator error on the core.
    pub fn set_error(&mut self, code: i32) {
        self.error = code;
    }

    /// Breakpoints keyed by byte address.
    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    /// Mutable breakpoint set.
    pub fn breakpoints_mut(&mut self) -> &mut BreakpointSet {
        &mut self.breakpoints
    }

    /// Symbol table for address lookups.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Mutable symbol table.
    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// The breakpoint at the current byte PC, if any (enabled or not; the
    /// driver decides whether to honor it).
    pub fn hit_breakpoint(&self) -> Option<&Breakpoint> {
        let byte_pc = (self.regs.pc & 0x7FFF_FFFF) as u64 * 4;
        self.breakpoints.at(byte_pc)
    }

    /// Whether a SYSCALL retired without the host handler having run yet.
    pub fn syscall_pending(&self) -> bool {
        self.syscall_pending
    }

    /// Run the host syscall handler if a SYSCALL is pending.
    ///
    /// Returns `true` exactly once per SYSCALL: the pending flag is cleared
    /// and `handler` observes the post-SYSCALL state (PC parked at
    /// [`SYSCALL_VECTOR`], IR holding the return address). The driver must
    /// call this after each cycle; the guest cannot make progress while the
    /// flag is set.
    pub fn take_syscall<F>(&mut self, handler: F) -> bool
    where
        F: FnOnce(&mut Self),
    {
        if !self.syscall_pending {
            return false;
        }

        self.syscall_pending = false;
        handler(self);
        true
    }

    /// Emulate one whole cycle: fetch the pair at PC, execute it as a
    /// bundle, update the counters and advance PC.
    pub fn cycle(&mut self) {
        let real_pc = self.regs.pc & 0x7FFF_FFFF;
        let [first, second] = self.memory.fetch(real_pc);

        #[cfg(debug_assertions)]
        {
            if first == 0 && second == 0 {
                self.nop_run += 1;
                assert!(
                    self.nop_run < NOP_RUN_LIMIT,
                    "{} consecutive no-op words at pc {:#010X}; branch into unmapped memory?",
                    NOP_RUN_LIMIT,
                    real_pc,
                );
            } else {
                self.nop_run = 0;
            }
        }

        let retired = self.execute(Opcode::new(first), Opcode::new(second));

        self.regs.cc = self.regs.cc.wrapping_add(1);
        self.regs.ic = self.regs.ic.wrapping_add(retired);
        self.regs.pc = self.regs.pc.wrapping_add(retired);
    }

    /// Execute a bundle and return the number of words retired in place
    /// (0 when a branch moved PC, otherwise 1 or 2).
    pub fn execute(&mut self, first: Opcode, second: Opcode) -> u32 {
        let old_pc = self.regs.pc;

        // The extension immediate exists only when the pair is
        // bundle + MOVEIX; the MOVEIX itself is not executed.
        let imm24 = if first.is_bundle() && second.is_moveix() {
            second.moveix_imm24() as u64
        } else {
            0
        };

        self.execute_unit(first, 0, imm24);

        if first.is_bundle() && !second.is_moveix() {
            self.execute_unit(second, 1, imm24);
        }

        if old_pc != self.regs.pc {
            // A jump happened; the caller fetches from the new PC next.
            return 0;
        }

        if first.is_bundle() {
            2
        } else {
            1
        }
    }

    fn execute_unit(&mut self, op: Opcode, slot: u32, imm24: u64) {
        // r63/v63 read as zero no matter what was written to them
        self.regs.gpi[REG_ZERO as usize] = 0;
        self.regs.gpf[REG_ZERO as usize] = 0;

        let issue = (slot << 3) | op.unit();
        match issue {
            0 | 1 | 8 | 9 => self.execute_alu(op, slot, imm24),
            2 | 10 => self.execute_lsu(op, slot, imm24),
            3 | 11 => self.execute_fpu(op, slot),
            5 => self.execute_efu(op),
            6 => self.execute_mdu(op, imm24),
            7 => self.execute_bru(op, imm24),
            13 => self.execute_cu(op),
            14 => panic!("vector unit is unsupported, opcode {:#010X}", op.raw()),
            _ => panic!("invalid issue id {} for opcode {:#010X}", issue, op.raw()),
        }
    }

    /// Load `1 << size` bytes from `addr`, zero-extended to 64 bits.
    ///
    /// A memory fault logs, records the error code on the core and yields 0.
    pub(crate) fn do_load(&mut self, addr: u64, size: u32) -> u64 {
        let count = 1usize << (size & 3);
        let mut buf = [0u8; 8];
        match self.memory.load(&mut self.spm, &mut buf[..count], addr) {
            Ok(()) => u64::from_le_bytes(buf),
            Err(err) => {
                log::error!("load of {count} bytes at {addr:#X} failed: {err}");
                self.error = err.code();
                0
            }
        }
    }

    /// Store the low `1 << size` bytes of `src` at `addr`.
    pub(crate) fn do_store(&mut self, src: u64, addr: u64, size: u32) {
        let count = 1usize << (size & 3);
        let bytes = src.to_le_bytes();
        if let Err(err) = self.memory.store(&mut self.spm, &bytes[..count], addr) {
            log::error!("store of {count} bytes at {addr:#X} failed: {err}");
            self.error = err.code();
        }
    }
}
