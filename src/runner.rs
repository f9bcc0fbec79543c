//! Execution driver and host syscall ABI.
//!
//! Two ways to drive a core:
//!
//! - [`run`]: a synchronous loop for the CLI, cycling until the guest exits
//!   or the core reports an error.
//! - [`Runner`]: a worker thread with a Stopped/Ready/Paused/Running status
//!   machine, batched cycles, breakpoint pausing and syscall dispatch.
//!   Inspection from other threads locks the machine, so it should happen
//!   while the runner is paused or stopped.
//!
//! # Syscall ABI
//!
//! GPR 1 carries the syscall id on entry and the return value on exit;
//! GPRs 2.. carry arguments. Ids: 1 `exit(code)`, 2 `stdio_read(fd, ptr,
//! len)`, 3 `stdio_write(fd, ptr, len)`. File handles 0/1/2 map to
//! stdin/stdout/stderr. Guest pointers are translated through the memory
//! collaborator's mapping.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::device::memory::{Memory, VmMemory};
use crate::interpreter::Core;

/// Syscall id: terminate execution with a code.
pub const SYSCALL_EXIT: u64 = 1;
/// Syscall id: read bytes from a file handle into guest memory.
pub const SYSCALL_STDIO_READ: u64 = 2;
/// Syscall id: write bytes from guest memory to a file handle.
pub const SYSCALL_STDIO_WRITE: u64 = 3;

/// Cycles executed per batch between status checks.
const CYCLE_BATCH: usize = 8 * 1024;

/// Driver status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// No program; one must be loaded before anything else.
    #[default]
    Stopped = 0,
    /// A program is loaded and ready to start.
    Ready = 1,
    /// Running but paused.
    Paused = 2,
    /// Running.
    Running = 3,
}

impl Status {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Status::Ready,
            2 => Status::Paused,
            3 => Status::Running,
            _ => Status::Stopped,
        }
    }
}

/// Run the reference syscall handler on a core parked at the syscall
/// vector. Returns the exit code when the guest asked to exit.
pub fn handle_syscall(core: &mut Core<VmMemory>) -> Option<i32> {
    let id = core.registers().gpi[1];
    match id {
        SYSCALL_EXIT => Some(core.registers().gpi[2] as i32),

        SYSCALL_STDIO_READ => {
            let fd = core.registers().gpi[2];
            let addr = core.registers().gpi[3];
            let len = core.registers().gpi[4] as usize;

            let count = match guest_buffer(core, addr, len) {
                Some(buffer) => match fd {
                    0 => std::io::stdin().read(buffer).unwrap_or(0),
                    _ => panic!("invalid file handle {fd} for stdio_read"),
                },
                None => 0,
            };
            core.registers_mut().gpi[1] = count as u64;
            None
        }

        SYSCALL_STDIO_WRITE => {
            let fd = core.registers().gpi[2];
            let addr = core.registers().gpi[3];
            let len = core.registers().gpi[4] as usize;

            let count = match guest_buffer(core, addr, len) {
                Some(buffer) => match fd {
                    1 => std::io::stdout().write(buffer).unwrap_or(0),
                    2 => std::io::stderr().write(buffer).unwrap_or(0),
                    _ => panic!("invalid file handle {fd} for stdio_write"),
                },
                None => 0,
            };
            core.registers_mut().gpi[1] = count as u64;
            None
        }

        _ => panic!("unknown syscall #{id}"),
    }
}

/// Translate a guest pointer and length into host bytes. A bad pointer or
/// length records an error on the core and yields nothing.
fn guest_buffer(core: &mut Core<VmMemory>, addr: u64, len: usize) -> Option<&mut [u8]> {
    enum Outcome {
        Ok,
        TooShort(usize),
        Err(crate::device::memory::MemoryError),
    }

    let outcome = match core.memory_mut().map(addr) {
        Ok(mapped) if len <= mapped.len() => Outcome::Ok,
        Ok(mapped) => Outcome::TooShort(mapped.len()),
        Err(err) => Outcome::Err(err),
    };

    match outcome {
        Outcome::Ok => Some(&mut core.memory_mut().map(addr).unwrap()[..len]),
        Outcome::TooShort(mapped_len) => {
            log::error!(
                "syscall buffer of {len} bytes at {addr:#X} exceeds the {} mapped bytes",
                mapped_len
            );
            core.set_error(2);
            None
        }
        Outcome::Err(err) => {
            log::error!("syscall buffer at {addr:#X} is not mapped: {err}");
            core.set_error(err.code());
            None
        }
    }
}

/// Drive a core synchronously until the guest exits or the core reports an
/// error. Returns the guest exit code, or the core error code.
pub fn run(core: &mut Core<VmMemory>) -> i32 {
    let mut exit_code = None;
    let mut counter = 0usize;
    let mut cycles = 0usize;
    let mut window_start = Instant::now();

    while core.error() == 0 && exit_code.is_none() {
        core.cycle();
        core.take_syscall(|core| exit_code = handle_syscall(core));

        counter += 1;
        cycles += 1;
        if counter > 1024 * 1024 {
            // Only look at the clock every so often
            let elapsed = window_start.elapsed().as_secs_f64();
            if elapsed > 1.0 {
                let frequency = cycles as f64 / elapsed;
                log::info!("frequency: {:.2} MHz", frequency / 1_000_000.0);
                window_start = Instant::now();
                cycles = 0;
            }
            counter = 0;
        }
    }

    exit_code.unwrap_or_else(|| core.error())
}

struct Shared {
    status: AtomicU8,
    shutdown: AtomicBool,
    machine: Mutex<Option<Core<VmMemory>>>,
    exit_code: Mutex<Option<i32>>,
}

impl Shared {
    fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: Status) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn compare_exchange_status(&self, expected: Status, desired: Status) -> bool {
        self.status
            .compare_exchange(
                expected as u8,
                desired as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Threaded execution driver.
///
/// Owns a worker thread that runs the loaded core in batches while the
/// status is [`Status::Running`]. Enabled breakpoints pause the runner;
/// the guest's `exit` stops it and records the exit code.
pub struct Runner {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Create a runner with its worker thread parked.
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            status: AtomicU8::new(Status::Stopped as u8),
            shutdown: AtomicBool::new(false),
            machine: Mutex::new(None),
            exit_code: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || worker_loop(&worker_shared));

        Self { shared, worker: Some(worker) }
    }

    /// Install a freshly prepared core; the runner becomes Ready.
    pub fn load(&self, core: Core<VmMemory>) {
        self.shared.set_status(Status::Stopped);
        *lock(&self.shared.machine) = Some(core);
        *lock(&self.shared.exit_code) = None;
        self.shared.set_status(Status::Ready);
    }

    /// Start a Ready runner, optionally paused. Returns whether it started.
    pub fn start(&self, paused: bool) -> bool {
        let desired = if paused { Status::Paused } else { Status::Running };
        self.shared.compare_exchange_status(Status::Ready, desired)
    }

    /// Pause a Running runner. Returns whether it was running.
    pub fn pause(&self) -> bool {
        self.shared.compare_exchange_status(Status::Running, Status::Paused)
    }

    /// Resume a Paused runner. Returns whether it was paused.
    pub fn resume(&self) -> bool {
        self.shared.compare_exchange_status(Status::Paused, Status::Running)
    }

    /// Force the runner to Stopped regardless of its current state.
    pub fn stop(&self) {
        self.shared.set_status(Status::Stopped);
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Exit code recorded by the guest's `exit` syscall, if any.
    pub fn exit_code(&self) -> Option<i32> {
        *lock(&self.shared.exit_code)
    }

    /// Inspect the loaded core. Blocks until the worker releases the
    /// machine, so call while paused or stopped.
    pub fn with_core<R>(&self, f: impl FnOnce(&Core<VmMemory>) -> R) -> Option<R> {
        lock(&self.shared.machine).as_ref().map(f)
    }

    /// Take the core out of the runner (stops it first).
    pub fn take_core(&self) -> Option<Core<VmMemory>> {
        self.stop();
        lock(&self.shared.machine).take()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.set_status(Status::Stopped);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn worker_loop(shared: &Shared) {
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }

        if shared.status() != Status::Running {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }

        let mut machine = lock(&shared.machine);
        let Some(core) = machine.as_mut() else {
            shared.set_status(Status::Stopped);
            continue;
        };

        for _ in 0..CYCLE_BATCH {
            if let Some(bp) = core.hit_breakpoint() {
                if bp.enabled {
                    shared.set_status(Status::Paused);
                    break;
                }
            }

            core.cycle();

            let mut exited = None;
            core.take_syscall(|core| exited = handle_syscall(core));
            if let Some(code) = exited {
                *lock(&shared.exit_code) = Some(code);
                shared.set_status(Status::Stopped);
                break;
            }

            if core.error() != 0 {
                log::error!("core error {}, stopping", core.error());
                shared.set_status(Status::Stopped);
                break;
            }

            // A syscall handler (or another thread) may have changed the
            // status; honor it before the next cycle
            if shared.status() != Status::Running {
                break;
            }
        }
    }
}
