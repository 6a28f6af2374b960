//! Processes: the file-descriptor table, the address space, exit and
//! wait. Scheduling and the user/kernel trampoline live outside the
//! core; what remains here is the state fork duplicates and exit tears
//! down.

mod fork;

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use array_macro::array;

use crate::error::{KernelError, Result};
use crate::fs::{OpenFile, Vnode};
use crate::hal::{Mmu, NoWait, WaitQueue};
use crate::kernel::Kernel;
use crate::lock::SpinLock;
use crate::param::NFILES;
use crate::vm::{handle_pagefault, FaultCause, VmMap};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcState {
    Running,
    /// Exited with a status; waits for the parent to reap it.
    Zombie(i32),
}

pub(crate) struct ProcData {
    pub(crate) state: ProcState,
    pub(crate) cwd: Option<Arc<dyn Vnode>>,
    pub(crate) files: [Option<Arc<OpenFile>>; NFILES],
    pub(crate) children: Vec<Arc<Proc>>,
}

pub struct Proc {
    pid: usize,
    kernel: Arc<Kernel>,
    parent: Weak<Proc>,
    mmu: Arc<dyn Mmu>,
    vmmap: SpinLock<VmMap>,
    /// Where this process sleeps waiting for children; children wake
    /// it on exit.
    waitq: Arc<dyn WaitQueue>,
    data: SpinLock<ProcData>,
}

impl Proc {
    pub(crate) fn new_root(kernel: Arc<Kernel>) -> Arc<Proc> {
        let cwd: Arc<dyn Vnode> = kernel.root();
        Arc::new(Proc {
            pid: kernel.alloc_pid(),
            mmu: kernel.mmu().clone(),
            kernel,
            parent: Weak::new(),
            vmmap: SpinLock::new(VmMap::new()),
            waitq: Arc::new(NoWait),
            data: SpinLock::new(ProcData {
                state: ProcState::Running,
                cwd: Some(cwd),
                files: array![None; NFILES],
                children: Vec::new(),
            }),
        })
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn getpid(&self) -> usize {
        self.pid
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn vmmap(&self) -> &SpinLock<VmMap> {
        &self.vmmap
    }

    pub fn mmu(&self) -> &Arc<dyn Mmu> {
        &self.mmu
    }

    pub fn state(&self) -> ProcState {
        self.data.lock().state
    }

    pub(crate) fn cwd(&self) -> Arc<dyn Vnode> {
        self.data
            .lock()
            .cwd
            .clone()
            .expect("live process has a cwd")
    }

    pub(crate) fn set_cwd(&self, vnode: Arc<dyn Vnode>) {
        self.data.lock().cwd = Some(vnode);
    }

    /// The open file behind descriptor `fd`.
    pub fn fget(&self, fd: usize) -> Result<Arc<OpenFile>> {
        self.data
            .lock()
            .files
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(KernelError::BadFd)
    }

    /// The lowest empty descriptor slot.
    pub(crate) fn next_fd(&self) -> Result<usize> {
        let data = self.data.lock();
        data.files
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(KernelError::TooManyFiles)
    }

    pub(crate) fn check_fd(&self, fd: usize) -> Result<()> {
        if fd < NFILES {
            Ok(())
        } else {
            Err(KernelError::BadFd)
        }
    }

    pub(crate) fn set_fd(&self, fd: usize, file: Arc<OpenFile>) {
        self.data.lock().files[fd] = Some(file);
    }

    pub(crate) fn take_fd(&self, fd: usize) -> Result<Arc<OpenFile>> {
        self.data
            .lock()
            .files
            .get_mut(fd)
            .and_then(|slot| slot.take())
            .ok_or(KernelError::BadFd)
    }

    /// Descriptors currently open; refcount accounting in tests.
    pub fn open_fds(&self) -> usize {
        self.data
            .lock()
            .files
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Terminate this process: every descriptor closes, the working
    /// directory and the whole address space are released, and the
    /// parent is woken to reap the status.
    pub fn exit(&self, status: i32) {
        kdbg!("proc {}: exit({})", self.pid, status);
        {
            let mut data = self.data.lock();
            data.state = ProcState::Zombie(status);
            for slot in data.files.iter_mut() {
                *slot = None;
            }
            data.cwd = None;
            data.children.clear();
        }
        self.vmmap.lock().clear();
        self.mmu.flush_tlb();
        if let Some(parent) = self.parent.upgrade() {
            parent.waitq.wake_all();
        }
    }

    /// Reap an exited child: the named one, or any. `NoChild` when the
    /// pid is not a live child (or there are no children at all).
    pub fn waitpid(&self, pid: Option<usize>) -> Result<(usize, i32)> {
        loop {
            {
                let mut data = self.data.lock();
                if data.children.is_empty() {
                    return Err(KernelError::NoChild);
                }
                if let Some(pid) = pid {
                    if !data.children.iter().any(|child| child.pid == pid) {
                        return Err(KernelError::NoChild);
                    }
                }
                let reaped = data.children.iter().position(|child| {
                    pid.map_or(true, |pid| child.pid == pid)
                        && matches!(child.state(), ProcState::Zombie(_))
                });
                if let Some(idx) = reaped {
                    let child = data.children.remove(idx);
                    let status = match child.state() {
                        ProcState::Zombie(status) => status,
                        ProcState::Running => unreachable!(),
                    };
                    return Ok((child.pid, status));
                }
            }
            self.waitq.sleep()?;
        }
    }

    /// A user-mode fault. Bad accesses (no mapping, protection
    /// violation) kill the process with the fault status; the parent
    /// sees it through `waitpid`.
    pub fn handle_user_fault(&self, vaddr: usize, cause: FaultCause) -> Result<()> {
        let outcome = {
            let map = self.vmmap.lock();
            handle_pagefault(&map, &*self.mmu, vaddr, cause)
        };
        if let Err(KernelError::Fault) = outcome {
            kdbg!("proc {}: fault at {:#x}", self.pid, vaddr);
            self.exit(KernelError::Fault.errno());
        }
        outcome
    }
}
