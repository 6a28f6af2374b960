//! fork: duplicate the address space copy-on-write, the descriptor
//! table by reference.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::Result;
use crate::hal::NoWait;
use crate::lock::SpinLock;
use crate::param::{USER_PAGE_HIGH, USER_PAGE_LOW};
use crate::proc::{Proc, ProcData, ProcState};

impl Proc {
    /// The implementation of fork(2).
    ///
    /// The clone shares every memory object with the parent; private
    /// areas then get one fresh shadow per side, so the first write on
    /// either side copies into its own overlay. The parent's user range
    /// is unmapped so it re-faults through its new shadows. Register
    /// state and the child's zero return value belong to the (external)
    /// trampoline; nothing here fails in a way that leaves a partial
    /// child behind.
    pub fn fork(self: &Arc<Self>) -> Result<Arc<Proc>> {
        let child_map = {
            let mut parent_map = self.vmmap().lock();
            let mut child_map = parent_map.clone_map();
            parent_map.fork_shadow(&mut child_map);
            child_map
        };
        self.mmu().unmap_range(USER_PAGE_LOW, USER_PAGE_HIGH);
        self.mmu().flush_tlb();

        let child = {
            let data = self.data.lock();
            Arc::new(Proc {
                pid: self.kernel().alloc_pid(),
                kernel: self.kernel().clone(),
                parent: Arc::downgrade(self),
                mmu: self.mmu().clone(),
                vmmap: SpinLock::new(child_map),
                waitq: Arc::new(NoWait),
                data: SpinLock::new(ProcData {
                    state: ProcState::Running,
                    cwd: data.cwd.clone(),
                    // Each open file gains one reference; offsets stay
                    // shared.
                    files: data.files.clone(),
                    children: Vec::new(),
                }),
            })
        };
        self.data.lock().children.push(child.clone());
        kdbg!("proc {}: forked child {}", self.pid(), child.pid());
        Ok(child)
    }
}
