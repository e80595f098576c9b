use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::diagnostics::{isolate, DiagnosticSource, Diagnostics};
use super::host::Host;

/// A zero-argument unit of DOM work.
pub type Task = Box<dyn FnOnce() -> anyhow::Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Tick,
    Read,
    Write,
}

impl TaskPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// When a pending flush runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    /// On the host's next animation frame.
    #[default]
    Frame,
    /// On the host's microtask queue, without waiting for a frame.
    Sync,
}

/// Two-phase read/write queue drained once per quantum.
///
/// Work queued into a phase that is already draining never joins it; it waits
/// for the next quantum, which is scheduled before the flush returns.
pub struct TaskQueue {
    host: Rc<dyn Host>,
    diagnostics: Rc<Diagnostics>,
    ticks: RefCell<Vec<Task>>,
    reads: RefCell<Vec<Task>>,
    writes: RefCell<Vec<Task>>,
    flush_pending: Cell<bool>,
    mode: Cell<QueueMode>,
    quantum: Cell<u64>,
    this: Weak<TaskQueue>,
}

impl TaskQueue {
    pub fn new(host: Rc<dyn Host>, diagnostics: Rc<Diagnostics>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            host,
            diagnostics,
            ticks: RefCell::new(Vec::new()),
            reads: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            flush_pending: Cell::new(false),
            mode: Cell::new(QueueMode::Frame),
            quantum: Cell::new(0),
            this: this.clone(),
        })
    }

    pub fn mode(&self) -> QueueMode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: QueueMode) {
        self.mode.set(mode);
    }

    /// Number of flushes completed so far.
    pub fn quantum(&self) -> u64 {
        self.quantum.get()
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }

    pub fn queue_read(&self, task: Task) {
        self.reads.borrow_mut().push(task);
        self.ensure_flush();
    }

    pub fn queue_write(&self, task: Task) {
        self.writes.borrow_mut().push(task);
        self.ensure_flush();
    }

    /// Runs `task` at the start of the next quantum, ahead of both phases.
    pub fn tick(&self, task: Task) {
        self.ticks.borrow_mut().push(task);
        self.ensure_flush();
    }

    pub fn has_pending(&self) -> bool {
        !self.ticks.borrow().is_empty()
            || !self.reads.borrow().is_empty()
            || !self.writes.borrow().is_empty()
    }

    fn ensure_flush(&self) {
        if self.flush_pending.get() {
            return;
        }
        self.flush_pending.set(true);
        let queue = self.this.clone();
        let run = move || {
            if let Some(queue) = queue.upgrade() {
                queue.flush();
            }
        };
        match self.mode.get() {
            QueueMode::Frame => {
                self.host.request_animation_frame(Box::new(run));
            }
            QueueMode::Sync => self.host.queue_microtask(Box::new(run)),
        }
    }

    /// Drains one quantum: ticks, then every read, then every write.
    pub fn flush(&self) {
        let quantum = self.quantum.get() + 1;
        self.quantum.set(quantum);

        let ticks = mem::take(&mut *self.ticks.borrow_mut());
        let reads = mem::take(&mut *self.reads.borrow_mut());
        debug!(
            target: "scheduler",
            quantum,
            ticks = ticks.len(),
            reads = reads.len(),
            "flush"
        );
        self.consume(TaskPhase::Tick, ticks);
        self.consume(TaskPhase::Read, reads);

        // Swapped only now so writes queued by this quantum's reads still run
        // in it; writes queued by writes wait for the next one.
        let writes = mem::take(&mut *self.writes.borrow_mut());
        self.consume(TaskPhase::Write, writes);

        self.flush_pending.set(false);
        if self.has_pending() {
            self.ensure_flush();
        }
    }

    fn consume(&self, phase: TaskPhase, tasks: Vec<Task>) {
        for task in tasks {
            isolate(
                &self.diagnostics,
                || DiagnosticSource::Task {
                    phase: phase.as_str(),
                },
                task,
            );
        }
    }
}
