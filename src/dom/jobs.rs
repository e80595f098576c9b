use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;
use std::task::{Context, Poll};

use futures_util::future::LocalBoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::task::noop_waker_ref;

pub type Microtask = Box<dyn FnOnce()>;

/// Microtask queue plus the set of in-flight local futures.
///
/// Futures are only ever polled from [`JobQueue::drain_jobs`]; anything spawned
/// while polling waits for the next drain.
#[derive(Default)]
pub(crate) struct JobQueue {
    microtasks: RefCell<VecDeque<Microtask>>,
    spawned: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
    running: RefCell<FuturesUnordered<LocalBoxFuture<'static, ()>>>,
}

impl JobQueue {
    pub(crate) fn queue_microtask(&self, task: Microtask) {
        self.microtasks.borrow_mut().push_back(task);
    }

    pub(crate) fn spawn(&self, job: LocalBoxFuture<'static, ()>) {
        self.spawned.borrow_mut().push(job);
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.microtasks.borrow().is_empty()
            && self.spawned.borrow().is_empty()
            && self.running.borrow().is_empty()
    }

    /// Runs microtasks until the queue is empty, including ones queued by
    /// earlier microtasks.
    pub(crate) fn drain_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    /// Polls every spawned future once it has something to do. Returns the
    /// number of futures that completed.
    pub(crate) fn drain_jobs(&self) -> usize {
        let mut completed = 0;
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            let fresh = mem::take(&mut *self.spawned.borrow_mut());
            let mut running = mem::take(&mut *self.running.borrow_mut());
            for job in fresh {
                running.push(job);
            }

            while let Poll::Ready(Some(())) = running.poll_next_unpin(&mut cx) {
                completed += 1;
            }

            *self.running.borrow_mut() = running;
            if self.spawned.borrow().is_empty() {
                break;
            }
        }
        completed
    }
}
