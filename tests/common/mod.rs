#![allow(dead_code)]

use promise_chain::JobQueue;
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

/// Virtual-clock timers layered over a [`JobQueue`].
///
/// Each timer callback is one macrotask: the microtask queue is drained after
/// every callback, before the next timer fires.
#[derive(Clone)]
pub struct Timers {
    inner: Rc<Inner>,
}

struct Inner {
    queue: JobQueue,
    now: Cell<u64>,
    next_id: Cell<u64>,
    due: RefCell<BTreeMap<(u64, u64), Box<dyn FnOnce()>>>,
}

impl Timers {
    pub fn new(queue: &JobQueue) -> Self {
        Self {
            inner: Rc::new(Inner {
                queue: queue.clone(),
                now: Cell::new(0),
                next_id: Cell::new(0),
                due: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    pub fn now(&self) -> u64 {
        self.inner.now.get()
    }

    pub fn set_timeout(&self, delay: u64, callback: impl FnOnce() + 'static) {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .due
            .borrow_mut()
            .insert((self.now() + delay, id), Box::new(callback));
    }

    /// Drains microtasks, then fires timers in due order until none are left.
    pub fn run(&self) {
        self.inner.queue.run_until_stalled().unwrap();
        loop {
            let next = self.inner.due.borrow_mut().pop_first();
            let Some(((at, _), callback)) = next else {
                break;
            };
            self.inner.now.set(at);
            callback();
            self.inner.queue.run_until_stalled().unwrap();
        }
    }
}
