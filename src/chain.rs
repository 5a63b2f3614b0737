//! Derived promises: `then`, `catch`, `finally`.
//!
//! Every method here registers one pair of observers on the parent and
//! returns a fresh child right away. The handler runs later, inside a
//! scheduled job, and whatever it hands back settles the child:
//!
//! - `Ok(value)` fulfils it,
//! - `Err(reason)` rejects it,
//! - a [`Promise`] is adopted.
use crate::{IntoSettlement, Promise, Settlement};
use std::{cell::Cell, rc::Rc};

impl<T: Clone + 'static, E: Clone + 'static> Promise<T, E> {
    fn chain<U, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Settlement<U, E> + 'static,
        G: FnOnce(E) -> Settlement<U, E> + 'static,
    {
        let (resolver, child) = Promise::pending_on(self.scheduler.clone());
        let rejecting = resolver.clone();
        self.register(
            move |value| resolver.resolve_with(on_fulfilled(value)),
            move |reason| rejecting.resolve_with(on_rejected(reason)),
        );
        child
    }

    /// Maps the fulfilled value. A rejection skips the handler and is passed
    /// on unchanged.
    ///
    /// Return a promise bare (or as [`Settlement::Adopt`]) to have the child
    /// adopt its outcome. `Ok(promise)` fulfils the child with the promise
    /// itself as its value.
    ///
    /// ```
    /// use promise_chain::{JobQueue, Promise};
    ///
    /// let queue = JobQueue::new();
    /// let failed = Promise::<u8, &str>::rejected(&queue, "boom").then(|n| Ok(n + 1));
    /// queue.run_until_stalled().unwrap();
    /// assert_eq!(failed.reason(), Some("boom"));
    /// ```
    pub fn then<F, R>(&self, on_fulfilled: F) -> Promise<R::Value, E>
    where
        F: FnOnce(T) -> R + 'static,
        R: IntoSettlement<Reason = E>,
        R::Value: Clone + 'static,
    {
        self.chain(
            move |value| on_fulfilled(value).into_settlement(),
            Settlement::Reject,
        )
    }

    /// Like [`Promise::then`], with a handler for each outcome.
    pub fn then_else<F, G, R, Q>(&self, on_fulfilled: F, on_rejected: G) -> Promise<R::Value, E>
    where
        F: FnOnce(T) -> R + 'static,
        G: FnOnce(E) -> Q + 'static,
        R: IntoSettlement<Reason = E>,
        Q: IntoSettlement<Value = R::Value, Reason = E>,
        R::Value: Clone + 'static,
    {
        self.chain(
            move |value| on_fulfilled(value).into_settlement(),
            move |reason| on_rejected(reason).into_settlement(),
        )
    }

    /// Handles a rejection. A fulfilment skips the handler and is passed on
    /// unchanged.
    pub fn catch<G, Q>(&self, on_rejected: G) -> Promise<T, E>
    where
        G: FnOnce(E) -> Q + 'static,
        Q: IntoSettlement<Value = T, Reason = E>,
    {
        self.chain(Settlement::Fulfill, move |reason| {
            on_rejected(reason).into_settlement()
        })
    }

    /// A child that settles exactly like this promise.
    pub fn pass_through(&self) -> Promise<T, E> {
        self.chain(Settlement::Fulfill, Settlement::Reject)
    }

    /// Runs `on_finally` once this promise settles, either way, then passes
    /// the outcome on.
    ///
    /// The handler sees neither value nor reason. If it fails, its reason
    /// replaces the outcome. If it returns a promise, the outcome is passed on
    /// once that promise fulfils.
    pub fn finally<F, R>(&self, on_finally: F) -> Promise<T, E>
    where
        F: FnOnce() -> R + 'static,
        R: IntoSettlement<Value = (), Reason = E>,
    {
        let on_fulfilled = Rc::new(Cell::new(Some(on_finally)));
        let on_rejected = on_fulfilled.clone();
        self.chain(
            move |value| run_finally(on_fulfilled.take(), Settlement::Fulfill(value)),
            move |reason| run_finally(on_rejected.take(), Settlement::Reject(reason)),
        )
    }
}

fn run_finally<T, E, F, R>(on_finally: Option<F>, outcome: Settlement<T, E>) -> Settlement<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    F: FnOnce() -> R,
    R: IntoSettlement<Value = (), Reason = E>,
{
    let Some(on_finally) = on_finally else {
        return outcome;
    };
    match on_finally().into_settlement() {
        Settlement::Fulfill(()) => outcome,
        Settlement::Reject(reason) => Settlement::Reject(reason),
        Settlement::Adopt(cleanup) => Settlement::Adopt(cleanup.then(move |()| outcome)),
    }
}
