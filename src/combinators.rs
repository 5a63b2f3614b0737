//! Fan-in over many promises.
//!
//! Inputs may be promises or plain outcomes: anything implementing
//! [`IntoSettlement`]. `Ok(value)` counts as an already fulfilled input and
//! `Err(reason)` as an already rejected one. Inputs are subscribed to in
//! order, so when several have already settled the earliest one wins.
use crate::{IntoSettlement, Promise, Schedule};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};
use tracing::trace;

fn subscribe<S, I, T, E>(scheduler: &S, inputs: I) -> Vec<Promise<T, E>>
where
    S: Schedule + Clone + 'static,
    I: IntoIterator,
    I::Item: IntoSettlement<Value = T, Reason = E>,
    T: Clone + 'static,
    E: Clone + 'static,
{
    inputs
        .into_iter()
        .map(|input| Promise::from_settlement(scheduler, input))
        .collect()
}

/// Shared slots filled in input order, handed out once all are filled.
struct Slots<V> {
    values: RefCell<Vec<Option<V>>>,
    remaining: Cell<usize>,
}

impl<V> Slots<V> {
    fn new(len: usize) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new((0..len).map(|_| None).collect()),
            remaining: Cell::new(len),
        })
    }

    /// Stores `value`, returning every value once the last slot is filled.
    fn fill(&self, index: usize, value: V) -> Option<Vec<V>> {
        let mut values = self.values.borrow_mut();
        if values[index].replace(value).is_none() {
            self.remaining.set(self.remaining.get() - 1);
        }
        if self.remaining.get() > 0 {
            return None;
        }
        Some(values.drain(..).flatten().collect())
    }
}

/// Fulfils with every input's value, in input order, once all of them have
/// fulfilled. Rejects with the first rejection.
///
/// An empty input fulfils straight away with an empty vector.
///
/// ```
/// use promise_chain::{all, JobQueue, Promise};
///
/// let queue = JobQueue::new();
/// let (later, pending) = Promise::<u32, String>::with_resolver(&queue);
/// let joined = all(&queue, vec![pending, Promise::resolved(&queue, 2)]);
/// later.resolve(1);
/// queue.run_until_stalled().unwrap();
/// assert_eq!(joined.value(), Some(vec![1, 2]));
/// ```
pub fn all<S, I, T, E>(scheduler: &S, inputs: I) -> Promise<Vec<T>, E>
where
    S: Schedule + Clone + 'static,
    I: IntoIterator,
    I::Item: IntoSettlement<Value = T, Reason = E>,
    T: Clone + 'static,
    E: Clone + 'static,
{
    let (resolver, aggregate) = Promise::with_resolver(scheduler);
    let inputs = subscribe(scheduler, inputs);
    if inputs.is_empty() {
        resolver.resolve(Vec::new());
        return aggregate;
    }
    trace!(inputs = inputs.len(), "waiting on all");
    let slots = Slots::new(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let slots = slots.clone();
        let fulfilling = resolver.clone();
        let rejecting = resolver.clone();
        input.register(
            move |value| {
                if let Some(values) = slots.fill(index, value) {
                    fulfilling.resolve(values);
                }
            },
            move |reason| rejecting.reject(reason),
        );
    }
    aggregate
}

/// Settles like whichever input settles first, in either direction.
///
/// An empty input never settles.
pub fn race<S, I, T, E>(scheduler: &S, inputs: I) -> Promise<T, E>
where
    S: Schedule + Clone + 'static,
    I: IntoIterator,
    I::Item: IntoSettlement<Value = T, Reason = E>,
    T: Clone + 'static,
    E: Clone + 'static,
{
    let (resolver, winner) = Promise::with_resolver(scheduler);
    for input in subscribe(scheduler, inputs) {
        let fulfilling = resolver.clone();
        let rejecting = resolver.clone();
        input.register(
            move |value| fulfilling.resolve(value),
            move |reason| rejecting.reject(reason),
        );
    }
    winner
}

/// Fulfils with every input's outcome, in input order, once all of them have
/// settled. Never rejects.
pub fn all_settled<S, I, T, E>(scheduler: &S, inputs: I) -> Promise<Vec<Result<T, E>>, E>
where
    S: Schedule + Clone + 'static,
    I: IntoIterator,
    I::Item: IntoSettlement<Value = T, Reason = E>,
    T: Clone + 'static,
    E: Clone + 'static,
{
    let (resolver, aggregate) = Promise::with_resolver(scheduler);
    let inputs = subscribe(scheduler, inputs);
    if inputs.is_empty() {
        resolver.resolve(Vec::new());
        return aggregate;
    }
    let slots = Slots::new(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let (fulfilled_slots, rejected_slots) = (slots.clone(), slots.clone());
        let fulfilling = resolver.clone();
        let rejecting = resolver.clone();
        input.register(
            move |value| {
                if let Some(outcomes) = fulfilled_slots.fill(index, Ok(value)) {
                    fulfilling.resolve(outcomes);
                }
            },
            move |reason| {
                if let Some(outcomes) = rejected_slots.fill(index, Err(reason)) {
                    rejecting.resolve(outcomes);
                }
            },
        );
    }
    aggregate
}

/// Fulfils with the first input to fulfil. Rejects with every reason, in
/// input order, once all inputs have rejected.
///
/// An empty input rejects straight away with no reasons.
pub fn any<S, I, T, E>(scheduler: &S, inputs: I) -> Promise<T, Vec<E>>
where
    S: Schedule + Clone + 'static,
    I: IntoIterator,
    I::Item: IntoSettlement<Value = T, Reason = E>,
    T: Clone + 'static,
    E: Clone + 'static,
{
    let (resolver, first) = Promise::with_resolver(scheduler);
    let inputs = subscribe(scheduler, inputs);
    if inputs.is_empty() {
        resolver.reject(Vec::new());
        return first;
    }
    let slots = Slots::new(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let slots = slots.clone();
        let fulfilling = resolver.clone();
        let rejecting = resolver.clone();
        input.register(
            move |value| fulfilling.resolve(value),
            move |reason| {
                if let Some(reasons) = slots.fill(index, reason) {
                    rejecting.reject(reasons);
                }
            },
        );
    }
    first
}
