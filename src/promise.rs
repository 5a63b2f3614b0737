//! The settlement state machine.
//!
//! A [`Promise`] is a shared handle to a single-assignment cell. Its
//! [`Resolver`] is the only way to settle it; any number of consumers may
//! clone the promise, chain on it or await it.
//!
//! ```text
//! Pending -> Fulfilled(value)
//!    |
//!    +-----> Rejected(reason)
//! ```
use crate::{AwaitError, IntoSettlement, Job, Schedule, Settlement};
use std::{
    cell::RefCell,
    fmt,
    future::Future,
    mem,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Debug)]
enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

struct Reaction<T, E> {
    on_fulfilled: Box<dyn FnOnce(T)>,
    on_rejected: Box<dyn FnOnce(E)>,
}

struct Inner<T, E> {
    state: State<T, E>,
    // Set by the first effective resolve, which may precede the state change
    // when another promise is being adopted.
    locked: bool,
    abandoned: bool,
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

/// A value that becomes available once, later.
///
/// # Examples
///
/// ```
/// use promise_chain::{JobQueue, Promise, PromiseState};
///
/// let queue = JobQueue::new();
/// let (resolver, promise) = Promise::<&str, ()>::with_resolver(&queue);
/// let shouted = promise.then(|word| Ok(word.to_uppercase()));
///
/// resolver.resolve("hi");
/// resolver.reject(()); // too late, ignored
/// assert_eq!(promise.state(), PromiseState::Fulfilled);
///
/// queue.run_until_stalled().unwrap();
/// assert_eq!(shouted.value(), Some("HI".to_string()));
/// ```
pub struct Promise<T, E> {
    inner: Rc<RefCell<Inner<T, E>>>,
    pub(crate) scheduler: Rc<dyn Schedule>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

/// The settling side of a [`Promise`].
///
/// Clones share one settle guard: whichever clone settles first wins and
/// every later call is ignored. Dropping the last clone of an unsettled
/// resolver abandons the promise.
pub struct Resolver<T: 'static, E: 'static> {
    shared: Rc<ResolverShared<T, E>>,
}

struct ResolverShared<T: 'static, E: 'static> {
    promise: Promise<T, E>,
}

impl<T: 'static, E: 'static> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: 'static, E: 'static> Drop for ResolverShared<T, E> {
    /// If the promise can no longer settle, release its observers and wake
    /// anyone awaiting it.
    fn drop(&mut self) {
        let promise = self.promise.clone();
        release(Box::new(move || promise.abandon()));
    }
}

thread_local! {
    // `Some` while an abandonment is being unwound.
    static ABANDONING: RefCell<Option<Vec<Job>>> = RefCell::new(None);
}

/// Runs `abandon`, or queues it if another abandonment is already running.
///
/// Abandoning a promise drops its observers, which drops the resolvers of
/// derived promises and abandons them too. Queueing keeps a long chain from
/// unwinding one stack frame per link.
fn release(abandon: Job) {
    let mut abandon = Some(abandon);
    let outermost = ABANDONING.try_with(|queue| {
        let mut queue = queue.borrow_mut();
        if let Some(pending) = queue.as_mut() {
            pending.extend(abandon.take());
            return false;
        }
        *queue = Some(Vec::new());
        true
    });
    let Some(mut next) = abandon else {
        return;
    };
    if outermost.is_err() {
        // Thread-local storage is gone, the thread is exiting.
        next();
        return;
    }
    loop {
        next();
        let queued = ABANDONING.with(|queue| queue.borrow_mut().as_mut().and_then(Vec::pop));
        match queued {
            Some(job) => next = job,
            None => break,
        }
    }
    ABANDONING.with(|queue| queue.borrow_mut().take());
}

impl<T, E> Promise<T, E> {
    pub fn state(&self) -> PromiseState {
        match self.inner.borrow().state {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// Whether the promise is pending with no way left to settle it.
    pub fn is_abandoned(&self) -> bool {
        self.inner.borrow().abandoned
    }

    fn abandon(&self) {
        let (reactions, wakers) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.abandoned = true;
            (mem::take(&mut inner.reactions), mem::take(&mut inner.wakers))
        };
        debug!(
            observers = reactions.len(),
            awaiting = wakers.len(),
            "promise abandoned while pending"
        );
        // Observers own the resolvers of derived promises; dropping them
        // abandons those in turn.
        drop(reactions);
        wakers.into_iter().for_each(Waker::wake);
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Promise<T, E> {
    /// Creates a pending promise and runs `initializer` with its resolver
    /// right away.
    ///
    /// An `Err` returned by the initializer rejects the promise, unless the
    /// initializer already settled it.
    pub fn new<S, F>(scheduler: &S, initializer: F) -> Self
    where
        S: Schedule + Clone + 'static,
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (resolver, promise) = Self::with_resolver(scheduler);
        if let Err(reason) = initializer(resolver.clone()) {
            debug!(settled = resolver.is_resolved(), "promise initializer failed");
            resolver.reject(reason);
        }
        promise
    }

    /// Creates a pending promise along with the resolver that settles it.
    pub fn with_resolver<S>(scheduler: &S) -> (Resolver<T, E>, Self)
    where
        S: Schedule + Clone + 'static,
    {
        Self::pending_on(Rc::new(scheduler.clone()))
    }

    pub(crate) fn pending_on(scheduler: Rc<dyn Schedule>) -> (Resolver<T, E>, Self) {
        let promise = Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                locked: false,
                abandoned: false,
                reactions: Vec::new(),
                wakers: Vec::new(),
            })),
            scheduler,
        };
        let resolver = Resolver {
            shared: Rc::new(ResolverShared {
                promise: promise.clone(),
            }),
        };
        (resolver, promise)
    }

    /// An already fulfilled promise.
    ///
    /// `value` is stored as is, even when it is itself a promise. Use
    /// [`Promise::from_settlement`] to adopt another promise instead.
    pub fn resolved<S>(scheduler: &S, value: T) -> Self
    where
        S: Schedule + Clone + 'static,
    {
        Self::from_settlement(scheduler, Settlement::Fulfill(value))
    }

    /// An already rejected promise.
    pub fn rejected<S>(scheduler: &S, reason: E) -> Self
    where
        S: Schedule + Clone + 'static,
    {
        Self::from_settlement(scheduler, Settlement::Reject(reason))
    }

    /// Wraps `outcome` in a promise. A promise is returned as is.
    pub fn from_settlement<S, R>(scheduler: &S, outcome: R) -> Self
    where
        S: Schedule + Clone + 'static,
        R: IntoSettlement<Value = T, Reason = E>,
    {
        match outcome.into_settlement() {
            Settlement::Adopt(promise) => promise,
            settlement => {
                let (resolver, promise) = Self::with_resolver(scheduler);
                resolver.resolve_with(settlement);
                promise
            }
        }
    }

    /// The fulfilled value, if there is one yet.
    pub fn value(&self) -> Option<T> {
        match &self.inner.borrow().state {
            State::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection reason, if there is one yet.
    pub fn reason(&self) -> Option<E> {
        match &self.inner.borrow().state {
            State::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Registers a pair of observers.
    ///
    /// While pending they are queued; once settled the matching one is
    /// scheduled straight away. Either way it never runs inline.
    pub(crate) fn register<F, G>(&self, on_fulfilled: F, on_rejected: G)
    where
        F: FnOnce(T) + 'static,
        G: FnOnce(E) + 'static,
    {
        let job: Job = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            match &inner.state {
                State::Fulfilled(value) => {
                    let value = value.clone();
                    Box::new(move || on_fulfilled(value))
                }
                State::Rejected(reason) => {
                    let reason = reason.clone();
                    Box::new(move || on_rejected(reason))
                }
                State::Pending => {
                    if !inner.abandoned {
                        inner.reactions.push(Reaction {
                            on_fulfilled: Box::new(on_fulfilled),
                            on_rejected: Box::new(on_rejected),
                        });
                    }
                    return;
                }
            }
        };
        self.scheduler.schedule(job);
    }

    /// Claims the settle guard. Only the first caller gets `true`.
    fn lock(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.locked || !matches!(inner.state, State::Pending) {
            return false;
        }
        inner.locked = true;
        true
    }

    fn settle(&self, outcome: Result<T, E>) {
        let (reactions, wakers) = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.state, State::Pending) {
                return;
            }
            inner.locked = true;
            inner.state = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(reason) => State::Rejected(reason.clone()),
            };
            (mem::take(&mut inner.reactions), mem::take(&mut inner.wakers))
        };
        match outcome {
            Ok(value) => {
                trace!(observers = reactions.len(), "promise fulfilled");
                for reaction in reactions {
                    let value = value.clone();
                    let on_fulfilled = reaction.on_fulfilled;
                    self.scheduler.schedule(Box::new(move || on_fulfilled(value)));
                }
            }
            Err(reason) => {
                if reactions.is_empty() {
                    debug!("promise rejected with no observers");
                } else {
                    trace!(observers = reactions.len(), "promise rejected");
                }
                for reaction in reactions {
                    let reason = reason.clone();
                    let on_rejected = reaction.on_rejected;
                    self.scheduler.schedule(Box::new(move || on_rejected(reason)));
                }
            }
        }
        wakers.into_iter().for_each(Waker::wake);
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Resolver<T, E> {
    /// Fulfils the promise with `value`.
    pub fn resolve(&self, value: T) {
        self.resolve_with(Settlement::Fulfill(value));
    }

    /// Rejects the promise with `reason`.
    pub fn reject(&self, reason: E) {
        self.resolve_with(Settlement::Reject(reason));
    }

    /// Settles the promise from `outcome`, adopting it if it is a promise.
    ///
    /// Only the first call through any clone of this resolver has an effect.
    pub fn resolve_with<R>(&self, outcome: R)
    where
        R: IntoSettlement<Value = T, Reason = E>,
    {
        let promise = &self.shared.promise;
        if !promise.lock() {
            trace!("promise already resolved, ignoring settlement");
            return;
        }
        match outcome.into_settlement() {
            Settlement::Fulfill(value) => promise.settle(Ok(value)),
            Settlement::Reject(reason) => promise.settle(Err(reason)),
            Settlement::Adopt(source) => {
                if Rc::ptr_eq(&source.inner, &promise.inner) {
                    warn!("promise resolved with itself, it will never settle");
                    return;
                }
                trace!("promise adopting the outcome of another promise");
                // These clones keep the promise from being abandoned until
                // the source settles or is abandoned itself.
                let on_fulfilled = self.clone();
                let on_rejected = self.clone();
                source.register(
                    move |value| on_fulfilled.shared.promise.settle(Ok(value)),
                    move |reason| on_rejected.shared.promise.settle(Err(reason)),
                );
            }
        }
    }

    /// Whether a settlement has already been accepted.
    pub fn is_resolved(&self) -> bool {
        let inner = self.shared.promise.inner.borrow();
        inner.locked || !matches!(inner.state, State::Pending)
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, AwaitError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        match &inner.state {
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(reason) => Poll::Ready(Err(AwaitError::Rejected(reason.clone()))),
            State::Pending if inner.abandoned => Poll::Ready(Err(AwaitError::Abandoned)),
            State::Pending => {
                if !inner.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Promise")
            .field("state", &inner.state)
            .field("locked", &inner.locked)
            .field("abandoned", &inner.abandoned)
            .field("observers", &inner.reactions.len())
            .finish()
    }
}

impl<T: fmt::Debug + 'static, E: fmt::Debug + 'static> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("promise", &self.shared.promise)
            .finish()
    }
}
