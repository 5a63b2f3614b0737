use crate::Promise;

/// The outcome fed into a promise's resolver.
///
/// `Adopt` carries another promise whose eventual outcome is taken over
/// instead of being stored as a value, so a chain never produces a promise
/// of a promise.
#[derive(Debug)]
pub enum Settlement<T, E> {
    Fulfill(T),
    Reject(E),
    Adopt(Promise<T, E>),
}

/// Anything a handler may hand back to the chain.
///
/// `Result<T, E>` fulfils or rejects, a [`Promise`] is adopted and a
/// [`Settlement`] is taken as is.
pub trait IntoSettlement {
    type Value;
    type Reason;

    fn into_settlement(self) -> Settlement<Self::Value, Self::Reason>;
}

impl<T, E> IntoSettlement for Settlement<T, E> {
    type Value = T;
    type Reason = E;

    fn into_settlement(self) -> Settlement<T, E> {
        self
    }
}

impl<T, E> IntoSettlement for Result<T, E> {
    type Value = T;
    type Reason = E;

    fn into_settlement(self) -> Settlement<T, E> {
        match self {
            Ok(value) => Settlement::Fulfill(value),
            Err(reason) => Settlement::Reject(reason),
        }
    }
}

impl<T, E> IntoSettlement for Promise<T, E> {
    type Value = T;
    type Reason = E;

    fn into_settlement(self) -> Settlement<T, E> {
        Settlement::Adopt(self)
    }
}

impl<T, E> From<Result<T, E>> for Settlement<T, E> {
    fn from(result: Result<T, E>) -> Self {
        result.into_settlement()
    }
}

impl<T, E> From<Promise<T, E>> for Settlement<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Settlement::Adopt(promise)
    }
}
