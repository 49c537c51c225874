use super::method::{Callable, MethodError, MethodResult};
use futures::FutureExt;
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

/// How a recorded call settled
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Returned(T),
    Failed(MethodError),
}

impl<T> Outcome<T> {
    pub fn is_returned(&self) -> bool {
        matches!(self, Outcome::Returned(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Returned(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&MethodError> {
        match self {
            Outcome::Returned(_) => None,
            Outcome::Failed(error) => Some(error),
        }
    }
}

struct Entries<A, T> {
    calls: Vec<A>,
    // Indexed by call; `None` until an asynchronous call settles.
    outcomes: Vec<Option<Outcome<T>>>,
}

/// Ordered record of the calls an instrumented method received
pub struct CallLog<A, T> {
    entries: Mutex<Entries<A, T>>,
}

impl<A, T> Default for CallLog<A, T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                calls: Vec::new(),
                outcomes: Vec::new(),
            }),
        }
    }
}

impl<A: Clone, T: Clone> CallLog<A, T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_call(&self, args: A) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.calls.push(args);
        entries.outcomes.push(None);
        entries.calls.len() - 1
    }

    fn settle(&self, index: usize, result: &MethodResult<T>) {
        let outcome = match result {
            Ok(value) => Outcome::Returned(value.clone()),
            Err(error) => Outcome::Failed(error.clone()),
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = entries.outcomes.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    pub fn call_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .len()
    }

    /// Arguments of every call, in call order
    pub fn calls(&self) -> Vec<A> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .clone()
    }

    pub fn last_call(&self) -> Option<A> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .last()
            .cloned()
    }

    /// Outcomes of every settled call, in call order
    pub fn outcomes(&self) -> Vec<Outcome<T>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcomes
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn results(&self) -> Vec<T> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| match outcome {
                Outcome::Returned(value) => Some(value),
                Outcome::Failed(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<MethodError> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| match outcome {
                Outcome::Returned(_) => None,
                Outcome::Failed(error) => Some(error),
            })
            .collect()
    }

    /// Calls that have started but not settled yet
    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcomes
            .iter()
            .filter(|outcome| outcome.is_none())
            .count()
    }
}

/// Type-erased view of a [`CallLog`], used where argument types vary per method
pub(crate) trait ErasedLog: Send + Sync {
    fn call_count(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<A, T> ErasedLog for CallLog<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    fn call_count(&self) -> usize {
        CallLog::call_count(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Wrap an implementation so every call is recorded in `log`
///
/// The wrapper hands the receiver through untouched and returns exactly
/// what the wrapped implementation produced.
pub(crate) fn recorded<S, A, T>(callable: &Callable<S, A, T>, log: Arc<CallLog<A, T>>) -> Callable<S, A, T>
where
    S: Send + Sync + 'static,
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    match callable.clone() {
        Callable::Sync(inner) => Callable::Sync(Arc::new(move |receiver: &S, args: A| {
            let index = log.record_call(args.clone());
            let result = inner(receiver, args);
            log.settle(index, &result);
            result
        })),
        Callable::Async(inner) => Callable::Async(Arc::new(move |receiver: Arc<S>, args: A| {
            let index = log.record_call(args.clone());
            let pending = inner(receiver, args);
            let log = Arc::clone(&log);
            async move {
                let result = pending.await;
                log.settle(index, &result);
                result
            }
            .boxed()
        })),
    }
}
