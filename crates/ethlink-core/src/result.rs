//! Single-assignment asynchronous result.
//!
//! An [`RpcResult`] is completed at most once, either with a value or with an
//! [`RpcError`]. It can be consumed three ways:
//!
//! - `.await` from async code ([`Future`] impl),
//! - [`get`](RpcResult::get) / [`get_timeout`](RpcResult::get_timeout) from a
//!   blocking thread,
//! - continuation callbacks ([`on_complete`](RpcResult::on_complete) and friends).
//!
//! Clones share state: completing one clone completes all of them.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use crate::error::RpcError;

pub type Outcome<T> = Result<T, RpcError>;

type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;
type Upstream = Box<dyn Fn() + Send + Sync>;

struct State<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
    wakers: Vec<Waker>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    /// Cancels the result this one was derived from.
    upstream: Mutex<Option<Upstream>>,
}

pub struct RpcResult<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for RpcResult<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for RpcResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> RpcResult<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    outcome: None,
                    callbacks: Vec::new(),
                    wakers: Vec::new(),
                }),
                ready: Condvar::new(),
                upstream: Mutex::new(None),
            }),
        }
    }

    /// An already-completed result.
    pub fn ready(value: T) -> Self {
        let result = Self::new();
        result.complete(value);
        result
    }

    /// An already-failed result.
    pub fn failed(error: RpcError) -> Self {
        let result = Self::new();
        result.complete_exceptionally(error);
        result
    }

    /// Complete with a value. Returns `false` if already complete.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Complete with an error. Returns `false` if already complete.
    pub fn complete_exceptionally(&self, error: RpcError) -> bool {
        self.settle(Err(error))
    }

    /// Complete with [`RpcError::Cancelled`].
    ///
    /// Cancelling a derived result also cancels its source.
    pub fn cancel(&self) -> bool {
        if !self.settle(Err(RpcError::Cancelled)) {
            return false;
        }
        let upstream = self.shared.upstream.lock().unwrap().take();
        if let Some(cancel_source) = upstream {
            cancel_source();
        }
        true
    }

    pub fn is_done(&self) -> bool {
        self.shared.state.lock().unwrap().outcome.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.peek(), Some(Err(RpcError::Cancelled)))
    }

    /// The outcome, if already settled. Never blocks.
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.shared.state.lock().unwrap().outcome.clone()
    }

    /// Block the calling thread until settled.
    ///
    /// Must not be called from inside an async task driving the response.
    pub fn get(&self) -> Outcome<T> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            state = self.shared.ready.wait(state).unwrap();
        }
    }

    /// Block for at most `timeout`. On expiry the wait fails with
    /// [`RpcError::Timeout`] and the result stays pending.
    pub fn get_timeout(&self, timeout: Duration) -> Outcome<T> {
        let state = self.shared.state.lock().unwrap();
        let (state, _) = self
            .shared
            .ready
            .wait_timeout_while(state, timeout, |s| s.outcome.is_none())
            .unwrap();
        match &state.outcome {
            Some(outcome) => outcome.clone(),
            None => Err(RpcError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Run `f` once with the outcome. Runs immediately on this thread if the
    /// result is already settled.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        match &state.outcome {
            Some(outcome) => {
                let outcome = outcome.clone();
                drop(state);
                f(&outcome);
            }
            None => state.callbacks.push(Box::new(f)),
        }
    }

    pub fn on_value<F>(&self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Ok(value) = outcome {
                f(value.clone());
            }
        });
    }

    pub fn on_error<F>(&self, f: F)
    where
        F: FnOnce(RpcError) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Err(e) = outcome {
                f(e.clone());
            }
        });
    }

    /// Derive a result by transforming the value. Errors pass through.
    pub fn map<U, F>(&self, f: F) -> RpcResult<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like [`map`](Self::map), but the transform may fail.
    pub fn try_map<U, F>(&self, f: F) -> RpcResult<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, RpcError> + Send + 'static,
    {
        let derived = self.derive();
        let target = derived.clone();
        self.on_complete(move |outcome| {
            target.settle(match outcome {
                Ok(value) => f(value.clone()),
                Err(e) => Err(e.clone()),
            });
        });
        derived
    }

    /// Chain a follow-up request on the value.
    pub fn and_then<U, F>(&self, f: F) -> RpcResult<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> RpcResult<U> + Send + 'static,
    {
        let derived = self.derive();
        let target = derived.clone();
        self.on_complete(move |outcome| match outcome {
            Ok(value) => {
                let next = f(value.clone());
                let relay = target.clone();
                next.on_complete(move |o| {
                    relay.settle(o.clone());
                });
                // cancelling the chained result now cancels the follow-up too
                let follow_up = Arc::downgrade(&next.shared);
                *target.shared.upstream.lock().unwrap() =
                    Some(Box::new(move || cancel_weak(&follow_up)));
            }
            Err(e) => {
                target.settle(Err(e.clone()));
            }
        });
        derived
    }

    fn derive<U: Clone + Send + 'static>(&self) -> RpcResult<U> {
        let derived = RpcResult::<U>::new();
        let source = Arc::downgrade(&self.shared);
        *derived.shared.upstream.lock().unwrap() = Some(Box::new(move || cancel_weak(&source)));
        derived
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let (callbacks, wakers, snapshot) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.wakers),
                outcome,
            )
        };

        self.shared.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks {
            callback(&snapshot);
        }
        true
    }
}

fn cancel_weak<T: Clone + Send + 'static>(shared: &Weak<Shared<T>>) {
    if let Some(shared) = shared.upgrade() {
        RpcResult { shared }.cancel();
    }
}

impl<T: Clone + Send + 'static> Future for RpcResult<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for RpcResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("RpcResult")
            .field("outcome", &state.outcome)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn first_completion_wins() {
        let r = RpcResult::<u64>::new();
        assert!(r.complete(1));
        assert!(!r.complete(2));
        assert!(!r.complete_exceptionally(RpcError::Other("late".into())));
        assert!(!r.cancel());
        assert_eq!(r.get(), Ok(1));
        assert_eq!(r.get(), Ok(1));
    }

    #[test]
    fn get_blocks_until_completed_from_another_thread() {
        let r = RpcResult::<String>::new();
        let producer = r.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.complete("0x1".into());
        });
        assert_eq!(r.get(), Ok("0x1".to_string()));
        t.join().unwrap();
    }

    #[test]
    fn get_timeout_leaves_result_pending() {
        let r = RpcResult::<u64>::new();
        assert_eq!(
            r.get_timeout(Duration::from_millis(10)),
            Err(RpcError::Timeout { ms: 10 })
        );
        assert!(!r.is_done());
        r.complete(9);
        assert_eq!(r.get_timeout(Duration::from_millis(10)), Ok(9));
    }

    #[test]
    fn callbacks_fire_once() {
        let r = RpcResult::<u64>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        r.on_complete(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        r.complete(1);
        r.complete(2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let r = RpcResult::ready(5u64);
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        r.on_value(move |v| *s.lock().unwrap() = Some(v));
        assert_eq!(*seen.lock().unwrap(), Some(5));
    }

    #[test]
    fn on_error_only_sees_errors() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ok = RpcResult::ready(1u64);
        let s = seen.clone();
        ok.on_error(move |e| s.lock().unwrap().push(e));

        let failed = RpcResult::<u64>::failed(RpcError::Other("boom".into()));
        let s = seen.clone();
        failed.on_error(move |e| s.lock().unwrap().push(e));

        assert_eq!(*seen.lock().unwrap(), vec![RpcError::Other("boom".into())]);
    }

    #[test]
    fn map_transforms_value_and_passes_errors() {
        let r = RpcResult::<String>::new();
        let len = r.map(|s| s.len());
        r.complete("0xabcd".into());
        assert_eq!(len.get(), Ok(6));

        let r = RpcResult::<String>::new();
        let len = r.map(|s| s.len());
        r.complete_exceptionally(RpcError::Other("down".into()));
        assert_eq!(len.get(), Err(RpcError::Other("down".into())));
    }

    #[test]
    fn try_map_failure_fails_derived() {
        let r = RpcResult::<String>::ready("zz".into());
        let parsed = r.try_map(|s| {
            u64::from_str_radix(&s, 16).map_err(|e| RpcError::Deserialization(e.to_string()))
        });
        assert!(matches!(parsed.get(), Err(RpcError::Deserialization(_))));
    }

    #[test]
    fn cancelling_mapped_result_cancels_source() {
        let source = RpcResult::<u64>::new();
        let doubled = source.map(|n| n * 2);
        assert!(doubled.cancel());
        assert!(source.is_cancelled());
        assert!(doubled.is_cancelled());
    }

    #[test]
    fn and_then_chains_follow_up() {
        let first = RpcResult::<u64>::new();
        let second = RpcResult::<String>::new();
        let follow_up = second.clone();
        let chained = first.and_then(move |_| follow_up);

        first.complete(5);
        assert!(!chained.is_done());
        second.complete("block 5".into());
        assert_eq!(chained.get(), Ok("block 5".to_string()));
    }

    #[test]
    fn and_then_cancel_reaches_follow_up() {
        let first = RpcResult::<u64>::ready(1);
        let second = RpcResult::<u64>::new();
        let follow_up = second.clone();
        let chained = first.and_then(move |_| follow_up);
        chained.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn await_resolves_after_completion() {
        let r = RpcResult::<u64>::new();
        let producer = r.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            producer.complete(42);
        });
        assert_eq!(r.await, Ok(42));
    }

    #[tokio::test]
    async fn await_sees_cancellation() {
        let r = RpcResult::<u64>::new();
        r.cancel();
        assert_eq!(r.clone().await, Err(RpcError::Cancelled));
    }
}
