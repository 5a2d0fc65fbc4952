//! Hierarchical completion/cancellation tokens
//!
//! Every item that flows through the graph carries a [`RequestContext`].
//! Whenever a node duplicates or derives items from one input it forks the
//! context; a context is *done* once its own work is marked complete and
//! every fork it spawned is done.
//!
//! Completion is tracked with an outstanding-child counter per context.
//! A child that finishes decrements its parent's counter; the parent fires
//! its callbacks when the counter reaches zero after its own `complete()`.
//! No tree walk happens on completion, only on originator lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

/// How a context finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Own work and all forks completed normally
    Completed,
    /// Deadline expired before completion
    TimedOut,
    /// Explicitly cancelled
    Cancelled,
}

impl Completion {
    /// Whether this is a soft cancellation rather than a normal completion
    pub fn is_cancellation(&self) -> bool {
        !matches!(self, Completion::Completed)
    }
}

type DoneCallback = Box<dyn FnOnce(Completion) + Send>;

struct ContextState {
    own_done: bool,
    outstanding: usize,
    outcome: Option<Completion>,
    callbacks: Vec<DoneCallback>,
    deadline: Option<Instant>,
}

struct ContextInner {
    id: String,
    parent: Option<RequestContext>,
    /// Whether this context was counted in the parent's outstanding forks
    counted_in_parent: bool,
    originator: Option<String>,
    publisher_metadata: Option<HashMap<String, String>>,
    state: Mutex<ContextState>,
    done_tx: watch::Sender<Option<Completion>>,
}

/// Cheaply cloneable handle to a node in the context tree
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

/// Builder for root contexts
#[derive(Default)]
pub struct RequestContextBuilder {
    originator: Option<String>,
    publisher_metadata: Option<HashMap<String, String>>,
    timeout: Option<Duration>,
}

impl RequestContextBuilder {
    /// Tag the context so derived results can find their way back to it
    pub fn originator(mut self, originator: impl Into<String>) -> Self {
        self.originator = Some(originator.into());
        self
    }

    /// Attach metadata describing who published the triggering event
    pub fn publisher_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.publisher_metadata = Some(metadata);
        self
    }

    /// Force-complete the context as timed out after `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RequestContext {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let ctx = RequestContext::create(None, false, self.originator, self.publisher_metadata, deadline);
        if deadline.is_some() {
            ctx.arm_timer();
        }
        ctx
    }
}

impl RequestContext {
    /// Create an untagged root context with no deadline
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    fn create(
        parent: Option<RequestContext>,
        counted_in_parent: bool,
        originator: Option<String>,
        publisher_metadata: Option<HashMap<String, String>>,
        deadline: Option<Instant>,
    ) -> Self {
        let (done_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(ContextInner {
                id: uuid::Uuid::new_v4().to_string(),
                parent,
                counted_in_parent,
                originator,
                publisher_metadata,
                state: Mutex::new(ContextState {
                    own_done: false,
                    outstanding: 0,
                    outcome: None,
                    callbacks: Vec::new(),
                    deadline,
                }),
                done_tx,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn parent(&self) -> Option<&RequestContext> {
        self.inner.parent.as_ref()
    }

    pub fn originator(&self) -> Option<&str> {
        self.inner.originator.as_deref()
    }

    /// Publisher metadata of this context or the nearest ancestor carrying any
    pub fn publisher_metadata(&self) -> Option<&HashMap<String, String>> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(metadata) = ctx.inner.publisher_metadata.as_ref() {
                return Some(metadata);
            }
            current = ctx.parent();
        }
        None
    }

    /// Fork a child whose completion this context waits for
    pub fn fork(&self) -> RequestContext {
        self.fork_inner(None)
    }

    /// Fork a child tagged with `originator`
    pub fn fork_with_originator(&self, originator: impl Into<String>) -> RequestContext {
        self.fork_inner(Some(originator.into()))
    }

    fn fork_inner(&self, originator: Option<String>) -> RequestContext {
        let counted = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                false
            } else {
                state.outstanding += 1;
                true
            }
        };
        if !counted {
            log::warn!(
                "Forking context {} after it finished; child is independent",
                self.inner.id
            );
        }
        Self::create(Some(self.clone()), counted, originator, None, None)
    }

    /// Mark this context's own contribution finished. Idempotent.
    pub fn complete(&self) {
        let fired = {
            let mut state = self.inner.state.lock();
            if state.own_done || state.outcome.is_some() {
                return;
            }
            state.own_done = true;
            Self::take_if_finished(&mut state)
        };
        if let Some((outcome, callbacks)) = fired {
            self.finish(outcome, callbacks);
        }
    }

    /// Force-complete as cancelled, regardless of outstanding forks
    pub fn cancel(&self) {
        self.force(Completion::Cancelled);
    }

    fn expire(&self) {
        log::debug!("Context {} timed out", self.inner.id);
        self.force(Completion::TimedOut);
    }

    fn force(&self, outcome: Completion) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.own_done = true;
            state.outcome = Some(outcome);
            std::mem::take(&mut state.callbacks)
        };
        self.finish(outcome, callbacks);
    }

    fn child_finished(&self) {
        let fired = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outstanding = state.outstanding.saturating_sub(1);
            Self::take_if_finished(&mut state)
        };
        if let Some((outcome, callbacks)) = fired {
            self.finish(outcome, callbacks);
        }
    }

    fn take_if_finished(state: &mut ContextState) -> Option<(Completion, Vec<DoneCallback>)> {
        if state.own_done && state.outstanding == 0 {
            state.outcome = Some(Completion::Completed);
            Some((Completion::Completed, std::mem::take(&mut state.callbacks)))
        } else {
            None
        }
    }

    fn finish(&self, outcome: Completion, callbacks: Vec<DoneCallback>) {
        self.inner.done_tx.send_replace(Some(outcome));
        for callback in callbacks {
            callback(outcome);
        }
        if self.inner.counted_in_parent {
            if let Some(parent) = self.inner.parent.as_ref() {
                parent.child_finished();
            }
        }
    }

    /// Run `callback` once, when this context and all its forks are done.
    ///
    /// Runs immediately if the context already finished.
    pub fn add_done_callback(&self, callback: impl FnOnce(Completion) + Send + 'static) {
        let finished = {
            let mut state = self.inner.state.lock();
            match state.outcome {
                Some(outcome) => Some(outcome),
                None => {
                    state.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        if let Some(outcome) = finished {
            callback(outcome);
        }
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    pub fn outcome(&self) -> Option<Completion> {
        self.inner.state.lock().outcome
    }

    /// Number of forks that have not finished yet
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    /// Wait until this context and all its forks are done
    pub async fn done(&self) -> Completion {
        let mut rx = self.inner.done_tx.subscribe();
        loop {
            if let Some(outcome) = *rx.borrow_and_update() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Completion::Cancelled;
            }
        }
    }

    /// Nearest context tagged with `originator`, starting with this one
    pub fn find_parent_by_originator(&self, originator: &str) -> Option<RequestContext> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if ctx.originator() == Some(originator) {
                return Some(ctx.clone());
            }
            current = ctx.parent();
        }
        None
    }

    /// Deadline of this context, or of the nearest ancestor that has one
    pub fn deadline(&self) -> Option<Instant> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(deadline) = ctx.inner.state.lock().deadline {
                return Some(deadline);
            }
            current = ctx.parent();
        }
        None
    }

    /// Push pending deadlines to `max(deadline, now + seconds)`.
    ///
    /// Forks carry no deadline of their own, so every unfinished context on
    /// the parent chain that has one is extended. Contexts without any
    /// deadline are left alone, as are durations that cannot be represented.
    pub fn snooze_timeout(&self, seconds: f64) {
        let extension = match Duration::try_from_secs_f64(seconds.max(0.0)) {
            Ok(extension) => extension,
            Err(e) => {
                log::warn!(
                    "Ignoring snooze of context {} by {} seconds: {}",
                    self.inner.id,
                    seconds,
                    e
                );
                return;
            }
        };
        let Some(candidate) = Instant::now().checked_add(extension) else {
            log::warn!(
                "Ignoring snooze of context {} by {} seconds: deadline overflows",
                self.inner.id,
                seconds
            );
            return;
        };

        let mut current = Some(self);
        while let Some(ctx) = current {
            {
                let mut state = ctx.inner.state.lock();
                if state.outcome.is_some() {
                    return;
                }
                if let Some(deadline) = state.deadline {
                    if candidate > deadline {
                        state.deadline = Some(candidate);
                    }
                }
            }
            current = ctx.parent();
        }
    }

    fn arm_timer(&self) {
        let weak: Weak<ContextInner> = Arc::downgrade(&self.inner);
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!(
                    "No async runtime; deadline of context {} will not be enforced",
                    self.inner.id
                );
                return;
            }
        };

        handle.spawn(async move {
            loop {
                let deadline = {
                    let Some(inner) = weak.upgrade() else { return };
                    let state = inner.state.lock();
                    if state.outcome.is_some() {
                        return;
                    }
                    match state.deadline {
                        Some(deadline) => deadline,
                        None => return,
                    }
                };

                tokio::time::sleep_until(deadline).await;

                let Some(inner) = weak.upgrade() else { return };
                let ctx = RequestContext { inner };
                let expired = ctx
                    .deadline()
                    .map(|deadline| Instant::now() >= deadline)
                    .unwrap_or(false);
                if expired {
                    ctx.expire();
                    return;
                }
            }
        });
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.inner.id)
            .field("originator", &self.inner.originator)
            .field("outcome", &self.outcome())
            .finish()
    }
}
