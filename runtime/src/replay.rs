//! Multicast replay channel.
//!
//! [`ReplayChannel`] is the state machine behind both the keyed response
//! channels and the outer response source. It keeps a bounded replay buffer, a
//! terminal state, and an explicit list of subscribers:
//!
//! ```text
//!             push              complete / fail
//!   Empty ──────────▶ Holding ──────────────────▶ Completed | Failed(err)
//!     │                                                  ▲
//!     └──────────────────────────────────────────────────┘
//! ```
//!
//! A new subscriber first receives the buffered values (oldest first), then
//! every later push, then the terminal event. Channels built with
//! [`ReplayChannel::latest_per`] retain the newest value of each equivalence
//! class and replay through [`ReplayChannel::subscribe_latest`] instead. Buffering and registration happen
//! under the same lock as pushes, so a subscriber never misses or duplicates a
//! value. Values are cloned per subscriber; subscribers never affect each other.

use composable_fetch_core::FetchError;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::stream::{FusedStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

/// Observable state of a [`ReplayChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Open, nothing pushed yet
    Empty,
    /// Open, holding at least one replayable value
    Holding,
    /// Terminated successfully; no further pushes are accepted
    Completed,
    /// Terminated with a failure that is replayed to every subscriber
    Failed(FetchError),
}

impl ChannelState {
    /// Whether the channel has reached a terminal state.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

#[derive(Debug, Clone)]
enum Terminal {
    Completed,
    Failed(FetchError),
}

type Subscriber<T> = UnboundedSender<Result<T, FetchError>>;

struct Inner<T> {
    buffer: VecDeque<T>,
    depth: Option<usize>,
    same_slot: Option<fn(&T, &T) -> bool>,
    terminal: Option<Terminal>,
    subscribers: Vec<Subscriber<T>>,
    pushed: u64,
}

/// Cloneable handle to a multicast channel with replay.
///
/// All clones share the same buffer and subscriber list.
pub struct ReplayChannel<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for ReplayChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> ReplayChannel<T> {
    /// Channel that replays the last `depth` values to new subscribers.
    ///
    /// A depth of zero is treated as one: the last value is never discarded.
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        Self::build(Some(depth.max(1)), None)
    }

    /// Channel that replays everything ever pushed.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::build(None, None)
    }

    /// Channel that retains the newest value of each class, where `same_slot`
    /// decides whether two values belong to the same class.
    ///
    /// The buffer stays in push order and is bounded by the number of distinct
    /// classes ever pushed.
    #[must_use]
    pub fn latest_per(same_slot: fn(&T, &T) -> bool) -> Self {
        Self::build(None, Some(same_slot))
    }

    fn build(depth: Option<usize>, same_slot: Option<fn(&T, &T) -> bool>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buffer: VecDeque::new(),
                depth,
                same_slot,
                terminal: None,
                subscribers: Vec::new(),
                pushed: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `value` to every live subscriber and retain it for replay.
    ///
    /// Returns `false` (and drops the value) if the channel has terminated.
    pub fn push(&self, value: T) -> bool {
        let mut inner = self.lock();
        if inner.terminal.is_some() {
            return false;
        }

        inner
            .subscribers
            .retain(|subscriber| subscriber.unbounded_send(Ok(value.clone())).is_ok());

        if let Some(same_slot) = inner.same_slot {
            inner.buffer.retain(|held| !same_slot(held, &value));
        }
        inner.buffer.push_back(value);
        if let Some(depth) = inner.depth {
            while inner.buffer.len() > depth {
                inner.buffer.pop_front();
            }
        }
        inner.pushed += 1;
        true
    }

    /// Terminate successfully. Subscriber streams end after their backlog.
    ///
    /// Returns `false` if the channel had already terminated.
    pub fn complete(&self) -> bool {
        let mut inner = self.lock();
        if inner.terminal.is_some() {
            return false;
        }
        inner.terminal = Some(Terminal::Completed);
        inner.subscribers.clear();
        true
    }

    /// Terminate with `error`, delivered to every current and future subscriber.
    ///
    /// Returns `false` if the channel had already terminated.
    pub fn fail(&self, error: FetchError) -> bool {
        let mut inner = self.lock();
        if inner.terminal.is_some() {
            return false;
        }
        for subscriber in inner.subscribers.drain(..) {
            let _ = subscriber.unbounded_send(Err(error.clone()));
        }
        inner.terminal = Some(Terminal::Failed(error));
        true
    }

    /// Attach a new subscriber.
    ///
    /// The stream yields the replay buffer, then live pushes, then ends (or
    /// yields the failure and ends) once the channel terminates.
    ///
    /// Every subscriber has its own unbounded queue. A stream that is held but
    /// never polled keeps accumulating pushes until it is dropped or the
    /// channel terminates.
    #[must_use]
    pub fn subscribe(&self) -> ReplayStream<T> {
        let (sender, receiver) = mpsc::unbounded();
        let mut inner = self.lock();

        for value in &inner.buffer {
            let _ = sender.unbounded_send(Ok(value.clone()));
        }

        Self::register(&mut inner, sender);
        ReplayStream { receiver }
    }

    /// Attach a subscriber that replays only the newest buffered value
    /// accepted by `replay`, then every live push.
    ///
    /// Live pushes are not passed through `replay`; callers filter them.
    #[must_use]
    pub fn subscribe_latest(&self, replay: impl Fn(&T) -> bool) -> ReplayStream<T> {
        let (sender, receiver) = mpsc::unbounded();
        let mut inner = self.lock();

        if let Some(value) = inner.buffer.iter().rev().find(|value| replay(*value)) {
            let _ = sender.unbounded_send(Ok(value.clone()));
        }

        Self::register(&mut inner, sender);
        ReplayStream { receiver }
    }

    fn register(inner: &mut Inner<T>, sender: Subscriber<T>) {
        match &inner.terminal {
            None => inner.subscribers.push(sender),
            Some(Terminal::Completed) => {}
            Some(Terminal::Failed(error)) => {
                let _ = sender.unbounded_send(Err(error.clone()));
            }
        }
    }

    /// The most recently pushed value, if any.
    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.lock().buffer.back().cloned()
    }

    /// Everything currently retained for replay, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().buffer.iter().cloned().collect()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        let inner = self.lock();
        match &inner.terminal {
            Some(Terminal::Completed) => ChannelState::Completed,
            Some(Terminal::Failed(error)) => ChannelState::Failed(error.clone()),
            None if inner.buffer.is_empty() => ChannelState::Empty,
            None => ChannelState::Holding,
        }
    }

    /// Total number of values ever accepted.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.lock().pushed
    }

    /// Number of subscribers still listening.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|subscriber| !subscriber.is_closed())
            .count()
    }
}

impl<T: Clone> fmt::Debug for ReplayChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ReplayChannel")
            .field("depth", &inner.depth)
            .field("latest_per_class", &inner.same_slot.is_some())
            .field("buffered", &inner.buffer.len())
            .field("pushed", &inner.pushed)
            .field("subscribers", &inner.subscribers.len())
            .field("terminal", &inner.terminal)
            .finish()
    }
}

/// One subscriber's view of a [`ReplayChannel`].
///
/// Dropping the stream unsubscribes; the channel prunes it on the next push.
#[derive(Debug)]
pub struct ReplayStream<T> {
    receiver: UnboundedReceiver<Result<T, FetchError>>,
}

impl<T> Stream for ReplayStream<T> {
    type Item = Result<T, FetchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl<T> FusedStream for ReplayStream<T> {
    fn is_terminated(&self) -> bool {
        self.receiver.is_terminated()
    }
}
