//! Progress event sinks.
//!
//! Engines emit typed events into an `EventSink` and never decide how those
//! events are shown. A channel, a log, a UI model or a test spy are all
//! valid sinks.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Receives progress events.
pub trait EventSink<E>: Send + Sync {
    /// Delivers one event. Must not block for long.
    fn emit(&self, event: E);
}

impl<E, S> EventSink<E> for Arc<S>
where
    S: EventSink<E> + ?Sized,
{
    fn emit(&self, event: E) {
        (**self).emit(event);
    }
}

impl<E: Send> EventSink<E> for UnboundedSender<E> {
    fn emit(&self, event: E) {
        // A closed receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl<E> EventSink<E> for NoopSink {
    fn emit(&self, _event: E) {}
}

/// Logs every event through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl<E: Display> EventSink<E> for TracingSink {
    fn emit(&self, event: E) {
        info!("{}", event);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<E, F> {
    f: F,
    _event: PhantomData<fn(E)>,
}

impl<E, F> FnSink<E, F>
where
    F: Fn(E) + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

impl<E, F> EventSink<E> for FnSink<E, F>
where
    F: Fn(E) + Send + Sync,
{
    fn emit(&self, event: E) {
        (self.f)(event);
    }
}

/// Keeps every event in memory, for tests and post-run summaries.
#[derive(Debug)]
pub struct RecordingSink<E> {
    events: Mutex<Vec<E>>,
}

impl<E> Default for RecordingSink<E> {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> RecordingSink<E> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn events(&self) -> Vec<E> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets all recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl<E: Send> EventSink<E> for RecordingSink<E> {
    fn emit(&self, event: E) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
