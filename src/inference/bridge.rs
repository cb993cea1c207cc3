//! Bounded hand-off between one token producer and one streaming consumer.
//!
//! [`open`] returns a [`Sink`] for the generation thread and a [`Source`] for
//! the response body. The producer blocks while the buffer is full; the
//! consumer suspends while it is empty. Dropping or cancelling the `Source`
//! closes the channel, which wakes a blocked `push` with [`Cancelled`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Sleep};

use crate::error::ChatError;

#[derive(Debug)]
enum Frame {
    Token(String),
    Done,
    Failed(String),
}

/// Per-request lifecycle. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Completed | StreamState::Failed | StreamState::Cancelled
        )
    }
}

/// The consumer side is gone; nothing pushed from now on will be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("token stream consumer has gone away")]
pub struct Cancelled;

pub fn open(capacity: usize) -> (Sink, Source) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let source = Source {
        rx,
        state: StreamState::Idle,
        deadline: Deadline::Unset,
        delivered: 0,
    };
    (Sink { tx }, source)
}

/// Producer handle. All methods block and must not be called from async code.
#[derive(Debug)]
pub struct Sink {
    tx: mpsc::Sender<Frame>,
}

impl Sink {
    /// Waits for buffer space, then enqueues `chunk`.
    pub fn push(&self, chunk: String) -> Result<(), Cancelled> {
        self.tx.blocking_send(Frame::Token(chunk)).map_err(|_| Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Marks the stream as fully delivered.
    pub fn finish(self) -> Result<(), Cancelled> {
        self.tx.blocking_send(Frame::Done).map_err(|_| Cancelled)
    }

    /// Ends the stream with a terminal error after whatever was already pushed.
    pub fn fail(self, reason: impl Into<String>) -> Result<(), Cancelled> {
        self.tx
            .blocking_send(Frame::Failed(reason.into()))
            .map_err(|_| Cancelled)
    }
}

enum Deadline {
    Unset,
    At(Instant, Duration),
    Armed(Pin<Box<Sleep>>, Duration),
}

/// Consumer handle: a finite, non-restartable stream of chunks.
///
/// Yields `Ok(chunk)` in push order, then ends. A failed generation yields
/// one `Err(ChatError::Generation)` before ending, so a partial reply is never
/// mistaken for a complete one.
pub struct Source {
    rx: mpsc::Receiver<Frame>,
    state: StreamState,
    deadline: Deadline,
    delivered: usize,
}

impl Source {
    /// Cancels the stream if it has not ended within `timeout` of this call.
    pub fn with_deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Deadline::At(Instant::now() + timeout, timeout);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Chunks handed to the consumer so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Stops consuming. A producer blocked in `push` is released immediately.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.rx.close();
            self.settle(StreamState::Cancelled);
        }
    }

    fn settle(&mut self, state: StreamState) {
        self.state = state;
        match state {
            StreamState::Completed => info!("Token stream completed after {} chunks", self.delivered),
            StreamState::Failed => warn!("Token stream failed after {} chunks", self.delivered),
            StreamState::Cancelled => warn!("Token stream cancelled after {} chunks", self.delivered),
            StreamState::Idle | StreamState::Streaming => {}
        }
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> Option<Duration> {
        if let Deadline::At(at, timeout) = self.deadline {
            let sleep = Box::pin(sleep_until(tokio::time::Instant::from_std(at)));
            self.deadline = Deadline::Armed(sleep, timeout);
        }
        match &mut self.deadline {
            Deadline::Armed(sleep, timeout) => sleep.as_mut().poll(cx).is_ready().then_some(*timeout),
            _ => None,
        }
    }
}

impl Stream for Source {
    type Item = Result<String, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }
        if this.state == StreamState::Idle {
            this.state = StreamState::Streaming;
        }

        if let Some(timeout) = this.poll_deadline(cx) {
            this.cancel();
            return Poll::Ready(Some(Err(ChatError::Generation(format!(
                "generation timed out after {:?}",
                timeout
            )))));
        }

        match this.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Frame::Token(chunk))) => {
                this.delivered += 1;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Frame::Done)) => {
                this.settle(StreamState::Completed);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Frame::Failed(reason))) => {
                this.settle(StreamState::Failed);
                Poll::Ready(Some(Err(ChatError::Generation(reason))))
            }
            Poll::Ready(None) => {
                this.settle(StreamState::Failed);
                Poll::Ready(Some(Err(ChatError::Generation(
                    "generation worker exited before completing".to_string(),
                ))))
            }
        }
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.cancel();
    }
}
