//! Receive-side decisions, kept free of any socket.
//!
//! [`next_read`] sizes the buffer for one datagram; [`Accumulator`] folds
//! batches of messages into a response and decides when it is complete.

use super::error::{Error, Result};
use super::message::Message;

/// What to do after a peek read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadAction {
    /// The datagram may have been truncated; peek again with this capacity.
    Grow(usize),
    /// The datagram is exactly this many bytes; dequeue it.
    Drain(usize),
}

/// Decide the next read given the buffer capacity and the peeked byte count.
///
/// A peek that fills the buffer may have been cut short, so the capacity
/// doubles until a peek comes back with room to spare.
pub(crate) fn next_read(capacity: usize, peeked: usize) -> ReadAction {
    if peeked >= capacity {
        ReadAction::Grow(capacity.saturating_mul(2))
    } else {
        ReadAction::Drain(peeked)
    }
}

/// Accumulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// More batches are expected.
    Reading,
    /// A batch carried a kernel error; the response is discarded.
    Erred,
    /// The response is complete.
    Done,
}

/// Collects the batches of one response.
#[derive(Debug)]
pub(crate) struct Accumulator {
    state: State,
    messages: Vec<Message>,
}

impl Accumulator {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Reading,
            messages: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> State {
        self.state
    }

    /// Fold in one batch and advance the state.
    ///
    /// A nonzero code in any error message (or an error message too short to
    /// hold a code) moves to [`State::Erred`] and is returned. Otherwise the
    /// batch is kept (ACKs included) and the state stays [`State::Reading`]
    /// only if the last message is flagged multi and is not the done marker.
    pub(crate) fn push(&mut self, batch: Vec<Message>) -> Result<State> {
        debug_assert_eq!(self.state, State::Reading);

        let failed = match embedded_error(&batch) {
            Ok(found) => found,
            Err(e) => Some(e),
        };
        if let Some(err) = failed {
            self.state = State::Erred;
            self.messages.clear();
            return Err(err);
        }

        let more = batch.last().is_some_and(|m| m.is_multi() && !m.is_done());
        self.messages.extend(batch);
        self.state = if more { State::Reading } else { State::Done };
        Ok(self.state)
    }

    pub(crate) fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// First nonzero error code carried by an error message in `batch`.
fn embedded_error(batch: &[Message]) -> Result<Option<Error>> {
    for msg in batch.iter().filter(|m| m.is_error()) {
        let code = msg.error_code()?;
        if code != 0 {
            return Ok(Some(Error::from_errno(code)));
        }
    }
    Ok(None)
}
