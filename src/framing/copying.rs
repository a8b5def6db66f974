//! Copying accumulation: deliveries are moved into an owned buffer.

use super::{extract, Accumulator, BufferWindow, Feed, FrameState, FramingError, OnMessage};
use crate::message::MessageShape;
use bytes::{Buf, BytesMut};

/// Accumulates messages in its own buffer.
///
/// The receive window is only a landing area and is emptied after every
/// delivery, so it may be smaller than a message.
#[derive(Debug)]
pub struct CopyingAccumulator {
    shape: MessageShape,
    pending: BytesMut,
    state: FrameState,
}

impl CopyingAccumulator {
    pub fn new(shape: MessageShape) -> Self {
        Self {
            shape,
            pending: BytesMut::with_capacity(shape.max_message_size()),
            state: FrameState::AwaitingHeader,
        }
    }

    /// Bytes held for messages not yet delivered.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Accumulator for CopyingAccumulator {
    fn feed(
        &mut self,
        window: &mut BufferWindow<'_>,
        received: usize,
        on_message: &mut OnMessage<'_>,
    ) -> Result<Feed, FramingError> {
        window.advance(received);
        self.pending.extend_from_slice(window.filled());
        window.clear();

        let extracted = extract(&self.pending, &self.shape, on_message)?;
        self.pending.advance(extracted.consumed);
        self.state = extracted.state;

        Ok(extracted.feed)
    }

    fn state(&self) -> FrameState {
        self.state
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.state = FrameState::AwaitingHeader;
    }
}
