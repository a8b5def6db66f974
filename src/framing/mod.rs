//! Message framing over raw byte deliveries.
//!
//! An [`Accumulator`] turns a stream of arbitrarily sized deliveries into
//! complete messages, using the length field at the start of each header.
//! Each complete message is passed to a callback exactly once, in arrival
//! order:
//!
//! ```text
//! AwaitingHeader -> AccumulatingPayload -> MessageComplete -> AwaitingHeader
//! ```
//!
//! Two strategies share one contract:
//! - [`InPlaceAccumulator`]: the receive window is the message buffer;
//!   callbacks borrow straight from it.
//! - [`CopyingAccumulator`]: deliveries are copied into a separate owned
//!   buffer, so the window can be smaller than a message.

mod copying;
mod in_place;
mod window;

pub use copying::CopyingAccumulator;
pub use in_place::InPlaceAccumulator;
pub use window::BufferWindow;

use crate::message::{declared_length, MessageShape};
use serde::Deserialize;
use thiserror::Error;

/// Where the accumulator stands between deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Fewer than `header_size` bytes of the next message are buffered.
    AwaitingHeader,
    /// Header parsed; waiting for the rest of a `total`-byte message.
    AccumulatingPayload { total: usize },
    /// A complete message is buffered but was not delivered because the
    /// callback asked to stop.
    MessageComplete,
}

/// Protocol violations. All of them are fatal for the descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("declared length {declared} is shorter than the {header_size}-byte header")]
    Malformed { declared: usize, header_size: usize },
    #[error("payload of {payload} bytes exceeds maximum {max}")]
    PayloadTooLarge { payload: usize, max: usize },
    #[error("window of {capacity} bytes cannot hold a {needed}-byte message")]
    WindowTooSmall { needed: usize, capacity: usize },
}

/// Summary of one `feed` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Feed {
    /// Messages handed to the callback.
    pub delivered: usize,
    /// The callback returned `false`; unconsumed bytes are kept.
    pub stopped: bool,
}

/// Callback invoked once per complete message. Return `false` to stop
/// extracting further messages from the current delivery.
pub type OnMessage<'f> = dyn FnMut(&[u8]) -> bool + 'f;

/// Stitches raw deliveries into whole messages.
pub trait Accumulator: Send {
    /// Account for `received` new bytes at the window's cursor, then
    /// deliver every complete message.
    ///
    /// Passing `received == 0` resumes extraction over bytes left behind
    /// by a callback that returned `false`.
    fn feed(
        &mut self,
        window: &mut BufferWindow<'_>,
        received: usize,
        on_message: &mut OnMessage<'_>,
    ) -> Result<Feed, FramingError>;

    fn state(&self) -> FrameState;

    /// Forget any partly accumulated message. Bytes in the window are the
    /// caller's to clear.
    fn reset(&mut self);
}

/// Accumulation strategy, picked once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    InPlace,
    Copying,
}

impl Strategy {
    pub fn build(self, shape: MessageShape) -> Box<dyn Accumulator> {
        match self {
            Strategy::InPlace => Box::new(InPlaceAccumulator::new(shape)),
            Strategy::Copying => Box::new(CopyingAccumulator::new(shape)),
        }
    }
}

/// Total length of the message at the start of `buf`, once its header is in.
fn frame_length(buf: &[u8], shape: &MessageShape) -> Result<Option<usize>, FramingError> {
    if buf.len() < shape.header_size() {
        return Ok(None);
    }
    let declared = declared_length(buf).unwrap_or(0);
    if declared < shape.header_size() {
        return Err(FramingError::Malformed {
            declared,
            header_size: shape.header_size(),
        });
    }
    let payload = declared - shape.header_size();
    if payload > shape.max_payload_size() {
        return Err(FramingError::PayloadTooLarge {
            payload,
            max: shape.max_payload_size(),
        });
    }
    Ok(Some(declared))
}

fn state_of(buf: &[u8], shape: &MessageShape) -> FrameState {
    match frame_length(buf, shape) {
        Ok(Some(total)) if buf.len() >= total => FrameState::MessageComplete,
        Ok(Some(total)) => FrameState::AccumulatingPayload { total },
        // Errors surface on the next pass
        _ => FrameState::AwaitingHeader,
    }
}

struct Extracted {
    consumed: usize,
    feed: Feed,
    state: FrameState,
}

/// Deliver complete messages from the front of `buf`.
fn extract(
    buf: &[u8],
    shape: &MessageShape,
    on_message: &mut OnMessage<'_>,
) -> Result<Extracted, FramingError> {
    let mut consumed = 0;
    let mut feed = Feed::default();

    loop {
        let rest = &buf[consumed..];
        let total = match frame_length(rest, shape)? {
            Some(total) if rest.len() >= total => total,
            _ => {
                return Ok(Extracted {
                    consumed,
                    feed,
                    state: state_of(rest, shape),
                })
            }
        };

        consumed += total;
        feed.delivered += 1;

        if !on_message(&rest[..total]) {
            feed.stopped = true;
            return Ok(Extracted {
                consumed,
                feed,
                state: state_of(&buf[consumed..], shape),
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    /// Build a framed message: 4-byte length, zero padding up to
    /// `header_size`, then `payload`.
    pub fn frame(header_size: usize, payload: &[u8]) -> Vec<u8> {
        let total = header_size + payload.len();
        let mut msg = vec![0u8; header_size];
        msg[..4].copy_from_slice(&(total as u32).to_be_bytes());
        msg.extend_from_slice(payload);
        msg
    }
}
