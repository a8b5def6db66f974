//! Zero-copy accumulation: the receive window doubles as message buffer.

use super::{extract, Accumulator, BufferWindow, Feed, FrameState, FramingError, OnMessage};
use crate::message::MessageShape;

/// Accumulates messages directly in the receive window.
///
/// After each pass, bytes of an incomplete next message are moved to the
/// window's start so the following read appends to them. The window must be
/// able to hold the largest message the shape allows.
#[derive(Debug)]
pub struct InPlaceAccumulator {
    shape: MessageShape,
    state: FrameState,
}

impl InPlaceAccumulator {
    pub fn new(shape: MessageShape) -> Self {
        Self {
            shape,
            state: FrameState::AwaitingHeader,
        }
    }
}

impl Accumulator for InPlaceAccumulator {
    fn feed(
        &mut self,
        window: &mut BufferWindow<'_>,
        received: usize,
        on_message: &mut OnMessage<'_>,
    ) -> Result<Feed, FramingError> {
        let needed = self.shape.max_message_size();
        if window.capacity() < needed {
            return Err(FramingError::WindowTooSmall {
                needed,
                capacity: window.capacity(),
            });
        }

        window.advance(received);
        let extracted = extract(window.filled(), &self.shape, on_message)?;
        window.consume(extracted.consumed);
        self.state = extracted.state;

        Ok(extracted.feed)
    }

    fn state(&self) -> FrameState {
        self.state
    }

    fn reset(&mut self) {
        self.state = FrameState::AwaitingHeader;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::testing::frame;
    use proptest::prelude::*;

    fn shape() -> MessageShape {
        MessageShape::new(8, 1024, u64::MAX).unwrap()
    }

    /// Copy `bytes` into the window's free tail and feed them.
    fn deliver(
        acc: &mut InPlaceAccumulator,
        window: &mut BufferWindow<'_>,
        bytes: &[u8],
        out: &mut Vec<Vec<u8>>,
    ) -> Result<Feed, FramingError> {
        window.free_mut()[..bytes.len()].copy_from_slice(bytes);
        acc.feed(window, bytes.len(), &mut |msg: &[u8]| {
            out.push(msg.to_vec());
            true
        })
    }

    #[test]
    fn test_large_message_over_three_reads() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(1032);
        let msg = frame(8, &[7u8; 1024]);
        let mut out = Vec::new();

        let feed = deliver(&mut acc, &mut window, &msg[..500], &mut out).unwrap();
        assert_eq!(feed.delivered, 0);
        assert_eq!(acc.state(), FrameState::AccumulatingPayload { total: 1032 });

        deliver(&mut acc, &mut window, &msg[500..800], &mut out).unwrap();
        assert!(out.is_empty());

        let feed = deliver(&mut acc, &mut window, &msg[800..], &mut out).unwrap();
        assert_eq!(feed.delivered, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len() - 8, 1024);
        assert_eq!(out[0], msg);
        assert_eq!(acc.state(), FrameState::AwaitingHeader);
        assert!(window.is_empty());
    }

    #[test]
    fn test_header_split_across_reads() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(1032);
        let msg = frame(8, b"payload");
        let mut out = Vec::new();

        deliver(&mut acc, &mut window, &msg[..3], &mut out).unwrap();
        assert_eq!(acc.state(), FrameState::AwaitingHeader);
        deliver(&mut acc, &mut window, &msg[3..], &mut out).unwrap();
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn test_multiple_messages_in_one_datagram() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(2048);
        let mut datagram = frame(8, b"a");
        datagram.extend(frame(8, b""));
        datagram.extend(frame(8, b"ccc"));
        let mut out = Vec::new();

        let feed = deliver(&mut acc, &mut window, &datagram, &mut out).unwrap();

        assert_eq!(feed.delivered, 3);
        assert_eq!(out[0], frame(8, b"a"));
        assert_eq!(out[1], frame(8, b""));
        assert_eq!(out[2], frame(8, b"ccc"));
    }

    #[test]
    fn test_residual_moves_to_front() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(1032);
        let first = frame(8, b"first");
        let second = frame(8, b"second");
        let mut bytes = first.clone();
        bytes.extend(&second[..6]);
        let mut out = Vec::new();

        deliver(&mut acc, &mut window, &bytes, &mut out).unwrap();
        assert_eq!(out, vec![first]);
        assert_eq!(window.filled(), &second[..6]);

        deliver(&mut acc, &mut window, &second[6..], &mut out).unwrap();
        assert_eq!(out[1], second);
    }

    #[test]
    fn test_stop_keeps_unconsumed_bytes() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(1032);
        let mut bytes = frame(8, b"one");
        bytes.extend(frame(8, b"two"));
        window.free_mut()[..bytes.len()].copy_from_slice(&bytes);

        let mut seen = Vec::new();
        let feed = acc
            .feed(&mut window, bytes.len(), &mut |msg: &[u8]| {
                seen.push(msg.to_vec());
                false
            })
            .unwrap();
        assert_eq!(feed, Feed { delivered: 1, stopped: true });
        assert_eq!(acc.state(), FrameState::MessageComplete);
        assert_eq!(window.filled(), &frame(8, b"two")[..]);

        // Resume without new bytes
        let feed = acc
            .feed(&mut window, 0, &mut |msg: &[u8]| {
                seen.push(msg.to_vec());
                true
            })
            .unwrap();
        assert_eq!(feed.delivered, 1);
        assert_eq!(seen, vec![frame(8, b"one"), frame(8, b"two")]);
        assert!(window.is_empty());
    }

    #[test]
    fn test_reset_starts_at_boundary() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(1032);
        let first = frame(8, b"first");
        let second = frame(8, b"second");
        let mut out = Vec::new();

        deliver(&mut acc, &mut window, &first[..10], &mut out).unwrap();
        assert_eq!(acc.state(), FrameState::AccumulatingPayload { total: 13 });

        acc.reset();
        window.clear();
        assert_eq!(acc.state(), FrameState::AwaitingHeader);

        deliver(&mut acc, &mut window, &second, &mut out).unwrap();
        assert_eq!(out, vec![second]);
    }

    #[test]
    fn test_oversized_payload_is_fatal() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(1032);
        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&2000u32.to_be_bytes());
        let mut out = Vec::new();

        let err = deliver(&mut acc, &mut window, &header, &mut out).unwrap_err();
        assert_eq!(
            err,
            FramingError::PayloadTooLarge {
                payload: 1992,
                max: 1024
            }
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_window_smaller_than_message_is_rejected() {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(100);
        let mut out = Vec::new();
        let err = deliver(&mut acc, &mut window, b"", &mut out).unwrap_err();
        assert_eq!(
            err,
            FramingError::WindowTooSmall {
                needed: 1032,
                capacity: 100
            }
        );
    }

    /// Feed `stream` in chunks of the given sizes (cycled); collect messages.
    fn run_split(stream: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
        let mut acc = InPlaceAccumulator::new(shape());
        let mut window = BufferWindow::with_capacity(shape().max_message_size());
        let mut out = Vec::new();
        let mut pos = 0;
        let mut sizes = sizes.iter().cycle();
        while pos < stream.len() {
            let size = (*sizes.next().unwrap()).min(window.remaining()).min(stream.len() - pos);
            deliver(&mut acc, &mut window, &stream[pos..pos + size], &mut out).unwrap();
            pos += size;
        }
        out
    }

    proptest! {
        #[test]
        fn prop_split_matches_whole(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..=300), 1..8),
            sizes in prop::collection::vec(1usize..=700, 1..16),
        ) {
            let messages: Vec<Vec<u8>> = payloads.iter().map(|p| frame(8, p)).collect();
            let stream: Vec<u8> = messages.concat();

            let whole = run_split(&stream, &[usize::MAX]);
            let split = run_split(&stream, &sizes);

            prop_assert_eq!(&whole, &messages);
            prop_assert_eq!(&split, &messages);

            let payload_total: usize = split.iter().map(|m| m.len() - 8).sum();
            prop_assert_eq!(payload_total, stream.len() - split.len() * 8);
        }
    }
}
