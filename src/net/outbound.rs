//! Bounded outbound buffer with relative-move coalescing
//!
//! Local moves go out as one-byte relative commands while the server can be
//! trusted to track them. Once enough relative bytes have gone out since the
//! last absolute position, the next move is sent as an absolute frame instead
//! and the count starts over.

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use super::protocol::{Frame, Relative};
use crate::game::{PlayerId, Pose};

/// Bytes queued plus bytes in flight never exceed this
pub const OUTBOUND_CAPACITY: usize = 256;
/// Relative bytes allowed between absolute positions, exclusive
pub const RELATIVE_CEILING: usize = 8;
/// A step burst this long is cheaper to send as one absolute frame
pub const STEP_BURST_LIMIT: usize = 5;

/// Outbound errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OutboundError {
    #[error("outbound buffer full ({needed} bytes needed, {available} available)")]
    BufferFull { needed: usize, available: usize },
}

/// What a movement request put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
    Nothing,
    /// This many relative bytes
    Relative(usize),
    Absolute,
}

/// Outbound byte queue
#[derive(Debug)]
pub struct OutboundQueue {
    pending: BytesMut,
    /// Bytes handed to the writer and not yet acknowledged
    in_flight: usize,
    /// Relative bytes since the last absolute position
    relative: usize,
    /// A position update was dropped; the next move must be absolute
    desynced: bool,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(capacity),
            in_flight: 0,
            relative: 0,
            desynced: false,
            capacity,
        }
    }

    /// Queue any frame as-is
    pub fn push(&mut self, frame: &Frame) -> Result<(), OutboundError> {
        self.reserve(frame.encoded_len())?;
        frame.encode(&mut self.pending);
        trace!(?frame, "Queued frame");
        Ok(())
    }

    /// Queue an absolute position and reset the relative count
    pub fn push_position(&mut self, id: PlayerId, pose: Pose) -> Result<(), OutboundError> {
        match self.push(&Frame::Move { id, pose }) {
            Ok(()) => {
                self.relative = 0;
                self.desynced = false;
                Ok(())
            }
            Err(err) => {
                self.desynced = true;
                Err(err)
            }
        }
    }

    /// Queue `count` quarter turns in one direction. Full circles cancel out.
    pub fn push_turns(
        &mut self,
        id: PlayerId,
        pose: Pose,
        action: Relative,
        count: usize,
    ) -> Result<Emitted, OutboundError> {
        let steps = vec![action; count % 4];
        self.push_relative(id, pose, &steps, false)
    }

    /// Queue `count` steps that were actually taken
    pub fn push_steps(
        &mut self,
        id: PlayerId,
        pose: Pose,
        action: Relative,
        count: usize,
    ) -> Result<Emitted, OutboundError> {
        let steps = vec![action; count];
        self.push_relative(id, pose, &steps, count >= STEP_BURST_LIMIT)
    }

    /// Queue a fixed sequence, such as the two halves of a peek
    pub fn push_sequence(
        &mut self,
        id: PlayerId,
        pose: Pose,
        actions: &[Relative],
    ) -> Result<Emitted, OutboundError> {
        self.push_relative(id, pose, actions, false)
    }

    /// `pose` is where the player ended up, used if an absolute frame is due
    fn push_relative(
        &mut self,
        id: PlayerId,
        pose: Pose,
        actions: &[Relative],
        force_absolute: bool,
    ) -> Result<Emitted, OutboundError> {
        if actions.is_empty() {
            return Ok(Emitted::Nothing);
        }
        if force_absolute || self.desynced || self.relative + actions.len() >= RELATIVE_CEILING {
            self.push_position(id, pose)?;
            return Ok(Emitted::Absolute);
        }

        if let Err(err) = self.reserve(actions.len()) {
            self.desynced = true;
            return Err(err);
        }
        for &action in actions {
            Frame::Relative { id, action }.encode(&mut self.pending);
        }
        self.relative += actions.len();
        Ok(Emitted::Relative(actions.len()))
    }

    fn reserve(&self, needed: usize) -> Result<(), OutboundError> {
        let available = self.capacity - self.pending.len() - self.in_flight;
        if needed > available {
            warn!(needed, available, "Outbound buffer full");
            return Err(OutboundError::BufferFull { needed, available });
        }
        Ok(())
    }

    /// Hand queued bytes to the writer, unless a flush is already outstanding
    pub fn take(&mut self) -> Option<Bytes> {
        if self.in_flight > 0 || self.pending.is_empty() {
            return None;
        }
        self.in_flight = self.pending.len();
        Some(self.pending.split().freeze())
    }

    /// The writer finished the last chunk
    pub fn complete_flush(&mut self) {
        self.in_flight = 0;
    }

    /// Nothing queued and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.pending.is_empty()
    }

    /// Drop everything, e.g. when the connection is gone
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = 0;
        self.relative = 0;
        self.desynced = false;
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
