//! Wire protocol frame definitions
//!
//! Every byte on the wire is 7-bit. The first byte of a frame selects its
//! kind through a 128-entry table; each kind has a fixed total length.

use bytes::BufMut;

use crate::game::{Direction, PlayerId, Pose, NAME_LEN};

/// Every payload byte has this bit set so it never looks like a frame tag
const FIELD_MARK: u8 = 0o100;
const FIELD_MASK: u8 = 0o77;

pub const TAG_LEAVE: u8 = 1;
pub const TAG_MOVE: u8 = 2;
pub const TAG_KILL: u8 = 3;
pub const TAG_NEW: u8 = 4;

/// Frame kind selected by a leading byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteClass {
    Ignore,
    Leave,
    Move,
    Kill,
    New,
    /// Console character
    Echo,
    Relative(Relative),
}

impl ByteClass {
    /// Total frame length, tag included
    pub const fn frame_len(self) -> usize {
        match self {
            ByteClass::Leave => 2,
            ByteClass::Move => 5,
            ByteClass::Kill => 3,
            ByteClass::New => 12,
            ByteClass::Ignore | ByteClass::Echo | ByteClass::Relative(_) => 1,
        }
    }
}

/// One-byte movement of another player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relative {
    TurnRight,
    TurnLeft,
    AboutFace,
    Forward,
    Backward,
}

impl Relative {
    /// Tag with the id bits cleared
    pub const fn base(self) -> u8 {
        match self {
            Relative::TurnRight => 0o20,
            Relative::TurnLeft => 0o30,
            Relative::AboutFace => 0o140,
            Relative::Forward => 0o150,
            Relative::Backward => 0o160,
        }
    }
}

/// Classification of every 7-bit value
pub static BYTE_CLASSES: [ByteClass; 128] = build_byte_classes();

const fn build_byte_classes() -> [ByteClass; 128] {
    let mut table = [ByteClass::Ignore; 128];
    let mut byte = 0;
    while byte < 128 {
        table[byte] = match byte as u8 {
            TAG_LEAVE => ByteClass::Leave,
            TAG_MOVE => ByteClass::Move,
            TAG_KILL => ByteClass::Kill,
            TAG_NEW => ByteClass::New,
            0o10..=0o17 | 0o40..=0o137 => ByteClass::Echo,
            0o20..=0o27 => ByteClass::Relative(Relative::TurnRight),
            0o30..=0o37 => ByteClass::Relative(Relative::TurnLeft),
            0o140..=0o147 => ByteClass::Relative(Relative::AboutFace),
            0o150..=0o157 => ByteClass::Relative(Relative::Forward),
            0o160..=0o167 => ByteClass::Relative(Relative::Backward),
            _ => ByteClass::Ignore,
        };
        byte += 1;
    }
    table
}

/// Classify a byte, ignoring the parity bit
pub fn classify(byte: u8) -> ByteClass {
    BYTE_CLASSES[(byte & 0x7f) as usize]
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Leave {
        id: PlayerId,
    },
    /// Absolute position
    Move {
        id: PlayerId,
        pose: Pose,
    },
    Kill {
        shooter: PlayerId,
        victim: PlayerId,
    },
    /// Player announce
    New {
        id: PlayerId,
        name: [u8; NAME_LEN],
        score: u32,
        deaths: u32,
    },
    Echo(u8),
    Relative {
        id: PlayerId,
        action: Relative,
    },
    /// Unknown tag, or a frame naming an id outside 1-8
    Ignored {
        tag: u8,
    },
}

/// Decode one frame from the front of `buf`. `None` means more bytes are
/// needed; otherwise the frame and the number of bytes it used.
pub fn decode(buf: &[u8]) -> Option<(Frame, usize)> {
    let tag = *buf.first()? & 0x7f;
    let class = classify(tag);
    let len = class.frame_len();
    if buf.len() < len {
        return None;
    }
    let body = &buf[1..len];
    let ignored = Frame::Ignored { tag };

    let frame = match class {
        ByteClass::Ignore => ignored,
        ByteClass::Echo => Frame::Echo(tag),
        ByteClass::Relative(action) => Frame::Relative {
            id: PlayerId::from_low_bits(tag),
            action,
        },
        ByteClass::Leave => match id_field(body[0]) {
            Some(id) => Frame::Leave { id },
            None => ignored,
        },
        ByteClass::Move => match id_field(body[0]) {
            Some(id) => Frame::Move {
                id,
                pose: Pose::new(
                    coord_field(body[2]),
                    coord_field(body[3]),
                    Direction::from_bits(body[1]),
                ),
            },
            None => ignored,
        },
        ByteClass::Kill => match (id_field(body[0]), id_field(body[1])) {
            (Some(shooter), Some(victim)) => Frame::Kill { shooter, victim },
            _ => ignored,
        },
        ByteClass::New => match id_field(body[0]) {
            Some(id) => {
                let mut name = [b' '; NAME_LEN];
                for (dst, src) in name.iter_mut().zip(&body[1..1 + NAME_LEN]) {
                    *dst = src & 0x7f;
                }
                Frame::New {
                    id,
                    name,
                    score: counter_field(body[7], body[8]),
                    deaths: counter_field(body[9], body[10]),
                }
            }
            None => ignored,
        },
    };
    Some((frame, len))
}

fn id_field(byte: u8) -> Option<PlayerId> {
    PlayerId::new(byte & 0x7f)
}

fn coord_field(byte: u8) -> i32 {
    (byte & FIELD_MASK) as i32
}

/// Two 6-bit digits, high first
fn counter_field(hi: u8, lo: u8) -> u32 {
    (((hi & FIELD_MASK) as u32) << 6) | (lo & FIELD_MASK) as u32
}

impl Frame {
    /// Bytes this frame takes on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Frame::Leave { .. } => ByteClass::Leave.frame_len(),
            Frame::Move { .. } => ByteClass::Move.frame_len(),
            Frame::Kill { .. } => ByteClass::Kill.frame_len(),
            Frame::New { .. } => ByteClass::New.frame_len(),
            Frame::Echo(_) | Frame::Relative { .. } | Frame::Ignored { .. } => 1,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        match *self {
            Frame::Leave { id } => {
                buf.put_u8(TAG_LEAVE);
                buf.put_u8(id.get());
            }
            Frame::Move { id, pose } => {
                buf.put_u8(TAG_MOVE);
                buf.put_u8(id.get());
                buf.put_u8(pose.dir.bits() | FIELD_MARK);
                buf.put_u8(pose.x as u8 & FIELD_MASK | FIELD_MARK);
                buf.put_u8(pose.y as u8 & FIELD_MASK | FIELD_MARK);
            }
            Frame::Kill { shooter, victim } => {
                buf.put_u8(TAG_KILL);
                buf.put_u8(shooter.get());
                buf.put_u8(victim.get());
            }
            Frame::New {
                id,
                name,
                score,
                deaths,
            } => {
                buf.put_u8(TAG_NEW);
                buf.put_u8(id.get());
                buf.put_slice(&name);
                put_counter(buf, score);
                put_counter(buf, deaths);
            }
            Frame::Echo(ch) => buf.put_u8(ch & 0x7f),
            Frame::Relative { id, action } => buf.put_u8(action.base() | id.low_bits()),
            Frame::Ignored { tag } => buf.put_u8(tag & 0x7f),
        }
    }
}

fn put_counter(buf: &mut impl BufMut, value: u32) {
    buf.put_u8(((value >> 6) as u8 & FIELD_MASK) | FIELD_MARK);
    buf.put_u8((value as u8 & FIELD_MASK) | FIELD_MARK);
}
