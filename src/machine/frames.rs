//! The machine stack: a single contiguous word arena holding environment and
//! choice-point frames of variable length, bump-allocated with explicit
//! previous-frame words. Frames are never compacted; the allocation point is
//! recomputed from the live E/B frames, which is what lets an environment be
//! retained when a choice point still covers it.

use super::heap::Cell;

const KIND_ENVIRONMENT: u64 = 0x1;
const KIND_CHOICE_POINT: u64 = 0x2;
const FLAG_EXTENDED: u64 = 0x4;
/// Set on the extended environments pushed by `;`/`->` as cut barriers, as
/// opposed to clause activations.
const FLAG_BARRIER: u64 = 0x8;

const NONE: u64 = u64::MAX;

fn encode_frame(frame: Option<usize>) -> u64 {
    frame.map_or(NONE, |at| at as u64)
}

fn decode_frame(word: u64) -> Option<usize> {
    (word != NONE).then_some(word as usize)
}

/// An environment frame holds the continuation and the permanent variables
/// of one activation. Extended frames additionally carry the cut barrier B0
/// and the activation's QR/PR.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnvFrame {
    pub prev_e: Option<usize>,
    pub prev_e_extended: bool,
    pub cp: Cell,
    pub num_y: usize,
    pub extended: bool,
    pub barrier: bool,
    pub b0: Option<usize>,
    pub qr: Cell,
    pub pr: Cell,
}

const ENV_FLAGS: usize = 0;
const ENV_PREV_E: usize = 1;
const ENV_PREV_E_EXTENDED: usize = 2;
const ENV_CP: usize = 3;
const ENV_NUM_Y: usize = 4;
const ENV_BASE_WORDS: usize = 5;
const ENV_B0: usize = 5;
const ENV_QR: usize = 6;
const ENV_PR: usize = 7;
const ENV_EXTENDED_WORDS: usize = 8;

/// A choice-point frame records everything needed to retry the next clause:
/// the argument registers, previous machine registers, the heap and trail
/// watermarks, the cut barrier, the packed next-alternative BP, and the
/// predicate and query being solved.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChoiceFrame {
    pub prev_b: Option<usize>,
    pub prev_e: Option<usize>,
    pub prev_e_extended: bool,
    pub cp: Cell,
    pub h: usize,
    pub tr: usize,
    pub b0: Option<usize>,
    pub bp: Cell,
    pub pr: Cell,
    pub qr: Cell,
    pub num_args: usize,
}

const CHOICE_FLAGS: usize = 0;
const CHOICE_PREV_B: usize = 1;
const CHOICE_PREV_E: usize = 2;
const CHOICE_PREV_E_EXTENDED: usize = 3;
const CHOICE_CP: usize = 4;
const CHOICE_H: usize = 5;
const CHOICE_TR: usize = 6;
const CHOICE_B0: usize = 7;
const CHOICE_BP: usize = 8;
const CHOICE_PR: usize = 9;
const CHOICE_QR: usize = 10;
const CHOICE_NUM_ARGS: usize = 11;
const CHOICE_WORDS: usize = 12;

pub(crate) struct StackArena {
    words: Vec<u64>,
}

impl StackArena {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    fn ensure(&mut self, end: usize) {
        if self.words.len() < end {
            self.words.resize(end, 0);
        }
    }

    fn get(&self, at: usize) -> u64 {
        self.words[at]
    }

    fn set(&mut self, at: usize, word: u64) {
        self.words[at] = word;
    }

    /// End of the frame starting at `at`, i.e. the first word past it.
    pub fn frame_end(&self, at: usize) -> usize {
        let flags = self.get(at);
        if flags & KIND_CHOICE_POINT != 0 {
            at + CHOICE_WORDS + self.get(at + CHOICE_NUM_ARGS) as usize
        } else {
            let header = if flags & FLAG_EXTENDED != 0 {
                ENV_EXTENDED_WORDS
            } else {
                ENV_BASE_WORDS
            };
            at + header + self.get(at + ENV_NUM_Y) as usize
        }
    }

    pub fn push_env(&mut self, at: usize, frame: &EnvFrame) -> usize {
        let header = if frame.extended {
            ENV_EXTENDED_WORDS
        } else {
            ENV_BASE_WORDS
        };
        self.ensure(at + header + frame.num_y);

        let mut flags = KIND_ENVIRONMENT;
        if frame.extended {
            flags |= FLAG_EXTENDED;
        }
        if frame.barrier {
            flags |= FLAG_BARRIER;
        }

        self.set(at + ENV_FLAGS, flags);
        self.set(at + ENV_PREV_E, encode_frame(frame.prev_e));
        self.set(at + ENV_PREV_E_EXTENDED, u64::from(frame.prev_e_extended));
        self.set(at + ENV_CP, frame.cp.raw());
        self.set(at + ENV_NUM_Y, frame.num_y as u64);
        if frame.extended {
            self.set(at + ENV_B0, encode_frame(frame.b0));
            self.set(at + ENV_QR, frame.qr.raw());
            self.set(at + ENV_PR, frame.pr.raw());
        }
        for i in 0..frame.num_y {
            self.set(at + header + i, Cell::int(0).raw());
        }

        at
    }

    pub fn env(&self, at: usize) -> EnvFrame {
        let flags = self.get(at + ENV_FLAGS);
        debug_assert!(flags & KIND_ENVIRONMENT != 0);
        let extended = flags & FLAG_EXTENDED != 0;

        EnvFrame {
            prev_e: decode_frame(self.get(at + ENV_PREV_E)),
            prev_e_extended: self.get(at + ENV_PREV_E_EXTENDED) != 0,
            cp: Cell::from_raw(self.get(at + ENV_CP)),
            num_y: self.get(at + ENV_NUM_Y) as usize,
            extended,
            barrier: flags & FLAG_BARRIER != 0,
            b0: if extended {
                decode_frame(self.get(at + ENV_B0))
            } else {
                None
            },
            qr: if extended {
                Cell::from_raw(self.get(at + ENV_QR))
            } else {
                Cell::int(0)
            },
            pr: if extended {
                Cell::from_raw(self.get(at + ENV_PR))
            } else {
                Cell::int(0)
            },
        }
    }

    fn env_y_slot(&self, at: usize, i: usize) -> usize {
        let flags = self.get(at + ENV_FLAGS);
        let header = if flags & FLAG_EXTENDED != 0 {
            ENV_EXTENDED_WORDS
        } else {
            ENV_BASE_WORDS
        };
        debug_assert!(i < self.get(at + ENV_NUM_Y) as usize);
        at + header + i
    }

    pub fn env_y(&self, at: usize, i: usize) -> Cell {
        Cell::from_raw(self.get(self.env_y_slot(at, i)))
    }

    pub fn set_env_y(&mut self, at: usize, i: usize, c: Cell) {
        let slot = self.env_y_slot(at, i);
        self.set(slot, c.raw());
    }

    pub fn push_choice(&mut self, at: usize, frame: &ChoiceFrame, args: &[Cell]) -> usize {
        debug_assert_eq!(frame.num_args, args.len());
        self.ensure(at + CHOICE_WORDS + args.len());

        self.set(at + CHOICE_FLAGS, KIND_CHOICE_POINT);
        self.set(at + CHOICE_PREV_B, encode_frame(frame.prev_b));
        self.set(at + CHOICE_PREV_E, encode_frame(frame.prev_e));
        self.set(at + CHOICE_PREV_E_EXTENDED, u64::from(frame.prev_e_extended));
        self.set(at + CHOICE_CP, frame.cp.raw());
        self.set(at + CHOICE_H, frame.h as u64);
        self.set(at + CHOICE_TR, frame.tr as u64);
        self.set(at + CHOICE_B0, encode_frame(frame.b0));
        self.set(at + CHOICE_BP, frame.bp.raw());
        self.set(at + CHOICE_PR, frame.pr.raw());
        self.set(at + CHOICE_QR, frame.qr.raw());
        self.set(at + CHOICE_NUM_ARGS, args.len() as u64);
        for (i, &arg) in args.iter().enumerate() {
            self.set(at + CHOICE_WORDS + i, arg.raw());
        }

        at
    }

    pub fn choice(&self, at: usize) -> ChoiceFrame {
        debug_assert!(self.get(at + CHOICE_FLAGS) & KIND_CHOICE_POINT != 0);

        ChoiceFrame {
            prev_b: decode_frame(self.get(at + CHOICE_PREV_B)),
            prev_e: decode_frame(self.get(at + CHOICE_PREV_E)),
            prev_e_extended: self.get(at + CHOICE_PREV_E_EXTENDED) != 0,
            cp: Cell::from_raw(self.get(at + CHOICE_CP)),
            h: self.get(at + CHOICE_H) as usize,
            tr: self.get(at + CHOICE_TR) as usize,
            b0: decode_frame(self.get(at + CHOICE_B0)),
            bp: Cell::from_raw(self.get(at + CHOICE_BP)),
            pr: Cell::from_raw(self.get(at + CHOICE_PR)),
            qr: Cell::from_raw(self.get(at + CHOICE_QR)),
            num_args: self.get(at + CHOICE_NUM_ARGS) as usize,
        }
    }

    pub fn choice_arg(&self, at: usize, i: usize) -> Cell {
        debug_assert!(i < self.get(at + CHOICE_NUM_ARGS) as usize);
        Cell::from_raw(self.get(at + CHOICE_WORDS + i))
    }

    pub fn set_choice_bp(&mut self, at: usize, bp: Cell) {
        debug_assert!(self.get(at + CHOICE_FLAGS) & KIND_CHOICE_POINT != 0);
        self.set(at + CHOICE_BP, bp.raw());
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, ChoiceFrame, EnvFrame, StackArena};

    #[test]
    fn environment_frames_round_trip() {
        let mut stack = StackArena::new();

        let base = stack.push_env(
            0,
            &EnvFrame {
                prev_e: None,
                prev_e_extended: false,
                cp: Cell::int(1),
                num_y: 2,
                extended: false,
                barrier: false,
                b0: None,
                qr: Cell::int(0),
                pr: Cell::int(0),
            },
        );

        stack.set_env_y(base, 0, Cell::int(10));
        stack.set_env_y(base, 1, Cell::int(11));

        let at = stack.frame_end(base);
        let ext = stack.push_env(
            at,
            &EnvFrame {
                prev_e: Some(base),
                prev_e_extended: false,
                cp: Cell::int(2),
                num_y: 0,
                extended: true,
                barrier: true,
                b0: Some(base),
                qr: Cell::int(3),
                pr: Cell::int(4),
            },
        );

        let decoded = stack.env(base);
        assert_eq!(decoded.prev_e, None);
        assert_eq!(decoded.cp, Cell::int(1));
        assert_eq!(decoded.num_y, 2);
        assert!(!decoded.extended);
        assert_eq!(stack.env_y(base, 0), Cell::int(10));
        assert_eq!(stack.env_y(base, 1), Cell::int(11));

        let decoded = stack.env(ext);
        assert_eq!(decoded.prev_e, Some(base));
        assert!(decoded.extended);
        assert!(decoded.barrier);
        assert_eq!(decoded.b0, Some(base));
        assert_eq!(decoded.qr, Cell::int(3));
        assert_eq!(decoded.pr, Cell::int(4));
    }

    #[test]
    fn choice_frames_round_trip() {
        let mut stack = StackArena::new();
        let args = [Cell::int(7), Cell::int(8)];

        let at = stack.push_choice(
            0,
            &ChoiceFrame {
                prev_b: None,
                prev_e: Some(3),
                prev_e_extended: true,
                cp: Cell::int(1),
                h: 100,
                tr: 5,
                b0: None,
                bp: Cell::int(0x102),
                pr: Cell::int(2),
                qr: Cell::int(3),
                num_args: 2,
            },
            &args,
        );

        let decoded = stack.choice(at);
        assert_eq!(decoded.prev_b, None);
        assert_eq!(decoded.prev_e, Some(3));
        assert!(decoded.prev_e_extended);
        assert_eq!(decoded.h, 100);
        assert_eq!(decoded.tr, 5);
        assert_eq!(decoded.bp, Cell::int(0x102));
        assert_eq!(decoded.num_args, 2);
        assert_eq!(stack.choice_arg(at, 0), Cell::int(7));
        assert_eq!(stack.choice_arg(at, 1), Cell::int(8));

        stack.set_choice_bp(at, Cell::int(0));
        assert_eq!(stack.choice(at).bp, Cell::int(0));

        assert_eq!(stack.frame_end(at), at + 12 + 2);
    }
}
