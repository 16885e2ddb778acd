//! The shared execution model of a compiled pattern: a flat bytecode program,
//! the control-flow graph built over it, a block scheduler and a backtracking
//! interpreter that walks the scheduled graph.
//!
//! # Example
//!
//! ```rust
//! use regjit_runtime::*;
//!
//! // `ab|ac`, hand assembled.
//! let program = Instructions::default().with_opcodes(vec![
//!     Opcode::Fork(InstFork::new(InstIndex::from(5))),
//!     Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(3))),
//!     Opcode::Fail,
//!     Opcode::JumpValue(InstJumpValue::new('b', InstIndex::from(9))),
//!     Opcode::Fail,
//!     Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(7))),
//!     Opcode::Fail,
//!     Opcode::JumpValue(InstJumpValue::new('c', InstIndex::from(9))),
//!     Opcode::Fail,
//!     Opcode::Match,
//! ]);
//!
//! let cfg = cfg::build(&program);
//! let schedule = scheduler::schedule(&cfg);
//! assert_eq!(cfg.len(), schedule.len());
//!
//! assert!(interpreter::run(&cfg, "xac").is_some());
//! assert!(interpreter::run(&cfg, "bc").is_none());
//! ```

use std::fmt::{Debug, Display};

pub mod cfg;
pub mod interpreter;
pub mod scheduler;

pub use cfg::{Block, BlockId, Cfg, Exit, ExitMetadata};
pub use interpreter::{run, CaptureSpan, Captures};
pub use scheduler::{schedule, Schedule, SchedulerAnomaly};

/// A linear bytecode program along with the number of automaton states its
/// `Visit` instructions track.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Instructions {
    visit_slots: usize,
    program: Vec<Instruction>,
}

impl Instructions {
    #[must_use]
    pub fn new(visit_slots: usize, program: Vec<Opcode>) -> Self {
        Self::default()
            .with_visit_slots(visit_slots)
            .with_opcodes(program)
    }

    pub fn with_opcodes(self, program: Vec<Opcode>) -> Self {
        // hand assembled programs may omit the slot count.
        let visit_slots = program
            .iter()
            .filter_map(|opcode| match opcode {
                Opcode::Visit(InstVisit { slot }) => Some(*slot as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            .max(self.visit_slots);

        Self {
            visit_slots,
            program: program
                .into_iter()
                .enumerate()
                .map(|(id, opcode)| Instruction::new(id, opcode))
                .collect(),
        }
    }

    pub fn with_visit_slots(self, visit_slots: usize) -> Self {
        Self {
            visit_slots: visit_slots.max(self.visit_slots),
            program: self.program,
        }
    }

    /// The number of distinct `Visit` slots referenced by the program.
    pub fn visit_slots(&self) -> usize {
        self.visit_slots
    }

    pub fn len(&self) -> usize {
        self.program.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: InstIndex) -> Option<&Opcode> {
        self.program.get(index.as_usize()).map(|inst| &inst.opcode)
    }
}

impl Display for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for inst in self.program.iter() {
            writeln!(f, "{}", inst)?
        }

        Ok(())
    }
}

impl std::ops::Index<InstIndex> for Instructions {
    type Output = Opcode;

    fn index(&self, index: InstIndex) -> &Self::Output {
        let idx = index.as_usize();
        &self.program[idx].opcode
    }
}

impl AsRef<[Instruction]> for Instructions {
    fn as_ref(&self) -> &[Instruction] {
        &self.program
    }
}

/// The absolute address of an instruction within a program.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstIndex(u32);

impl InstIndex {
    pub const fn new(ptr: u32) -> Self {
        Self(ptr)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for InstIndex {
    fn from(ptr: u32) -> Self {
        Self(ptr)
    }
}

impl std::ops::Add<u32> for InstIndex {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        let new_ptr = self.0 + rhs;

        InstIndex::from(new_ptr)
    }
}

impl Display for InstIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    id: usize,
    opcode: Opcode,
}

impl Instruction {
    #[must_use]
    pub fn new(id: usize, opcode: Opcode) -> Self {
        Self { id, opcode }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn opcode(&self) -> &Opcode {
        &self.opcode
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}: {}", self.id, self.opcode)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// Pushes the cursor onto the index stack, opening a capture.
    PushIndex,
    /// Pops the index stack, closing the named capture at the cursor.
    PopIndex(InstPopIndex),
    /// Falls through at the beginning of input, otherwise jumps to the
    /// guarded block.
    GuardBegin(InstGuard),
    /// Falls through at the end of input, otherwise jumps to the guarded
    /// block.
    GuardEnd(InstGuard),
    JumpAny(InstJumpAny),
    JumpValue(InstJumpValue),
    JumpValuesInvert(InstJumpValuesInvert),
    JumpRange(InstJumpRange),
    JumpRangeInvert(InstJumpRange),
    JumpLookahead(InstJumpLookahead),
    JumpLookaheadInvert(InstJumpLookahead),
    /// Records a backtrack point resuming at the target with the current
    /// cursor, then falls through.
    Fork(InstFork),
    /// Fails if the slot was already entered at the current cursor during
    /// this match.
    Visit(InstVisit),
    Jump(InstJump),
    /// Marks the start of a block that is only reached when a guard fails.
    Deoptimize,
    Match,
    Fail,
}

impl Opcode {
    /// Returns the address this instruction may transfer control to, if any.
    pub fn target(&self) -> Option<InstIndex> {
        match self {
            Opcode::GuardBegin(InstGuard { guarded }) | Opcode::GuardEnd(InstGuard { guarded }) => {
                Some(*guarded)
            }
            Opcode::JumpAny(InstJumpAny { target })
            | Opcode::JumpValue(InstJumpValue { target, .. })
            | Opcode::JumpValuesInvert(InstJumpValuesInvert { target, .. })
            | Opcode::JumpRange(InstJumpRange { target, .. })
            | Opcode::JumpRangeInvert(InstJumpRange { target, .. })
            | Opcode::JumpLookahead(InstJumpLookahead { target, .. })
            | Opcode::JumpLookaheadInvert(InstJumpLookahead { target, .. })
            | Opcode::Fork(InstFork { target })
            | Opcode::Jump(InstJump { target }) => Some(*target),
            Opcode::PushIndex
            | Opcode::PopIndex(_)
            | Opcode::Visit(_)
            | Opcode::Deoptimize
            | Opcode::Match
            | Opcode::Fail => None,
        }
    }

    /// Returns true for instructions that end execution of the current path.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Opcode::Match | Opcode::Fail)
    }

    /// Returns true if control can reach the instruction that follows.
    pub fn falls_through(&self) -> bool {
        !matches!(self, Opcode::Jump(_) | Opcode::Match | Opcode::Fail)
    }

    /// Returns true if this instruction must be the last of its basic block.
    pub fn ends_block(&self) -> bool {
        self.is_terminal() || self.target().is_some()
    }

    /// Rewrites the control transfer target of an instruction, leaving
    /// instructions without one untouched.
    pub fn with_target(self, new_target: InstIndex) -> Self {
        match self {
            Opcode::GuardBegin(_) => Opcode::GuardBegin(InstGuard::new(new_target)),
            Opcode::GuardEnd(_) => Opcode::GuardEnd(InstGuard::new(new_target)),
            Opcode::JumpAny(_) => Opcode::JumpAny(InstJumpAny::new(new_target)),
            Opcode::JumpValue(inst) => Opcode::JumpValue(InstJumpValue {
                target: new_target,
                ..inst
            }),
            Opcode::JumpValuesInvert(inst) => Opcode::JumpValuesInvert(InstJumpValuesInvert {
                target: new_target,
                ..inst
            }),
            Opcode::JumpRange(inst) => Opcode::JumpRange(InstJumpRange {
                target: new_target,
                ..inst
            }),
            Opcode::JumpRangeInvert(inst) => Opcode::JumpRangeInvert(InstJumpRange {
                target: new_target,
                ..inst
            }),
            Opcode::JumpLookahead(inst) => Opcode::JumpLookahead(InstJumpLookahead {
                target: new_target,
                ..inst
            }),
            Opcode::JumpLookaheadInvert(inst) => Opcode::JumpLookaheadInvert(InstJumpLookahead {
                target: new_target,
                ..inst
            }),
            Opcode::Fork(_) => Opcode::Fork(InstFork::new(new_target)),
            Opcode::Jump(_) => Opcode::Jump(InstJump::new(new_target)),
            other => other,
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Opcode::PushIndex => write!(f, "PushIndex"),
            Opcode::PopIndex(i) => Display::fmt(i, f),
            Opcode::GuardBegin(i) => write!(f, "GuardBegin: {}", i),
            Opcode::GuardEnd(i) => write!(f, "GuardEnd: {}", i),
            Opcode::JumpAny(i) => Display::fmt(i, f),
            Opcode::JumpValue(i) => Display::fmt(i, f),
            Opcode::JumpValuesInvert(i) => Display::fmt(i, f),
            Opcode::JumpRange(i) => write!(f, "JumpRange: {}", i),
            Opcode::JumpRangeInvert(i) => write!(f, "JumpRangeInvert: {}", i),
            Opcode::JumpLookahead(i) => write!(f, "JumpLookahead: {}", i),
            Opcode::JumpLookaheadInvert(i) => write!(f, "JumpLookaheadInvert: {}", i),
            Opcode::Fork(i) => Display::fmt(i, f),
            Opcode::Visit(i) => Display::fmt(i, f),
            Opcode::Jump(i) => Display::fmt(i, f),
            Opcode::Deoptimize => write!(f, "Deoptimize"),
            Opcode::Match => write!(f, "Match"),
            Opcode::Fail => write!(f, "Fail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstPopIndex {
    pub capture: String,
}

impl InstPopIndex {
    #[must_use]
    pub fn new(capture: impl Into<String>) -> Self {
        Self {
            capture: capture.into(),
        }
    }
}

impl Display for InstPopIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PopIndex: {:?}", self.capture)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstGuard {
    pub guarded: InstIndex,
}

impl InstGuard {
    #[must_use]
    pub fn new(guarded: InstIndex) -> Self {
        Self { guarded }
    }
}

impl Display for InstGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.guarded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstJumpAny {
    pub target: InstIndex,
}

impl InstJumpAny {
    #[must_use]
    pub fn new(target: InstIndex) -> Self {
        Self { target }
    }
}

impl Display for InstJumpAny {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JumpAny: ({})", self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstJumpValue {
    pub value: char,
    pub target: InstIndex,
}

impl InstJumpValue {
    #[must_use]
    pub fn new(value: char, target: InstIndex) -> Self {
        Self { value, target }
    }

    pub fn accepts(&self, c: char) -> bool {
        self.value == c
    }
}

impl Display for InstJumpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JumpValue: {:?}, ({})", self.value, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstJumpValuesInvert {
    pub values: Vec<char>,
    pub target: InstIndex,
}

impl InstJumpValuesInvert {
    #[must_use]
    pub fn new(values: Vec<char>, target: InstIndex) -> Self {
        Self { values, target }
    }

    pub fn accepts(&self, c: char) -> bool {
        !self.values.contains(&c)
    }
}

impl Display for InstJumpValuesInvert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JumpValuesInvert: {:?}, ({})", self.values, self.target)
    }
}

/// A jump over an inclusive character range. The same payload backs both
/// `JumpRange` and `JumpRangeInvert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstJumpRange {
    pub left: char,
    pub right: char,
    pub target: InstIndex,
}

impl InstJumpRange {
    #[must_use]
    pub fn new(left: char, right: char, target: InstIndex) -> Self {
        Self {
            left,
            right,
            target,
        }
    }

    pub fn contains(&self, c: char) -> bool {
        (self.left..=self.right).contains(&c)
    }
}

impl Display for InstJumpRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}-{:?}, ({})", self.left, self.right, self.target)
    }
}

/// A non-consuming test for a literal starting at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstJumpLookahead {
    pub values: Vec<char>,
    pub target: InstIndex,
}

impl InstJumpLookahead {
    #[must_use]
    pub fn new(values: Vec<char>, target: InstIndex) -> Self {
        Self { values, target }
    }

    pub fn is_prefix_of(&self, remaining: &[char]) -> bool {
        remaining.starts_with(&self.values)
    }
}

impl Display for InstJumpLookahead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let literal: String = self.values.iter().collect();
        write!(f, "{:?}, ({})", literal, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstFork {
    pub target: InstIndex,
}

impl InstFork {
    #[must_use]
    pub fn new(target: InstIndex) -> Self {
        Self { target }
    }
}

impl Display for InstFork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fork: ({})", self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstVisit {
    pub slot: u32,
}

impl InstVisit {
    #[must_use]
    pub fn new(slot: u32) -> Self {
        Self { slot }
    }
}

impl Display for InstVisit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Visit: [{:04}]", self.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstJump {
    pub target: InstIndex,
}

impl InstJump {
    #[must_use]
    pub fn new(target: InstIndex) -> Self {
        Self { target }
    }
}

impl Display for InstJump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Jump: ({})", self.target)
    }
}

/// A bitset over `(slot, cursor)` pairs tracking which automaton states have
/// already been entered at a given input position.
#[derive(Debug, Clone)]
pub struct VisitSet {
    slots: usize,
    bits: Vec<u64>,
}

impl VisitSet {
    pub fn new(slots: usize, input_len: usize) -> Self {
        let len = slots * (input_len + 1);
        Self {
            slots,
            bits: vec![0; len.div_ceil(64)],
        }
    }

    /// Marks the pair, returning `true` if it had not been marked before.
    pub fn insert(&mut self, slot: u32, cursor: usize) -> bool {
        let bit = cursor * self.slots + slot as usize;
        let (word, mask) = (bit / 64, 1u64 << (bit % 64));
        match self.bits.get_mut(word) {
            Some(w) if *w & mask == 0 => {
                *w |= mask;
                true
            }
            Some(_) => false,
            // an out of range slot is never tracked.
            None => true,
        }
    }

    /// Exposes the raw words, laid out as `cursor * slots + slot`.
    pub fn as_mut_words(&mut self) -> &mut [u64] {
        &mut self.bits
    }
}
