//! A backtracking interpreter that walks the blocks of a [`Cfg`] by label.
//!
//! Matching is attempted from every start position in turn. `Fork` records a
//! resume point on the backtrack stack and `Fail` returns to the newest one;
//! with none left the attempt is abandoned and the next start position is
//! tried. Capture bookkeeping is undone through the same stack, so a resumed
//! path sees the index stack exactly as it was when the point was recorded.

use crate::cfg::{BlockId, Cfg};
use crate::{InstGuard, InstIndex, InstVisit, Opcode, VisitSet};

/// The character offsets of a closed capture group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl CaptureSpan {
    pub fn new(name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }
}

/// The capture spans recorded along a successful path. A group closed more
/// than once keeps its last span.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captures {
    spans: Vec<CaptureSpan>,
}

impl Captures {
    pub fn get(&self, name: &str) -> Option<&CaptureSpan> {
        self.spans.iter().find(|span| span.name == name)
    }

    /// The span of the whole match.
    pub fn whole(&self) -> Option<&CaptureSpan> {
        self.get("$0")
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureSpan> {
        self.spans.iter()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn record(&mut self, span: &CaptureSpan) {
        match self.spans.iter_mut().find(|s| s.name == span.name) {
            Some(existing) => *existing = span.clone(),
            None => self.spans.push(span.clone()),
        }
    }
}

#[derive(Debug)]
enum Backtrack {
    Resume { label: InstIndex, cursor: usize },
    DropIndex,
    RestoreIndex { start: usize },
}

enum Flow {
    Continue,
    Goto(InstIndex),
    Fail,
    Match,
}

struct Attempt<'a> {
    cfg: &'a Cfg,
    input: &'a [char],
    cursor: usize,
    trail: Vec<Backtrack>,
    indices: Vec<usize>,
    closed: Vec<CaptureSpan>,
}

impl<'a> Attempt<'a> {
    fn new(cfg: &'a Cfg, input: &'a [char], start: usize) -> Self {
        Self {
            cfg,
            input,
            cursor: start,
            trail: vec![],
            indices: vec![],
            closed: vec![],
        }
    }

    fn run(mut self, visits: &mut VisitSet) -> Option<Captures> {
        let mut block = self.cfg.start();

        loop {
            let flow = self.execute(block, visits);
            let next = match flow {
                Flow::Match => return Some(self.captures()),
                Flow::Goto(label) => self.cfg.block_at(label),
                Flow::Continue => self.cfg.fallthrough(block),
                Flow::Fail => None,
            };

            block = match next {
                Some(next) => next,
                None => self.backtrack()?,
            };
        }
    }

    fn execute(&mut self, block: BlockId, visits: &mut VisitSet) -> Flow {
        let cfg = self.cfg;
        for inst in cfg[block].instructions() {
            let flow = match inst.opcode() {
                Opcode::PushIndex => {
                    self.indices.push(self.cursor);
                    self.trail.push(Backtrack::DropIndex);
                    Flow::Continue
                }
                Opcode::PopIndex(pop) => {
                    if let Some(start) = self.indices.pop() {
                        self.closed
                            .push(CaptureSpan::new(pop.capture.as_str(), start, self.cursor));
                        self.trail.push(Backtrack::RestoreIndex { start });
                    }
                    Flow::Continue
                }
                Opcode::GuardBegin(InstGuard { guarded }) if self.cursor != 0 => {
                    Flow::Goto(*guarded)
                }
                Opcode::GuardEnd(InstGuard { guarded }) if self.cursor != self.input.len() => {
                    Flow::Goto(*guarded)
                }
                Opcode::GuardBegin(_) | Opcode::GuardEnd(_) => Flow::Continue,
                Opcode::JumpAny(inst) => self.consume_if(inst.target, |_| true),
                Opcode::JumpValue(inst) => self.consume_if(inst.target, |c| inst.accepts(c)),
                Opcode::JumpValuesInvert(inst) => {
                    self.consume_if(inst.target, |c| inst.accepts(c))
                }
                Opcode::JumpRange(inst) => self.consume_if(inst.target, |c| inst.contains(c)),
                Opcode::JumpRangeInvert(inst) => {
                    self.consume_if(inst.target, |c| !inst.contains(c))
                }
                Opcode::JumpLookahead(inst) if inst.is_prefix_of(self.remaining()) => {
                    Flow::Goto(inst.target)
                }
                Opcode::JumpLookaheadInvert(inst) if !inst.is_prefix_of(self.remaining()) => {
                    Flow::Goto(inst.target)
                }
                Opcode::JumpLookahead(_) | Opcode::JumpLookaheadInvert(_) => Flow::Continue,
                Opcode::Fork(inst) => {
                    self.trail.push(Backtrack::Resume {
                        label: inst.target,
                        cursor: self.cursor,
                    });
                    Flow::Continue
                }
                Opcode::Visit(InstVisit { slot }) if !visits.insert(*slot, self.cursor) => {
                    Flow::Fail
                }
                Opcode::Visit(_) | Opcode::Deoptimize => Flow::Continue,
                Opcode::Jump(inst) => Flow::Goto(inst.target),
                Opcode::Match => Flow::Match,
                Opcode::Fail => Flow::Fail,
            };

            if !matches!(flow, Flow::Continue) {
                return flow;
            }
        }

        Flow::Continue
    }

    fn remaining(&self) -> &[char] {
        self.input.get(self.cursor..).unwrap_or(&[])
    }

    fn consume_if<F>(&mut self, target: InstIndex, accepts: F) -> Flow
    where
        F: Fn(char) -> bool,
    {
        match self.input.get(self.cursor) {
            Some(&c) if accepts(c) => {
                self.cursor += 1;
                Flow::Goto(target)
            }
            _ => Flow::Continue,
        }
    }

    /// Unwinds to the newest resume point, returning the block to resume.
    fn backtrack(&mut self) -> Option<BlockId> {
        while let Some(entry) = self.trail.pop() {
            match entry {
                Backtrack::Resume { label, cursor } => {
                    if let Some(block) = self.cfg.block_at(label) {
                        self.cursor = cursor;
                        return Some(block);
                    }
                }
                Backtrack::DropIndex => {
                    self.indices.pop();
                }
                Backtrack::RestoreIndex { start } => {
                    self.closed.pop();
                    self.indices.push(start);
                }
            }
        }

        None
    }

    fn captures(&self) -> Captures {
        let mut captures = Captures::default();
        for span in self.closed.iter() {
            captures.record(span);
        }

        captures
    }
}

/// Runs a program against an input, returning the captures of the first
/// match found. Spans are measured in characters.
pub fn run(cfg: &Cfg, input: &str) -> Option<Captures> {
    if cfg.is_empty() {
        return None;
    }

    let input: Vec<char> = input.chars().collect();
    let mut visits = VisitSet::new(cfg.visit_slots(), input.len());

    (0..=input.len()).find_map(|start| Attempt::new(cfg, &input, start).run(&mut visits))
}
