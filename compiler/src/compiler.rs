//! Lowers an automaton into linear bytecode.
//!
//! Each reachable state becomes a run of instructions headed by a `Visit`
//! of the state's slot. Its transitions are attempted in order, each but
//! the last guarded by a `Fork` to the next alternative. Targets are
//! emitted against symbolic labels and patched once every label is bound.
//!
//! # Example
//!
//! ```
//! use regjit_compiler::{compiler, fsm::nfa, parse};
//!
//! let root = parse("a").unwrap();
//! let automaton = nfa::build(&root).unwrap();
//! let instructions = compiler::compile(&automaton).unwrap();
//!
//! assert_eq!(
//!     "0000: Visit: [0000]
//! 0001: PushIndex
//! 0002: Jump: (0003)
//! 0003: Visit: [0001]
//! 0004: JumpValue: 'a', (0006)
//! 0005: Fail
//! 0006: Visit: [0002]
//! 0007: PopIndex: \"$0\"
//! 0008: Jump: (0009)
//! 0009: Match
//! ",
//!     instructions.to_string()
//! );
//! ```
use std::collections::HashMap;

use regjit_runtime::*;

use crate::error::CompileError;
use crate::fsm::{Automaton, Predicate, StateId};

/// A symbolic address that is resolved after emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Label {
    /// The first instruction of a state.
    State(StateId),
    /// The instructions attempting the nth transition of a state.
    Alternative(StateId, usize),
    /// The shared block reached when a guard fails.
    Deoptimize,
}

#[derive(Default)]
struct Emitter {
    opcodes: Vec<Opcode>,
    bound: HashMap<Label, InstIndex>,
    fixups: Vec<(usize, Label)>,
}

impl Emitter {
    fn here(&self) -> InstIndex {
        InstIndex::from(self.opcodes.len() as u32)
    }

    fn bind(&mut self, label: Label) {
        let here = self.here();
        self.bound.insert(label, here);
    }

    fn emit(&mut self, opcode: Opcode) {
        self.opcodes.push(opcode);
    }

    /// Emits an instruction whose target is patched to the label's address.
    fn emit_to(&mut self, opcode: Opcode, label: Label) {
        self.fixups.push((self.opcodes.len(), label));
        self.opcodes.push(opcode);
    }

    fn finish(mut self, visit_slots: usize) -> Result<Instructions, CompileError> {
        for (idx, label) in std::mem::take(&mut self.fixups) {
            let address = self.bound.get(&label).copied().ok_or_else(|| {
                CompileError::BackendLowering(format!("unbound label {:?}", label))
            })?;

            let opcode = std::mem::replace(&mut self.opcodes[idx], Opcode::Fail);
            self.opcodes[idx] = opcode.with_target(address);
        }

        Ok(Instructions::new(visit_slots, self.opcodes))
    }
}

/// The target of an instruction until its label is patched.
const PLACEHOLDER: InstIndex = InstIndex::new(0);

/// Compiles every state reachable from the automaton's start, in
/// breadth-first order, so the start state always lives at address zero.
pub fn compile(automaton: &Automaton) -> Result<Instructions, CompileError> {
    let mut emitter = Emitter::default();
    let mut guarded = false;
    let mut slots = 0u32;

    for id in automaton.reachable() {
        let state = automaton.state(id);
        emitter.bind(Label::State(id));

        if state.is_finish() {
            emitter.emit(Opcode::Match);
            continue;
        }

        emitter.emit(Opcode::Visit(InstVisit::new(slots)));
        slots += 1;

        let transitions = state.transitions();
        if transitions.is_empty() {
            emitter.emit(Opcode::Fail);
            continue;
        }

        for (idx, transition) in transitions.iter().enumerate() {
            if idx > 0 {
                emitter.bind(Label::Alternative(id, idx));
            }
            if idx + 1 < transitions.len() {
                emitter.emit_to(
                    Opcode::Fork(InstFork::new(PLACEHOLDER)),
                    Label::Alternative(id, idx + 1),
                );
            }

            guarded |= lower_transition(&mut emitter, &transition.predicate, transition.target);
        }
    }

    if guarded {
        emitter.bind(Label::Deoptimize);
        emitter.emit(Opcode::Deoptimize);
        emitter.emit(Opcode::Fail);
    }

    let instructions = emitter.finish(slots as usize)?;
    log::debug!(
        "lowered {} states to {} instructions",
        automaton.len(),
        instructions.len()
    );

    Ok(instructions)
}

/// Emits the instructions for a single transition, returning true if a
/// guard referencing the deoptimization block was emitted.
fn lower_transition(emitter: &mut Emitter, predicate: &Predicate, target: StateId) -> bool {
    let target = Label::State(target);

    match predicate {
        Predicate::Epsilon => {
            emitter.emit_to(Opcode::Jump(InstJump::new(PLACEHOLDER)), target);
        }
        Predicate::Value(value) => {
            emitter.emit_to(
                Opcode::JumpValue(InstJumpValue::new(*value, PLACEHOLDER)),
                target,
            );
            emitter.emit(Opcode::Fail);
        }
        Predicate::Range {
            left,
            right,
            invert: false,
        } => {
            emitter.emit_to(
                Opcode::JumpRange(InstJumpRange::new(*left, *right, PLACEHOLDER)),
                target,
            );
            emitter.emit(Opcode::Fail);
        }
        Predicate::Range {
            left,
            right,
            invert: true,
        } => {
            emitter.emit_to(
                Opcode::JumpRangeInvert(InstJumpRange::new(*left, *right, PLACEHOLDER)),
                target,
            );
            emitter.emit(Opcode::Fail);
        }
        Predicate::Invert(values) => {
            emitter.emit_to(
                Opcode::JumpValuesInvert(InstJumpValuesInvert::new(values.clone(), PLACEHOLDER)),
                target,
            );
            emitter.emit(Opcode::Fail);
        }
        Predicate::Any => {
            emitter.emit_to(Opcode::JumpAny(InstJumpAny::new(PLACEHOLDER)), target);
            emitter.emit(Opcode::Fail);
        }
        Predicate::Type(ty) => {
            for range in ty.ranges() {
                emitter.emit_to(
                    Opcode::JumpRange(InstJumpRange::new(
                        *range.start(),
                        *range.end(),
                        PLACEHOLDER,
                    )),
                    target,
                );
            }
            emitter.emit(Opcode::Fail);
        }
        Predicate::BeginAnchor => {
            emitter.emit_to(
                Opcode::GuardBegin(InstGuard::new(PLACEHOLDER)),
                Label::Deoptimize,
            );
            emitter.emit_to(Opcode::Jump(InstJump::new(PLACEHOLDER)), target);
            return true;
        }
        Predicate::EndAnchor => {
            emitter.emit_to(
                Opcode::GuardEnd(InstGuard::new(PLACEHOLDER)),
                Label::Deoptimize,
            );
            emitter.emit_to(Opcode::Jump(InstJump::new(PLACEHOLDER)), target);
            return true;
        }
        Predicate::StartCapture(_) => {
            emitter.emit(Opcode::PushIndex);
            emitter.emit_to(Opcode::Jump(InstJump::new(PLACEHOLDER)), target);
        }
        Predicate::EndCapture(name) => {
            emitter.emit(Opcode::PopIndex(InstPopIndex::new(name.clone())));
            emitter.emit_to(Opcode::Jump(InstJump::new(PLACEHOLDER)), target);
        }
        Predicate::PositiveLookahead(values) => {
            emitter.emit_to(
                Opcode::JumpLookahead(InstJumpLookahead::new(values.clone(), PLACEHOLDER)),
                target,
            );
            emitter.emit(Opcode::Fail);
        }
        Predicate::NegativeLookahead(values) => {
            emitter.emit_to(
                Opcode::JumpLookaheadInvert(InstJumpLookahead::new(values.clone(), PLACEHOLDER)),
                target,
            );
            emitter.emit(Opcode::Fail);
        }
    }

    false
}
