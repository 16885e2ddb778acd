//! Lowers a scheduled program to x86-64 machine code.
//!
//! Blocks are laid out in schedule order. Generated code keeps all of its
//! state in caller-saved registers, so it needs neither a prologue nor an
//! epilogue:
//!
//! | register | holds                                   |
//! |----------|-----------------------------------------|
//! | `rdi`    | input code points                       |
//! | `rsi`    | input length                            |
//! | `rdx`    | frame stack                             |
//! | `rcx`    | frame stack capacity, in words          |
//! | `r8`     | visit bitmap                            |
//! | `r9`     | cursor                                  |
//! | `r10`    | frame stack depth, in words             |
//! | `r11`    | offset the current attempt started at   |
//! | `rax`    | scratch                                 |
//!
//! Each frame is two words: the address to resume at and the cursor to
//! resume with. Generated code returns one of the `STATUS_*` codes.

mod assembler;
#[cfg(target_arch = "x86_64")]
mod buffer;

use std::collections::HashMap;

use regjit_runtime::{BlockId, InstIndex, Opcode};

pub use assembler::{Assembler, Cond, Label, Mem, Reg};

use super::{Matcher, Program};
use crate::error::CompileError;

pub const STATUS_NO_MATCH: u64 = 0;
pub const STATUS_MATCH: u64 = 1;
/// The frame stack is full. The caller retries with a larger one.
pub const STATUS_OVERFLOW: u64 = 2;

const INPUT: Reg = Reg::Rdi;
const LEN: Reg = Reg::Rsi;
const FRAMES: Reg = Reg::Rdx;
const CAPACITY: Reg = Reg::Rcx;
const VISITS: Reg = Reg::R8;
const CURSOR: Reg = Reg::R9;
const DEPTH: Reg = Reg::R10;
const START: Reg = Reg::R11;
const SCRATCH: Reg = Reg::Rax;

const FRAME_WORDS: i32 = 2;

/// Generates machine code for a program without mapping it.
pub fn generate(program: &Program) -> Result<Vec<u8>, CompileError> {
    let code = Codegen::new(program).run()?;
    log::debug!(
        "generated {} bytes of native code for {} blocks",
        code.len(),
        program.schedule().len()
    );

    Ok(code)
}

#[cfg(target_arch = "x86_64")]
pub fn compile(program: &Program) -> Result<Box<dyn Matcher>, CompileError> {
    NativeMatcher::new(program).map(|m| Box::new(m) as Box<dyn Matcher>)
}

#[cfg(not(target_arch = "x86_64"))]
pub fn compile(_: &Program) -> Result<Box<dyn Matcher>, CompileError> {
    Err(CompileError::UnsupportedBackend(super::Backend::Native))
}

/// A program mapped into executable memory.
#[cfg(target_arch = "x86_64")]
#[derive(Debug)]
pub struct NativeMatcher {
    buffer: buffer::CodeBuffer,
    visit_slots: usize,
}

#[cfg(target_arch = "x86_64")]
impl NativeMatcher {
    const INITIAL_FRAME_WORDS: usize = 64;

    pub fn new(program: &Program) -> Result<Self, CompileError> {
        let code = generate(program)?;
        let buffer = buffer::CodeBuffer::new(&code)?;

        Ok(Self {
            buffer,
            visit_slots: program.cfg().visit_slots(),
        })
    }
}

#[cfg(target_arch = "x86_64")]
impl Matcher for NativeMatcher {
    fn is_match(&self, input: &str) -> bool {
        let chars: Vec<u32> = input.chars().map(u32::from).collect();
        let entry = self.buffer.entry();
        let mut frame_words = Self::INITIAL_FRAME_WORDS;

        loop {
            let mut frames = vec![0u64; frame_words];
            let mut visits = regjit_runtime::VisitSet::new(self.visit_slots, chars.len());
            let words = visits.as_mut_words();

            // SAFETY: the generated code reads at most `chars.len()` code
            // points, keeps the frame depth below the capacity it is handed
            // and only sets bits below `visit_slots * (chars.len() + 1)`.
            let status = unsafe {
                entry(
                    chars.as_ptr(),
                    chars.len(),
                    frames.as_mut_ptr(),
                    frames.len(),
                    words.as_mut_ptr(),
                )
            };

            match status {
                STATUS_MATCH => return true,
                STATUS_OVERFLOW => {
                    frame_words *= 2;
                    log::trace!("frame stack overflowed, retrying with {} words", frame_words);
                }
                STATUS_NO_MATCH => return false,
                other => {
                    log::warn!("native code returned unknown status {}", other);
                    return false;
                }
            }
        }
    }
}

struct Codegen<'a> {
    program: &'a Program,
    asm: Assembler,
    blocks: HashMap<BlockId, Label>,
    restart: Label,
    fail: Label,
    no_match: Label,
    overflow: Label,
}

impl<'a> Codegen<'a> {
    fn new(program: &'a Program) -> Self {
        let mut asm = Assembler::new();
        let blocks = program
            .schedule()
            .order()
            .iter()
            .map(|id| (*id, asm.new_label()))
            .collect();

        Self {
            program,
            restart: asm.new_label(),
            fail: asm.new_label(),
            no_match: asm.new_label(),
            overflow: asm.new_label(),
            asm,
            blocks,
        }
    }

    fn run(mut self) -> Result<Vec<u8>, CompileError> {
        let program = self.program;
        let order = program.schedule().order();

        // begin the first attempt at offset zero.
        self.asm.zero(START);
        self.asm.bind(self.restart);
        self.asm.cmp(START, LEN);
        self.asm.jcc(Cond::Above, self.no_match);
        self.asm.mov(CURSOR, START);
        self.asm.zero(DEPTH);

        match order.first() {
            Some(first) if *first == program.cfg().start() => (),
            Some(_) => {
                let start = self.block_label(program.cfg().start())?;
                self.asm.jmp(start);
            }
            None => self.asm.jmp(self.no_match),
        }

        for (idx, id) in order.iter().enumerate() {
            let label = self.block_label(*id)?;
            self.asm.bind(label);
            self.block(*id, order.get(idx + 1).copied())?;
        }

        // pop a frame, or move on to the next starting offset.
        let advance = self.asm.new_label();
        self.asm.bind(self.fail);
        self.asm.test(DEPTH, DEPTH);
        self.asm.jcc(Cond::Equal, advance);
        self.asm.sub_imm(DEPTH, FRAME_WORDS);
        self.asm.load(CURSOR, Mem::indexed(FRAMES, DEPTH, 8, 8));
        self.asm.jmp_mem(Mem::indexed(FRAMES, DEPTH, 8, 0));
        self.asm.bind(advance);
        self.asm.inc(START);
        self.asm.jmp(self.restart);

        self.asm.bind(self.no_match);
        self.asm.zero(Reg::Rax);
        self.asm.ret();

        self.asm.bind(self.overflow);
        self.asm.mov_eax_imm(STATUS_OVERFLOW as u32);
        self.asm.ret();

        self.asm.finish()
    }

    fn block_label(&self, id: BlockId) -> Result<Label, CompileError> {
        self.blocks.get(&id).copied().ok_or_else(|| {
            CompileError::BackendLowering(format!(
                "{} is not scheduled",
                self.program.cfg()[id].name()
            ))
        })
    }

    fn target_block(&self, target: InstIndex) -> Result<BlockId, CompileError> {
        self.program.cfg().block_at(target).ok_or_else(|| {
            CompileError::BackendLowering(format!("no block begins at {}", target))
        })
    }

    fn target_label(&self, target: InstIndex) -> Result<Label, CompileError> {
        self.target_block(target).and_then(|id| self.block_label(id))
    }

    fn block(&mut self, id: BlockId, next: Option<BlockId>) -> Result<(), CompileError> {
        let program = self.program;
        let block = &program.cfg()[id];

        for inst in block.instructions() {
            self.instruction(inst.opcode(), next)?;
        }

        if block.falls_through() {
            match program.cfg().fallthrough(id) {
                Some(fallthrough) if Some(fallthrough) == next => (),
                Some(fallthrough) => {
                    let label = self.block_label(fallthrough)?;
                    self.asm.jmp(label);
                }
                None => self.asm.jmp(self.fail),
            }
        }

        Ok(())
    }

    fn instruction(&mut self, opcode: &Opcode, next: Option<BlockId>) -> Result<(), CompileError> {
        match opcode {
            Opcode::PushIndex | Opcode::PopIndex(_) | Opcode::Deoptimize => (),
            Opcode::GuardBegin(inst) => {
                let guarded = self.target_label(inst.guarded)?;
                self.asm.test(CURSOR, CURSOR);
                self.asm.jcc(Cond::NotEqual, guarded);
            }
            Opcode::GuardEnd(inst) => {
                let guarded = self.target_label(inst.guarded)?;
                self.asm.cmp(CURSOR, LEN);
                self.asm.jcc(Cond::NotEqual, guarded);
            }
            Opcode::JumpAny(inst) => self.consume_if(inst.target, |_, _| ())?,
            Opcode::JumpValue(inst) => self.consume_if(inst.target, |asm, reject| {
                asm.cmp_eax_imm(u32::from(inst.value));
                asm.jcc(Cond::NotEqual, reject);
            })?,
            Opcode::JumpValuesInvert(inst) => self.consume_if(inst.target, |asm, reject| {
                for value in inst.values.iter() {
                    asm.cmp_eax_imm(u32::from(*value));
                    asm.jcc(Cond::Equal, reject);
                }
            })?,
            Opcode::JumpRange(inst) => self.consume_if(inst.target, |asm, reject| {
                asm.cmp_eax_imm(u32::from(inst.left));
                asm.jcc(Cond::Below, reject);
                asm.cmp_eax_imm(u32::from(inst.right));
                asm.jcc(Cond::Above, reject);
            })?,
            Opcode::JumpRangeInvert(inst) => self.consume_if(inst.target, |asm, reject| {
                let accept = asm.new_label();
                asm.cmp_eax_imm(u32::from(inst.left));
                asm.jcc(Cond::Below, accept);
                asm.cmp_eax_imm(u32::from(inst.right));
                asm.jcc(Cond::BelowOrEqual, reject);
                asm.bind(accept);
            })?,
            Opcode::JumpLookahead(inst) => {
                let target = self.target_label(inst.target)?;
                let reject = self.asm.new_label();
                self.lookahead(&inst.values, reject)?;
                self.asm.jmp(target);
                self.asm.bind(reject);
            }
            Opcode::JumpLookaheadInvert(inst) => {
                let target = self.target_label(inst.target)?;
                let accept = self.asm.new_label();
                let reject = self.asm.new_label();
                self.lookahead(&inst.values, accept)?;
                self.asm.jmp(reject);
                self.asm.bind(accept);
                self.asm.jmp(target);
                self.asm.bind(reject);
            }
            Opcode::Fork(inst) => {
                let resume = self.target_label(inst.target)?;
                self.asm.cmp(DEPTH, CAPACITY);
                self.asm.jcc(Cond::AboveOrEqual, self.overflow);
                self.asm.lea_label(SCRATCH, resume);
                self.asm.store(Mem::indexed(FRAMES, DEPTH, 8, 0), SCRATCH);
                self.asm.store(Mem::indexed(FRAMES, DEPTH, 8, 8), CURSOR);
                self.asm.add_imm(DEPTH, FRAME_WORDS);
            }
            Opcode::Visit(inst) => {
                let slots = i32::try_from(self.program.cfg().visit_slots()).map_err(|_| {
                    CompileError::BackendLowering("too many visit slots".to_string())
                })?;
                let slot = i32::try_from(inst.slot).map_err(|_| {
                    CompileError::BackendLowering("visit slot out of range".to_string())
                })?;

                self.asm.imul_imm(SCRATCH, CURSOR, slots);
                self.asm.add_imm(SCRATCH, slot);
                self.asm.bts(Mem::base(VISITS), SCRATCH);
                self.asm.jcc(Cond::Below, self.fail);
            }
            Opcode::Jump(inst) => {
                let target = self.target_block(inst.target)?;
                if Some(target) != next {
                    let label = self.block_label(target)?;
                    self.asm.jmp(label);
                }
            }
            Opcode::Match => {
                self.asm.mov_eax_imm(STATUS_MATCH as u32);
                self.asm.ret();
            }
            Opcode::Fail => self.asm.jmp(self.fail),
        }

        Ok(())
    }

    /// Emits a bounds checked read of the character under the cursor into
    /// `eax`, then the given test which branches to its label to reject. On
    /// acceptance the cursor advances and control moves to the target.
    fn consume_if(
        &mut self,
        target: InstIndex,
        test: impl FnOnce(&mut Assembler, Label),
    ) -> Result<(), CompileError> {
        let target = self.target_label(target)?;
        let reject = self.asm.new_label();

        self.asm.cmp(CURSOR, LEN);
        self.asm.jcc(Cond::AboveOrEqual, reject);
        self.asm.load32(SCRATCH, Mem::indexed(INPUT, CURSOR, 4, 0));
        test(&mut self.asm, reject);
        self.asm.inc(CURSOR);
        self.asm.jmp(target);
        self.asm.bind(reject);

        Ok(())
    }

    /// Falls through when the input at the cursor starts with `values`,
    /// otherwise branches to `mismatch`.
    fn lookahead(&mut self, values: &[char], mismatch: Label) -> Result<(), CompileError> {
        let out_of_range =
            || CompileError::BackendLowering("lookahead is too long to encode".to_string());
        let len = i32::try_from(values.len()).map_err(|_| out_of_range())?;

        self.asm.mov(SCRATCH, CURSOR);
        self.asm.add_imm(SCRATCH, len);
        self.asm.cmp(SCRATCH, LEN);
        self.asm.jcc(Cond::Above, mismatch);

        for (idx, value) in values.iter().enumerate() {
            let disp = i32::try_from(idx * 4).map_err(|_| out_of_range())?;
            self.asm.load32(SCRATCH, Mem::indexed(INPUT, CURSOR, 4, disp));
            self.asm.cmp_eax_imm(u32::from(*value));
            self.asm.jcc(Cond::NotEqual, mismatch);
        }

        Ok(())
    }
}
