//! Execution backends for a compiled program.
//!
//! Every backend consumes the same [Program]: the bytecode, its control-flow
//! graph and the block schedule. The interpreter walks the graph directly,
//! the native backend emits x86-64 machine code in schedule order and the
//! source backend emits a reference procedure that mirrors the generated
//! code block for block.

pub mod native;
pub mod source;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regjit_runtime::{cfg, scheduler, Cfg, Instructions, Schedule};

use crate::error::CompileError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    #[default]
    Interpreter,
    Native,
    Source,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Interpreter => write!(f, "interpreter"),
            Backend::Native => write!(f, "native"),
            Backend::Source => write!(f, "source"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpreter" => Ok(Backend::Interpreter),
            "native" => Ok(Backend::Native),
            "source" => Ok(Backend::Source),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// A bytecode program along with the analyses every backend shares.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instructions: Instructions,
    cfg: Cfg,
    schedule: Schedule,
}

impl Program {
    pub fn new(instructions: Instructions) -> Self {
        let cfg = cfg::build(&instructions);
        let schedule = scheduler::schedule(&cfg);
        log::debug!("built {} blocks, scheduled {}", cfg.len(), schedule.len());

        Self {
            instructions,
            cfg,
            schedule,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

/// Evaluates inputs against a lowered program.
pub trait Matcher: fmt::Debug + Send + Sync {
    /// Returns true if the pattern matches anywhere in the input.
    fn is_match(&self, input: &str) -> bool;
}

/// Walks the scheduled graph with the runtime's backtracking interpreter.
#[derive(Debug, Clone)]
pub struct Interpreter {
    program: Arc<Program>,
}

impl Interpreter {
    pub fn new(program: Arc<Program>) -> Self {
        Self { program }
    }
}

impl Matcher for Interpreter {
    fn is_match(&self, input: &str) -> bool {
        regjit_runtime::run(self.program.cfg(), input).is_some()
    }
}

/// Lowers a program for the given backend.
pub fn lower(program: Arc<Program>, backend: Backend) -> Result<Box<dyn Matcher>, CompileError> {
    log::debug!("lowering program for the {} backend", backend);

    match backend {
        Backend::Interpreter => Ok(Box::new(Interpreter::new(program))),
        Backend::Native => native::compile(&program),
        Backend::Source => source::generate(&program).map(|p| Box::new(p) as Box<dyn Matcher>),
    }
}
