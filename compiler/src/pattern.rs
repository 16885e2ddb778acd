use std::fmt;
use std::sync::Arc;

use regjit_runtime::{Captures, Cfg, Instructions, Schedule};

use crate::backend::{self, Backend, Matcher, Program};
use crate::error::CompileError;
use crate::fsm::{dfa, nfa};
use crate::{compiler, parser};

/// Options controlling how a pattern is compiled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    backend: Backend,
    deterministic: bool,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Runs the subset construction before generating bytecode.
    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn deterministic(&self) -> bool {
        self.deterministic
    }
}

/// A pattern lowered for a single backend.
pub struct CompiledPattern {
    pattern: String,
    backend: Backend,
    program: Arc<Program>,
    matcher: Box<dyn Matcher>,
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("pattern", &self.pattern)
            .field("backend", &self.backend)
            .field("instructions", &self.program.instructions().len())
            .finish()
    }
}

impl CompiledPattern {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Returns true if the pattern matches anywhere in the input.
    pub fn is_match(&self, input: &str) -> bool {
        self.matcher.is_match(input)
    }

    /// Returns the capture spans of the first match. Spans are always
    /// computed by the interpreter, regardless of the selected backend.
    pub fn captures(&self, input: &str) -> Option<Captures> {
        regjit_runtime::run(self.program.cfg(), input)
    }

    /// Lowers the same program for another backend. The returned pattern
    /// shares the program with this one.
    pub fn with_backend(&self, backend: Backend) -> Result<Self, CompileError> {
        let matcher = backend::lower(Arc::clone(&self.program), backend)?;

        Ok(Self {
            pattern: self.pattern.clone(),
            backend,
            program: Arc::clone(&self.program),
            matcher,
        })
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn instructions(&self) -> &Instructions {
        self.program.instructions()
    }

    pub fn cfg(&self) -> &Cfg {
        self.program.cfg()
    }

    pub fn schedule(&self) -> &Schedule {
        self.program.schedule()
    }
}

/// Compiles a pattern for the given backend.
///
/// # Example
///
/// ```
/// use regjit_compiler::{compile, Backend};
///
/// let pattern = compile("^(?<year>\\d{4})-\\d{2}$", Backend::Interpreter).unwrap();
///
/// assert!(pattern.is_match("2024-06"));
/// assert!(!pattern.is_match("24-06"));
///
/// let captures = pattern.captures("2024-06").unwrap();
/// assert_eq!(Some((0, 4)), captures.get("year").map(|span| (span.start, span.end)));
/// ```
pub fn compile(pattern: &str, backend: Backend) -> Result<CompiledPattern, CompileError> {
    compile_with_options(pattern, CompileOptions::default().with_backend(backend))
}

pub fn compile_with_options(
    pattern: &str,
    options: CompileOptions,
) -> Result<CompiledPattern, CompileError> {
    let root = parser::parse(pattern)?;
    let automaton = nfa::build(&root)?;
    let automaton = if options.deterministic {
        dfa::build(&automaton)
    } else {
        automaton
    };

    let instructions = compiler::compile(&automaton)?;
    log::trace!("bytecode for {:?}:\n{}", pattern, instructions);

    let program = Arc::new(Program::new(instructions));
    if let Some(anomaly) = program.schedule().anomaly() {
        log::debug!("{:?} scheduled in definition order: {}", pattern, anomaly);
    }

    let matcher = backend::lower(Arc::clone(&program), options.backend)?;

    Ok(CompiledPattern {
        pattern: pattern.to_string(),
        backend: options.backend,
        program,
        matcher,
    })
}
