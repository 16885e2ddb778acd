//! Generates a reference procedure from a scheduled program.
//!
//! The procedure mirrors the native backend block for block: one case per
//! scheduled block, in schedule order, with the same frame stack and visit
//! bitmap. It can be executed directly or rendered as Rust source text for
//! inspection.

use std::collections::HashMap;
use std::fmt;

use regjit_runtime::{BlockId, InstIndex, Opcode, VisitSet};

use super::{Matcher, Program};
use crate::error::CompileError;

/// A case of the procedure, resolved both by name and by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    name: String,
    case: usize,
}

impl Target {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A test against the input under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    NotAtStart,
    NotAtEnd,
    Any,
    Value(char),
    NoneOf(Vec<char>),
    InRange(char, char),
    OutsideRange(char, char),
    LookingAt(Vec<char>),
    NotLookingAt(Vec<char>),
}

impl Condition {
    pub fn holds(&self, input: &[char], cursor: usize) -> bool {
        let next = input.get(cursor);

        match self {
            Condition::NotAtStart => cursor != 0,
            Condition::NotAtEnd => cursor != input.len(),
            Condition::Any => next.is_some(),
            Condition::Value(value) => next == Some(value),
            Condition::NoneOf(values) => next.map_or(false, |c| !values.contains(c)),
            Condition::InRange(left, right) => next.map_or(false, |c| (left..=right).contains(&c)),
            Condition::OutsideRange(left, right) => {
                next.map_or(false, |c| !(left..=right).contains(&c))
            }
            Condition::LookingAt(values) => input[cursor..].starts_with(values),
            Condition::NotLookingAt(values) => !input[cursor..].starts_with(values),
        }
    }
}

fn char_list(values: &[char]) -> String {
    let values: Vec<String> = values.iter().map(|c| format!("{:?}", c)).collect();
    format!("[{}]", values.join(", "))
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::NotAtStart => write!(f, "cursor != 0"),
            Condition::NotAtEnd => write!(f, "cursor != chars.len()"),
            Condition::Any => write!(f, "cursor < chars.len()"),
            Condition::Value(value) => write!(f, "chars.get(cursor) == Some(&{:?})", value),
            Condition::NoneOf(values) => write!(
                f,
                "chars.get(cursor).map_or(false, |c| !{}.contains(c))",
                char_list(values)
            ),
            Condition::InRange(left, right) => write!(
                f,
                "chars.get(cursor).map_or(false, |c| ({:?}..={:?}).contains(c))",
                left, right
            ),
            Condition::OutsideRange(left, right) => write!(
                f,
                "chars.get(cursor).map_or(false, |c| !({:?}..={:?}).contains(c))",
                left, right
            ),
            Condition::LookingAt(values) => {
                write!(f, "chars[cursor..].starts_with(&{})", char_list(values))
            }
            Condition::NotLookingAt(values) => {
                write!(f, "!chars[cursor..].starts_with(&{})", char_list(values))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// An instruction with no effect on matching.
    Comment(String),
    /// Backtracks if the slot was already entered at the cursor.
    Visit(u32),
    Branch {
        condition: Condition,
        consume: bool,
        target: Target,
    },
    Goto(Target),
    /// Records a frame resuming at the target with the current cursor.
    Push(Target),
    Backtrack,
    Accept,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    name: String,
    statements: Vec<Statement>,
}

impl Case {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    cases: Vec<Case>,
    visit_slots: usize,
}

enum Flow {
    Goto(usize),
    Backtrack,
    Accept,
}

impl Procedure {
    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    fn execute(
        &self,
        case: usize,
        input: &[char],
        cursor: &mut usize,
        stack: &mut Vec<(usize, usize)>,
        visits: &mut VisitSet,
    ) -> Flow {
        for statement in self.cases[case].statements.iter() {
            match statement {
                Statement::Comment(_) => (),
                Statement::Visit(slot) => {
                    if !visits.insert(*slot, *cursor) {
                        return Flow::Backtrack;
                    }
                }
                Statement::Branch {
                    condition,
                    consume,
                    target,
                } => {
                    if condition.holds(input, *cursor) {
                        if *consume {
                            *cursor += 1;
                        }
                        return Flow::Goto(target.case);
                    }
                }
                Statement::Goto(target) => return Flow::Goto(target.case),
                Statement::Push(target) => stack.push((target.case, *cursor)),
                Statement::Backtrack => return Flow::Backtrack,
                Statement::Accept => return Flow::Accept,
            }
        }

        Flow::Backtrack
    }
}

impl Matcher for Procedure {
    fn is_match(&self, input: &str) -> bool {
        if self.cases.is_empty() {
            return false;
        }

        let input: Vec<char> = input.chars().collect();
        let mut visits = VisitSet::new(self.visit_slots, input.len());

        for start in 0..=input.len() {
            let mut cursor = start;
            let mut stack = vec![];
            let mut case = 0;

            loop {
                match self.execute(case, &input, &mut cursor, &mut stack, &mut visits) {
                    Flow::Goto(next) => case = next,
                    Flow::Accept => return true,
                    Flow::Backtrack => match stack.pop() {
                        Some((resume, at)) => {
                            case = resume;
                            cursor = at;
                        }
                        None => break,
                    },
                }
            }
        }

        false
    }
}

/// Builds the procedure for a program. The first case is always the
/// program's start block.
pub fn generate(program: &Program) -> Result<Procedure, CompileError> {
    let cfg = program.cfg();
    let order = program.schedule().order();
    let positions: HashMap<BlockId, usize> = order
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect();

    let case_of = |id: BlockId| -> Result<Target, CompileError> {
        positions
            .get(&id)
            .map(|case| Target {
                name: cfg[id].name().to_string(),
                case: *case,
            })
            .ok_or_else(|| {
                CompileError::BackendLowering(format!("{} is not scheduled", cfg[id].name()))
            })
    };
    let target = |label: InstIndex| -> Result<Target, CompileError> {
        cfg.block_at(label)
            .ok_or_else(|| CompileError::BackendLowering(format!("no block begins at {}", label)))
            .and_then(&case_of)
    };

    if order.first().is_some_and(|first| *first != cfg.start()) {
        return Err(CompileError::BackendLowering(
            "schedule does not begin with the start block".to_string(),
        ));
    }

    let mut cases = Vec::with_capacity(order.len());
    for id in order {
        let block = &cfg[*id];
        let mut statements = vec![];

        for inst in block.instructions() {
            let statement = match inst.opcode() {
                opcode @ (Opcode::PushIndex | Opcode::PopIndex(_) | Opcode::Deoptimize) => {
                    Statement::Comment(opcode.to_string())
                }
                Opcode::GuardBegin(inst) => Statement::Branch {
                    condition: Condition::NotAtStart,
                    consume: false,
                    target: target(inst.guarded)?,
                },
                Opcode::GuardEnd(inst) => Statement::Branch {
                    condition: Condition::NotAtEnd,
                    consume: false,
                    target: target(inst.guarded)?,
                },
                Opcode::JumpAny(inst) => Statement::Branch {
                    condition: Condition::Any,
                    consume: true,
                    target: target(inst.target)?,
                },
                Opcode::JumpValue(inst) => Statement::Branch {
                    condition: Condition::Value(inst.value),
                    consume: true,
                    target: target(inst.target)?,
                },
                Opcode::JumpValuesInvert(inst) => Statement::Branch {
                    condition: Condition::NoneOf(inst.values.clone()),
                    consume: true,
                    target: target(inst.target)?,
                },
                Opcode::JumpRange(inst) => Statement::Branch {
                    condition: Condition::InRange(inst.left, inst.right),
                    consume: true,
                    target: target(inst.target)?,
                },
                Opcode::JumpRangeInvert(inst) => Statement::Branch {
                    condition: Condition::OutsideRange(inst.left, inst.right),
                    consume: true,
                    target: target(inst.target)?,
                },
                Opcode::JumpLookahead(inst) => Statement::Branch {
                    condition: Condition::LookingAt(inst.values.clone()),
                    consume: false,
                    target: target(inst.target)?,
                },
                Opcode::JumpLookaheadInvert(inst) => Statement::Branch {
                    condition: Condition::NotLookingAt(inst.values.clone()),
                    consume: false,
                    target: target(inst.target)?,
                },
                Opcode::Fork(inst) => Statement::Push(target(inst.target)?),
                Opcode::Visit(inst) => Statement::Visit(inst.slot),
                Opcode::Jump(inst) => Statement::Goto(target(inst.target)?),
                Opcode::Match => Statement::Accept,
                Opcode::Fail => Statement::Backtrack,
            };
            statements.push(statement);
        }

        // cases are dispatched by name, so running off the end is explicit.
        if block.falls_through() {
            match cfg.fallthrough(*id) {
                Some(fallthrough) => statements.push(Statement::Goto(case_of(fallthrough)?)),
                None => statements.push(Statement::Backtrack),
            }
        }

        cases.push(Case {
            name: block.name().to_string(),
            statements,
        });
    }

    Ok(Procedure {
        cases,
        visit_slots: cfg.visit_slots(),
    })
}

struct Indented<'a, 'b> {
    f: &'a mut fmt::Formatter<'b>,
}

impl Indented<'_, '_> {
    fn line(&mut self, depth: usize, text: impl fmt::Display) -> fmt::Result {
        writeln!(self.f, "{:width$}{}", "", text, width = depth * 4)
    }

    fn backtrack(&mut self, depth: usize) -> fmt::Result {
        self.line(depth, "match stack.pop() {")?;
        self.line(depth + 1, "Some((resume, at)) => {")?;
        self.line(depth + 2, "block = resume;")?;
        self.line(depth + 2, "cursor = at;")?;
        self.line(depth + 2, "continue;")?;
        self.line(depth + 1, "}")?;
        self.line(depth + 1, "None => break,")?;
        self.line(depth, "}")
    }

    fn goto(&mut self, depth: usize, target: &Target) -> fmt::Result {
        self.line(depth, format!("block = {:?};", target.name))?;
        self.line(depth, "continue;")
    }

    fn statement(&mut self, depth: usize, statement: &Statement) -> fmt::Result {
        match statement {
            Statement::Comment(text) => self.line(depth, format!("// {}", text)),
            Statement::Visit(slot) => {
                self.line(
                    depth,
                    format!(
                        "if std::mem::replace(&mut visited[cursor * SLOTS + {}], true) {{",
                        slot
                    ),
                )?;
                self.backtrack(depth + 1)?;
                self.line(depth, "}")
            }
            Statement::Branch {
                condition,
                consume,
                target,
            } => {
                self.line(depth, format!("if {} {{", condition))?;
                if *consume {
                    self.line(depth + 1, "cursor += 1;")?;
                }
                self.goto(depth + 1, target)?;
                self.line(depth, "}")
            }
            Statement::Goto(target) => self.goto(depth, target),
            Statement::Push(target) => {
                self.line(depth, format!("stack.push(({:?}, cursor));", target.name))
            }
            Statement::Backtrack => self.backtrack(depth),
            Statement::Accept => self.line(depth, "return true;"),
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Indented { f };
        let entry = self.cases.first().map_or("", |case| case.name.as_str());

        out.line(0, "|input: &str| -> bool {")?;
        out.line(1, format!("const SLOTS: usize = {};", self.visit_slots))?;
        out.line(1, "let chars: Vec<char> = input.chars().collect();")?;
        out.line(1, "let mut visited = vec![false; SLOTS * (chars.len() + 1)];")?;
        out.line(1, "for start in 0..=chars.len() {")?;
        out.line(2, "let mut cursor = start;")?;
        out.line(2, "let mut stack: Vec<(&str, usize)> = Vec::new();")?;
        out.line(2, format!("let mut block = {:?};", entry))?;
        out.line(2, "loop {")?;
        out.line(3, "match block {")?;
        for case in self.cases.iter() {
            out.line(4, format!("{:?} => {{", case.name))?;
            for statement in case.statements.iter() {
                out.statement(5, statement)?;
            }
            out.line(4, "}")?;
        }
        out.line(4, "_ => unreachable!(),")?;
        out.line(3, "}")?;
        out.line(2, "}")?;
        out.line(1, "}")?;
        out.line(1, "false")?;
        out.line(0, "}")
    }
}
