//! Groups a linear program into basic blocks connected by labeled exits.
//!
//! A block is addressed by a [`BlockId`] into the graph's arena and is
//! labeled by the address of its first instruction. Exits name their target
//! by label; the label map resolves a label back to its block.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Write};

use crate::{InstIndex, Instruction, Instructions, Opcode};

/// An index into the block arena of a [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(usize);

impl BlockId {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for BlockId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

/// Hints attached to an exit edge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExitMetadata {
    /// The estimated likelihood that control leaves through this exit.
    pub probability: Option<f64>,
}

impl ExitMetadata {
    pub fn with_probability(probability: f64) -> Self {
        Self {
            probability: Some(probability),
        }
    }
}

impl Display for ExitMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.probability {
            Some(p) => write!(f, "{{probability: {:.2}}}", p),
            None => write!(f, "{{}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exit {
    pub label: InstIndex,
    pub metadata: ExitMetadata,
}

impl Exit {
    pub fn new(label: InstIndex) -> Self {
        Self {
            label,
            metadata: ExitMetadata::default(),
        }
    }

    pub fn with_metadata(self, metadata: ExitMetadata) -> Self {
        Self {
            label: self.label,
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    id: BlockId,
    label: InstIndex,
    end: InstIndex,
    name: String,
    instructions: Vec<Instruction>,
    predecessors: Vec<BlockId>,
    exits: Vec<Exit>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// The address of the first instruction in the block.
    pub fn label(&self) -> InstIndex {
        self.label
    }

    /// The address immediately following the last instruction in the block.
    pub fn end(&self) -> InstIndex {
        self.end
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    pub fn exits(&self) -> &[Exit] {
        &self.exits
    }

    pub fn last(&self) -> Option<&Opcode> {
        self.instructions.last().map(Instruction::opcode)
    }

    /// Returns true if control can leave the block by running off its end.
    pub fn falls_through(&self) -> bool {
        self.last().map_or(true, Opcode::falls_through)
    }

    /// Deoptimize blocks are the failure paths of guards and are never
    /// scheduled eagerly.
    pub fn is_deoptimize(&self) -> bool {
        matches!(
            self.instructions.first().map(Instruction::opcode),
            Some(Opcode::Deoptimize)
        )
    }
}

/// A control-flow graph over a program's basic blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    start: BlockId,
    visit_slots: usize,
    blocks: Vec<Block>,
    labels: HashMap<InstIndex, BlockId>,
}

impl Cfg {
    pub fn start(&self) -> BlockId {
        self.start
    }

    pub fn visit_slots(&self) -> usize {
        self.visit_slots
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.as_usize())
    }

    /// Resolves a label to the block it starts.
    pub fn block_at(&self, label: InstIndex) -> Option<BlockId> {
        self.labels.get(&label).copied()
    }

    /// Returns the block reached by running off the end of `id`, if any.
    pub fn fallthrough(&self, id: BlockId) -> Option<BlockId> {
        let block = self.get(id)?;
        if block.falls_through() {
            self.block_at(block.end())
        } else {
            None
        }
    }

    /// Renders every block with its predecessors, instructions and exits.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for block in self.blocks.iter() {
            self.dump_block(&mut out, block, true);
        }

        out
    }

    pub(crate) fn dump_block(&self, out: &mut String, block: &Block, with_instructions: bool) {
        let _ = writeln!(out, "{}:", block.name());
        for pred in block.predecessors() {
            let _ = writeln!(out, "    <- {}", self[*pred].name());
        }
        if with_instructions {
            for inst in block.instructions() {
                let _ = writeln!(out, "    {}", inst);
            }
        }
        for exit in block.exits() {
            let name = self
                .block_at(exit.label)
                .map_or("<unresolved>", |id| self[id].name());
            let _ = writeln!(out, "    {} -> {} {}", exit.label, name, exit.metadata);
        }
    }
}

impl std::ops::Index<BlockId> for Cfg {
    type Output = Block;

    fn index(&self, index: BlockId) -> &Self::Output {
        &self.blocks[index.as_usize()]
    }
}

pub fn block_name(label: InstIndex) -> String {
    format!("block_{}", label)
}

/// Builds the control-flow graph of a program.
///
/// Blocks start at address zero, at every control transfer target and after
/// every instruction that ends a block.
pub fn build(program: &Instructions) -> Cfg {
    let instructions = program.as_ref();
    let len = instructions.len();

    let mut leaders = BTreeSet::new();
    if len > 0 {
        leaders.insert(0usize);
    }
    for (addr, inst) in instructions.iter().enumerate() {
        let opcode = inst.opcode();
        if let Some(target) = opcode.target() {
            if target.as_usize() < len {
                leaders.insert(target.as_usize());
            }
        }
        if opcode.ends_block() && addr + 1 < len {
            leaders.insert(addr + 1);
        }
    }

    let starts: Vec<usize> = leaders.into_iter().collect();
    let mut blocks: Vec<Block> = starts
        .iter()
        .enumerate()
        .map(|(idx, &start)| {
            let end = starts.get(idx + 1).copied().unwrap_or(len);
            let label = InstIndex::from(start as u32);
            Block {
                id: BlockId(idx),
                label,
                end: InstIndex::from(end as u32),
                name: block_name(label),
                instructions: instructions[start..end].to_vec(),
                predecessors: vec![],
                exits: vec![],
            }
        })
        .collect();

    let labels: HashMap<InstIndex, BlockId> = blocks
        .iter()
        .map(|block| (block.label, block.id))
        .collect();

    for idx in 0..blocks.len() {
        let exits = exits_of(&blocks[idx], &blocks, &labels, len);
        blocks[idx].exits = exits;
    }

    for idx in 0..blocks.len() {
        let targets: Vec<BlockId> = blocks[idx]
            .exits
            .iter()
            .filter_map(|exit| labels.get(&exit.label).copied())
            .collect();
        for target in targets {
            let preds = &mut blocks[target.as_usize()].predecessors;
            if !preds.contains(&BlockId(idx)) {
                preds.push(BlockId(idx));
            }
        }
    }

    Cfg {
        start: BlockId(0),
        visit_slots: program.visit_slots(),
        blocks,
        labels,
    }
}

fn exits_of(
    block: &Block,
    blocks: &[Block],
    labels: &HashMap<InstIndex, BlockId>,
    program_len: usize,
) -> Vec<Exit> {
    let fallthrough = (block.end.as_usize() < program_len).then(|| Exit::new(block.end));

    match block.last() {
        None | Some(Opcode::Match) | Some(Opcode::Fail) => vec![],
        Some(Opcode::Jump(inst)) => vec![Exit::new(inst.target)],
        Some(Opcode::Fork(inst)) => {
            let alternatives = remaining_alternatives(inst.target, blocks, labels) + 1;
            let taken = 1.0 / alternatives as f64;
            fallthrough
                .map(|exit| exit.with_metadata(ExitMetadata::with_probability(taken)))
                .into_iter()
                .chain(std::iter::once(
                    Exit::new(inst.target)
                        .with_metadata(ExitMetadata::with_probability(1.0 - taken)),
                ))
                .collect()
        }
        Some(opcode) => match opcode.target() {
            Some(target) => std::iter::once(Exit::new(target))
                .chain(fallthrough)
                .collect(),
            None => fallthrough.into_iter().collect(),
        },
    }
}

/// Counts the alternatives reachable through a chain of fork blocks starting
/// at `label`.
fn remaining_alternatives(
    label: InstIndex,
    blocks: &[Block],
    labels: &HashMap<InstIndex, BlockId>,
) -> usize {
    let mut count = 1;
    let mut next = labels.get(&label).copied();

    // bounded by the block count so a cyclic chain still terminates.
    while let Some(id) = next.filter(|_| count <= blocks.len()) {
        match blocks[id.as_usize()].last() {
            Some(Opcode::Fork(inst)) => {
                count += 1;
                next = labels.get(&inst.target).copied();
            }
            _ => break,
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn alternation_program() -> Instructions {
        // a|b|c with a shared match.
        Instructions::default().with_opcodes(vec![
            Opcode::Visit(InstVisit::new(0)),
            Opcode::Fork(InstFork::new(InstIndex::from(4))),
            Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(10))),
            Opcode::Fail,
            Opcode::Fork(InstFork::new(InstIndex::from(7))),
            Opcode::JumpValue(InstJumpValue::new('b', InstIndex::from(10))),
            Opcode::Fail,
            Opcode::JumpValue(InstJumpValue::new('c', InstIndex::from(10))),
            Opcode::Fail,
            Opcode::Fail,
            Opcode::Match,
        ])
    }

    #[test]
    fn should_split_blocks_at_targets_and_after_jumps() {
        let cfg = build(&alternation_program());
        let labels: Vec<u32> = cfg.blocks().iter().map(|b| b.label().as_u32()).collect();

        assert_eq!(vec![0, 2, 3, 4, 5, 6, 7, 8, 9, 10], labels);
        assert_eq!(2, cfg[BlockId::from(0)].instructions().len());
        assert_eq!("block_0004", cfg[BlockId::from(3)].name());
    }

    #[test]
    fn should_order_exits_and_assign_fork_probabilities() {
        let cfg = build(&alternation_program());

        // three alternatives share the first decision point.
        let first = &cfg[BlockId::from(0)];
        assert_eq!(
            vec![
                (InstIndex::from(2), Some(1.0 / 3.0)),
                (InstIndex::from(4), Some(1.0 - 1.0 / 3.0)),
            ],
            first
                .exits()
                .iter()
                .map(|e| (e.label, e.metadata.probability))
                .collect::<Vec<_>>()
        );

        let second = &cfg[BlockId::from(3)];
        assert_eq!(
            vec![Some(0.5), Some(0.5)],
            second
                .exits()
                .iter()
                .map(|e| e.metadata.probability)
                .collect::<Vec<_>>()
        );

        // conditional jumps list their target ahead of the fallthrough.
        let test = &cfg[BlockId::from(1)];
        assert_eq!(
            vec![InstIndex::from(10), InstIndex::from(3)],
            test.exits().iter().map(|e| e.label).collect::<Vec<_>>()
        );
        assert!(cfg[BlockId::from(2)].exits().is_empty());
    }

    #[test]
    fn should_record_deduplicated_predecessors() {
        let cfg = build(&alternation_program());
        let matched = cfg.block_at(InstIndex::from(10)).map(|id| &cfg[id]);

        assert_eq!(
            Some(vec![BlockId::from(1), BlockId::from(4), BlockId::from(6)]),
            matched.map(|b| b.predecessors().to_vec())
        );
        // the unused trailing fail is an orphan.
        assert!(cfg[BlockId::from(8)].predecessors().is_empty());
    }

    #[test]
    fn should_flag_deoptimize_blocks() {
        let program = Instructions::default().with_opcodes(vec![
            Opcode::GuardBegin(InstGuard::new(InstIndex::from(3))),
            Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(5))),
            Opcode::Fail,
            Opcode::Deoptimize,
            Opcode::Fail,
            Opcode::Match,
        ]);
        let cfg = build(&program);

        let deopt: Vec<&str> = cfg
            .blocks()
            .iter()
            .filter(|b| b.is_deoptimize())
            .map(Block::name)
            .collect();
        assert_eq!(vec!["block_0003"], deopt);
        assert_eq!(Some(BlockId::from(1)), cfg.fallthrough(BlockId::from(0)));
    }

    #[test]
    fn should_dump_blocks() {
        let program = Instructions::default().with_opcodes(vec![
            Opcode::JumpAny(InstJumpAny::new(InstIndex::from(2))),
            Opcode::Fail,
            Opcode::Match,
        ]);

        assert_eq!(
            "block_0000:
    0000: JumpAny: (0002)
    0002 -> block_0002 {}
    0001 -> block_0001 {}
block_0001:
    <- block_0000
    0001: Fail
block_0002:
    <- block_0000
    0002: Match
",
            build(&program).dump()
        );
    }
}
