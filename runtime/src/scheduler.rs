//! Orders the basic blocks of a [`Cfg`] for code generation.
//!
//! The scheduler greedily follows the most probable ready successor of the
//! block it last placed, so likely paths fall through rather than jump. A
//! block is ready when it is not yet scheduled, is not a deoptimize block,
//! and every predecessor other than itself has been scheduled.

use std::fmt::{Display, Write};

use crate::cfg::{BlockId, Cfg};

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerAnomalyKind {
    /// A block selected for placement was already placed.
    AlreadyScheduled(String),
    /// An exit names a label that starts no block.
    UnresolvedExit { block: String, label: String },
}

/// A recoverable scheduling failure, carried alongside the fallback order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerAnomaly {
    pub kind: SchedulerAnomalyKind,
    pub total: usize,
    pub scheduled: usize,
    pub remaining: usize,
    pub ready: usize,
    pub deferred: usize,
}

impl Display for SchedulerAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match &self.kind {
            SchedulerAnomalyKind::AlreadyScheduled(name) => {
                format!("{} was selected after being scheduled", name)
            }
            SchedulerAnomalyKind::UnresolvedExit { block, label } => {
                format!("{} exits to unresolved label {}", block, label)
            }
        };

        write!(
            f,
            "scheduling failed ({}) with {} blocks, {} scheduled, {} remaining, {} ready, {} deferred - using fallback scheduler to recover",
            reason, self.total, self.scheduled, self.remaining, self.ready, self.deferred
        )
    }
}

/// A linear order over the blocks of a [`Cfg`].
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    order: Vec<BlockId>,
    anomaly: Option<SchedulerAnomaly>,
}

impl Schedule {
    pub fn order(&self) -> &[BlockId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The failure recovered from, when the fallback order is in use.
    pub fn anomaly(&self) -> Option<&SchedulerAnomaly> {
        self.anomaly.as_ref()
    }

    /// Returns the block placed immediately after `id`.
    pub fn next_after(&self, id: BlockId) -> Option<BlockId> {
        let position = self.order.iter().position(|b| *b == id)?;
        self.order.get(position + 1).copied()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.order.contains(&id)
    }

    /// Renders the scheduled blocks with their predecessors and exits.
    pub fn dump(&self, cfg: &Cfg) -> String {
        let mut out = String::new();
        for id in self.order.iter() {
            cfg.dump_block(&mut out, &cfg[*id], false);
        }
        if let Some(anomaly) = &self.anomaly {
            let _ = writeln!(out, "# {}", anomaly);
        }

        out
    }
}

/// Schedules every non-orphan block of the graph exactly once, starting with
/// the start block and ending with the deoptimize blocks. On an internal
/// inconsistency the blocks are returned in definition order instead.
pub fn schedule(cfg: &Cfg) -> Schedule {
    if cfg.is_empty() {
        return Schedule {
            order: vec![],
            anomaly: None,
        };
    }

    match Greedy::new(cfg).run() {
        Ok(order) => {
            log::trace!("scheduled {} of {} blocks", order.len(), cfg.len());
            Schedule {
                order,
                anomaly: None,
            }
        }
        Err(anomaly) => {
            log::warn!("{}", anomaly);
            Schedule {
                order: cfg.blocks().iter().map(|b| b.id()).collect(),
                anomaly: Some(anomaly),
            }
        }
    }
}

struct Greedy<'a> {
    cfg: &'a Cfg,
    scheduled: Vec<bool>,
    order: Vec<BlockId>,
    deferred: Vec<BlockId>,
}

impl<'a> Greedy<'a> {
    fn new(cfg: &'a Cfg) -> Self {
        Self {
            cfg,
            scheduled: vec![false; cfg.len()],
            order: Vec::with_capacity(cfg.len()),
            deferred: vec![],
        }
    }

    fn run(mut self) -> Result<Vec<BlockId>, SchedulerAnomaly> {
        self.place(self.cfg.start())?;

        while let Some(&last) = self.order.last() {
            let pending: Vec<(BlockId, f64)> = self
                .successors(last)?
                .into_iter()
                .filter(|(id, _)| !self.is_scheduled(*id))
                .collect();

            // ties keep the first exit encountered.
            let mut most_probable: Option<(BlockId, f64)> = None;
            for &(id, probability) in pending.iter().filter(|(id, _)| self.is_ready(*id)) {
                if most_probable.map_or(true, |(_, best)| probability > best) {
                    most_probable = Some((id, probability));
                }
            }

            if let Some((next, _)) = most_probable {
                self.place(next)?;
                self.deferred.retain(|id| *id != next);
                for (id, _) in pending {
                    if id != next && !self.is_deoptimize(id) && !self.deferred.contains(&id) {
                        self.deferred.push(id);
                    }
                }
            } else if !self.deferred.is_empty() {
                let position = self
                    .deferred
                    .iter()
                    .position(|id| self.is_ready(*id))
                    .unwrap_or(0);
                let next = self.deferred.remove(position);
                self.place(next)?;
            } else if let Some(loop_entry) = self.first_unscheduled_entry() {
                self.place(loop_entry)?;
            } else {
                // every remaining block is an orphan or a deoptimize block.
                break;
            }
        }

        let deoptimize: Vec<BlockId> = self
            .cfg
            .blocks()
            .iter()
            .map(|b| b.id())
            .filter(|id| self.is_deoptimize(*id) && !self.is_scheduled(*id))
            .collect();
        self.order.extend(deoptimize);

        Ok(self.order)
    }

    fn place(&mut self, id: BlockId) -> Result<(), SchedulerAnomaly> {
        if self.is_scheduled(id) {
            return Err(self.anomaly(SchedulerAnomalyKind::AlreadyScheduled(
                self.cfg[id].name().to_string(),
            )));
        }

        self.scheduled[id.as_usize()] = true;
        self.order.push(id);
        Ok(())
    }

    fn successors(&self, id: BlockId) -> Result<Vec<(BlockId, f64)>, SchedulerAnomaly> {
        let block = &self.cfg[id];
        block
            .exits()
            .iter()
            .map(|exit| match self.cfg.block_at(exit.label) {
                Some(target) => Ok((target, exit.metadata.probability.unwrap_or(0.0))),
                None => Err(self.anomaly(SchedulerAnomalyKind::UnresolvedExit {
                    block: block.name().to_string(),
                    label: exit.label.to_string(),
                })),
            })
            .collect()
    }

    fn first_unscheduled_entry(&self) -> Option<BlockId> {
        self.cfg
            .blocks()
            .iter()
            .find(|b| {
                !self.is_scheduled(b.id()) && !b.is_deoptimize() && !b.predecessors().is_empty()
            })
            .map(|b| b.id())
    }

    fn is_scheduled(&self, id: BlockId) -> bool {
        self.scheduled[id.as_usize()]
    }

    fn is_deoptimize(&self, id: BlockId) -> bool {
        self.cfg[id].is_deoptimize()
    }

    fn is_ready(&self, id: BlockId) -> bool {
        let block = &self.cfg[id];
        !self.is_scheduled(id)
            && !block.is_deoptimize()
            && block
                .predecessors()
                .iter()
                .all(|pred| *pred == id || self.is_scheduled(*pred))
    }

    fn anomaly(&self, kind: SchedulerAnomalyKind) -> SchedulerAnomaly {
        let remaining: Vec<BlockId> = self
            .cfg
            .blocks()
            .iter()
            .map(|b| b.id())
            .filter(|id| !self.is_scheduled(*id))
            .collect();
        let ready = remaining.iter().filter(|id| self.is_ready(**id)).count();

        SchedulerAnomaly {
            kind,
            total: self.cfg.len(),
            scheduled: self.order.len(),
            remaining: remaining.len(),
            ready,
            deferred: self.deferred.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn ids(schedule: &Schedule, cfg: &Cfg) -> Vec<u32> {
        schedule
            .order()
            .iter()
            .map(|id| cfg[*id].label().as_u32())
            .collect()
    }

    #[test]
    fn should_follow_fallthrough_of_an_even_fork() {
        // a|b
        let program = Instructions::default().with_opcodes(vec![
            Opcode::Fork(InstFork::new(InstIndex::from(3))),
            Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(5))),
            Opcode::Fail,
            Opcode::JumpValue(InstJumpValue::new('b', InstIndex::from(5))),
            Opcode::Fail,
            Opcode::Match,
        ]);
        let cfg = cfg::build(&program);
        let schedule = schedule(&cfg);

        assert_eq!(vec![0, 1, 2, 3, 5, 4], ids(&schedule, &cfg));
        assert!(schedule.anomaly().is_none());
    }

    #[test]
    fn should_schedule_deoptimize_blocks_last_and_omit_orphans() {
        let program = Instructions::default().with_opcodes(vec![
            Opcode::GuardBegin(InstGuard::new(InstIndex::from(6))),
            Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(4))),
            Opcode::Fail,
            Opcode::Fail,
            Opcode::GuardEnd(InstGuard::new(InstIndex::from(6))),
            Opcode::Match,
            Opcode::Deoptimize,
            Opcode::Fail,
        ]);
        let cfg = cfg::build(&program);
        let schedule = schedule(&cfg);

        // the second fail at 0003 is unreachable and left out.
        assert_eq!(vec![0, 1, 4, 5, 2, 6], ids(&schedule, &cfg));
    }

    #[test]
    fn should_schedule_a_cycle_without_probability_hints() {
        // a*b, entered through the test for `b`.
        let program = Instructions::default().with_opcodes(vec![
            Opcode::Jump(InstJump::new(InstIndex::from(3))),
            Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(3))),
            Opcode::Fail,
            Opcode::JumpValue(InstJumpValue::new('b', InstIndex::from(5))),
            Opcode::Jump(InstJump::new(InstIndex::from(1))),
            Opcode::Match,
        ]);
        let cfg = cfg::build(&program);
        let schedule = schedule(&cfg);

        let mut placed = ids(&schedule, &cfg);
        assert_eq!(Some(&0), placed.first());
        placed.sort_unstable();
        assert_eq!(vec![0, 1, 2, 3, 4, 5], placed);
        assert!(schedule.anomaly().is_none());
    }

    #[test]
    fn should_be_deterministic() {
        let program = Instructions::default().with_opcodes(vec![
            Opcode::Fork(InstFork::new(InstIndex::from(4))),
            Opcode::Fork(InstFork::new(InstIndex::from(6))),
            Opcode::JumpAny(InstJumpAny::new(InstIndex::from(8))),
            Opcode::Fail,
            Opcode::JumpValue(InstJumpValue::new('x', InstIndex::from(0))),
            Opcode::Fail,
            Opcode::JumpRange(InstJumpRange::new('0', '9', InstIndex::from(8))),
            Opcode::Fail,
            Opcode::Match,
        ]);
        let cfg = cfg::build(&program);

        let first = schedule(&cfg);
        for _ in 0..8 {
            assert_eq!(first, schedule(&cfg));
        }
        assert_eq!(Some(&cfg.start()), first.order().first());
    }

    #[test]
    fn should_fall_back_to_definition_order_on_unresolved_exits() {
        let program = Instructions::default().with_opcodes(vec![
            Opcode::Fork(InstFork::new(InstIndex::from(2))),
            Opcode::Jump(InstJump::new(InstIndex::from(42))),
            Opcode::Match,
        ]);
        let cfg = cfg::build(&program);
        let schedule = schedule(&cfg);

        assert_eq!(vec![0, 1, 2], ids(&schedule, &cfg));
        assert!(matches!(
            schedule.anomaly().map(|a| &a.kind),
            Some(SchedulerAnomalyKind::UnresolvedExit { .. })
        ));
        assert_eq!(
            Some((3, 2, 1)),
            schedule.anomaly().map(|a| (a.total, a.scheduled, a.remaining))
        );
    }

    #[test]
    fn should_dump_schedule_with_exits() {
        let program = Instructions::default().with_opcodes(vec![
            Opcode::Fork(InstFork::new(InstIndex::from(2))),
            Opcode::Match,
            Opcode::Fail,
        ]);
        let cfg = cfg::build(&program);

        assert_eq!(
            "block_0000:
    0001 -> block_0001 {probability: 0.50}
    0002 -> block_0002 {probability: 0.50}
block_0001:
    <- block_0000
block_0002:
    <- block_0000
",
            schedule(&cfg).dump(&cfg)
        );
    }
}
