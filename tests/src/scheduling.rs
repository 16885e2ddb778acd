use std::collections::HashSet;

use regjit_compiler::{compile, Backend};
use regjit_runtime::scheduler;

const PATTERNS: [&str; 8] = [
    "a",
    "ab|ac|ad",
    "^a+b$",
    "(a|b)*c",
    "a{2,4}",
    "\\w+@\\w+",
    "^(?:x|y)?z\\z",
    "a(?!b)c",
];

#[test]
fn should_schedule_start_block_first() {
    for pattern in PATTERNS {
        let compiled = compile(pattern, Backend::Interpreter).unwrap();

        assert_eq!(
            Some(&compiled.cfg().start()),
            compiled.schedule().order().first(),
            "{}",
            pattern
        );
    }
}

#[test]
fn should_schedule_every_reachable_block_once() {
    for pattern in PATTERNS {
        let compiled = compile(pattern, Backend::Interpreter).unwrap();
        let (cfg, schedule) = (compiled.cfg(), compiled.schedule());

        let mut seen = HashSet::new();
        assert!(
            schedule.order().iter().all(|id| seen.insert(*id)),
            "{} scheduled a block twice",
            pattern
        );

        for block in cfg.blocks() {
            let reachable = block.id() == cfg.start() || !block.predecessors().is_empty();
            if reachable {
                assert!(seen.contains(&block.id()), "{} omitted {}", pattern, block.name());
            }
        }
        assert!(schedule.anomaly().is_none(), "{}", pattern);
    }
}

#[test]
fn should_schedule_deterministically() {
    for pattern in PATTERNS {
        let compiled = compile(pattern, Backend::Interpreter).unwrap();

        assert_eq!(compiled.schedule(), &scheduler::schedule(compiled.cfg()));
    }
}

#[test]
fn should_place_deoptimized_blocks_last() {
    let compiled = compile("^a$", Backend::Interpreter).unwrap();
    let (cfg, order) = (compiled.cfg(), compiled.schedule().order());

    let first_deopt = order
        .iter()
        .position(|id| cfg[*id].is_deoptimize())
        .unwrap();
    assert!(order[first_deopt..]
        .iter()
        .all(|id| cfg[*id].is_deoptimize()));
}
