use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use regjit_runtime::*;

fn pad_input_to_length_with(suffix: &str, pad_str: &str, len: usize) -> String {
    let suffix_len = suffix.chars().count();

    if suffix_len > len {
        "".to_string()
    } else {
        pad_str
            .chars()
            .cycle()
            .take(len - suffix_len)
            .chain(suffix.chars())
            .collect()
    }
}

fn bench_program(c: &mut Criterion, group_name: &str, program: Instructions) {
    let mut group = c.benchmark_group(group_name);
    let cfg = cfg::build(&program);
    let input = "ab";
    let pad = "xy";

    (1..10)
        .map(|exponent| 2usize.pow(exponent))
        .map(|input_len| (pad_input_to_length_with(input, pad, input_len), input_len))
        .for_each(|(input, sample_size)| {
            group.throughput(Throughput::Elements(sample_size as u64));
            group.bench_with_input(
                BenchmarkId::new("input length of size", sample_size),
                &(input, sample_size),
                |b, (input, input_size)| {
                    let expected = CaptureSpan::new("$0", *input_size - 2, *input_size);

                    b.iter(|| {
                        let res = run(&cfg, input);
                        assert_eq!(
                            Some(Some(&expected)),
                            res.as_ref().map(|captures| captures.whole())
                        )
                    })
                },
            );
        })
}

pub fn linear_input_size_comparison(c: &mut Criterion) {
    let program = Instructions::default().with_opcodes(vec![
        Opcode::Visit(InstVisit::new(0)),
        Opcode::PushIndex,
        Opcode::JumpValue(InstJumpValue::new('a', InstIndex::from(4))),
        Opcode::Fail,
        Opcode::JumpValue(InstJumpValue::new('b', InstIndex::from(6))),
        Opcode::Fail,
        Opcode::PopIndex(InstPopIndex::new("$0")),
        Opcode::Match,
    ]);

    bench_program(c, "exponential input length comparison", program)
}

pub fn linear_input_size_comparison_against_range_match(c: &mut Criterion) {
    let program = Instructions::default().with_opcodes(vec![
        Opcode::Visit(InstVisit::new(0)),
        Opcode::PushIndex,
        Opcode::JumpRange(InstJumpRange::new('a', 'w', InstIndex::from(4))),
        Opcode::Fail,
        Opcode::JumpRange(InstJumpRange::new('a', 'w', InstIndex::from(6))),
        Opcode::Fail,
        Opcode::PopIndex(InstPopIndex::new("$0")),
        Opcode::Match,
    ]);

    bench_program(c, "input length comparison for range matching", program)
}

criterion_group!(
    benches,
    linear_input_size_comparison,
    linear_input_size_comparison_against_range_match
);
criterion_main!(benches);
