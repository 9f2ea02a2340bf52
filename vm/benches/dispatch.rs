use criterion::{black_box, criterion_group, criterion_main, Criterion};
use heap::HeapSettings;
use object::Value;
use vm::{demos, Interpreter, VMCreateInfo};

fn bench_settings() -> VMCreateInfo {
    VMCreateInfo {
        heap: HeapSettings {
            segment_words: 16 * 1024,
            ..HeapSettings::default()
        },
        ..VMCreateInfo::default()
    }
}

fn bench_vm() -> Interpreter {
    let mut vm = Interpreter::new(bench_settings()).expect("bootstrap");
    demos::install_fib(&mut vm).expect("install fib");
    demos::install_producer_consumer(&mut vm).expect("install producer");
    demos::install_churn(&mut vm).expect("install churn");
    vm
}

fn bench_sends(c: &mut Criterion) {
    let mut vm = bench_vm();
    let warmup = vm
        .send_message(Value::from_i64(15), "fib", &[])
        .expect("warmup");
    black_box(warmup);

    c.bench_function("fib_20", |b| {
        b.iter(|| {
            let value = vm
                .send_message(black_box(Value::from_i64(20)), "fib", &[])
                .expect("fib");
            black_box(value);
        })
    });
}

fn bench_processes(c: &mut Criterion) {
    let mut vm = bench_vm();
    c.bench_function("producer_consumer_1000", |b| {
        b.iter(|| {
            let nil = vm.nil();
            let value = vm
                .send_message(nil, "producerConsumer:", &[Value::from_i64(1_000)])
                .expect("processes");
            black_box(value);
        })
    });
}

fn bench_allocation(c: &mut Criterion) {
    let mut vm = bench_vm();
    c.bench_function("churn_10000", |b| {
        b.iter(|| {
            let nil = vm.nil();
            let value = vm
                .send_message(nil, "churn:", &[Value::from_i64(10_000)])
                .expect("churn");
            black_box(value);
        })
    });
}

criterion_group!(benches, bench_sends, bench_processes, bench_allocation);
criterion_main!(benches);
