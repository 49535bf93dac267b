use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use parmap::pool::ProcessPool;
use parmap::tasks::{ShiftedSquare, ShiftedSquareArgs};
use parmap::utils::discard_logger;
use parmap::{pmap, tmap, MapOptions, Progress, Task};

// built alongside benches, so it can serve as the worker program
const WORKER: &str = env!("CARGO_BIN_EXE_parmap");

fn busy_args() -> ShiftedSquareArgs {
    ShiftedSquareArgs {
        offset: 1,
        delay_ms: 1,
        echo: false,
    }
}

// 256 items that each sleep 1ms: sequential vs thread pool of growing size.
fn thread_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_bench");
    group
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(5));
    let args = busy_args();
    let items: Vec<i64> = (0..256).collect();
    group.bench_function("sequential", |b| {
        b.iter(|| {
            items
                .iter()
                .map(|x| ShiftedSquare::call(*x, &args).unwrap())
                .collect::<Vec<_>>()
        })
    });
    for num_thread in vec![1, 2, 4, 8, 16] {
        let opts = MapOptions::new().no_progress(true).workers(num_thread);
        group.bench_with_input(BenchmarkId::new("tmap", num_thread), &opts, |b, opts| {
            b.iter(|| tmap(|x| ShiftedSquare::call(x, &args).unwrap(), items.clone(), opts).unwrap())
        });
    }
    group.finish();
}

// Process pools, with and without the cost of spawning the workers.
fn process_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_bench");
    group
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(5));
    let args = busy_args();
    let items: Vec<i64> = (0..256).collect();
    for num_worker in vec![1, 2, 4, 8] {
        let opts = MapOptions::new()
            .no_progress(true)
            .workers(num_worker)
            .worker_program(WORKER);
        group.bench_with_input(BenchmarkId::new("pmap", num_worker), &opts, |b, opts| {
            b.iter(|| pmap::<ShiftedSquare, _>(items.clone(), &args, opts).unwrap())
        });

        let mut pool =
            ProcessPool::new(WORKER.into(), Vec::new(), num_worker, discard_logger()).unwrap();
        let progress = Progress::hidden();
        group.bench_function(BenchmarkId::new("warm_pool", num_worker), |b| {
            b.iter(|| {
                pool.map::<ShiftedSquare>(items.clone(), &args, &progress)
                    .unwrap()
            })
        });
        pool.join().unwrap();
    }
    group.finish();
}

criterion_group!(benches, thread_bench, process_bench);
criterion_main!(benches);
