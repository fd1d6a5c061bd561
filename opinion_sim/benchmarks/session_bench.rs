use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use opinion_sim::{
    build_session_app, reference_community, run_session, CommunityConfig, ExecutionMode,
    SessionConfig,
};

fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");

    for actors in [20u32, 50, 100, 200] {
        for (label, execution) in [
            ("sequential", ExecutionMode::Sequential),
            ("parallel", ExecutionMode::Parallel { workers: 4 }),
        ] {
            group.bench_with_input(BenchmarkId::new(label, actors), &actors, |b, &actors| {
                b.iter_batched(
                    || {
                        let community = CommunityConfig {
                            actors,
                            activation_probability: 0.5,
                            ..CommunityConfig::default()
                        };
                        let config = SessionConfig {
                            sessions: 1,
                            execution,
                            ..SessionConfig::default()
                        };
                        let network =
                            reference_community(&community, config.seed).expect("community");
                        build_session_app(network, config).expect("app")
                    },
                    |mut app| {
                        run_session(&mut app).expect("session");
                    },
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(session_benches, bench_session);
criterion_main!(session_benches);
