//! Criterion benchmarks for walk-forward selection and sleeve mixing.
//!
//! Run with: `cargo bench -p crosslab-runner`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crosslab_core::data::{synthetic_panel, ReturnKind, SyntheticSpec};
use crosslab_core::domain::AssetId;
use crosslab_core::engine::{CostModel, SleeveRunner};
use crosslab_core::position::PositionConfig;
use crosslab_core::signal::SignalBuilder;
use crosslab_runner::metrics::HOURLY_BARS_PER_YEAR;
use crosslab_runner::{
    FoldConfig, MixConfig, MixMethod, PortfolioCombiner, SignalGrid, WalkForwardValidator,
};

fn runner() -> SleeveRunner {
    SleeveRunner::new(
        SignalBuilder::with_benchmark(AssetId::new("BTCUSDT")),
        PositionConfig::default(),
        CostModel::default(),
    )
}

fn bench_walk_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_forward");
    group.sample_size(10);

    let spec = SyntheticSpec {
        n_assets: 10,
        n_bars: 4_000,
        ..SyntheticSpec::default()
    };
    let panel = synthetic_panel(&spec, 1).expect("synthetic panel");
    let returns = panel.returns(ReturnKind::Simple);
    let candidates = SignalGrid::reversal_default().candidates();

    for train in [1_000usize, 2_000] {
        let validator =
            WalkForwardValidator::new(runner(), FoldConfig::rolling(train, 500), HOURLY_BARS_PER_YEAR);
        group.bench_with_input(BenchmarkId::new("reversal_grid", train), &train, |b, _| {
            b.iter(|| {
                let _ = validator.run(black_box(returns), black_box(&candidates));
            });
        });
    }
    group.finish();
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine");

    let spec = SyntheticSpec {
        n_bars: 5_000,
        ..SyntheticSpec::default()
    };
    let panel = synthetic_panel(&spec, 2).expect("synthetic panel");
    let returns = panel.returns(ReturnKind::Simple);
    let r = runner();
    let sleeves: Vec<_> = [
        SignalGrid::reversal_default().candidates()[0].clone(),
        SignalGrid::momentum_default().candidates()[0].clone(),
    ]
    .iter()
    .map(|cfg| r.run_full(returns, cfg).expect("sleeve run"))
    .collect();

    for (name, mix) in [
        ("equal_vol", MixConfig::equal_vol(720, 24)),
        (
            "static_optimized",
            MixConfig::new(MixMethod::StaticOptimized {
                step: 0.02,
                train_bars: None,
            }),
        ),
    ] {
        let combiner = PortfolioCombiner::new(mix);
        group.bench_function(name, |b| {
            b.iter(|| {
                let _ = combiner.combine(black_box(&sleeves));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_walk_forward, bench_combine);
criterion_main!(benches);
