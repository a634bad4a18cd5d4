//! Look-ahead contamination tests for scores, weights and sleeve returns.
//!
//! Invariant: nothing computed at bar t may depend on data from bar t or later
//! (scores), or from bar t+1 or later (weights held after t, returns of t).
//!
//! Method: run on a truncated panel (bars 0..250) and on the full panel
//! (bars 0..400) over the same range, and separately perturb every return from
//! a cutoff onward. Anything that changes before the cutoff is leaking.

use crosslab_core::data::{synthetic_panel, PricePanel, ReturnKind, ReturnPanel, SyntheticSpec};
use crosslab_core::domain::AssetId;
use crosslab_core::engine::{CostModel, SleeveRunner};
use crosslab_core::position::PositionConfig;
use crosslab_core::schedule::Schedule;
use crosslab_core::signal::{SignalBuilder, SignalConfig};

const FULL: usize = 400;
const CUT: usize = 250;

fn full_panel() -> PricePanel {
    let spec = SyntheticSpec {
        n_assets: 7,
        n_bars: FULL,
        gap_rate: 0.02,
        ..SyntheticSpec::default()
    };
    synthetic_panel(&spec, 42).unwrap()
}

fn truncate(panel: &PricePanel, len: usize) -> PricePanel {
    let columns = (0..panel.n_assets())
        .map(|a| {
            let closes = (0..len).map(|t| panel.close(a, t)).collect();
            (panel.assets()[a].clone(), closes)
        })
        .collect();
    PricePanel::from_closes(panel.timestamps()[..len].to_vec(), columns).unwrap()
}

fn configs() -> Vec<SignalConfig> {
    vec![
        SignalConfig::reversal(4)
            .with_residual_window(Some(48))
            .with_vol_window(Some(12))
            .with_band(0.5)
            .with_rebalance_every(6),
        SignalConfig::momentum(24)
            .with_skip(6)
            .with_band(0.0)
            .with_rebalance_every(10),
    ]
}

fn runner() -> SleeveRunner {
    SleeveRunner::new(
        SignalBuilder::with_benchmark(AssetId::new("BTCUSDT")),
        PositionConfig::default(),
        CostModel::new(7.0),
    )
}

#[test]
fn scores_identical_on_truncated_panel() {
    let full = full_panel();
    let short = truncate(&full, CUT);
    let builder = SignalBuilder::with_benchmark(AssetId::new("BTCUSDT"));

    for cfg in configs() {
        let sched = Schedule::isolated(0..CUT, cfg.rebalance_every);
        let a = builder
            .build(full.returns(ReturnKind::Simple), &cfg, &sched)
            .unwrap();
        let b = builder
            .build(short.returns(ReturnKind::Simple), &cfg, &sched)
            .unwrap();
        assert_eq!(a, b, "{}: scores differ after truncation", cfg.label());
    }
}

#[test]
fn sleeve_identical_on_truncated_panel() {
    let full = full_panel();
    let short = truncate(&full, CUT);

    for cfg in configs() {
        let a = runner()
            .run(full.returns(ReturnKind::Simple), &cfg, 0..CUT, 0)
            .unwrap();
        let b = runner()
            .run_full(short.returns(ReturnKind::Simple), &cfg)
            .unwrap();
        assert_eq!(a.bars, b.bars, "{}: sleeve differs after truncation", cfg.label());
    }
}

fn perturbed(returns: &ReturnPanel, from: usize) -> ReturnPanel {
    let columns = (0..returns.n_assets())
        .map(|a| {
            let col = returns
                .column(a)
                .iter()
                .enumerate()
                .map(|(t, r)| if t >= from { r.map(|x| -3.0 * x + 0.01) } else { *r })
                .collect();
            (returns.assets()[a].clone(), col)
        })
        .collect();
    ReturnPanel::from_columns(returns.kind(), returns.timestamps().to_vec(), columns).unwrap()
}

#[test]
fn future_returns_do_not_move_current_scores() {
    let full = full_panel();
    let base = full.returns(ReturnKind::Simple);
    let changed = perturbed(base, CUT);
    let builder = SignalBuilder::with_benchmark(AssetId::new("BTCUSDT"));

    for cfg in configs() {
        let sched = Schedule::isolated(0..FULL, cfg.rebalance_every);
        let a = builder.build(base, &cfg, &sched).unwrap();
        let b = builder.build(&changed, &cfg, &sched).unwrap();

        // the score at bar CUT itself only reads returns up to CUT - 1
        for t in sched.rebalance_points().filter(|t| *t <= CUT) {
            assert_eq!(a.at(t), b.at(t), "{}: score at {t} moved", cfg.label());
        }
        let later_differs = sched
            .rebalance_points()
            .filter(|t| *t > CUT + cfg.warmup())
            .any(|t| a.at(t) != b.at(t));
        assert!(later_differs, "{}: perturbation had no effect", cfg.label());
    }
}
