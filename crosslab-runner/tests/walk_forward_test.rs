//! Walk-forward integration: selection, OOS stitching, skipped folds, mixing.

use crosslab_core::data::{synthetic_panel, PricePanel, ReturnKind, SyntheticSpec};
use crosslab_core::domain::AssetId;
use crosslab_core::engine::{CostModel, SleeveRunner};
use crosslab_core::position::PositionConfig;
use crosslab_core::signal::{SignalBuilder, SignalConfig};
use crosslab_runner::metrics::{sharpe_ratio, HOURLY_BARS_PER_YEAR as HOURLY_BARS};
use crosslab_runner::walk_forward::SkipReason;
use crosslab_runner::{FoldConfig, MixConfig, SleeveSpec, WalkForwardValidator};

fn panel() -> PricePanel {
    let spec = SyntheticSpec {
        n_assets: 6,
        n_bars: 1_200,
        ..SyntheticSpec::default()
    };
    synthetic_panel(&spec, 42).unwrap()
}

fn runner() -> SleeveRunner {
    SleeveRunner::new(
        SignalBuilder::with_benchmark(AssetId::new("BTCUSDT")),
        PositionConfig::default(),
        CostModel::default(),
    )
}

fn validator(folds: FoldConfig) -> WalkForwardValidator {
    WalkForwardValidator::new(runner(), folds, HOURLY_BARS)
}

fn candidates() -> Vec<SignalConfig> {
    [2, 3]
        .into_iter()
        .map(|k| {
            SignalConfig::reversal(k)
                .with_band(1.0)
                .with_residual_window(Some(48))
                .with_rebalance_every(12)
                .with_vol_window(Some(12))
        })
        .collect()
}

#[test]
fn oos_series_is_the_concatenation_of_test_windows() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    let wf = validator(FoldConfig::expanding(400, 200))
        .run(returns, &candidates())
        .unwrap();

    assert_eq!(wf.folds.len(), 4);
    assert!(wf.skipped.is_empty());
    assert_eq!(wf.oos.len(), 800);
    assert_eq!(wf.oos.bars[0].timestamp, returns.timestamps()[400]);
    for w in wf.oos.bars.windows(2) {
        assert_eq!(w[1].t, w[0].t + 1);
    }
    assert_eq!(wf.oos_metrics.n_obs, 800);
}

#[test]
fn fold_test_bars_replicate_a_direct_run() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    let r = runner();
    let wf = validator(FoldConfig::rolling(400, 200))
        .run(returns, &candidates())
        .unwrap();

    for report in &wf.folds {
        let f = report.fold;
        let direct = r
            .run(returns, &report.selected, f.test(), f.train_start)
            .unwrap();
        let stitched: Vec<f64> = wf
            .oos
            .bars
            .iter()
            .filter(|b| f.test().contains(&b.t))
            .map(|b| b.net_return)
            .collect();
        assert_eq!(stitched, direct.net_returns(), "fold {}", f.index);
        assert_eq!(report.fingerprint, report.selected.fingerprint());
    }
}

#[test]
fn selection_maximizes_train_sharpe() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    let r = runner();
    let cands = candidates();
    let wf = validator(FoldConfig::expanding(400, 200))
        .run(returns, &cands)
        .unwrap();

    for report in &wf.folds {
        let f = report.fold;
        let best = cands
            .iter()
            .map(|c| {
                let res = r.run(returns, c, f.train(), f.train_start).unwrap();
                sharpe_ratio(&res.net_returns(), HOURLY_BARS)
            })
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.train_sharpe, best);
    }
}

#[test]
fn ties_go_to_the_earlier_candidate() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    // a band no z-score can reach keeps every rebalance flat: Sharpe 0, turnover 0
    let flat = |k| SignalConfig::reversal(k).with_band(100.0);

    let wf = validator(FoldConfig::expanding(400, 200))
        .run(returns, &[flat(2), flat(3)])
        .unwrap();
    assert!(wf.folds.iter().all(|f| f.selected.lookback == 2));

    let wf = validator(FoldConfig::expanding(400, 200))
        .run(returns, &[flat(3), flat(2)])
        .unwrap();
    assert!(wf.folds.iter().all(|f| f.selected.lookback == 3));
    assert!(wf.oos.net_returns().iter().all(|r| *r == 0.0));
    // the stitched series spans several selections, so it carries no config label
    assert_eq!(wf.oos.label, "oos");
}

#[test]
fn folds_without_a_feasible_candidate_are_reported() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    let long = SignalConfig::reversal(500)
        .with_residual_window(None)
        .with_vol_window(None);

    let wf = validator(FoldConfig::expanding(400, 200))
        .run(returns, &[long])
        .unwrap();
    assert_eq!(wf.skipped.len(), 1);
    assert_eq!(wf.skipped[0].fold.index, 0);
    assert!(matches!(
        wf.skipped[0].reason,
        SkipReason::NoFeasibleCandidate {
            train_bars: 400,
            min_warmup: 500,
            ..
        }
    ));
    assert_eq!(wf.folds.len(), 3);
    assert_eq!(wf.oos.len(), 600);
}

#[test]
fn runs_are_deterministic() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    let v = validator(FoldConfig::rolling(300, 150));
    let a = v.run(returns, &candidates()).unwrap();
    let b = v.run(returns, &candidates()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn mixed_walk_forward_applies_train_weights() {
    let prices = panel();
    let returns = prices.returns(ReturnKind::Simple);
    let sleeves = vec![
        SleeveSpec {
            name: "rev".into(),
            candidates: candidates(),
        },
        SleeveSpec {
            name: "mom".into(),
            candidates: vec![SignalConfig::momentum(24)
                .with_skip(0)
                .with_rebalance_every(24)],
        },
    ];
    let v = validator(FoldConfig::expanding(400, 200));

    let equal = v
        .run_mix(returns, &sleeves, &MixConfig::equal_weight())
        .unwrap();
    assert_eq!(equal.folds.len(), 4);
    assert_eq!(equal.oos.len(), 800);
    for f in &equal.folds {
        assert_eq!(f.weights, vec![0.5, 0.5]);
        assert_eq!(f.sleeves.len(), 2);
    }

    let inv_vol = v
        .run_mix(returns, &sleeves, &MixConfig::equal_vol(200, 24))
        .unwrap();
    for f in &inv_vol.folds {
        let sum: f64 = f.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(f.weights.iter().all(|w| *w >= 0.0));
    }
}
