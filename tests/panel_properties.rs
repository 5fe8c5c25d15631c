//! Property tests for panel evaluation invariants.
//!
//! Uses proptest to verify:
//! 1. Cross-sectional ranks stay in [-0.5, 0.5] and sum to zero per date
//! 2. Scale outputs stay in [-1, 1] with min/max pinned to the endpoints
//! 3. Delay only ever reads backwards
//! 4. Trailing means are missing until the window fills
//! 5. Guarded division never produces infinities
//! 6. Evaluation is byte-for-byte deterministic

mod common;

use alpha_panel::{FactorCompiler, PanelEngine, PanelVector};
use common::*;
use proptest::prelude::*;

fn panel_values(cells: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![8 => 1.0f64..500.0, 1 => Just(f64::NAN)],
        cells,
    )
}

fn positive_or_zero(cells: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![
            6 => 0.5f64..10.0,
            2 => Just(0.0),
            1 => Just(f64::NAN),
        ],
        cells,
    )
}

fn eval_panel(
    source: &str,
    symbol_count: usize,
    date_count: usize,
    fields: &[(&str, Vec<f64>)],
) -> PanelVector {
    let names = numbered_symbols(symbol_count);
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let bundle = bundle_with(&refs, date_count, fields);
    let plan = FactorCompiler::default()
        .compile(source)
        .expect("property formula should compile");
    PanelEngine::default()
        .evaluate(&plan, &bundle)
        .expect("property evaluation should succeed")
}

proptest! {
    #[test]
    fn rank_outputs_stay_bounded_and_centered(values in panel_values(5 * 9)) {
        let out = eval_panel("RANK(CLOSE)", 5, 9, &[("close", values.clone())]);

        for col in 0..9 {
            let mut sum = 0.0;
            let mut finite = 0usize;
            for row in 0..5 {
                let v_in = values[row * 9 + col];
                let v_out = out.value_at(row, col);
                if v_in.is_finite() {
                    prop_assert!((-0.5..=0.5).contains(&v_out), "rank {v_out} out of bounds");
                    sum += v_out;
                    finite += 1;
                } else {
                    prop_assert!(v_out.is_nan(), "missing input must stay missing");
                }
            }
            if finite > 0 {
                prop_assert!(sum.abs() < 1e-9, "date {col} ranks sum to {sum}");
            }
        }
    }

    #[test]
    fn scale_outputs_stay_inside_unit_bounds(values in panel_values(4 * 8)) {
        let out = eval_panel("SCALE(CLOSE)", 4, 8, &[("close", values.clone())]);

        for col in 0..8 {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for row in 0..4 {
                let v = values[row * 8 + col];
                if v.is_finite() {
                    min = min.min(v);
                    max = max.max(v);
                }
            }
            for row in 0..4 {
                let v_in = values[row * 8 + col];
                let v_out = out.value_at(row, col);
                if !v_in.is_finite() || min > max {
                    prop_assert!(v_out.is_nan());
                } else if max > min {
                    prop_assert!((-1.0..=1.0).contains(&v_out), "scale {v_out} out of bounds");
                    if v_in == max {
                        prop_assert!(approx_eq(v_out, 1.0));
                    }
                    if v_in == min {
                        prop_assert!(approx_eq(v_out, -1.0));
                    }
                } else {
                    prop_assert_eq!(v_out, 0.0);
                }
            }
        }
    }

    #[test]
    fn delay_never_looks_forward(values in panel_values(4 * 12)) {
        let out = eval_panel("DELAY(CLOSE, 3)", 4, 12, &[("close", values.clone())]);

        for row in 0..4 {
            for col in 0..12 {
                let v_out = out.value_at(row, col);
                if col < 3 {
                    prop_assert!(v_out.is_nan(), "insufficient history must be missing");
                } else {
                    let v_in = values[row * 12 + col - 3];
                    prop_assert_eq!(v_out.to_bits(), v_in.to_bits());
                }
            }
        }
    }

    #[test]
    fn mean_warms_up_then_tracks_the_window(values in panel_values(3 * 15)) {
        let out = eval_panel("MEAN(CLOSE, 4)", 3, 15, &[("close", values.clone())]);

        for row in 0..3 {
            let expected = naive_window_mean(&values[row * 15..(row + 1) * 15], 4);
            for col in 0..15 {
                let v_out = out.value_at(row, col);
                prop_assert!(
                    approx_eq(v_out, expected[col]),
                    "row {} col {}: got {}, expected {}",
                    row,
                    col,
                    v_out,
                    expected[col]
                );
            }
        }
    }

    #[test]
    fn division_never_produces_infinities(
        close in panel_values(4 * 10),
        volume in positive_or_zero(4 * 10),
    ) {
        let out = eval_panel(
            "CLOSE / VOLUME",
            4,
            10,
            &[("close", close), ("volume", volume)],
        );

        for &v in out.values() {
            prop_assert!(!v.is_infinite(), "guarded division must stay finite, got {v}");
        }
    }

    #[test]
    fn evaluation_is_bit_deterministic(values in panel_values(5 * 12)) {
        let source = "RANK(MEAN(CLOSE, 4) / DELAY(CLOSE, 2) - 1)";
        let compiler = FactorCompiler::default();
        let engine = PanelEngine::default();

        let names = numbered_symbols(5);
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let bundle = bundle_with(&refs, 12, &[("close", values)]);

        let plan_a = compiler.compile(source).expect("plan should compile");
        let plan_b = compiler.compile(source).expect("plan should compile");
        let first = engine
            .evaluate(&plan_a, &bundle)
            .expect("evaluation should succeed");
        for plan in [&plan_a, &plan_b] {
            for _ in 0..2 {
                let next = engine.evaluate(plan, &bundle).expect("evaluation should succeed");
                for (a, b) in first.values().iter().zip(next.values()) {
                    prop_assert_eq!(a.to_bits(), b.to_bits());
                }
            }
        }
    }
}
