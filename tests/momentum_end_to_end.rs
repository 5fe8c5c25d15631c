mod common;

use alpha_panel::{EvalError, Factor, FactorCompiler, FactorError, ParseError};
use common::*;

const DATES: usize = 25;
const LOOKBACK: usize = 20;

const MOMENTUM_PROGRAM: &str = "ret = CLOSE / DELAY(CLOSE, 20) - 1\nMOMENTUM = RANK(ret)";

/// Two symbols with different daily growth rates. The faster compounder has
/// the larger 20-day return on every defined date.
fn growth_panel(daily_a: f64, daily_b: f64) -> Vec<f64> {
    let mut close = Vec::with_capacity(DATES * 2);
    for i in 0..DATES {
        close.push(100.0 * daily_a.powi(i as i32));
    }
    for i in 0..DATES {
        close.push(50.0 * daily_b.powi(i as i32));
    }
    close
}

#[test]
fn momentum_warms_up_then_splits_the_ranks() {
    init_test_logging();
    let close = growth_panel(1.01, 1.005);
    let bundle = bundle_with(&["SS600000", "SZ000001"], DATES, &[("close", close.clone())]);

    let factor = Factor::from_formula("momentum", MOMENTUM_PROGRAM)
        .expect("momentum program should compile");
    let out = factor.calculate(&bundle).expect("momentum evaluation should succeed");

    for col in 0..LOOKBACK {
        assert!(out.value_at(0, col).is_nan(), "date {col} precedes the lookback");
        assert!(out.value_at(1, col).is_nan(), "date {col} precedes the lookback");
    }

    let row_a = &close[..DATES];
    let row_b = &close[DATES..];
    for col in LOOKBACK..DATES {
        let ret_a = row_a[col] / row_a[col - LOOKBACK] - 1.0;
        let ret_b = row_b[col] / row_b[col - LOOKBACK] - 1.0;
        assert!(ret_a > ret_b, "panel construction should keep one clear winner");
        assert_eq!(out.value_at(0, col), 0.5, "winner rank at date {col}");
        assert_eq!(out.value_at(1, col), -0.5, "loser rank at date {col}");
    }
}

#[test]
fn identical_histories_tie_to_zero() {
    // Two symbols with bit-identical price paths have bit-identical 20-day
    // returns, so every defined rank averages out to zero. A proportional
    // path would not do: the division epsilon keeps returns from being
    // exactly scale-invariant.
    let mut close = growth_panel(1.01, 1.01);
    for i in 0..DATES {
        close[DATES + i] = close[i];
    }
    let bundle = bundle_with(&["SS600000", "SZ000001"], DATES, &[("close", close)]);

    let out = Factor::from_formula("momentum", MOMENTUM_PROGRAM)
        .expect("momentum program should compile")
        .calculate(&bundle)
        .expect("momentum evaluation should succeed");

    for col in LOOKBACK..DATES {
        assert_eq!(out.value_at(0, col), 0.0, "tied rank at date {col}");
        assert_eq!(out.value_at(1, col), 0.0, "tied rank at date {col}");
    }
}

#[test]
fn unknown_operators_fail_at_compile_time_before_any_data() {
    init_test_logging();
    let compiler = FactorCompiler::default();
    let err = compiler
        .compile("FOOBAR(CLOSE, 5)")
        .expect_err("an unknown operator must not compile");

    assert!(err.to_string().contains("FOOBAR"), "message should name the operator");
    match err {
        FactorError::Parse(ParseError::UnknownFunction { name }) => assert_eq!(name, "FOOBAR"),
        other => panic!("expected an unknown-function error, got {other:?}"),
    }
}

#[test]
fn missing_price_history_is_a_typed_error() {
    let volume: Vec<f64> = synthetic_series(DATES * 2);
    let bundle = bundle_with(&["SS600000", "SZ000001"], DATES, &[("volume", volume)]);

    let err = Factor::from_formula("momentum", MOMENTUM_PROGRAM)
        .expect("momentum program should compile")
        .calculate(&bundle)
        .expect_err("a bundle without close prices must be rejected");

    match err {
        FactorError::Eval(EvalError::MissingField { field }) => assert_eq!(field, "close"),
        other => panic!("expected a missing-field error, got {other:?}"),
    }
}
