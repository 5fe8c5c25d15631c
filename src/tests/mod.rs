use std::sync::Arc;

use crate::compile::FactorCompiler;
use crate::engine::PanelEngine;
use crate::panel::{InputBundle, PanelIndex, PanelVector};
use crate::plan::CompiledPlan;


fn trading_dates(count: usize) -> Vec<String> {
    let mut day = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).expect("calendar start");
    let mut dates = Vec::with_capacity(count);
    for _ in 0..count {
        dates.push(day.format("%Y%m%d").to_string());
        day = day.succ_opt().expect("next calendar day");
    }
    dates
}

fn universe(symbols: &[&str], date_count: usize) -> Arc<PanelIndex> {
    let dates = trading_dates(date_count);
    let date_refs: Vec<&str> = dates.iter().map(String::as_str).collect();
    PanelIndex::from_parts(symbols, &date_refs).expect("valid universe")
}

fn bundle_with(symbols: &[&str], date_count: usize, fields: &[(&str, Vec<f64>)]) -> InputBundle {
    let mut bundle = InputBundle::new(universe(symbols, date_count));
    for (name, values) in fields {
        bundle
            .insert_values(name, values.clone())
            .expect("field on the bundle universe");
    }
    bundle
}

fn compile_one(source: &str) -> CompiledPlan {
    FactorCompiler::default()
        .compile(source)
        .expect("formula should compile")
}

fn eval_one(source: &str, bundle: &InputBundle) -> PanelVector {
    let plan = compile_one(source);
    PanelEngine::default()
        .evaluate(&plan, bundle)
        .expect("evaluation should succeed")
}

fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs.is_nan() && rhs.is_nan()) || (lhs - rhs).abs() < 1e-9
}

fn assert_series_approx(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(approx_eq(*a, *e), "cell {i}: got {a}, expected {e}");
    }
}

fn assert_bits_eq(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a.to_bits(), e.to_bits(), "cell {i}: got {a}, expected {e}");
    }
}

fn synthetic_series(len: usize) -> Vec<f64> {
    let mut s = 0x9E37_79B9_7F4A_7C15u64;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        s = s
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let x = ((s >> 11) as f64) * (1.0 / ((1u64 << 53) as f64));
        out.push(x * 100.0);
    }
    out
}

/// Trailing-window reference: NaN until the window is full, NaN when the
/// window holds any non-finite value, else `f` over the window slice.
fn naive_window_apply(series: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; series.len()];
    if window == 0 {
        return out;
    }
    for i in 0..series.len() {
        if i + 1 < window {
            continue;
        }
        let slice = &series[i + 1 - window..=i];
        if slice.iter().any(|v| !v.is_finite()) {
            continue;
        }
        out[i] = f(slice);
    }
    out
}

fn naive_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn naive_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = naive_mean(values);
    let m2 = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>();
    (m2 / (n - 1.0)).sqrt()
}

fn naive_bivariate_nums(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_xx: f64 = x.iter().map(|a| a * a).sum();
    let sum_yy: f64 = y.iter().map(|b| b * b).sum();
    let cov_num = sum_xy - (sum_x * sum_y) / n;
    let var_x_num = sum_xx - (sum_x * sum_x) / n;
    let var_y_num = sum_yy - (sum_y * sum_y) / n;
    (cov_num, var_x_num, var_y_num)
}

fn naive_corr(x: &[f64], y: &[f64]) -> f64 {
    let (cov_num, var_x_num, var_y_num) = naive_bivariate_nums(x, y);
    cov_num / (var_x_num.sqrt() * var_y_num.sqrt())
}

fn naive_cov(x: &[f64], y: &[f64]) -> f64 {
    let (cov_num, _, _) = naive_bivariate_nums(x, y);
    cov_num / (x.len() as f64 - 1.0)
}

fn naive_beta(x: &[f64], y: &[f64]) -> f64 {
    let (cov_num, _, var_y_num) = naive_bivariate_nums(x, y);
    cov_num / var_y_num
}

/// Per-date reference rank: average-tie percentile minus 0.5 over the finite
/// cells, NaN passed through.
fn naive_cs_rank(column: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; column.len()];
    let finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    if n == 0 {
        return out;
    }
    for (i, v) in column.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        if n == 1 {
            out[i] = 0.0;
            continue;
        }
        let below = finite.iter().filter(|o| **o < *v).count();
        let equal = finite.iter().filter(|o| **o == *v).count();
        let avg_rank = below as f64 + (equal as f64 + 1.0) / 2.0;
        out[i] = (avg_rank - 1.0) / (n as f64 - 1.0) - 0.5;
    }
    out
}
