#![allow(dead_code)]

use std::sync::Arc;

use alpha_panel::{InputBundle, PanelIndex};

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn trading_dates(count: usize) -> Vec<String> {
    let mut day = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).expect("calendar start");
    let mut dates = Vec::with_capacity(count);
    for _ in 0..count {
        dates.push(day.format("%Y%m%d").to_string());
        day = day.succ_opt().expect("next calendar day");
    }
    dates
}

pub fn universe(symbols: &[&str], date_count: usize) -> Arc<PanelIndex> {
    let dates = trading_dates(date_count);
    let date_refs: Vec<&str> = dates.iter().map(String::as_str).collect();
    PanelIndex::from_parts(symbols, &date_refs).expect("valid universe")
}

pub fn bundle_with(
    symbols: &[&str],
    date_count: usize,
    fields: &[(&str, Vec<f64>)],
) -> InputBundle {
    let mut bundle = InputBundle::new(universe(symbols, date_count));
    for (name, values) in fields {
        bundle
            .insert_values(name, values.clone())
            .expect("field on the bundle universe");
    }
    bundle
}

pub fn numbered_symbols(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("SS60{i:04}")).collect()
}

pub fn synthetic_series(len: usize) -> Vec<f64> {
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

pub fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs.is_nan() && rhs.is_nan()) || (lhs - rhs).abs() < 1e-9
}

pub fn assert_bits_eq(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a.to_bits(), e.to_bits(), "cell {i}: got {a}, expected {e}");
    }
}

/// Trailing mean with full-window warmup; a window holding any non-finite
/// value is undefined.
pub fn naive_window_mean(series: &[f64], window: usize) -> Vec<f64> {
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
        out[i] = slice.iter().sum::<f64>() / window as f64;
    }
    out
}
