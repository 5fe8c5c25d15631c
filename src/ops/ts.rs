//! Per-symbol windowed kernels. Every function receives one symbol's date
//! series sorted ascending and writes the aligned output slice; cell `i` only
//! reads cells `<= i`, so no kernel can leak future data. A trailing window
//! must hold its full `n` finite observations before anything is emitted.

use crate::ops::stats::{Moments, PairMoments};
use crate::plan::PlanParam;

const VAR_NUM_EPS: f64 = 1e-12;

#[inline]
fn finite_or_nan(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}

#[inline]
fn trailing_window(series: &[f64], i: usize, window: usize) -> Option<&[f64]> {
    if window == 0 || i + 1 < window {
        None
    } else {
        Some(&series[i + 1 - window..=i])
    }
}

pub fn ts_delay(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let Some(lag) = p.lag() else {
        out.fill(f64::NAN);
        return;
    };
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = if i >= lag {
            finite_or_nan(series[i - lag])
        } else {
            f64::NAN
        };
    }
}

pub fn ts_delta(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let Some(lag) = p.lag() else {
        out.fill(f64::NAN);
        return;
    };
    for (i, cell) in out.iter_mut().enumerate() {
        if i < lag {
            *cell = f64::NAN;
            continue;
        }
        let (now, past) = (series[i], series[i - lag]);
        *cell = if now.is_finite() && past.is_finite() {
            now - past
        } else {
            f64::NAN
        };
    }
}

pub fn ts_sum(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match trailing_window(series, i, window).and_then(Moments::over) {
            Some(m) => m.sum(),
            None => f64::NAN,
        };
    }
}

pub fn ts_mean(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match trailing_window(series, i, window).and_then(Moments::over) {
            Some(m) => m.mean(),
            None => f64::NAN,
        };
    }
}

pub fn ts_std(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match trailing_window(series, i, window).and_then(Moments::over) {
            Some(m) => finite_or_nan(m.std()),
            None => f64::NAN,
        };
    }
}

pub fn ts_var(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match trailing_window(series, i, window).and_then(Moments::over) {
            Some(m) => finite_or_nan(m.var()),
            None => f64::NAN,
        };
    }
}

pub fn ts_max(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = window_fold(series, i, window, f64::NEG_INFINITY, f64::max);
    }
}

pub fn ts_min(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = window_fold(series, i, window, f64::INFINITY, f64::min);
    }
}

#[inline]
fn window_fold(
    series: &[f64],
    i: usize,
    window: usize,
    seed: f64,
    fold: fn(f64, f64) -> f64,
) -> f64 {
    let Some(values) = trailing_window(series, i, window) else {
        return f64::NAN;
    };
    let mut acc = seed;
    for &v in values {
        if !v.is_finite() {
            return f64::NAN;
        }
        acc = fold(acc, v);
    }
    acc
}

/// Dates since the window maximum; 0 means the max is today. Ties resolve to
/// the most recent occurrence.
pub fn ts_argmax(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = window_argext(series, i, window, |v, best| v > best);
    }
}

/// Dates since the window minimum; same tie rule as [`ts_argmax`].
pub fn ts_argmin(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = window_argext(series, i, window, |v, best| v < best);
    }
}

#[inline]
fn window_argext(
    series: &[f64],
    i: usize,
    window: usize,
    better: fn(f64, f64) -> bool,
) -> f64 {
    if window == 0 || i + 1 < window {
        return f64::NAN;
    }
    let mut best = series[i];
    if !best.is_finite() {
        return f64::NAN;
    }
    let mut best_lag = 0usize;
    for lag in 1..window {
        let v = series[i - lag];
        if !v.is_finite() {
            return f64::NAN;
        }
        if better(v, best) {
            best = v;
            best_lag = lag;
        }
    }
    best_lag as f64
}

pub fn ts_product(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        let Some(values) = trailing_window(series, i, window) else {
            *cell = f64::NAN;
            continue;
        };
        let mut acc = 1.0;
        let mut poisoned = false;
        for &v in values {
            if !v.is_finite() {
                poisoned = true;
                break;
            }
            acc *= v;
        }
        *cell = if poisoned { f64::NAN } else { finite_or_nan(acc) };
    }
}

/// Percentile rank of today's value within its trailing window, in `[0, 1]`,
/// with average tie ranks.
pub fn ts_rank(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    let mut scratch = Vec::with_capacity(window);
    for (i, cell) in out.iter_mut().enumerate() {
        let Some(values) = trailing_window(series, i, window) else {
            *cell = f64::NAN;
            continue;
        };
        let latest = series[i];
        if !latest.is_finite() || values.iter().any(|v| !v.is_finite()) {
            *cell = f64::NAN;
            continue;
        }
        scratch.clear();
        scratch.extend_from_slice(values);
        scratch.sort_by(|a, b| a.total_cmp(b));
        let lower = scratch.partition_point(|v| *v < latest);
        let upper = scratch.partition_point(|v| *v <= latest);
        let avg_rank = ((lower + 1 + upper) as f64) * 0.5;
        *cell = if window > 1 {
            (avg_rank - 1.0) / (window as f64 - 1.0)
        } else {
            0.0
        };
    }
}

/// Linear-interpolated trailing-window quantile.
pub fn ts_quantile(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let Some((window, q)) = p.window_scalar() else {
        out.fill(f64::NAN);
        return;
    };
    if !q.is_finite() || !(0.0..=1.0).contains(&q) {
        out.fill(f64::NAN);
        return;
    }
    let mut scratch = Vec::with_capacity(window);
    for (i, cell) in out.iter_mut().enumerate() {
        let Some(values) = trailing_window(series, i, window) else {
            *cell = f64::NAN;
            continue;
        };
        if values.iter().any(|v| !v.is_finite()) {
            *cell = f64::NAN;
            continue;
        }
        scratch.clear();
        scratch.extend_from_slice(values);
        scratch.sort_by(|a, b| a.total_cmp(b));
        if scratch.len() == 1 {
            *cell = scratch[0];
            continue;
        }
        let idx = q * ((scratch.len() - 1) as f64);
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        let frac = idx - (lo as f64);
        *cell = scratch[lo] + (scratch[hi] - scratch[lo]) * frac;
    }
}

/// Linear-decay weighted mean: today carries weight `n`, the oldest window
/// date carries weight 1.
pub fn ts_wma(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        if window == 0 || i + 1 < window {
            *cell = f64::NAN;
            continue;
        }
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut poisoned = false;
        for lag in 0..window {
            let v = series[i - lag];
            if !v.is_finite() {
                poisoned = true;
                break;
            }
            let weight = (window - lag) as f64;
            weighted_sum += weight * v;
            weight_sum += weight;
        }
        *cell = if poisoned {
            f64::NAN
        } else {
            finite_or_nan(weighted_sum / weight_sum)
        };
    }
}

#[inline]
fn ewm_alpha(window: usize) -> f64 {
    2.0 / (window as f64 + 1.0)
}

/// Exponentially weighted mean over the trailing window only: today carries
/// weight 1, each older date decays by `1 - 2/(n+1)`.
pub fn ts_ema(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        if window == 0 || i + 1 < window {
            *cell = f64::NAN;
            continue;
        }
        let decay = 1.0 - ewm_alpha(window);
        let mut weight = 1.0;
        let mut weight_sum = 0.0;
        let mut wx_sum = 0.0;
        let mut poisoned = false;
        for lag in 0..window {
            let v = series[i - lag];
            if !v.is_finite() {
                poisoned = true;
                break;
            }
            weight_sum += weight;
            wx_sum += weight * v;
            weight *= decay;
        }
        *cell = if poisoned || weight_sum <= 0.0 {
            f64::NAN
        } else {
            finite_or_nan(wx_sum / weight_sum)
        };
    }
}

/// Recursive modified moving average `y = (m*x + (n-m)*y_prev) / n`, reseeded
/// after any undefined observation; emits only once `n` observations have fed
/// the recursion since the last reseed.
pub fn ts_sma(series: &[f64], p: PlanParam, out: &mut [f64]) {
    let Some((window, weight)) = p.window_scalar() else {
        out.fill(f64::NAN);
        return;
    };
    let n = window as f64;
    let m = weight;
    if window == 0 || !(0.0 < m && m < n) {
        out.fill(f64::NAN);
        return;
    }
    let mut acc = f64::NAN;
    let mut run = 0usize;
    for (i, cell) in out.iter_mut().enumerate() {
        let v = series[i];
        if !v.is_finite() {
            acc = f64::NAN;
            run = 0;
            *cell = f64::NAN;
            continue;
        }
        if acc.is_nan() {
            acc = v;
            run = 1;
        } else {
            acc = (m * v + (n - m) * acc) / n;
            run += 1;
        }
        *cell = if run >= window { acc } else { f64::NAN };
    }
}

pub fn ts_corr(x: &[f64], y: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match paired_moments(x, y, i, window) {
            Some(m) => finite_or_nan(m.correlation(VAR_NUM_EPS)),
            None => f64::NAN,
        };
    }
}

pub fn ts_cov(x: &[f64], y: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match paired_moments(x, y, i, window) {
            Some(m) => finite_or_nan(m.sample_cov()),
            None => f64::NAN,
        };
    }
}

/// Rolling OLS slope of `x` on `y`.
pub fn ts_beta(x: &[f64], y: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    for (i, cell) in out.iter_mut().enumerate() {
        *cell = match paired_moments(x, y, i, window) {
            Some(m) => finite_or_nan(m.slope(VAR_NUM_EPS)),
            None => f64::NAN,
        };
    }
}

#[inline]
fn paired_moments(x: &[f64], y: &[f64], i: usize, window: usize) -> Option<PairMoments> {
    if window == 0 || i + 1 < window {
        return None;
    }
    PairMoments::over(&x[i + 1 - window..=i], &y[i + 1 - window..=i])
}
