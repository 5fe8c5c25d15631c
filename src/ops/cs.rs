//! Per-date cross-sectional kernels. Column kernels receive one date's values
//! across all symbols (gathered by the executor) and write the aligned output
//! column; cells that are undefined stay NaN and are excluded from the
//! statistic. The pooled z-score additionally reads a trailing run of dates,
//! so it works on the whole matrix.

use crate::ops::PanelShape;
use crate::plan::PlanParam;

/// Average-tie percentile rank shifted to `[-0.5, 0.5]`. Tie averaging keeps
/// the rank sum fixed, so the per-date mean over defined cells is exactly 0.
pub fn cs_rank(column: &[f64], _p: PlanParam, out: &mut [f64]) {
    out.fill(f64::NAN);
    let mut pairs: Vec<(usize, f64)> = column
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();
    if pairs.is_empty() {
        return;
    }
    let n = pairs.len();
    pairs.sort_by(|a, b| a.1.total_cmp(&b.1));
    let mut start = 0usize;
    while start < n {
        let mut end = start + 1;
        while end < n && pairs[end].1 == pairs[start].1 {
            end += 1;
        }
        // 1-based ranks start+1..=end share their average.
        let avg_rank = ((start + 1 + end) as f64) * 0.5;
        let normalized = if n > 1 {
            (avg_rank - 1.0) / ((n - 1) as f64)
        } else {
            0.5
        };
        for &(slot, _) in &pairs[start..end] {
            out[slot] = normalized - 0.5;
        }
        start = end;
    }
}

/// Min/max rescale onto `[-1, 1]`; a constant date maps to 0.
pub fn cs_scale(column: &[f64], _p: PlanParam, out: &mut [f64]) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut count = 0usize;
    for &v in column {
        if v.is_finite() {
            min = min.min(v);
            max = max.max(v);
            count += 1;
        }
    }
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = column[slot];
        *cell = if !v.is_finite() || count == 0 {
            f64::NAN
        } else if max > min {
            2.0 * (v - min) / (max - min) - 1.0
        } else {
            0.0
        };
    }
}

/// Subtract the date's cross-sectional mean.
pub fn cs_demean(column: &[f64], _p: PlanParam, out: &mut [f64]) {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in column {
        if v.is_finite() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        out.fill(f64::NAN);
        return;
    }
    let mean = sum / count as f64;
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = column[slot];
        *cell = if v.is_finite() { v - mean } else { f64::NAN };
    }
}

/// Clip to the date's mean plus/minus `k` sample standard deviations. With
/// fewer than two defined cells there is no spread and values pass through.
pub fn cs_winsorize(column: &[f64], p: PlanParam, out: &mut [f64]) {
    let Some(k) = p.scalar() else {
        out.fill(f64::NAN);
        return;
    };
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for &v in column {
        if v.is_finite() {
            sum += v;
            sum_sq += v * v;
            count += 1;
        }
    }
    let bounds = if count >= 2 {
        let n = count as f64;
        let mean = sum / n;
        let m2 = sum_sq - (sum * sum) / n;
        let std = (m2 / (n - 1.0)).max(0.0).sqrt();
        Some((mean - k * std, mean + k * std))
    } else {
        None
    };
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = column[slot];
        if !v.is_finite() {
            *cell = f64::NAN;
            continue;
        }
        *cell = match bounds {
            Some((lo, hi)) => v.max(lo).min(hi),
            None => v,
        };
    }
}

/// Clamp to the date's `[q, 1-q]` interpolated quantiles.
pub fn cs_clip_quantile(column: &[f64], p: PlanParam, out: &mut [f64]) {
    let Some(q) = p.scalar() else {
        out.fill(f64::NAN);
        return;
    };
    let mut sorted: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        out.fill(f64::NAN);
        return;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let lo = interpolated_quantile(&sorted, q);
    let hi = interpolated_quantile(&sorted, 1.0 - q);
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = column[slot];
        *cell = if v.is_finite() {
            v.max(lo).min(hi)
        } else {
            f64::NAN
        };
    }
}

fn interpolated_quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = q * ((sorted.len() - 1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    let frac = idx - (lo as f64);
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Standardize each cell against the pooled mean/std of every symbol's values
/// over the trailing `n` dates ending at the cell's date. The first `n - 1`
/// dates are undefined; a degenerate pool (no spread) maps defined cells to 0.
pub fn cs_zscore_pooled(shape: PanelShape, input: &[f64], p: PlanParam, out: &mut [f64]) {
    let window = p.window().unwrap_or(0);
    if window == 0 {
        out.fill(f64::NAN);
        return;
    }
    for date_col in 0..shape.date_count {
        if date_col + 1 < window {
            for symbol_row in 0..shape.symbol_count {
                out[shape.cell(symbol_row, date_col)] = f64::NAN;
            }
            continue;
        }
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut count = 0usize;
        for pool_col in date_col + 1 - window..=date_col {
            for symbol_row in 0..shape.symbol_count {
                let v = input[shape.cell(symbol_row, pool_col)];
                if v.is_finite() {
                    sum += v;
                    sum_sq += v * v;
                    count += 1;
                }
            }
        }
        let stats = if count >= 2 {
            let n = count as f64;
            let mean = sum / n;
            let m2 = sum_sq - (sum * sum) / n;
            let std = (m2 / (n - 1.0)).max(0.0).sqrt();
            Some((mean, std))
        } else {
            None
        };
        for symbol_row in 0..shape.symbol_count {
            let cell = shape.cell(symbol_row, date_col);
            let v = input[cell];
            if !v.is_finite() {
                out[cell] = f64::NAN;
                continue;
            }
            out[cell] = match stats {
                Some((mean, std)) if std > 0.0 => (v - mean) / std,
                Some(_) | None => 0.0,
            };
        }
    }
}
