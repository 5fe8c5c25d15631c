//! Operator layer entry.
//!
//! Extension path (minimal touch points):
//! 1) implement kernel in `elem.rs` / `ts.rs` / `cs.rs`,
//! 2) add opcode in `spec.rs` and register meta in `catalog.rs` (`OP_METAS`),
//! 3) add compile/evaluation tests.

use crate::plan::PlanParam;

/// Dense panel shape: one row per symbol, one column per date, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelShape {
    pub symbol_count: usize,
    pub date_count: usize,
}

impl PanelShape {
    #[inline]
    pub const fn len(self) -> usize {
        self.symbol_count * self.date_count
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub const fn cell(self, symbol_row: usize, date_col: usize) -> usize {
        symbol_row * self.date_count + date_col
    }
}

/// Epsilon added to every denominator so division stays finite near zero.
pub const DIV_EPS: f64 = 1e-12;

/// Elementwise kernel over aligned whole-panel slices.
pub type ElemKernel = fn(inputs: &[&[f64]], p: PlanParam, out: &mut [f64]);
/// Per-symbol kernel over one date-ordered series.
pub type SeriesKernel = fn(series: &[f64], p: PlanParam, out: &mut [f64]);
/// Per-symbol kernel over two aligned date-ordered series.
pub type SeriesPairKernel = fn(x: &[f64], y: &[f64], p: PlanParam, out: &mut [f64]);
/// Per-date kernel over one cross-section column.
pub type SectionKernel = fn(column: &[f64], p: PlanParam, out: &mut [f64]);
/// Whole-matrix kernel for operators pooling across both axes.
pub type PooledKernel = fn(shape: PanelShape, input: &[f64], p: PlanParam, out: &mut [f64]);

/// How the engine drives a kernel across the panel: whole slices at once,
/// per symbol row, per date column, or over the full matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelDispatch {
    Elem(ElemKernel),
    Series(SeriesKernel),
    SeriesPair(SeriesPairKernel),
    Section(SectionKernel),
    Pooled(PooledKernel),
}

pub mod arg_spec;
pub mod catalog;
pub mod spec;

mod cs;
mod elem;
mod stats;
mod ts;

pub use arg_spec::{ArgSpec, ParsedArgs};
pub use catalog::{OpMeta, OperatorRegistry, OP_METAS};
pub use cs::{cs_clip_quantile, cs_demean, cs_rank, cs_scale, cs_winsorize, cs_zscore_pooled};
pub use elem::{
    elem_abs, elem_add, elem_and, elem_clip, elem_div, elem_eq, elem_exp, elem_fillna, elem_ge,
    elem_gt, elem_le, elem_log, elem_lt, elem_mul, elem_ne, elem_or, elem_pow, elem_sign,
    elem_signed_power, elem_sqrt, elem_sub, elem_where,
};
pub use spec::{Domain, OpCode};
pub use ts::{
    ts_argmax, ts_argmin, ts_beta, ts_corr, ts_cov, ts_delay, ts_delta, ts_ema, ts_max, ts_mean,
    ts_min, ts_product, ts_quantile, ts_rank, ts_sma, ts_std, ts_sum, ts_var, ts_wma,
};
