use crate::ops::{
    self, ArgSpec, Domain, ElemKernel, KernelDispatch, OpCode, SectionKernel, SeriesKernel,
    SeriesPairKernel,
};
use crate::plan::MAX_NODE_INPUTS;
use std::collections::HashMap;

/// Registry row tying a public operator name to its opcode, argument shape,
/// and kernel.
#[derive(Debug, Clone, Copy)]
pub struct OpMeta {
    pub name: &'static str,
    pub op: OpCode,
    pub domain: Domain,
    pub args: ArgSpec,
    pub kernel: KernelDispatch,
}

const fn elem_unary(name: &'static str, op: OpCode, kernel: ElemKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Elem,
        args: ArgSpec::SeriesOnly,
        kernel: KernelDispatch::Elem(kernel),
    }
}

const fn elem_binary(name: &'static str, op: OpCode, kernel: ElemKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Elem,
        args: ArgSpec::TwoSeries,
        kernel: KernelDispatch::Elem(kernel),
    }
}

const fn elem_with(name: &'static str, op: OpCode, args: ArgSpec, kernel: ElemKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Elem,
        args,
        kernel: KernelDispatch::Elem(kernel),
    }
}

const fn ts_window(name: &'static str, op: OpCode, kernel: SeriesKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Ts,
        args: ArgSpec::SeriesWindow,
        kernel: KernelDispatch::Series(kernel),
    }
}

const fn ts_lagged(name: &'static str, op: OpCode, kernel: SeriesKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Ts,
        args: ArgSpec::SeriesLag,
        kernel: KernelDispatch::Series(kernel),
    }
}

const fn ts_with(name: &'static str, op: OpCode, args: ArgSpec, kernel: SeriesKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Ts,
        args,
        kernel: KernelDispatch::Series(kernel),
    }
}

const fn ts_pair(name: &'static str, op: OpCode, kernel: SeriesPairKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Ts,
        args: ArgSpec::TwoSeriesWindow,
        kernel: KernelDispatch::SeriesPair(kernel),
    }
}

const fn cs_section(name: &'static str, op: OpCode, args: ArgSpec, kernel: SectionKernel) -> OpMeta {
    OpMeta {
        name,
        op,
        domain: Domain::Cs,
        args,
        kernel: KernelDispatch::Section(kernel),
    }
}

/// Every operator reachable from formula text, one row per opcode.
/// Names are the canonical uppercase spellings; lookup is case-insensitive.
pub static OP_METAS: [OpMeta; OpCode::COUNT] = [
    elem_unary("ABS", OpCode::ElemAbs, ops::elem_abs),
    elem_unary("SIGN", OpCode::ElemSign, ops::elem_sign),
    elem_unary("LOG", OpCode::ElemLog, ops::elem_log),
    elem_unary("EXP", OpCode::ElemExp, ops::elem_exp),
    elem_unary("SQRT", OpCode::ElemSqrt, ops::elem_sqrt),
    elem_binary("ADD", OpCode::ElemAdd, ops::elem_add),
    elem_binary("SUB", OpCode::ElemSub, ops::elem_sub),
    elem_binary("MUL", OpCode::ElemMul, ops::elem_mul),
    elem_binary("DIV", OpCode::ElemDiv, ops::elem_div),
    elem_binary("POWER", OpCode::ElemPow, ops::elem_pow),
    elem_binary("SIGNEDPOWER", OpCode::ElemSignedPower, ops::elem_signed_power),
    elem_with("IF", OpCode::ElemWhere, ArgSpec::ThreeSeries, ops::elem_where),
    elem_with(
        "FILLNA",
        OpCode::ElemFillNa,
        ArgSpec::SeriesConstant,
        ops::elem_fillna,
    ),
    elem_with("CLIP", OpCode::ElemClip, ArgSpec::SeriesClamp, ops::elem_clip),
    elem_binary("LT", OpCode::ElemLt, ops::elem_lt),
    elem_binary("LE", OpCode::ElemLe, ops::elem_le),
    elem_binary("GT", OpCode::ElemGt, ops::elem_gt),
    elem_binary("GE", OpCode::ElemGe, ops::elem_ge),
    elem_binary("EQ", OpCode::ElemEq, ops::elem_eq),
    elem_binary("NE", OpCode::ElemNe, ops::elem_ne),
    elem_binary("AND", OpCode::ElemAnd, ops::elem_and),
    elem_binary("OR", OpCode::ElemOr, ops::elem_or),
    ts_lagged("DELAY", OpCode::TsDelay, ops::ts_delay),
    ts_lagged("DELTA", OpCode::TsDelta, ops::ts_delta),
    ts_window("SUM", OpCode::TsSum, ops::ts_sum),
    ts_window("MEAN", OpCode::TsMean, ops::ts_mean),
    ts_window("STDDEV", OpCode::TsStd, ops::ts_std),
    ts_window("VARIANCE", OpCode::TsVar, ops::ts_var),
    ts_window("MAX", OpCode::TsMax, ops::ts_max),
    ts_window("MIN", OpCode::TsMin, ops::ts_min),
    ts_window("ARGMAX", OpCode::TsArgMax, ops::ts_argmax),
    ts_window("ARGMIN", OpCode::TsArgMin, ops::ts_argmin),
    ts_window("PRODUCT", OpCode::TsProduct, ops::ts_product),
    ts_window("TSRANK", OpCode::TsRank, ops::ts_rank),
    ts_with(
        "QUANTILE",
        OpCode::TsQuantile,
        ArgSpec::SeriesWindowQuantile,
        ops::ts_quantile,
    ),
    ts_window("WMA", OpCode::TsWma, ops::ts_wma),
    ts_window("EMA", OpCode::TsEma, ops::ts_ema),
    ts_with(
        "SMA",
        OpCode::TsSma,
        ArgSpec::SeriesWindowWeight,
        ops::ts_sma,
    ),
    ts_pair("CORRELATION", OpCode::TsCorr, ops::ts_corr),
    ts_pair("COVARIANCE", OpCode::TsCov, ops::ts_cov),
    ts_pair("BETA", OpCode::TsBeta, ops::ts_beta),
    cs_section("RANK", OpCode::CsRank, ArgSpec::SeriesOnly, ops::cs_rank),
    cs_section("SCALE", OpCode::CsScale, ArgSpec::SeriesOnly, ops::cs_scale),
    OpMeta {
        name: "ZSCORE",
        op: OpCode::CsZscore,
        domain: Domain::Cs,
        args: ArgSpec::SeriesWindow,
        kernel: KernelDispatch::Pooled(ops::cs_zscore_pooled),
    },
    cs_section("DEMEAN", OpCode::CsDemean, ArgSpec::SeriesOnly, ops::cs_demean),
    cs_section(
        "WINSORIZE",
        OpCode::CsWinsorize,
        ArgSpec::SeriesStdBound,
        ops::cs_winsorize,
    ),
    cs_section(
        "CLIPQ",
        OpCode::CsClipQuantile,
        ArgSpec::SeriesTailQuantile,
        ops::cs_clip_quantile,
    ),
];

/// Immutable operator table handed to the compiler. Built once per process
/// (or per test) and shared by reference; compiled plans only carry opcodes,
/// so any registry with the same rows evaluates them identically.
#[derive(Debug)]
pub struct OperatorRegistry {
    by_name: HashMap<String, usize>,
    by_code: [usize; OpCode::COUNT],
}

impl OperatorRegistry {
    /// Registry with the full built-in operator set.
    pub fn standard() -> Self {
        let mut by_name = HashMap::with_capacity(OP_METAS.len());
        let mut by_code = [usize::MAX; OpCode::COUNT];
        for (idx, meta) in OP_METAS.iter().enumerate() {
            validate_meta(meta);
            if by_name.insert(meta.name.to_string(), idx).is_some() {
                panic!("duplicate operator name in registry: `{}`", meta.name);
            }
            let slot = meta.op.as_usize();
            if by_code[slot] != usize::MAX {
                panic!("duplicate opcode in registry: {:?}", meta.op);
            }
            by_code[slot] = idx;
        }
        for (slot, idx) in by_code.iter().enumerate() {
            if *idx == usize::MAX {
                panic!("opcode slot {slot} not registered");
            }
        }
        Self { by_name, by_code }
    }

    /// Case-insensitive name lookup. `mean`, `Mean`, and `MEAN` all resolve.
    pub fn resolve(&self, name: &str) -> Option<&'static OpMeta> {
        let canonical = name.trim().to_ascii_uppercase();
        self.by_name.get(&canonical).map(|idx| &OP_METAS[*idx])
    }

    #[inline]
    pub fn meta(&self, op: OpCode) -> &'static OpMeta {
        &OP_METAS[self.by_code[op.as_usize()]]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn validate_meta(meta: &OpMeta) {
    if !meta
        .name
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        panic!("operator name `{}` must be uppercase ascii", meta.name);
    }
    let series = meta.args.series_count();
    match meta.kernel {
        KernelDispatch::Elem(_) => {
            if !matches!(meta.domain, Domain::Elem) {
                panic!("operator `{}` elementwise kernel outside Elem domain", meta.name);
            }
            if series == 0 || series > MAX_NODE_INPUTS {
                panic!("operator `{}` has unsupported input count {series}", meta.name);
            }
        }
        KernelDispatch::Series(_) => {
            if !matches!(meta.domain, Domain::Ts) || series != 1 {
                panic!("operator `{}` series kernel needs Ts domain and one input", meta.name);
            }
        }
        KernelDispatch::SeriesPair(_) => {
            if !matches!(meta.domain, Domain::Ts) || series != 2 {
                panic!("operator `{}` pair kernel needs Ts domain and two inputs", meta.name);
            }
        }
        KernelDispatch::Section(_) | KernelDispatch::Pooled(_) => {
            if !matches!(meta.domain, Domain::Cs) || series != 1 {
                panic!(
                    "operator `{}` cross-section kernel needs Cs domain and one input",
                    meta.name
                );
            }
        }
    }
    let expects_window = matches!(
        meta.args,
        ArgSpec::SeriesWindow
            | ArgSpec::TwoSeriesWindow
            | ArgSpec::SeriesWindowQuantile
            | ArgSpec::SeriesWindowWeight
    );
    if expects_window && matches!(meta.kernel, KernelDispatch::Elem(_)) {
        panic!("operator `{}` takes a window but runs elementwise", meta.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_covers_every_opcode() {
        let registry = OperatorRegistry::standard();
        assert_eq!(OP_METAS.len(), OpCode::COUNT);
        assert_eq!(registry.len(), OpCode::COUNT);
        for meta in OP_METAS.iter() {
            let resolved = registry.resolve(meta.name).expect("name must resolve");
            assert_eq!(resolved.op, meta.op, "name `{}` resolves its own row", meta.name);
            assert_eq!(registry.meta(meta.op).name, meta.name);
        }
    }

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for meta in OP_METAS.iter() {
            assert!(seen.insert(meta.name), "duplicate name `{}`", meta.name);
        }
    }

    #[test]
    fn resolution_is_case_insensitive() {
        let registry = OperatorRegistry::standard();
        assert_eq!(registry.resolve("mean").map(|m| m.op), Some(OpCode::TsMean));
        assert_eq!(registry.resolve("Mean").map(|m| m.op), Some(OpCode::TsMean));
        assert_eq!(
            registry.resolve(" rank ").map(|m| m.op),
            Some(OpCode::CsRank)
        );
        assert!(registry.resolve("FOOBAR").is_none());
    }

    #[test]
    fn windowed_rows_use_windowed_specs() {
        for meta in OP_METAS.iter() {
            if matches!(meta.kernel, KernelDispatch::SeriesPair(_)) {
                assert_eq!(meta.args, ArgSpec::TwoSeriesWindow, "`{}`", meta.name);
            }
        }
    }
}
