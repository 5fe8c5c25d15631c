use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ArgumentError, EvalError, FactorError};
use crate::ops::{KernelDispatch, OpCode, OpMeta, OperatorRegistry, PanelShape};
use crate::panel::{normalize_field_name, InputBundle, PanelIndex, PanelVector};
use crate::plan::{CompiledPlan, PlanNode, PlanParam};

/// Evaluates compiled plans against input bundles.
///
/// The engine holds no state beyond its operator registry, so evaluating the
/// same plan over the same bundle reproduces the same output bytes.
#[derive(Debug, Clone)]
pub struct PanelEngine {
    registry: Arc<OperatorRegistry>,
}

impl PanelEngine {
    pub fn new(registry: Arc<OperatorRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    /// Evaluate a plan over a bundle. Every field the plan reads must be
    /// present.
    pub fn evaluate(
        &self,
        plan: &CompiledPlan,
        bundle: &InputBundle,
    ) -> Result<PanelVector, FactorError> {
        self.evaluate_with_defaults(plan, bundle, &HashMap::new())
    }

    /// Evaluate with per-field fallbacks: a field the plan reads that is
    /// absent from the bundle materializes as a constant panel of its default
    /// instead of failing. Default keys are normalized like bundle inserts.
    pub fn evaluate_with_defaults(
        &self,
        plan: &CompiledPlan,
        bundle: &InputBundle,
        defaults: &HashMap<String, f64>,
    ) -> Result<PanelVector, FactorError> {
        let index = bundle.index();
        if index.is_empty() {
            return Err(EvalError::EmptyUniverse.into());
        }
        let defaults: HashMap<String, f64> = defaults
            .iter()
            .map(|(name, value)| (normalize_field_name(name), *value))
            .collect();
        for field in plan.required_fields() {
            if !bundle.contains(field) && !defaults.contains_key(field) {
                return Err(EvalError::MissingField {
                    field: field.clone(),
                }
                .into());
            }
        }

        let shape = PanelShape {
            symbol_count: index.symbol_count(),
            date_count: index.date_count(),
        };
        let len = shape.len();
        let mut buffers: Vec<Vec<f64>> = Vec::with_capacity(plan.nodes.len());
        for node in &plan.nodes {
            let buffer = match node {
                PlanNode::Field { name } => match bundle.get(name) {
                    Some(panel) => panel.values().to_vec(),
                    None => {
                        let value = defaults.get(name).copied().ok_or_else(|| {
                            EvalError::MissingField {
                                field: name.clone(),
                            }
                        })?;
                        vec![value; len]
                    }
                },
                PlanNode::Const { bits } => vec![f64::from_bits(*bits); len],
                PlanNode::Call { op, inputs, param } => {
                    let meta = self.registry.meta(*op);
                    let slices: Vec<&[f64]> =
                        inputs.iter().map(|&i| buffers[i].as_slice()).collect();
                    let mut out = vec![f64::NAN; len];
                    run_kernel(meta, shape, &slices, *param, &mut out);
                    out
                }
            };
            buffers.push(buffer);
        }

        let values = std::mem::take(&mut buffers[plan.output]);
        let result = PanelVector::from_values(index.clone(), values);
        let non_finite = result.non_finite_count();
        if non_finite > 0 {
            log::debug!(
                target: "alpha_panel::engine",
                "evaluation produced {non_finite} non-finite cells out of {len}"
            );
        }
        Ok(result)
    }
}

impl Default for PanelEngine {
    fn default() -> Self {
        Self::new(Arc::new(OperatorRegistry::standard()))
    }
}

/// Drive one operator's kernel across the panel in its dispatch shape:
/// elementwise over the whole buffer, per symbol row, per date column, or
/// over the full matrix at once.
pub(crate) fn run_kernel(
    meta: &OpMeta,
    shape: PanelShape,
    inputs: &[&[f64]],
    param: PlanParam,
    out: &mut [f64],
) {
    match meta.kernel {
        KernelDispatch::Elem(kernel) => kernel(inputs, param, out),
        KernelDispatch::Series(kernel) => {
            for row in 0..shape.symbol_count {
                let start = shape.cell(row, 0);
                let end = start + shape.date_count;
                kernel(&inputs[0][start..end], param, &mut out[start..end]);
            }
        }
        KernelDispatch::SeriesPair(kernel) => {
            for row in 0..shape.symbol_count {
                let start = shape.cell(row, 0);
                let end = start + shape.date_count;
                kernel(
                    &inputs[0][start..end],
                    &inputs[1][start..end],
                    param,
                    &mut out[start..end],
                );
            }
        }
        KernelDispatch::Section(kernel) => {
            let mut column = vec![0.0; shape.symbol_count];
            let mut transformed = vec![0.0; shape.symbol_count];
            for col in 0..shape.date_count {
                for row in 0..shape.symbol_count {
                    column[row] = inputs[0][shape.cell(row, col)];
                }
                kernel(&column, param, &mut transformed);
                for row in 0..shape.symbol_count {
                    out[shape.cell(row, col)] = transformed[row];
                }
            }
        }
        KernelDispatch::Pooled(kernel) => kernel(shape, inputs[0], param, out),
    }
}

/// Evaluation context handed to callable factor routines.
///
/// A routine sees the same operator surface formula text compiles down to:
/// [`PanelCtx::apply`] runs any registered operator over materialized panels,
/// and the named wrappers cover the common ones. Values flow through the same
/// kernels either way, so a routine and an equivalent formula produce
/// identical bytes.
pub struct PanelCtx<'a> {
    registry: &'a OperatorRegistry,
    bundle: &'a InputBundle,
    defaults: &'a HashMap<String, f64>,
    shape: PanelShape,
}

impl<'a> PanelCtx<'a> {
    pub(crate) fn new(
        registry: &'a OperatorRegistry,
        bundle: &'a InputBundle,
        defaults: &'a HashMap<String, f64>,
    ) -> Self {
        let index = bundle.index();
        Self {
            registry,
            bundle,
            defaults,
            shape: PanelShape {
                symbol_count: index.symbol_count(),
                date_count: index.date_count(),
            },
        }
    }

    #[inline]
    pub fn index(&self) -> &Arc<PanelIndex> {
        self.bundle.index()
    }

    /// Fetch a raw field as an owned panel. An absent field falls back to its
    /// declared default when one exists, else this is a `MissingField` error.
    pub fn field(&self, name: &str) -> Result<PanelVector, FactorError> {
        if let Some(panel) = self.bundle.get(name) {
            return Ok(panel.clone());
        }
        let normalized = normalize_field_name(name);
        match self.defaults.get(&normalized) {
            Some(value) => Ok(PanelVector::filled(self.index().clone(), *value)),
            None => Err(EvalError::MissingField { field: normalized }.into()),
        }
    }

    /// Constant panel over the whole universe.
    pub fn constant(&self, value: f64) -> PanelVector {
        PanelVector::filled(self.index().clone(), value)
    }

    /// Run one registered operator over materialized panels. Input count and
    /// parameter shape are checked against the operator's signature, and every
    /// input must be keyed on this context's universe.
    pub fn apply(
        &self,
        op: OpCode,
        inputs: &[&PanelVector],
        param: PlanParam,
    ) -> Result<PanelVector, FactorError> {
        let meta = self.registry.meta(op);
        let expected = meta.args.series_count();
        if inputs.len() != expected {
            return Err(ArgumentError::Arity {
                name: meta.name.to_string(),
                expected,
                actual: inputs.len(),
            }
            .into());
        }
        meta.args.validate_param(meta.name, param)?;
        for (position, input) in inputs.iter().enumerate() {
            if !Arc::ptr_eq(input.index(), self.bundle.index())
                && **input.index() != **self.bundle.index()
            {
                return Err(EvalError::UniverseMismatch {
                    field: format!("{} argument {}", meta.name, position + 1),
                }
                .into());
            }
        }
        if self.shape.is_empty() {
            return Err(EvalError::EmptyUniverse.into());
        }

        let slices: Vec<&[f64]> = inputs.iter().map(|panel| panel.values()).collect();
        let mut out = vec![f64::NAN; self.shape.len()];
        run_kernel(meta, self.shape, &slices, param, &mut out);
        Ok(PanelVector::from_values(self.index().clone(), out))
    }

    pub fn abs(&self, x: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemAbs, &[x], PlanParam::None)
    }

    pub fn add(&self, x: &PanelVector, y: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemAdd, &[x, y], PlanParam::None)
    }

    pub fn sub(&self, x: &PanelVector, y: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemSub, &[x, y], PlanParam::None)
    }

    pub fn mul(&self, x: &PanelVector, y: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemMul, &[x, y], PlanParam::None)
    }

    /// Division with the engine-wide epsilon added to the denominator.
    pub fn div(&self, x: &PanelVector, y: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemDiv, &[x, y], PlanParam::None)
    }

    pub fn power(&self, x: &PanelVector, y: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemPow, &[x, y], PlanParam::None)
    }

    /// Per-key select: where `cond` is true (non-zero) take `a`, else `b`.
    pub fn select(
        &self,
        cond: &PanelVector,
        a: &PanelVector,
        b: &PanelVector,
    ) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemWhere, &[cond, a, b], PlanParam::None)
    }

    pub fn fillna(&self, x: &PanelVector, value: f64) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemFillNa, &[x], PlanParam::scalar_from(value))
    }

    pub fn clip(&self, x: &PanelVector, lo: f64, hi: f64) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::ElemClip, &[x], PlanParam::scalar_pair_from(lo, hi))
    }

    pub fn delay(&self, x: &PanelVector, lag: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsDelay, &[x], PlanParam::Lag(lag))
    }

    pub fn delta(&self, x: &PanelVector, lag: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsDelta, &[x], PlanParam::Lag(lag))
    }

    pub fn sum(&self, x: &PanelVector, window: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsSum, &[x], PlanParam::Window(window))
    }

    pub fn mean(&self, x: &PanelVector, window: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsMean, &[x], PlanParam::Window(window))
    }

    pub fn stddev(&self, x: &PanelVector, window: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsStd, &[x], PlanParam::Window(window))
    }

    pub fn min(&self, x: &PanelVector, window: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsMin, &[x], PlanParam::Window(window))
    }

    pub fn max(&self, x: &PanelVector, window: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsMax, &[x], PlanParam::Window(window))
    }

    pub fn correlation(
        &self,
        x: &PanelVector,
        y: &PanelVector,
        window: usize,
    ) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsCorr, &[x, y], PlanParam::Window(window))
    }

    pub fn covariance(
        &self,
        x: &PanelVector,
        y: &PanelVector,
        window: usize,
    ) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::TsCov, &[x, y], PlanParam::Window(window))
    }

    pub fn rank(&self, x: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::CsRank, &[x], PlanParam::None)
    }

    pub fn scale(&self, x: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::CsScale, &[x], PlanParam::None)
    }

    pub fn demean(&self, x: &PanelVector) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::CsDemean, &[x], PlanParam::None)
    }

    pub fn zscore(&self, x: &PanelVector, window: usize) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::CsZscore, &[x], PlanParam::Window(window))
    }

    pub fn winsorize(&self, x: &PanelVector, k: f64) -> Result<PanelVector, FactorError> {
        self.apply(OpCode::CsWinsorize, &[x], PlanParam::scalar_from(k))
    }
}
