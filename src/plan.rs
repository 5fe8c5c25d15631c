use crate::ops::OpCode;

pub const MAX_NODE_INPUTS: usize = 3;

/// Structured operator parameter resolved at compile time.
///
/// Float parameters are stored as IEEE bits so the whole param stays `Eq`
/// and `Hash` for subexpression de-dup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanParam {
    None,
    Window(usize),
    Lag(usize),
    WindowScalar { window: usize, bits: u64 },
    Scalar { bits: u64 },
    ScalarPair { lo_bits: u64, hi_bits: u64 },
}

impl PlanParam {
    #[inline]
    pub fn scalar_from(value: f64) -> Self {
        Self::Scalar {
            bits: value.to_bits(),
        }
    }

    #[inline]
    pub fn window_scalar_from(window: usize, value: f64) -> Self {
        Self::WindowScalar {
            window,
            bits: value.to_bits(),
        }
    }

    #[inline]
    pub fn scalar_pair_from(lo: f64, hi: f64) -> Self {
        Self::ScalarPair {
            lo_bits: lo.to_bits(),
            hi_bits: hi.to_bits(),
        }
    }

    #[inline]
    pub const fn window(self) -> Option<usize> {
        match self {
            Self::Window(window) | Self::WindowScalar { window, .. } => Some(window),
            _ => None,
        }
    }

    #[inline]
    pub const fn lag(self) -> Option<usize> {
        match self {
            Self::Lag(lag) => Some(lag),
            _ => None,
        }
    }

    #[inline]
    pub fn scalar(self) -> Option<f64> {
        match self {
            Self::Scalar { bits } => Some(f64::from_bits(bits)),
            _ => None,
        }
    }

    #[inline]
    pub fn window_scalar(self) -> Option<(usize, f64)> {
        match self {
            Self::WindowScalar { window, bits } => Some((window, f64::from_bits(bits))),
            _ => None,
        }
    }

    #[inline]
    pub fn scalar_pair(self) -> Option<(f64, f64)> {
        match self {
            Self::ScalarPair { lo_bits, hi_bits } => {
                Some((f64::from_bits(lo_bits), f64::from_bits(hi_bits)))
            }
            _ => None,
        }
    }
}

/// One step of a compiled factor. Inputs refer to earlier nodes only, so
/// evaluating nodes in index order satisfies every dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Raw input column, loaded from the bundle under its normalized name.
    Field { name: String },
    /// Broadcast constant.
    Const { bits: u64 },
    /// Operator application over previously planned nodes.
    Call {
        op: OpCode,
        inputs: Vec<usize>,
        param: PlanParam,
    },
}

/// Immutable execution plan for one factor formula.
///
/// A plan never holds data: it is compiled once and re-evaluated against
/// any number of input bundles over the same or different universes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    pub(crate) nodes: Vec<PlanNode>,
    pub(crate) output: usize,
    required_fields: Vec<String>,
    bindings: Vec<(String, usize)>,
}

impl CompiledPlan {
    pub(crate) fn new(
        nodes: Vec<PlanNode>,
        output: usize,
        required_fields: Vec<String>,
        bindings: Vec<(String, usize)>,
    ) -> Self {
        debug_assert!(output < nodes.len());
        Self {
            nodes,
            output,
            required_fields,
            bindings,
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Raw field names this plan reads, in first-use order.
    #[inline]
    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Statement bindings in source order, each pointing at its plan node.
    /// Rebinding a name keeps only the newest entry.
    #[inline]
    pub fn bindings(&self) -> &[(String, usize)] {
        &self.bindings
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileManifest {
    pub statement_count: usize,
    pub node_count: usize,
    pub field_count: usize,
    /// Number of successful operator-lowering attempts.
    pub lowered_op_count: usize,
    /// Common-subexpression hits from node signature lookup.
    pub cse_hit_count: usize,
    /// Algebraic identity folds reusing an existing node (e.g. `x + 0`).
    pub identity_fold_count: usize,
    /// End-to-end compile latency in microseconds.
    pub compile_time_us: u64,
}

impl CompileManifest {
    #[inline]
    pub fn summary_line(&self) -> String {
        format!(
            "statements={} nodes={} fields={} lowered={} cse_hits={} identity_folds={} compile_us={}",
            self.statement_count,
            self.node_count,
            self.field_count,
            self.lowered_op_count,
            self.cse_hit_count,
            self.identity_fold_count,
            self.compile_time_us
        )
    }
}
