use crate::error::{FactorError, ParseError};
use crate::formula::{parse_program, BinaryOp, ExprAst, UnaryOp};
use crate::ops::{OpCode, OperatorRegistry, DIV_EPS};
use crate::panel::normalize_field_name;
use crate::plan::{CompileManifest, CompiledPlan, PlanNode, PlanParam};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Compiles formula text into immutable [`CompiledPlan`]s against an
/// explicit operator registry. The compiler holds no panel data; plans it
/// produces can be evaluated against any bundle.
#[derive(Debug, Clone)]
pub struct FactorCompiler {
    registry: Arc<OperatorRegistry>,
}

impl FactorCompiler {
    pub fn new(registry: Arc<OperatorRegistry>) -> Self {
        Self { registry }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    pub fn compile(&self, source: &str) -> Result<CompiledPlan, FactorError> {
        let (plan, _) = self.compile_with_manifest(source)?;
        Ok(plan)
    }

    pub fn compile_with_manifest(
        &self,
        source: &str,
    ) -> Result<(CompiledPlan, CompileManifest), FactorError> {
        let started_at = Instant::now();
        let program = parse_program(source)?;

        let bound_names: HashSet<String> = program
            .statements
            .iter()
            .filter_map(|s| s.target.clone())
            .collect();

        let mut ctx = LowerCtx {
            registry: &self.registry,
            nodes: Vec::new(),
            node_by_sig: HashMap::new(),
            required_fields: Vec::new(),
            env: HashMap::new(),
            bound_names,
            bindings: Vec::new(),
            stats: LowerStats::default(),
        };

        let mut output = 0;
        for statement in &program.statements {
            output = ctx.lower_expr(&statement.expr)?;
            if let Some(target) = &statement.target {
                ctx.bind(target.clone(), output);
            }
        }

        let manifest = CompileManifest {
            statement_count: program.statements.len(),
            node_count: ctx.nodes.len(),
            field_count: ctx.required_fields.len(),
            lowered_op_count: ctx.stats.lowered_op_count,
            cse_hit_count: ctx.stats.cse_hit_count,
            identity_fold_count: ctx.stats.identity_fold_count,
            compile_time_us: started_at.elapsed().as_micros() as u64,
        };
        log::debug!(target: "alpha_panel::compile", "{}", manifest.summary_line());

        let plan = CompiledPlan::new(ctx.nodes, output, ctx.required_fields, ctx.bindings);
        Ok((plan, manifest))
    }
}

impl Default for FactorCompiler {
    fn default() -> Self {
        Self::new(Arc::new(OperatorRegistry::standard()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeSig {
    Field(String),
    Const(u64),
    Call {
        op: OpCode,
        inputs: Vec<usize>,
        param: PlanParam,
    },
}

#[derive(Debug, Default)]
struct LowerStats {
    lowered_op_count: usize,
    cse_hit_count: usize,
    identity_fold_count: usize,
}

struct LowerCtx<'a> {
    registry: &'a OperatorRegistry,
    nodes: Vec<PlanNode>,
    node_by_sig: HashMap<NodeSig, usize>,
    required_fields: Vec<String>,
    /// Statement bindings visible so far, exact-name keyed.
    env: HashMap<String, usize>,
    /// Every name bound anywhere in the program, for forward-reference checks.
    bound_names: HashSet<String>,
    bindings: Vec<(String, usize)>,
    stats: LowerStats,
}

impl<'a> LowerCtx<'a> {
    fn lower_expr(&mut self, ast: &ExprAst) -> Result<usize, FactorError> {
        if let Some(value) = const_expr_value(ast) {
            return Ok(self.const_node(value));
        }
        match ast {
            ExprAst::Number(value) => Ok(self.const_node(*value)),
            ExprAst::Identifier(name) => self.resolve_identifier(name),
            ExprAst::Unary { op, expr } => match op {
                UnaryOp::Plus => self.lower_expr(expr),
                UnaryOp::Minus => {
                    let inner = self.lower_expr(expr)?;
                    let minus_one = self.const_node(-1.0);
                    Ok(self.call_node(OpCode::ElemMul, vec![minus_one, inner], PlanParam::None))
                }
            },
            ExprAst::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs)?;
                let rhs = self.lower_expr(rhs)?;
                Ok(self.call_node(opcode_for_binary(*op), vec![lhs, rhs], PlanParam::None))
            }
            ExprAst::Call { name, args } => self.lower_call(name, args),
        }
    }

    fn lower_call(&mut self, name: &str, args: &[ExprAst]) -> Result<usize, FactorError> {
        let Some(meta) = self.registry.resolve(name) else {
            return Err(ParseError::UnknownFunction {
                name: name.to_string(),
            }
            .into());
        };
        let parsed = meta.args.parse(meta.name, args)?;
        self.stats.lowered_op_count += 1;
        let mut inputs = Vec::with_capacity(parsed.series.len());
        for sub in parsed.series {
            inputs.push(self.lower_expr(sub)?);
        }
        Ok(self.call_node(meta.op, inputs, parsed.param))
    }

    /// Bindings shadow raw fields under their exact spelling. An identifier
    /// bound only by a later statement is a forward reference; anything else
    /// resolves as a raw field under its normalized name.
    fn resolve_identifier(&mut self, name: &str) -> Result<usize, FactorError> {
        if let Some(slot) = self.env.get(name) {
            return Ok(*slot);
        }
        if self.bound_names.contains(name) {
            return Err(ParseError::ForwardReference {
                name: name.to_string(),
            }
            .into());
        }
        Ok(self.field_node(name))
    }

    fn bind(&mut self, name: String, slot: usize) {
        self.env.insert(name.clone(), slot);
        if let Some(entry) = self.bindings.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = slot;
        } else {
            self.bindings.push((name, slot));
        }
    }

    fn field_node(&mut self, raw: &str) -> usize {
        let name = normalize_field_name(raw);
        let sig = NodeSig::Field(name.clone());
        if let Some(slot) = self.node_by_sig.get(&sig) {
            return *slot;
        }
        self.required_fields.push(name.clone());
        let slot = self.nodes.len();
        self.nodes.push(PlanNode::Field { name });
        self.node_by_sig.insert(sig, slot);
        slot
    }

    fn const_node(&mut self, value: f64) -> usize {
        let bits = value.to_bits();
        let sig = NodeSig::Const(bits);
        if let Some(slot) = self.node_by_sig.get(&sig) {
            return *slot;
        }
        let slot = self.nodes.len();
        self.nodes.push(PlanNode::Const { bits });
        self.node_by_sig.insert(sig, slot);
        slot
    }

    fn call_node(&mut self, op: OpCode, mut inputs: Vec<usize>, param: PlanParam) -> usize {
        if is_commutative(op) && inputs.len() == 2 && inputs[1] < inputs[0] {
            inputs.swap(0, 1);
        }
        if let Some(slot) = self.try_identity_passthrough(op, &inputs) {
            self.stats.identity_fold_count += 1;
            return slot;
        }
        let sig = NodeSig::Call {
            op,
            inputs: inputs.clone(),
            param,
        };
        if let Some(slot) = self.node_by_sig.get(&sig) {
            self.stats.cse_hit_count += 1;
            return *slot;
        }
        let slot = self.nodes.len();
        self.nodes.push(PlanNode::Call { op, inputs, param });
        self.node_by_sig.insert(sig, slot);
        slot
    }

    fn try_identity_passthrough(&self, op: OpCode, inputs: &[usize]) -> Option<usize> {
        if inputs.len() != 2 {
            return None;
        }
        let (lhs, rhs) = (inputs[0], inputs[1]);
        match op {
            OpCode::ElemAdd => self
                .passthrough_if_identity(lhs, rhs, 0.0)
                .or_else(|| self.passthrough_if_identity(rhs, lhs, 0.0)),
            OpCode::ElemMul => self
                .passthrough_if_identity(lhs, rhs, 1.0)
                .or_else(|| self.passthrough_if_identity(rhs, lhs, 1.0)),
            OpCode::ElemSub => self.passthrough_if_identity(lhs, rhs, 0.0),
            OpCode::ElemPow => self.passthrough_if_identity(lhs, rhs, 1.0),
            _ => None,
        }
    }

    fn passthrough_if_identity(
        &self,
        value_slot: usize,
        maybe_identity: usize,
        expected: f64,
    ) -> Option<usize> {
        let value = self.const_value(maybe_identity)?;
        (value == expected && self.produces_scrubbed_cells(value_slot)).then_some(value_slot)
    }

    /// An identity fold removes a kernel application, so it only applies
    /// when the surviving operand is already clean. Raw fields can carry
    /// infinities straight from the bundle that the kernel would have
    /// mapped to NaN.
    fn produces_scrubbed_cells(&self, slot: usize) -> bool {
        match &self.nodes[slot] {
            PlanNode::Call { .. } => true,
            PlanNode::Const { bits } => f64::from_bits(*bits).is_finite(),
            PlanNode::Field { .. } => false,
        }
    }

    fn const_value(&self, slot: usize) -> Option<f64> {
        match self.nodes.get(slot)? {
            PlanNode::Const { bits } => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }
}

#[inline]
const fn opcode_for_binary(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::ElemAdd,
        BinaryOp::Sub => OpCode::ElemSub,
        BinaryOp::Mul => OpCode::ElemMul,
        BinaryOp::Div => OpCode::ElemDiv,
        BinaryOp::Pow => OpCode::ElemPow,
        BinaryOp::Lt => OpCode::ElemLt,
        BinaryOp::Le => OpCode::ElemLe,
        BinaryOp::Gt => OpCode::ElemGt,
        BinaryOp::Ge => OpCode::ElemGe,
        BinaryOp::Eq => OpCode::ElemEq,
        BinaryOp::Ne => OpCode::ElemNe,
        BinaryOp::And => OpCode::ElemAnd,
        BinaryOp::Or => OpCode::ElemOr,
    }
}

#[inline]
const fn is_commutative(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::ElemAdd
            | OpCode::ElemMul
            | OpCode::ElemEq
            | OpCode::ElemNe
            | OpCode::ElemAnd
            | OpCode::ElemOr
    )
}

/// Fold literal-only subtrees at compile time. Arithmetic mirrors the
/// kernels exactly (division keeps the denominator epsilon) so a folded
/// constant is bit-identical to what evaluation would have produced.
fn const_expr_value(ast: &ExprAst) -> Option<f64> {
    match ast {
        ExprAst::Number(v) => v.is_finite().then_some(*v),
        ExprAst::Unary { op, expr } => {
            let v = const_expr_value(expr)?;
            let out = match op {
                UnaryOp::Plus => v,
                UnaryOp::Minus => -v,
            };
            out.is_finite().then_some(out)
        }
        ExprAst::Binary { op, lhs, rhs } => {
            let lhs = const_expr_value(lhs)?;
            let rhs = const_expr_value(rhs)?;
            let out = match op {
                BinaryOp::Add => lhs + rhs,
                BinaryOp::Sub => lhs - rhs,
                BinaryOp::Mul => lhs * rhs,
                BinaryOp::Div => lhs / (rhs + DIV_EPS),
                BinaryOp::Pow => lhs.powf(rhs),
                BinaryOp::Lt => bool_to_f64(lhs < rhs),
                BinaryOp::Le => bool_to_f64(lhs <= rhs),
                BinaryOp::Gt => bool_to_f64(lhs > rhs),
                BinaryOp::Ge => bool_to_f64(lhs >= rhs),
                BinaryOp::Eq => bool_to_f64(lhs == rhs),
                BinaryOp::Ne => bool_to_f64(lhs != rhs),
                BinaryOp::And => bool_to_f64(lhs != 0.0 && rhs != 0.0),
                BinaryOp::Or => bool_to_f64(lhs != 0.0 || rhs != 0.0),
            };
            out.is_finite().then_some(out)
        }
        ExprAst::Call { .. } | ExprAst::Identifier(_) => None,
    }
}

#[inline]
fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArgumentError;
    use crate::plan::PlanNode;

    fn compiler() -> FactorCompiler {
        FactorCompiler::default()
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = compiler().compile("FOOBAR(CLOSE)").expect_err("unknown op");
        assert_eq!(
            err,
            FactorError::Parse(ParseError::UnknownFunction {
                name: "FOOBAR".to_string()
            })
        );
    }

    #[test]
    fn forward_reference_is_rejected() {
        let err = compiler()
            .compile("a = b + 1\nb = CLOSE\na")
            .expect_err("forward ref");
        assert_eq!(
            err,
            FactorError::Parse(ParseError::ForwardReference {
                name: "b".to_string()
            })
        );
    }

    #[test]
    fn rebinding_keeps_the_newest_definition() {
        let plan = compiler()
            .compile("x = CLOSE\nx = x + 1\nx")
            .expect("rebinding compiles");
        assert_eq!(plan.bindings().len(), 1);
        let (_, slot) = plan.bindings()[0];
        assert_eq!(slot, plan.output);
        assert!(matches!(plan.nodes[plan.output], PlanNode::Call { .. }));
    }

    #[test]
    fn identical_subtrees_are_interned_once() {
        let (_, manifest) = compiler()
            .compile_with_manifest("RANK(CLOSE) + RANK(CLOSE)")
            .expect("compiles");
        assert_eq!(manifest.cse_hit_count, 1);
    }

    #[test]
    fn commutative_operands_share_a_node() {
        let (plan, manifest) = compiler()
            .compile_with_manifest("OPEN * CLOSE + CLOSE * OPEN")
            .expect("compiles");
        assert_eq!(manifest.cse_hit_count, 1);
        // fields, one shared MUL, one ADD
        assert_eq!(plan.node_count(), 4);
    }

    #[test]
    fn arithmetic_identities_fold_away() {
        let (plan, manifest) = compiler()
            .compile_with_manifest("MEAN(CLOSE, 3) * 1 + 0")
            .expect("compiles");
        assert_eq!(manifest.identity_fold_count, 2);
        assert!(matches!(
            plan.nodes[plan.output],
            PlanNode::Call {
                op: OpCode::TsMean,
                ..
            }
        ));
    }

    #[test]
    fn identities_over_raw_fields_still_run_the_kernel() {
        // The multiply scrubs infinities out of the raw column, so it must
        // not fold away.
        let (plan, manifest) = compiler()
            .compile_with_manifest("CLOSE * 1")
            .expect("compiles");
        assert_eq!(manifest.identity_fold_count, 0);
        assert!(matches!(
            plan.nodes[plan.output],
            PlanNode::Call {
                op: OpCode::ElemMul,
                ..
            }
        ));
    }

    #[test]
    fn literal_subtrees_fold_to_constants() {
        let (plan, _) = compiler()
            .compile_with_manifest("CLOSE + (2 * 3 - 5)")
            .expect("compiles");
        let folded = plan
            .nodes
            .iter()
            .any(|node| matches!(node, PlanNode::Const { bits } if f64::from_bits(*bits) == 1.0));
        assert!(folded, "2 * 3 - 5 should fold to the constant 1");
    }

    #[test]
    fn required_fields_keep_first_use_order() {
        let plan = compiler()
            .compile("OPEN + CLOSE / VOLUME")
            .expect("compiles");
        assert_eq!(plan.required_fields(), ["open", "close", "volume"]);
    }

    #[test]
    fn bound_names_do_not_become_fields() {
        let plan = compiler()
            .compile("x = MEAN(CLOSE, 3)\nRANK(x)")
            .expect("compiles");
        assert_eq!(plan.required_fields(), ["close"]);
    }

    #[test]
    fn arity_is_checked_at_compile_time() {
        let err = compiler().compile("MEAN(CLOSE)").expect_err("missing window");
        assert_eq!(
            err,
            FactorError::Argument(ArgumentError::Arity {
                name: "MEAN".to_string(),
                expected: 2,
                actual: 1,
            })
        );
    }

    #[test]
    fn window_literals_are_validated() {
        let err = compiler().compile("MEAN(CLOSE, 0)").expect_err("zero window");
        assert!(matches!(
            err,
            FactorError::Argument(ArgumentError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn operator_names_resolve_case_insensitively() {
        let plan = compiler().compile("rank(mean(CLOSE, 5))").expect("compiles");
        assert_eq!(plan.required_fields(), ["close"]);
    }

    #[test]
    fn unary_minus_lowers_to_negation() {
        let plan = compiler().compile("-CLOSE").expect("compiles");
        assert!(matches!(
            plan.nodes[plan.output],
            PlanNode::Call {
                op: OpCode::ElemMul,
                ..
            }
        ));
    }
}
