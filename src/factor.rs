use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::compile::FactorCompiler;
use crate::engine::{PanelCtx, PanelEngine};
use crate::error::{EvalError, FactorError, ParseError};
use crate::ops::OperatorRegistry;
use crate::panel::{normalize_field_name, InputBundle, PanelVector};
use crate::plan::CompiledPlan;

/// Raw-field requirement a factor declares up front.
///
/// A required field must be present in every bundle the factor evaluates
/// against. An optional field absent from a bundle materializes as a constant
/// panel of its neutral value instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub neutral: f64,
}

impl FieldSpec {
    pub fn required(name: &str) -> Self {
        Self {
            name: normalize_field_name(name),
            optional: false,
            neutral: 0.0,
        }
    }

    pub fn optional(name: &str, neutral: f64) -> Self {
        Self {
            name: normalize_field_name(name),
            optional: true,
            neutral,
        }
    }
}

/// Declared evaluation mode of a factor definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefMode {
    Formula,
    Routine,
}

/// Serializable factor definition, the shape the invocation boundary stores
/// and ships. `body` holds formula text for formula mode; routine-mode
/// factors are bound in code and their defs carry only the routine's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDef {
    pub name: String,
    pub mode: DefMode,
    pub body: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl FactorDef {
    pub fn formula(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: DefMode::Formula,
            body: body.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields = fields;
        self
    }
}

/// A callable factor body. Implementations read fields through the context
/// and combine them with the registered operator kernels, so a routine obeys
/// the same numeric conventions as compiled formula text.
pub trait FactorRoutine: Send + Sync {
    fn evaluate(&self, ctx: &PanelCtx<'_>) -> Result<PanelVector, FactorError>;
}

impl<F> FactorRoutine for F
where
    F: Fn(&PanelCtx<'_>) -> Result<PanelVector, FactorError> + Send + Sync,
{
    fn evaluate(&self, ctx: &PanelCtx<'_>) -> Result<PanelVector, FactorError> {
        self(ctx)
    }
}

/// How a factor computes: a compiled plan re-evaluated per bundle, or a
/// callable routine. Callers never branch on this; both sit behind
/// [`Factor::calculate`].
pub enum FactorMode {
    Formula(CompiledPlan),
    Routine(Box<dyn FactorRoutine>),
}

impl fmt::Debug for FactorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Formula(plan) => f.debug_tuple("Formula").field(plan).finish(),
            Self::Routine(_) => f.write_str("Routine(..)"),
        }
    }
}

/// A named, ready-to-evaluate factor.
///
/// Construction resolves everything that can fail early: formula text is
/// compiled (parse and argument errors surface here, never at evaluation),
/// and declared fields are split into required names and optional neutrals.
/// Evaluation is pure; the same bundle always yields the same bytes.
#[derive(Debug)]
pub struct Factor {
    name: String,
    mode: FactorMode,
    required: Vec<String>,
    defaults: HashMap<String, f64>,
    engine: PanelEngine,
}

impl Factor {
    /// Compile a definition against the compiler's registry.
    pub fn from_def(compiler: &FactorCompiler, def: &FactorDef) -> Result<Self, FactorError> {
        let mode = match def.mode {
            DefMode::Formula => FactorMode::Formula(compiler.compile(&def.body)?),
            DefMode::Routine => {
                return Err(ParseError::Syntax {
                    expr: def.body.clone(),
                    reason: "routine bodies are bound in code, not compiled from text"
                        .to_string(),
                }
                .into())
            }
        };
        Ok(Self::assemble(
            &def.name,
            mode,
            &def.fields,
            compiler.registry().clone(),
        ))
    }

    /// Compile formula text against the standard registry. Fields the formula
    /// reads are all treated as required.
    pub fn from_formula(name: &str, source: &str) -> Result<Self, FactorError> {
        let compiler = FactorCompiler::default();
        let plan = compiler.compile(source)?;
        Ok(Self::assemble(
            name,
            FactorMode::Formula(plan),
            &[],
            compiler.registry().clone(),
        ))
    }

    /// Wrap a callable routine with its field declarations, against the
    /// standard registry.
    pub fn from_routine(
        name: &str,
        fields: Vec<FieldSpec>,
        routine: impl FactorRoutine + 'static,
    ) -> Self {
        Self::assemble(
            name,
            FactorMode::Routine(Box::new(routine)),
            &fields,
            Arc::new(OperatorRegistry::standard()),
        )
    }

    fn assemble(
        name: &str,
        mode: FactorMode,
        fields: &[FieldSpec],
        registry: Arc<OperatorRegistry>,
    ) -> Self {
        let mut required = Vec::new();
        let mut defaults = HashMap::new();
        for field in fields {
            let name = normalize_field_name(&field.name);
            if field.optional {
                defaults.insert(name, field.neutral);
            } else {
                required.push(name);
            }
        }
        Self {
            name: name.to_string(),
            mode,
            required,
            defaults,
            engine: PanelEngine::new(registry),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against a bundle. Identical bundles produce identical output
    /// bytes regardless of mode.
    pub fn calculate(&self, bundle: &InputBundle) -> Result<PanelVector, FactorError> {
        match &self.mode {
            FactorMode::Formula(plan) => {
                self.engine.evaluate_with_defaults(plan, bundle, &self.defaults)
            }
            FactorMode::Routine(routine) => {
                if bundle.index().is_empty() {
                    return Err(EvalError::EmptyUniverse.into());
                }
                for field in &self.required {
                    if !bundle.contains(field) {
                        return Err(EvalError::MissingField {
                            field: field.clone(),
                        }
                        .into());
                    }
                }
                let ctx = PanelCtx::new(self.engine.registry(), bundle, &self.defaults);
                let result = routine.evaluate(&ctx)?;
                if !Arc::ptr_eq(result.index(), bundle.index())
                    && *result.index() != *bundle.index()
                {
                    return Err(EvalError::UniverseMismatch {
                        field: self.name.clone(),
                    }
                    .into());
                }
                let non_finite = result.non_finite_count();
                if non_finite > 0 {
                    log::debug!(
                        target: "alpha_panel::engine",
                        "factor `{}` produced {non_finite} non-finite cells",
                        self.name
                    );
                }
                Ok(result)
            }
        }
    }
}

/// Evaluate independent factors over one bundle in parallel, one `Result`
/// per factor in input order. A failed factor carries its error in its own
/// slot and never disturbs siblings.
pub fn evaluate_batch(
    factors: &[Factor],
    bundle: &InputBundle,
) -> Vec<Result<PanelVector, FactorError>> {
    factors
        .par_iter()
        .map(|factor| factor.calculate(bundle))
        .collect()
}
