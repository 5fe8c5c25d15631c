use thiserror::Error;

/// Formula-text rejection. Always raised at compile time, never during
/// evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty formula")]
    EmptyFormula,
    #[error("invalid expression `{expr}`: {reason}")]
    Syntax { expr: String, reason: String },
    #[error("unknown function `{name}`; not in the operator library")]
    UnknownFunction { name: String },
    #[error("`{name}` is bound by a later statement; forward references are not allowed")]
    ForwardReference { name: String },
}

/// Operator called with the wrong argument shape. Raised at compile time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("operator `{name}` requires {expected} args, got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("operator `{name}` argument {position} must be a numeric literal")]
    LiteralExpected { name: String, position: usize },
    #[error("operator `{name}` window must be a positive integer, got {value}")]
    InvalidWindow { name: String, value: f64 },
    #[error("operator `{name}` parameter `{param}` {reason}")]
    ScalarOutOfRange {
        name: String,
        param: &'static str,
        reason: String,
    },
}

/// Evaluation-time failure: the compiled plan met a bundle it cannot run
/// against, or panel inputs violated the universe contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("input bundle is missing required field `{field}`")]
    MissingField { field: String },
    #[error("input bundle has an empty symbol or date universe")]
    EmptyUniverse,
    #[error("field `{field}` is keyed on a different universe than the bundle")]
    UniverseMismatch { field: String },
    #[error("invalid trade date `{text}`: {reason}")]
    InvalidDate { text: String, reason: String },
    #[error("invalid panel index: {reason}")]
    InvalidIndex { reason: String },
}

/// Caller-facing union returned by the factor contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactorError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
