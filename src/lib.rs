pub mod compile;
pub mod engine;
pub mod error;
pub mod factor;
pub mod formula;
pub mod ops;
pub mod panel;
pub mod plan;

pub use compile::FactorCompiler;
pub use engine::{PanelCtx, PanelEngine};
pub use error::{ArgumentError, EvalError, FactorError, ParseError};
pub use factor::{
    evaluate_batch, DefMode, Factor, FactorDef, FactorMode, FactorRoutine, FieldSpec,
};
pub use panel::{FactorValueRow, InputBundle, PanelIndex, PanelVector, TradeDate};

#[cfg(test)]
mod tests;
