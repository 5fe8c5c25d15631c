use crate::error::ArgumentError;
use crate::formula::{ExprAst, UnaryOp};
use crate::plan::PlanParam;

/// Lowered call arguments: the sub-expressions that become plan inputs, plus
/// the structured parameter extracted from literal arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArgs<'a> {
    pub series: Vec<&'a ExprAst>,
    pub param: PlanParam,
}

/// Compile-time argument shape of an operator. Literal positions must hold
/// numeric literals (an optional sign is allowed); everything else is lowered
/// as a panel expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgSpec {
    SeriesOnly,
    TwoSeries,
    ThreeSeries,
    SeriesLag,
    SeriesWindow,
    TwoSeriesWindow,
    SeriesWindowQuantile,
    SeriesWindowWeight,
    SeriesConstant,
    SeriesClamp,
    SeriesStdBound,
    SeriesTailQuantile,
}

impl ArgSpec {
    #[inline]
    pub const fn arity(self) -> usize {
        match self {
            Self::SeriesOnly => 1,
            Self::TwoSeries => 2,
            Self::ThreeSeries => 3,
            Self::SeriesLag => 2,
            Self::SeriesWindow => 2,
            Self::TwoSeriesWindow => 3,
            Self::SeriesWindowQuantile => 3,
            Self::SeriesWindowWeight => 3,
            Self::SeriesConstant => 2,
            Self::SeriesClamp => 3,
            Self::SeriesStdBound => 2,
            Self::SeriesTailQuantile => 2,
        }
    }

    /// How many arguments are panel expressions rather than literals.
    #[inline]
    pub const fn series_count(self) -> usize {
        match self {
            Self::SeriesOnly
            | Self::SeriesLag
            | Self::SeriesWindow
            | Self::SeriesWindowQuantile
            | Self::SeriesWindowWeight
            | Self::SeriesConstant
            | Self::SeriesClamp
            | Self::SeriesStdBound
            | Self::SeriesTailQuantile => 1,
            Self::TwoSeries | Self::TwoSeriesWindow => 2,
            Self::ThreeSeries => 3,
        }
    }

    pub fn parse<'a>(
        self,
        name: &str,
        args: &'a [ExprAst],
    ) -> Result<ParsedArgs<'a>, ArgumentError> {
        let expected = self.arity();
        if args.len() != expected {
            return Err(ArgumentError::Arity {
                name: name.to_string(),
                expected,
                actual: args.len(),
            });
        }
        match self {
            Self::SeriesOnly => Ok(ParsedArgs {
                series: vec![&args[0]],
                param: PlanParam::None,
            }),
            Self::TwoSeries => Ok(ParsedArgs {
                series: vec![&args[0], &args[1]],
                param: PlanParam::None,
            }),
            Self::ThreeSeries => Ok(ParsedArgs {
                series: vec![&args[0], &args[1], &args[2]],
                param: PlanParam::None,
            }),
            Self::SeriesLag => {
                let lag = window_at(name, args, 1)?;
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::Lag(lag),
                })
            }
            Self::SeriesWindow => {
                let window = window_at(name, args, 1)?;
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::Window(window),
                })
            }
            Self::TwoSeriesWindow => {
                let window = window_at(name, args, 2)?;
                Ok(ParsedArgs {
                    series: vec![&args[0], &args[1]],
                    param: PlanParam::Window(window),
                })
            }
            Self::SeriesWindowQuantile => {
                let window = window_at(name, args, 1)?;
                let q = literal_at(name, args, 2)?;
                if !q.is_finite() || !(0.0..=1.0).contains(&q) {
                    return Err(ArgumentError::ScalarOutOfRange {
                        name: name.to_string(),
                        param: "q",
                        reason: format!("must be in [0, 1], got {q}"),
                    });
                }
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::window_scalar_from(window, q),
                })
            }
            Self::SeriesWindowWeight => {
                let window = window_at(name, args, 1)?;
                let weight = literal_at(name, args, 2)?;
                let ok = weight.is_finite()
                    && weight.fract() == 0.0
                    && weight >= 1.0
                    && (weight as usize) < window;
                if !ok {
                    return Err(ArgumentError::ScalarOutOfRange {
                        name: name.to_string(),
                        param: "m",
                        reason: format!("must be an integer in [1, {window}), got {weight}"),
                    });
                }
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::window_scalar_from(window, weight),
                })
            }
            Self::SeriesConstant => {
                let value = literal_at(name, args, 1)?;
                if !value.is_finite() {
                    return Err(ArgumentError::ScalarOutOfRange {
                        name: name.to_string(),
                        param: "value",
                        reason: "must be finite".to_string(),
                    });
                }
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::scalar_from(value),
                })
            }
            Self::SeriesClamp => {
                let lo = literal_at(name, args, 1)?;
                let hi = literal_at(name, args, 2)?;
                if !lo.is_finite() || !hi.is_finite() || lo > hi {
                    return Err(ArgumentError::ScalarOutOfRange {
                        name: name.to_string(),
                        param: "bounds",
                        reason: format!("must be finite with lo <= hi, got [{lo}, {hi}]"),
                    });
                }
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::scalar_pair_from(lo, hi),
                })
            }
            Self::SeriesStdBound => {
                let k = literal_at(name, args, 1)?;
                if !k.is_finite() || k <= 0.0 {
                    return Err(ArgumentError::ScalarOutOfRange {
                        name: name.to_string(),
                        param: "k",
                        reason: format!("must be > 0, got {k}"),
                    });
                }
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::scalar_from(k),
                })
            }
            Self::SeriesTailQuantile => {
                let q = literal_at(name, args, 1)?;
                if !q.is_finite() || q <= 0.0 || q >= 0.5 {
                    return Err(ArgumentError::ScalarOutOfRange {
                        name: name.to_string(),
                        param: "q",
                        reason: format!("must be in (0, 0.5), got {q}"),
                    });
                }
                Ok(ParsedArgs {
                    series: vec![&args[0]],
                    param: PlanParam::scalar_from(q),
                })
            }
        }
    }
}

impl ArgSpec {
    /// Check a directly supplied parameter against this spec, for callers
    /// that bypass formula text and build parameters themselves.
    pub fn validate_param(self, name: &str, param: PlanParam) -> Result<(), ArgumentError> {
        match self {
            Self::SeriesOnly | Self::TwoSeries | Self::ThreeSeries => match param {
                PlanParam::None => Ok(()),
                _ => Err(param_shape_error(name)),
            },
            Self::SeriesLag => match param {
                PlanParam::Lag(lag) if lag >= 1 => Ok(()),
                PlanParam::Lag(lag) => Err(ArgumentError::InvalidWindow {
                    name: name.to_string(),
                    value: lag as f64,
                }),
                _ => Err(param_shape_error(name)),
            },
            Self::SeriesWindow | Self::TwoSeriesWindow => match param {
                PlanParam::Window(window) if window >= 1 => Ok(()),
                PlanParam::Window(window) => Err(ArgumentError::InvalidWindow {
                    name: name.to_string(),
                    value: window as f64,
                }),
                _ => Err(param_shape_error(name)),
            },
            Self::SeriesWindowQuantile => match param.window_scalar() {
                Some((window, _)) if window == 0 => Err(ArgumentError::InvalidWindow {
                    name: name.to_string(),
                    value: 0.0,
                }),
                Some((_, q)) if q.is_finite() && (0.0..=1.0).contains(&q) => Ok(()),
                Some((_, q)) => Err(ArgumentError::ScalarOutOfRange {
                    name: name.to_string(),
                    param: "q",
                    reason: format!("must be in [0, 1], got {q}"),
                }),
                None => Err(param_shape_error(name)),
            },
            Self::SeriesWindowWeight => match param.window_scalar() {
                Some((window, m))
                    if window >= 1
                        && m.is_finite()
                        && m.fract() == 0.0
                        && m >= 1.0
                        && (m as usize) < window =>
                {
                    Ok(())
                }
                Some((window, m)) => Err(ArgumentError::ScalarOutOfRange {
                    name: name.to_string(),
                    param: "m",
                    reason: format!("must be an integer in [1, {window}), got {m}"),
                }),
                None => Err(param_shape_error(name)),
            },
            Self::SeriesConstant => match param.scalar() {
                Some(value) if value.is_finite() => Ok(()),
                Some(_) => Err(ArgumentError::ScalarOutOfRange {
                    name: name.to_string(),
                    param: "value",
                    reason: "must be finite".to_string(),
                }),
                None => Err(param_shape_error(name)),
            },
            Self::SeriesClamp => match param.scalar_pair() {
                Some((lo, hi)) if lo.is_finite() && hi.is_finite() && lo <= hi => Ok(()),
                Some((lo, hi)) => Err(ArgumentError::ScalarOutOfRange {
                    name: name.to_string(),
                    param: "bounds",
                    reason: format!("must be finite with lo <= hi, got [{lo}, {hi}]"),
                }),
                None => Err(param_shape_error(name)),
            },
            Self::SeriesStdBound => match param.scalar() {
                Some(k) if k.is_finite() && k > 0.0 => Ok(()),
                Some(k) => Err(ArgumentError::ScalarOutOfRange {
                    name: name.to_string(),
                    param: "k",
                    reason: format!("must be > 0, got {k}"),
                }),
                None => Err(param_shape_error(name)),
            },
            Self::SeriesTailQuantile => match param.scalar() {
                Some(q) if q.is_finite() && q > 0.0 && q < 0.5 => Ok(()),
                Some(q) => Err(ArgumentError::ScalarOutOfRange {
                    name: name.to_string(),
                    param: "q",
                    reason: format!("must be in (0, 0.5), got {q}"),
                }),
                None => Err(param_shape_error(name)),
            },
        }
    }
}

fn param_shape_error(name: &str) -> ArgumentError {
    ArgumentError::ScalarOutOfRange {
        name: name.to_string(),
        param: "param",
        reason: "does not match the operator's parameter shape".to_string(),
    }
}

/// A numeric literal, optionally signed. Anything else is a panel expression
/// and cannot feed a structured parameter.
fn literal_value(expr: &ExprAst) -> Option<f64> {
    match expr {
        ExprAst::Number(value) => Some(*value),
        ExprAst::Unary { op, expr } => {
            let inner = literal_value(expr)?;
            match op {
                UnaryOp::Plus => Some(inner),
                UnaryOp::Minus => Some(-inner),
            }
        }
        _ => None,
    }
}

fn literal_at(name: &str, args: &[ExprAst], idx: usize) -> Result<f64, ArgumentError> {
    literal_value(&args[idx]).ok_or_else(|| ArgumentError::LiteralExpected {
        name: name.to_string(),
        position: idx + 1,
    })
}

fn window_at(name: &str, args: &[ExprAst], idx: usize) -> Result<usize, ArgumentError> {
    let value = literal_at(name, args, idx)?;
    let ok = value.is_finite()
        && value.fract() == 0.0
        && value >= 1.0
        && value <= u32::MAX as f64;
    if !ok {
        return Err(ArgumentError::InvalidWindow {
            name: name.to_string(),
            value,
        });
    }
    Ok(value as usize)
}
