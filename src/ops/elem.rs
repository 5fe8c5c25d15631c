use crate::ops::DIV_EPS;
use crate::plan::PlanParam;

#[inline]
fn finite_or_nan(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}

#[inline]
fn bool_value(v: bool) -> f64 {
    if v {
        1.0
    } else {
        0.0
    }
}

pub fn elem_abs(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(x[slot].abs());
    }
}

pub fn elem_sign(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = x[slot];
        *cell = if !v.is_finite() {
            f64::NAN
        } else if v == 0.0 {
            0.0
        } else {
            v.signum()
        };
    }
}

pub fn elem_log(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(x[slot].ln());
    }
}

pub fn elem_exp(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(x[slot].exp());
    }
}

pub fn elem_sqrt(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(x[slot].sqrt());
    }
}

pub fn elem_add(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(lhs[slot] + rhs[slot]);
    }
}

pub fn elem_sub(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(lhs[slot] - rhs[slot]);
    }
}

pub fn elem_mul(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(lhs[slot] * rhs[slot]);
    }
}

/// Division guards every denominator with `DIV_EPS` instead of raising on
/// zero; a zero denominator yields a large finite value, not an error.
pub fn elem_div(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(lhs[slot] / (rhs[slot] + DIV_EPS));
    }
}

pub fn elem_pow(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        *cell = finite_or_nan(lhs[slot].powf(rhs[slot]));
    }
}

pub fn elem_signed_power(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (x, y) = (lhs[slot], rhs[slot]);
        if !x.is_finite() || !y.is_finite() {
            *cell = f64::NAN;
            continue;
        }
        *cell = finite_or_nan(x.signum() * x.abs().powf(y));
    }
}

/// Vectorized select: `a` where `cond != 0`, `b` where `cond == 0`, NaN where
/// `cond` is undefined.
pub fn elem_where(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (cond, then_v, else_v) = (inputs[0], inputs[1], inputs[2]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let c = cond[slot];
        if !c.is_finite() {
            *cell = f64::NAN;
            continue;
        }
        let picked = if c != 0.0 { then_v[slot] } else { else_v[slot] };
        *cell = finite_or_nan(picked);
    }
}

pub fn elem_fillna(inputs: &[&[f64]], p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    let Some(fill) = p.scalar() else {
        out.fill(f64::NAN);
        return;
    };
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = x[slot];
        *cell = if v.is_finite() { v } else { fill };
    }
}

pub fn elem_clip(inputs: &[&[f64]], p: PlanParam, out: &mut [f64]) {
    let x = inputs[0];
    let Some((lower, upper)) = p.scalar_pair() else {
        out.fill(f64::NAN);
        return;
    };
    for (slot, cell) in out.iter_mut().enumerate() {
        let v = x[slot];
        if !v.is_finite() {
            *cell = f64::NAN;
            continue;
        }
        *cell = v.max(lower).min(upper);
    }
}

pub fn elem_lt(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a < b)
        };
    }
}

pub fn elem_le(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a <= b)
        };
    }
}

pub fn elem_gt(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a > b)
        };
    }
}

pub fn elem_ge(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a >= b)
        };
    }
}

pub fn elem_eq(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a == b)
        };
    }
}

pub fn elem_ne(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a != b)
        };
    }
}

pub fn elem_and(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a != 0.0 && b != 0.0)
        };
    }
}

pub fn elem_or(inputs: &[&[f64]], _p: PlanParam, out: &mut [f64]) {
    let (lhs, rhs) = (inputs[0], inputs[1]);
    for (slot, cell) in out.iter_mut().enumerate() {
        let (a, b) = (lhs[slot], rhs[slot]);
        *cell = if !a.is_finite() || !b.is_finite() {
            f64::NAN
        } else {
            bool_value(a != 0.0 || b != 0.0)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run2(kernel: super::super::ElemKernel, lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; lhs.len()];
        kernel(&[lhs, rhs], PlanParam::None, &mut out);
        out
    }

    #[test]
    fn div_guards_zero_denominator() {
        let out = run2(elem_div, &[1.0, -2.0, f64::NAN], &[0.0, 4.0, 1.0]);
        assert!(out[0].is_finite());
        assert!(out[0] > 1e11);
        assert!((out[1] + 0.5).abs() < 1e-9);
        assert!(out[2].is_nan());
    }

    #[test]
    fn log_propagates_nan_on_invalid_domain() {
        let mut out = vec![0.0; 3];
        elem_log(&[&[-1.0, 0.0, core::f64::consts::E]], PlanParam::None, &mut out);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn where_select_gates_on_condition() {
        let mut out = vec![0.0; 3];
        elem_where(
            &[&[1.0, 0.0, f64::NAN], &[10.0, 10.0, 10.0], &[20.0, 20.0, 20.0]],
            PlanParam::None,
            &mut out,
        );
        assert_eq!(out[0], 10.0);
        assert_eq!(out[1], 20.0);
        assert!(out[2].is_nan());
    }

    #[test]
    fn comparisons_are_nan_poisoned() {
        let out = run2(elem_lt, &[1.0, f64::NAN], &[2.0, 2.0]);
        assert_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
    }

    #[test]
    fn fillna_replaces_undefined_cells_only() {
        let mut out = vec![0.0; 3];
        elem_fillna(
            &[&[f64::NAN, 2.0, f64::INFINITY]],
            PlanParam::scalar_from(0.0),
            &mut out,
        );
        assert_eq!(out, vec![0.0, 2.0, 0.0]);
    }

    #[test]
    fn signed_power_keeps_sign_on_even_exponents() {
        let out = run2(elem_signed_power, &[-2.0, 3.0], &[2.0, 2.0]);
        assert_eq!(out[0], -4.0);
        assert_eq!(out[1], 9.0);
    }
}
