/// First and second order running sums over one trailing window.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Moments {
    n: f64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    /// Accumulates the slice left to right. `None` for an empty window or
    /// one holding any non-finite observation.
    pub(super) fn over(window: &[f64]) -> Option<Self> {
        let mut acc = Self::default();
        for &value in window {
            if !value.is_finite() {
                return None;
            }
            acc.n += 1.0;
            acc.sum += value;
            acc.sum_sq += value * value;
        }
        (acc.n > 0.0).then_some(acc)
    }

    #[inline]
    pub(super) fn sum(self) -> f64 {
        self.sum
    }

    #[inline]
    pub(super) fn mean(self) -> f64 {
        self.sum / self.n
    }

    #[inline]
    pub(super) fn var(self) -> f64 {
        if self.n <= 1.0 {
            return f64::NAN;
        }
        let m2 = self.sum_sq - (self.sum * self.sum) / self.n;
        (m2 / (self.n - 1.0)).max(0.0)
    }

    #[inline]
    pub(super) fn std(self) -> f64 {
        self.var().sqrt()
    }
}

/// Cross sums over a pair of aligned windows.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct PairMoments {
    n: f64,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_yy: f64,
    sum_xy: f64,
}

impl PairMoments {
    /// Accumulates both slices in lockstep. `None` on a length mismatch,
    /// an empty window, or any non-finite observation on either side.
    pub(super) fn over(xs: &[f64], ys: &[f64]) -> Option<Self> {
        if xs.len() != ys.len() {
            return None;
        }
        let mut acc = Self::default();
        for (&x, &y) in xs.iter().zip(ys) {
            if !x.is_finite() || !y.is_finite() {
                return None;
            }
            acc.n += 1.0;
            acc.sum_x += x;
            acc.sum_y += y;
            acc.sum_xx += x * x;
            acc.sum_yy += y * y;
            acc.sum_xy += x * y;
        }
        (acc.n > 0.0).then_some(acc)
    }

    /// Pearson correlation. `NaN` when either variance numerator sits at
    /// or below `eps`, where the ratio stops meaning anything.
    pub(super) fn correlation(self, eps: f64) -> f64 {
        let var_x = self.var_x_num();
        let var_y = self.var_y_num();
        if var_x <= eps || var_y <= eps {
            return f64::NAN;
        }
        self.cov_num() / (var_x.sqrt() * var_y.sqrt())
    }

    /// Sample covariance with the `n - 1` divisor.
    pub(super) fn sample_cov(self) -> f64 {
        if self.n <= 1.0 {
            return f64::NAN;
        }
        self.cov_num() / (self.n - 1.0)
    }

    /// OLS slope of the x window regressed on the y window. `NaN` when
    /// the regressor variance numerator sits at or below `eps`.
    pub(super) fn slope(self, eps: f64) -> f64 {
        let var_y = self.var_y_num();
        if var_y <= eps {
            return f64::NAN;
        }
        self.cov_num() / var_y
    }

    fn cov_num(self) -> f64 {
        self.sum_xy - (self.sum_x * self.sum_y) / self.n
    }

    fn var_x_num(self) -> f64 {
        self.sum_xx - (self.sum_x * self.sum_x) / self.n
    }

    fn var_y_num(self) -> f64 {
        self.sum_yy - (self.sum_y * self.sum_y) / self.n
    }
}
