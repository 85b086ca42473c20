use std::ops::{Div, Mul};

/// Double-double scalar: an unevaluated sum hi + lo carrying roughly twice the
/// f64 precision. The Lagrange basis products over the monomial basis cancel
/// catastrophically in plain f64 at high degree, so polynomial arithmetic runs
/// on this type and rounds to f64 only at the API boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DoubleDouble {
    hi: f64,
    lo: f64,
}

impl DoubleDouble {
    pub(crate) const ZERO: DoubleDouble = DoubleDouble { hi: 0.0, lo: 0.0 };

    pub(crate) fn from_f64(x: f64) -> DoubleDouble {
        DoubleDouble { hi: x, lo: 0.0 }
    }

    /// Round back to f64
    pub(crate) fn value(self) -> f64 {
        self.hi + self.lo
    }

    // error-free sum of two f64 (Knuth)
    fn two_sum(a: f64, b: f64) -> (f64, f64) {
        let s = a + b;
        let bb = s - a;
        let err = (a - (s - bb)) + (b - bb);
        (s, err)
    }

    // error-free renormalization, valid when |a| dominates |b|
    fn quick_two_sum(a: f64, b: f64) -> DoubleDouble {
        let s = a + b;
        let err = b - (s - a);
        DoubleDouble { hi: s, lo: err }
    }

    // error-free product via fused multiply-add
    fn two_prod(a: f64, b: f64) -> (f64, f64) {
        let p = a * b;
        let err = a.mul_add(b, -p);
        (p, err)
    }

    pub(crate) fn add(self, rhs: DoubleDouble) -> DoubleDouble {
        let (s, e) = DoubleDouble::two_sum(self.hi, rhs.hi);
        DoubleDouble::quick_two_sum(s, e + self.lo + rhs.lo)
    }

    pub(crate) fn sub(self, rhs: DoubleDouble) -> DoubleDouble {
        self.add(rhs.neg())
    }

    pub(crate) fn neg(self) -> DoubleDouble {
        DoubleDouble {
            hi: -self.hi,
            lo: -self.lo,
        }
    }

    pub(crate) fn mul(self, rhs: DoubleDouble) -> DoubleDouble {
        let (p, e) = DoubleDouble::two_prod(self.hi, rhs.hi);
        DoubleDouble::quick_two_sum(p, e + self.hi * rhs.lo + self.lo * rhs.hi)
    }

    pub(crate) fn mul_f64(self, rhs: f64) -> DoubleDouble {
        let (p, e) = DoubleDouble::two_prod(self.hi, rhs);
        DoubleDouble::quick_two_sum(p, e + self.lo * rhs)
    }

    pub(crate) fn div(self, rhs: DoubleDouble) -> DoubleDouble {
        let q1 = self.hi / rhs.hi;
        let r = self.sub(rhs.mul_f64(q1));
        let q2 = r.value() / rhs.value();
        DoubleDouble::quick_two_sum(q1, q2)
    }

    pub(crate) fn div_f64(self, rhs: f64) -> DoubleDouble {
        self.div(DoubleDouble::from_f64(rhs))
    }
}

/// Polynomial in one variable stored as a coefficient list, lowest degree first:
/// coeffs[k] multiplies tau^k. Immutable once built; every operation returns a
/// new polynomial. Arithmetic is carried in double-double precision so the
/// coefficient sets derived from it hold their invariants at high degree.
#[derive(Debug, Clone)]
pub struct Polynomial {
    coeffs: Vec<DoubleDouble>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>) -> Polynomial {
        Polynomial::from_parts(coeffs.into_iter().map(DoubleDouble::from_f64).collect())
    }

    fn from_parts(coeffs: Vec<DoubleDouble>) -> Polynomial {
        let mut p = Polynomial { coeffs };
        p.normalize();
        p
    }

    pub fn constant(c: f64) -> Polynomial {
        Polynomial::new(vec![c])
    }

    /// Coefficients rounded to f64, lowest degree first
    pub fn coeffs(&self) -> Vec<f64> {
        self.coeffs.iter().map(|c| c.value()).collect()
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    // strip trailing zero coefficients, keep at least the constant term
    fn normalize(&mut self) {
        while self.coeffs.len() > 1 && self.coeffs.last().map(|c| c.value()) == Some(0.0) {
            self.coeffs.pop();
        }
        if self.coeffs.is_empty() {
            self.coeffs.push(DoubleDouble::ZERO);
        }
    }

    /// Horner evaluation at a scalar point
    pub fn evaluate(&self, tau: f64) -> f64 {
        let tau = DoubleDouble::from_f64(tau);
        self.coeffs
            .iter()
            .rev()
            .fold(DoubleDouble::ZERO, |acc, &c| acc.mul(tau).add(c))
            .value()
    }

    pub fn derivative(&self) -> Polynomial {
        if self.coeffs.len() <= 1 {
            return Polynomial::constant(0.0);
        }
        let coeffs = self
            .coeffs
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, &c)| c.mul_f64(k as f64))
            .collect();
        Polynomial::from_parts(coeffs)
    }

    /// Antiderivative with the integration constant fixed so that the value at 0 is 0
    pub fn antiderivative(&self) -> Polynomial {
        let mut coeffs = Vec::with_capacity(self.coeffs.len() + 1);
        coeffs.push(DoubleDouble::ZERO);
        for (k, &c) in self.coeffs.iter().enumerate() {
            coeffs.push(c.div_f64(k as f64 + 1.0));
        }
        Polynomial::from_parts(coeffs)
    }
}

impl PartialEq for Polynomial {
    // compared at the f64 resolution the API exposes
    fn eq(&self, other: &Polynomial) -> bool {
        self.coeffs.len() == other.coeffs.len()
            && self
                .coeffs
                .iter()
                .zip(other.coeffs.iter())
                .all(|(a, b)| a.value() == b.value())
    }
}

impl Mul for Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: Polynomial) -> Polynomial {
        let mut coeffs = vec![DoubleDouble::ZERO; self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            for (j, &b) in rhs.coeffs.iter().enumerate() {
                coeffs[i + j] = coeffs[i + j].add(a.mul(b));
            }
        }
        Polynomial::from_parts(coeffs)
    }
}

impl Mul<f64> for Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: f64) -> Polynomial {
        Polynomial::from_parts(self.coeffs.into_iter().map(|c| c.mul_f64(rhs)).collect())
    }
}

impl Div<f64> for Polynomial {
    type Output = Polynomial;
    fn div(self, rhs: f64) -> Polynomial {
        Polynomial::from_parts(self.coeffs.into_iter().map(|c| c.div_f64(rhs)).collect())
    }
}
