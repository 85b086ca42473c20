use crate::numerical::Collocation::Collocation_main::CollocationError;
use crate::numerical::Collocation::Collocation_poly::{DoubleDouble, Polynomial};
use gauss_quad::GaussLegendre;
use itertools::Itertools;
use log::info;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::str::FromStr;

/// Collocation scheme: Gauss-Radau IIA points (right endpoint included, L-stable,
/// suited to stiff systems) or Gauss-Legendre points (no forced endpoint, higher
/// per-stage accuracy order).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollocationScheme {
    Radau,
    Legendre,
}

impl CollocationScheme {
    pub fn name(&self) -> &'static str {
        match self {
            CollocationScheme::Radau => "radau",
            CollocationScheme::Legendre => "legendre",
        }
    }
}

impl fmt::Display for CollocationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CollocationScheme {
    type Err = CollocationError;
    fn from_str(s: &str) -> Result<CollocationScheme, CollocationError> {
        match s {
            "radau" => Ok(CollocationScheme::Radau),
            "legendre" => Ok(CollocationScheme::Legendre),
            other => Err(CollocationError::InvalidScheme(other.to_string())),
        }
    }
}

// Gauss-Radau IIA node seeds on (0, 1], right endpoint exact, degree 1..=9.
// 15-digit classic tables, sharpened to correctly rounded f64 by radau_points
// before use. The endpoint 1.0 must stay exact because the radau continuity
// coefficients rely on it.
const RADAU_POINTS: [&[f64]; 9] = [
    &[1.000000000000000],
    &[0.333333333333333, 1.000000000000000],
    &[0.155051025721682, 0.644948974278318, 1.000000000000000],
    &[0.088587959512704, 0.409466864440735, 0.787659461760847, 1.000000000000000],
    &[
        0.057104196114518,
        0.276843013638124,
        0.583590432368917,
        0.860240135656219,
        1.000000000000000,
    ],
    &[
        0.039809857051469,
        0.198013417873608,
        0.437974810247386,
        0.695464273353636,
        0.901464914201174,
        1.000000000000000,
    ],
    &[
        0.029316427159785,
        0.148078599668484,
        0.336984690281154,
        0.558671518771550,
        0.769233862030055,
        0.926945671319741,
        1.000000000000000,
    ],
    &[
        0.022479386438713,
        0.114679053160905,
        0.265789822784590,
        0.452846373669445,
        0.647375282886830,
        0.819759308263108,
        0.943737439463078,
        1.000000000000000,
    ],
    &[
        0.017779915147364,
        0.091323607899794,
        0.214308479395631,
        0.371932164583272,
        0.545186684803427,
        0.713175242827757,
        0.855633742957854,
        0.955366044710030,
        1.000000000000000,
    ],
];

/// The deg quadrature nodes of the chosen rule on (0, 1], without the left endpoint.
pub fn collocation_points(
    deg: usize,
    scheme: CollocationScheme,
) -> Result<Vec<f64>, CollocationError> {
    if deg < 1 {
        return Err(CollocationError::InvalidDegree(deg as i64));
    }
    match scheme {
        CollocationScheme::Radau => {
            if deg > RADAU_POINTS.len() {
                return Err(CollocationError::InvalidDegree(deg as i64));
            }
            Ok(radau_points(deg))
        }
        CollocationScheme::Legendre => {
            if deg == 1 {
                // midpoint rule, exact
                return Ok(vec![0.5]);
            }
            let quad = GaussLegendre::new(deg)
                .map_err(|_| CollocationError::InvalidDegree(deg as i64))?;
            // gauss-quad works on [-1, 1]; shift to (0, 1) and order ascending
            let points: Vec<f64> = quad
                .nodes()
                .map(|x| 0.5 * (x + 1.0))
                .sorted_by(|a, b| a.total_cmp(b))
                .collect();
            Ok(points)
        }
    }
}

// The interior Radau IIA nodes solve P_{deg-1}(x) - P_deg(x) = 0 on (-1, 1).
// The tabulated seeds carry only 15 digits, so each one gets a few Newton
// steps in double-double arithmetic against that Legendre combination before
// the shift back to (0, 1]. The right endpoint stays exactly 1.
fn radau_points(deg: usize) -> Vec<f64> {
    let seeds = RADAU_POINTS[deg - 1];
    let mut points = Vec::with_capacity(deg);
    for &tau in &seeds[..deg - 1] {
        let mut x = DoubleDouble::from_f64(2.0 * tau - 1.0);
        for _ in 0..3 {
            let (p_prev2, p_prev, p) = legendre_triple(deg, x);
            let f = p_prev.sub(p);
            // (x^2 - 1) f'(x) = (deg-1)(x P_{deg-1} - P_{deg-2}) - deg (x P_deg - P_{deg-1})
            let num = x
                .mul(p_prev)
                .sub(p_prev2)
                .mul_f64((deg - 1) as f64)
                .sub(x.mul(p).sub(p_prev).mul_f64(deg as f64));
            let denom = x.mul(x).sub(DoubleDouble::from_f64(1.0));
            let fp = num.div(denom);
            x = x.sub(f.div(fp));
        }
        points.push(x.add(DoubleDouble::from_f64(1.0)).div_f64(2.0).value());
    }
    points.push(1.0);
    points
}

// (P_{deg-2}, P_{deg-1}, P_deg) by the three-term Legendre recurrence, deg >= 2
fn legendre_triple(deg: usize, x: DoubleDouble) -> (DoubleDouble, DoubleDouble, DoubleDouble) {
    let mut p_prev2 = DoubleDouble::from_f64(1.0);
    let mut p_prev = DoubleDouble::from_f64(1.0);
    let mut p = x;
    for k in 1..deg {
        let next = x
            .mul(p)
            .mul_f64((2 * k + 1) as f64)
            .sub(p_prev.mul_f64(k as f64))
            .div_f64((k + 1) as f64);
        p_prev2 = p_prev;
        p_prev = p;
        p = next;
    }
    (p_prev2, p_prev, p)
}

/// Coefficient sets of the collocation equation, derived once from the Lagrange
/// basis on the node grid and immutable afterwards.
///
/// With L_j the degree-deg Lagrange basis polynomial of node j:
/// - c[(j, r)] = L_j'(tau_root[r])  - differentiation matrix
/// - d[j] = L_j(1)                  - continuity coefficients, sum(d) = 1
/// - b[j] = integral of L_j on [0,1] - quadrature weights, sum(b) = 1
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeCoefficients {
    pub scheme: CollocationScheme,
    pub deg: usize,
    /// tau_root[0] = 0, tau_root[1..=deg] = collocation nodes on (0, 1]
    pub tau_root: DVector<f64>,
    pub c: DMatrix<f64>,
    pub d: DVector<f64>,
    pub b: DVector<f64>,
}

impl SchemeCoefficients {
    pub fn new(deg: usize, scheme: CollocationScheme) -> Result<SchemeCoefficients, CollocationError> {
        let points = collocation_points(deg, scheme)?;
        let mut tau_root = vec![0.0];
        tau_root.extend(points);

        let n = deg + 1;
        let mut c = DMatrix::zeros(n, n);
        let mut d = DVector::zeros(n);
        let mut b = DVector::zeros(n);

        for j in 0..n {
            // Lagrange basis polynomial of node j: L_j(tau_root[r]) = [r == j]
            let mut p = Polynomial::constant(1.0);
            for r in 0..n {
                if r != j {
                    p = p * Polynomial::new(vec![-tau_root[r], 1.0]) / (tau_root[j] - tau_root[r]);
                }
            }

            // Continuity coefficients. The radau grid contains tau = 1 exactly, so
            // L_j(1) reduces to an indicator there; legendre has no such guarantee
            // and the basis must be evaluated directly.
            d[j] = match scheme {
                CollocationScheme::Radau => {
                    if j == deg {
                        1.0
                    } else {
                        0.0
                    }
                }
                CollocationScheme::Legendre => p.evaluate(1.0),
            };

            // Differentiation matrix from the basis derivative at every node
            let dp = p.derivative();
            for r in 0..n {
                c[(j, r)] = dp.evaluate(tau_root[r]);
            }

            // Quadrature weights from the basis antiderivative at the right end
            b[j] = p.antiderivative().evaluate(1.0);
        }

        info!(
            "collocation coefficients derived: scheme = {}, deg = {}, tau_root = {:?}",
            scheme, deg, tau_root
        );

        Ok(SchemeCoefficients {
            scheme,
            deg,
            tau_root: DVector::from_vec(tau_root),
            c,
            d,
            b,
        })
    }

    /// Rebuild the coefficient sets from persisted raw arrays, without re-deriving
    /// anything. `c` is row-major of size (deg+1)*(deg+1).
    pub fn from_parts(
        deg: usize,
        scheme: CollocationScheme,
        tau_root: &[f64],
        c: &[f64],
        d: &[f64],
        b: &[f64],
    ) -> Result<SchemeCoefficients, CollocationError> {
        let n = deg + 1;
        if deg < 1 {
            return Err(CollocationError::InvalidDegree(deg as i64));
        }
        if tau_root.len() != n || d.len() != n || b.len() != n || c.len() != n * n {
            return Err(CollocationError::MalformedRecord(format!(
                "coefficient arrays do not match degree {}: tau_root {}, c {}, d {}, b {}",
                deg,
                tau_root.len(),
                c.len(),
                d.len(),
                b.len()
            )));
        }
        Ok(SchemeCoefficients {
            scheme,
            deg,
            tau_root: DVector::from_row_slice(tau_root),
            c: DMatrix::from_row_slice(n, n, c),
            d: DVector::from_row_slice(d),
            b: DVector::from_row_slice(b),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("radau".parse::<CollocationScheme>().unwrap(), CollocationScheme::Radau);
        assert_eq!(
            "legendre".parse::<CollocationScheme>().unwrap(),
            CollocationScheme::Legendre
        );
        let err = "hermite".parse::<CollocationScheme>().unwrap_err();
        assert_eq!(err, CollocationError::InvalidScheme("hermite".to_string()));
    }

    #[test]
    fn test_invalid_degree_rejected_eagerly() {
        assert_eq!(
            collocation_points(0, CollocationScheme::Radau).unwrap_err(),
            CollocationError::InvalidDegree(0)
        );
        assert_eq!(
            SchemeCoefficients::new(0, CollocationScheme::Legendre).unwrap_err(),
            CollocationError::InvalidDegree(0)
        );
    }

    #[test]
    fn test_legendre_degree_one() {
        let coeffs = SchemeCoefficients::new(1, CollocationScheme::Legendre).unwrap();
        assert_eq!(coeffs.tau_root.as_slice(), &[0.0, 0.5]);
        // midpoint rule: xf is the pure extrapolation 2*x_1 - x0
        assert_relative_eq!(coeffs.d[0], -1.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.d[1], 2.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.b[0], 0.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.b[1], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_radau_endpoint_and_continuity() {
        for deg in 1..=9 {
            let coeffs = SchemeCoefficients::new(deg, CollocationScheme::Radau).unwrap();
            assert_eq!(coeffs.tau_root[deg], 1.0, "radau endpoint must be exact");
            for j in 0..deg {
                assert_eq!(coeffs.d[j], 0.0);
            }
            assert_eq!(coeffs.d[deg], 1.0);
        }
    }

    #[test]
    fn test_radau_degree_one_is_backward_euler() {
        let coeffs = SchemeCoefficients::new(1, CollocationScheme::Radau).unwrap();
        assert_eq!(coeffs.tau_root.as_slice(), &[0.0, 1.0]);
        // L_0 = 1 - tau, L_1 = tau
        assert_relative_eq!(coeffs.c[(0, 0)], -1.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.c[(0, 1)], -1.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.c[(1, 0)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.c[(1, 1)], 1.0, epsilon = 1e-14);
        assert_relative_eq!(coeffs.b[0], 0.5, epsilon = 1e-14);
        assert_relative_eq!(coeffs.b[1], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn test_continuity_and_quadrature_sums() {
        for scheme in [CollocationScheme::Radau, CollocationScheme::Legendre] {
            for deg in 1..=9 {
                let coeffs = SchemeCoefficients::new(deg, scheme).unwrap();
                let d_sum: f64 = coeffs.d.iter().sum();
                let b_sum: f64 = coeffs.b.iter().sum();
                assert_relative_eq!(d_sum, 1.0, epsilon = 1e-12);
                assert_relative_eq!(b_sum, 1.0, epsilon = 1e-12);
                // derivative of the constant interpolant vanishes at every node
                for r in 0..=deg {
                    let col_sum: f64 = (0..=deg).map(|j| coeffs.c[(j, r)]).sum();
                    assert_relative_eq!(col_sum, 0.0, epsilon = 1e-11);
                }
            }
        }
    }

    #[test]
    fn test_radau_nodes_match_closed_forms() {
        // degree 2: interior node 1/3; degree 3: (4 -+ sqrt(6))/10
        let p2 = collocation_points(2, CollocationScheme::Radau).unwrap();
        assert_relative_eq!(p2[0], 1.0 / 3.0, epsilon = 1e-15);
        assert_eq!(p2[1], 1.0);
        let p3 = collocation_points(3, CollocationScheme::Radau).unwrap();
        assert_relative_eq!(p3[0], (4.0 - 6.0_f64.sqrt()) / 10.0, epsilon = 1e-15);
        assert_relative_eq!(p3[1], (4.0 + 6.0_f64.sqrt()) / 10.0, epsilon = 1e-15);
        assert_eq!(p3[2], 1.0);
    }

    #[test]
    fn test_legendre_nodes_sorted_and_interior() {
        for deg in 1..=9 {
            let points = collocation_points(deg, CollocationScheme::Legendre).unwrap();
            assert_eq!(points.len(), deg);
            for w in points.windows(2) {
                assert!(w[0] < w[1], "nodes must be ascending");
            }
            assert!(points[0] > 0.0 && points[deg - 1] < 1.0);
        }
    }

    #[test]
    fn test_from_parts_roundtrip_and_length_check() {
        let coeffs = SchemeCoefficients::new(3, CollocationScheme::Radau).unwrap();
        let c_flat: Vec<f64> = coeffs.c.row_iter().flat_map(|r| r.iter().cloned().collect::<Vec<_>>()).collect();
        let rebuilt = SchemeCoefficients::from_parts(
            3,
            CollocationScheme::Radau,
            coeffs.tau_root.as_slice(),
            &c_flat,
            coeffs.d.as_slice(),
            coeffs.b.as_slice(),
        )
        .unwrap();
        assert_eq!(rebuilt, coeffs);

        let broken = SchemeCoefficients::from_parts(
            3,
            CollocationScheme::Radau,
            coeffs.tau_root.as_slice(),
            &c_flat[..5],
            coeffs.d.as_slice(),
            coeffs.b.as_slice(),
        );
        assert!(matches!(broken, Err(CollocationError::MalformedRecord(_))));
    }
}
