/// Collocation-based implicit discretization of DAE systems
/// Example#1
/// ```
///    use std::collections::HashMap;
///    use std::sync::Arc;
///    use nalgebra::DVector;
///    use RustedColloc::numerical::Collocation::Collocation_main::{
///        Collocation, CollocationOptions, DaeDims, DaeFn, DaeOutput, ForwardStepInput,
///    };
///    // scalar DAE dx/dt = -x, no algebraic part, no quadrature
///    let dims = DaeDims { nx: 1, nz: 0, np: 0, nu: 0, nq: 0 };
///    let dae = Arc::new(DaeFn {
///        dims,
///        f: |_t: f64, x: &DVector<f64>, _z: &DVector<f64>, _p: &DVector<f64>, _u: &DVector<f64>| DaeOutput {
///            ode: DVector::from_vec(vec![-x[0]]),
///            alg: DVector::zeros(0),
///            quad: DVector::zeros(0),
///        },
///    });
///    // configure degree and scheme the same way options are fed from a task file
///    let mut opts = HashMap::new();
///    opts.insert("interpolation_order".to_string(), "3".to_string());
///    opts.insert("collocation_scheme".to_string(), "radau".to_string());
///    let options = CollocationOptions::from_map(&opts).unwrap();
///    let colloc = Collocation::new(dae, dims, &options).unwrap();
///    // initial guess for the interior unknowns, then hand the residual to any root solver
///    let x0 = DVector::from_vec(vec![1.0]);
///    let buffer = colloc.reset(&x0, &DVector::zeros(0));
///    let out = colloc.forward_step().evaluate(&ForwardStepInput {
///        t0: 0.0,
///        h: 0.1,
///        x0: &x0,
///        p: &DVector::zeros(0),
///        u: &DVector::zeros(0),
///        v: &buffer.v,
///    });
///    assert_eq!(out.residual.len(), colloc.forward_step().nv());
/// ```
pub mod Collocation;
