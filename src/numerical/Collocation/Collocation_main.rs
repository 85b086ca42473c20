use crate::Utils::logger::init_logger;
use crate::numerical::Collocation::Collocation_backward::BackwardStep;
use crate::numerical::Collocation::Collocation_coeffs::{CollocationScheme, SchemeCoefficients};
use core::fmt::Display;
use log::info;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use simplelog::LevelFilter;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Errors of the collocation core. All construction-time failures are raised
/// eagerly, never deferred to the first step evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum CollocationError {
    InvalidDegree(i64),
    InvalidScheme(String),
    DimensionMismatch(String),
    MissingBackwardModel,
    SerializationVersionMismatch { found: u32, supported: u32 },
    UnknownOption(String),
    InvalidOptionValue(String, String),
    MalformedRecord(String),
    Io(String),
}

impl fmt::Display for CollocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollocationError::InvalidDegree(deg) => {
                write!(f, "interpolation order must be a positive integer, got {}", deg)
            }
            CollocationError::InvalidScheme(name) => {
                write!(f, "unknown collocation scheme '{}', expected radau|legendre", name)
            }
            CollocationError::DimensionMismatch(msg) => write!(f, "dimension mismatch: {}", msg),
            CollocationError::MissingBackwardModel => {
                write!(f, "no backward DAE supplied, adjoint capability is unavailable")
            }
            CollocationError::SerializationVersionMismatch { found, supported } => {
                write!(
                    f,
                    "persisted record has version {}, this build supports version {}",
                    found, supported
                )
            }
            CollocationError::UnknownOption(key) => write!(f, "unrecognized option '{}'", key),
            CollocationError::InvalidOptionValue(key, value) => {
                write!(f, "option '{}' has invalid value '{}'", key, value)
            }
            CollocationError::MalformedRecord(msg) => write!(f, "malformed record: {}", msg),
            CollocationError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl std::error::Error for CollocationError {}

/// Dimensions of a DAE model, fixed per model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaeDims {
    /// differential states
    pub nx: usize,
    /// algebraic states
    pub nz: usize,
    /// parameters
    pub np: usize,
    /// controls, constant over one interval
    pub nu: usize,
    /// quadrature states
    pub nq: usize,
}

/// Dimensions of a backward (adjoint) DAE model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackwardDaeDims {
    pub nrx: usize,
    pub nrz: usize,
    pub nrp: usize,
    /// control sensitivity quadratures
    pub nuq: usize,
}

/// Output slots of one DAE evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct DaeOutput {
    pub ode: DVector<f64>,
    pub alg: DVector<f64>,
    pub quad: DVector<f64>,
}

/// A DAE in semi-explicit form, realized as an opaque pure callable:
/// dx/dt = ode(t,x,z,p,u), 0 = alg(t,x,z,p,u), dq/dt = quad(t,x,z,p,u).
/// The realization (hand-written code, AD, compiled expression tree) is
/// the caller's business; the core only requires determinism.
pub trait DaeCallable: Send + Sync {
    fn dims(&self) -> DaeDims;
    fn evaluate(
        &self,
        t: f64,
        x: &DVector<f64>,
        z: &DVector<f64>,
        p: &DVector<f64>,
        u: &DVector<f64>,
    ) -> DaeOutput;
}

/// Output slots of one backward DAE evaluation. rquad has length np (parameter
/// sensitivity), uquad has length nuq (control sensitivity) - kept separate.
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardDaeOutput {
    pub rode: DVector<f64>,
    pub ralg: DVector<f64>,
    pub rquad: DVector<f64>,
    pub uquad: DVector<f64>,
}

/// Backward (adjoint) DAE callable. When this is the reverse-mode derivative of
/// the forward callable, the assembled backward relation propagates adjoint
/// sensitivities that match forward ones to machine precision.
pub trait BackwardDaeCallable: Send + Sync {
    fn dims(&self) -> BackwardDaeDims;
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        t: f64,
        x: &DVector<f64>,
        z: &DVector<f64>,
        p: &DVector<f64>,
        u: &DVector<f64>,
        rx: &DVector<f64>,
        rz: &DVector<f64>,
        rp: &DVector<f64>,
    ) -> BackwardDaeOutput;
}

/// Wrap a plain closure as a DAE callable
pub struct DaeFn<F> {
    pub dims: DaeDims,
    pub f: F,
}

impl<F> DaeCallable for DaeFn<F>
where
    F: Fn(f64, &DVector<f64>, &DVector<f64>, &DVector<f64>, &DVector<f64>) -> DaeOutput
        + Send
        + Sync,
{
    fn dims(&self) -> DaeDims {
        self.dims
    }
    fn evaluate(
        &self,
        t: f64,
        x: &DVector<f64>,
        z: &DVector<f64>,
        p: &DVector<f64>,
        u: &DVector<f64>,
    ) -> DaeOutput {
        (self.f)(t, x, z, p, u)
    }
}

/// Wrap a plain closure as a backward DAE callable
pub struct BackwardDaeFn<F> {
    pub dims: BackwardDaeDims,
    pub f: F,
}

impl<F> BackwardDaeCallable for BackwardDaeFn<F>
where
    F: Fn(
            f64,
            &DVector<f64>,
            &DVector<f64>,
            &DVector<f64>,
            &DVector<f64>,
            &DVector<f64>,
            &DVector<f64>,
            &DVector<f64>,
        ) -> BackwardDaeOutput
        + Send
        + Sync,
{
    fn dims(&self) -> BackwardDaeDims {
        self.dims
    }
    fn evaluate(
        &self,
        t: f64,
        x: &DVector<f64>,
        z: &DVector<f64>,
        p: &DVector<f64>,
        u: &DVector<f64>,
        rx: &DVector<f64>,
        rz: &DVector<f64>,
        rp: &DVector<f64>,
    ) -> BackwardDaeOutput {
        (self.f)(t, x, z, p, u, rx, rz, rp)
    }
}

/// Configuration surface consumed from the caller
#[derive(Debug, Clone, PartialEq)]
pub struct CollocationOptions {
    /// number of interior collocation nodes, positive
    pub interpolation_order: usize,
    /// "radau" or "legendre"
    pub collocation_scheme: String,
}

impl Default for CollocationOptions {
    fn default() -> CollocationOptions {
        CollocationOptions {
            interpolation_order: 3,
            collocation_scheme: "radau".to_string(),
        }
    }
}

impl CollocationOptions {
    /// Read options from a key-value map, the way a parsed task file feeds them.
    /// Unrecognized keys, invalid orders and unknown schemes are rejected here,
    /// at configuration time.
    pub fn from_map(opts: &HashMap<String, String>) -> Result<CollocationOptions, CollocationError> {
        let mut options = CollocationOptions::default();
        for (key, value) in opts {
            match key.as_str() {
                "interpolation_order" => {
                    let deg: i64 = value.parse().map_err(|_| {
                        CollocationError::InvalidOptionValue(key.clone(), value.clone())
                    })?;
                    if deg < 1 {
                        return Err(CollocationError::InvalidDegree(deg));
                    }
                    options.interpolation_order = deg as usize;
                }
                "collocation_scheme" => {
                    // parse eagerly so a bad name fails now, not at assembly
                    let scheme: CollocationScheme = value.parse()?;
                    options.collocation_scheme = scheme.name().to_string();
                }
                other => return Err(CollocationError::UnknownOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

/// Inputs of the forward step relation for one integration interval
#[derive(Debug, Clone)]
pub struct ForwardStepInput<'a> {
    pub t0: f64,
    pub h: f64,
    pub x0: &'a DVector<f64>,
    pub p: &'a DVector<f64>,
    pub u: &'a DVector<f64>,
    /// stacked interior unknowns, deg blocks of (x_j, z_j)
    pub v: &'a DVector<f64>,
}

/// Outputs of the forward step relation: end state, the stacked residual the
/// external root solver must drive to zero, and the interval quadrature
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardStepOutput {
    pub xf: DVector<f64>,
    pub residual: DVector<f64>,
    pub qf: DVector<f64>,
}

/// Forward implicit step relation. Immutable after assembly, reusable across
/// all time steps and safe to evaluate concurrently over disjoint buffers.
pub struct ForwardStep {
    dae: Arc<dyn DaeCallable>,
    pub coefficients: SchemeCoefficients,
    pub dims: DaeDims,
}

impl ForwardStep {
    pub(crate) fn assemble(
        dae: Arc<dyn DaeCallable>,
        coefficients: SchemeCoefficients,
        dims: DaeDims,
    ) -> Result<ForwardStep, CollocationError> {
        let declared = dae.dims();
        if declared != dims {
            return Err(CollocationError::DimensionMismatch(format!(
                "DAE callable declares {:?}, configured {:?}",
                declared, dims
            )));
        }
        info!(
            "assembled forward step relation: scheme = {}, deg = {}, {} interior unknowns",
            coefficients.scheme,
            coefficients.deg,
            coefficients.deg * (dims.nx + dims.nz)
        );
        Ok(ForwardStep {
            dae,
            coefficients,
            dims,
        })
    }

    /// Size of the stacked interior unknown vector v
    pub fn nv(&self) -> usize {
        self.coefficients.deg * (self.dims.nx + self.dims.nz)
    }

    /// Pure evaluation of the step relation at caller-supplied data.
    /// Residual block of node j: h*ode_j - sum_{r=0..deg} c[(r,j)]*x_r, stacked
    /// with alg_j; node 0's state is fixed to x0 and has no algebraic slot.
    pub fn evaluate(&self, input: &ForwardStepInput) -> ForwardStepOutput {
        let deg = self.coefficients.deg;
        let DaeDims { nx, nz, np, nu, nq } = self.dims;
        let block = nx + nz;
        assert_eq!(input.x0.len(), nx, "x0 has wrong length");
        assert_eq!(input.p.len(), np, "p has wrong length");
        assert_eq!(input.u.len(), nu, "u has wrong length");
        assert_eq!(input.v.len(), deg * block, "v has wrong length");

        let tau = &self.coefficients.tau_root;
        let c = &self.coefficients.c;
        let d = &self.coefficients.d;
        let b = &self.coefficients.b;

        // collocated states, node 0 is the interval start
        let mut x: Vec<DVector<f64>> = Vec::with_capacity(deg + 1);
        let mut z: Vec<DVector<f64>> = Vec::with_capacity(deg + 1);
        x.push(input.x0.clone());
        z.push(DVector::zeros(nz));
        for j in 1..=deg {
            let offset = (j - 1) * block;
            x.push(input.v.rows(offset, nx).into_owned());
            z.push(input.v.rows(offset + nx, nz).into_owned());
        }

        let mut xf = d[0] * input.x0;
        let mut qf = DVector::zeros(nq);
        let mut residual = DVector::zeros(deg * block);

        for j in 1..=deg {
            let t_j = input.t0 + input.h * tau[j];
            let out = self.dae.evaluate(t_j, &x[j], &z[j], input.p, input.u);
            assert_eq!(out.ode.len(), nx, "DAE ode output has wrong length");
            assert_eq!(out.alg.len(), nz, "DAE alg output has wrong length");
            assert_eq!(out.quad.len(), nq, "DAE quad output has wrong length");

            // derivative of the interpolating polynomial at node j
            let mut xp_j = c[(0, j)] * &x[0];
            for r in 1..=deg {
                xp_j += c[(r, j)] * &x[r];
            }

            let res_x = input.h * &out.ode - xp_j;
            let offset = (j - 1) * block;
            residual.rows_mut(offset, nx).copy_from(&res_x);
            residual.rows_mut(offset + nx, nz).copy_from(&out.alg);

            xf += d[j] * &x[j];
            qf += (b[j] * input.h) * &out.quad;
        }

        ForwardStepOutput { xf, residual, qf }
    }
}

/// Flat buffer of the stacked interior node unknowns. Owned by exactly one
/// active integration run; the external root solver overwrites it in place
/// between resets.
#[derive(Debug, Clone, PartialEq)]
pub struct StateBuffer {
    pub v: DVector<f64>,
    deg: usize,
    n_diff: usize,
    n_alg: usize,
}

impl StateBuffer {
    pub fn new(deg: usize, n_diff: usize, n_alg: usize) -> StateBuffer {
        StateBuffer {
            v: DVector::zeros(deg * (n_diff + n_alg)),
            deg,
            n_diff,
            n_alg,
        }
    }

    /// Heuristic initial guess: replicate concat(x0, z0) into every interior
    /// node block. Callers may warm-start the buffer otherwise.
    pub fn reset(&mut self, x0: &DVector<f64>, z0: &DVector<f64>) {
        assert_eq!(x0.len(), self.n_diff, "x0 has wrong length");
        assert_eq!(z0.len(), self.n_alg, "z0 has wrong length");
        let block = self.n_diff + self.n_alg;
        for j in 0..self.deg {
            self.v.rows_mut(j * block, self.n_diff).copy_from(x0);
            self.v
                .rows_mut(j * block + self.n_diff, self.n_alg)
                .copy_from(z0);
        }
    }
}

/// Collocation discretization of a DAE model: node grid and coefficient sets
/// derived once at construction, a forward implicit step relation, and - when
/// a backward DAE is supplied - the exact adjoint step relation.
pub struct Collocation {
    pub deg: usize,
    pub scheme: CollocationScheme,
    pub coefficients: SchemeCoefficients,
    pub fstep: ForwardStep,
    pub bstep: Option<BackwardStep>,
    // logging configuration
    pub log_level: Option<LevelFilter>,
    pub log_to_file: Option<String>,
    pub log_to_console: bool,
}

impl Display for Collocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Collocation {{ scheme: {}, deg: {}, dims: {:?}, backward: {} }}",
            self.scheme,
            self.deg,
            self.fstep.dims,
            self.bstep.is_some()
        )
    }
}

impl fmt::Debug for Collocation {
    // the trait-object callables rule out a derive; reuse the Display rendering
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Collocation {
    /// Derive the coefficient sets for the configured scheme and assemble the
    /// forward step relation. Pure builder, invoked once per (model, degree,
    /// scheme) tuple.
    pub fn new(
        dae: Arc<dyn DaeCallable>,
        dims: DaeDims,
        options: &CollocationOptions,
    ) -> Result<Collocation, CollocationError> {
        let scheme: CollocationScheme = options.collocation_scheme.parse()?;
        let deg = options.interpolation_order;
        let coefficients = SchemeCoefficients::new(deg, scheme)?;
        let fstep = ForwardStep::assemble(dae, coefficients.clone(), dims)?;
        Ok(Collocation {
            deg,
            scheme,
            coefficients,
            fstep,
            bstep: None,
            log_level: Some(LevelFilter::Warn),
            log_to_file: None,
            log_to_console: true,
        })
    }

    /// Attach a backward DAE and assemble the adjoint step relation. Without
    /// this call the adjoint capability is simply absent.
    pub fn with_backward(
        mut self,
        bdae: Arc<dyn BackwardDaeCallable>,
        rdims: BackwardDaeDims,
    ) -> Result<Collocation, CollocationError> {
        let bstep = BackwardStep::assemble(bdae, self.coefficients.clone(), self.fstep.dims, rdims)?;
        self.bstep = Some(bstep);
        Ok(self)
    }

    pub fn forward_step(&self) -> &ForwardStep {
        &self.fstep
    }

    pub fn backward_step(&self) -> Result<&BackwardStep, CollocationError> {
        self.bstep
            .as_ref()
            .ok_or(CollocationError::MissingBackwardModel)
    }

    pub fn has_backward(&self) -> bool {
        self.bstep.is_some()
    }

    /// Allocate the interior unknown buffer and fill it with the replication
    /// initial guess
    pub fn reset(&self, x0: &DVector<f64>, z0: &DVector<f64>) -> StateBuffer {
        let dims = self.fstep.dims;
        let mut buffer = StateBuffer::new(self.deg, dims.nx, dims.nz);
        buffer.reset(x0, z0);
        buffer
    }

    /// Allocate and fill the adjoint unknown buffer; requires a backward relation
    pub fn resetB(
        &self,
        rx0: &DVector<f64>,
        rz0: &DVector<f64>,
    ) -> Result<StateBuffer, CollocationError> {
        let bstep = self.backward_step()?;
        let mut buffer = StateBuffer::new(self.deg, bstep.rdims.nrx, bstep.rdims.nrz);
        buffer.reset(rx0, rz0);
        Ok(buffer)
    }

    /// Algebraic state at the interval end: the z block of the last interior node
    pub fn algebraic_state_output(&self, v: &DVector<f64>) -> DVector<f64> {
        let nz = self.fstep.dims.nz;
        assert_eq!(v.len(), self.fstep.nv(), "v has wrong length");
        v.rows(v.len() - nz, nz).into_owned()
    }

    pub fn check(&self) {
        assert_eq!(self.coefficients.deg, self.deg, "degree is inconsistent");
        assert_eq!(
            self.coefficients.tau_root.len(),
            self.deg + 1,
            "node grid has wrong size"
        );
        assert_eq!(self.coefficients.tau_root[0], 0.0, "node grid must start at 0");
        assert_eq!(self.coefficients.d.len(), self.deg + 1, "continuity vector has wrong size");
        assert_eq!(self.coefficients.b.len(), self.deg + 1, "quadrature weights have wrong size");
        if let Some(ref bstep) = self.bstep {
            assert_eq!(
                bstep.coefficients, self.coefficients,
                "forward and backward relations must share coefficients"
            );
        }
    }

    ////////////////////////////////logging functions
    /// Set logging level (Off, Error, Warn, Info, Debug, Trace)
    pub fn set_log_level(&mut self, level: LevelFilter) {
        self.log_level = Some(level);
        self.init_logger();
    }

    /// Enable logging to file
    pub fn set_log_file(&mut self, filename: String) {
        self.log_to_file = Some(filename);
        self.init_logger();
    }

    /// Enable/disable console logging
    pub fn set_console_logging(&mut self, enabled: bool) {
        self.log_to_console = enabled;
        self.init_logger();
    }

    fn init_logger(&self) {
        init_logger(
            self.log_level.unwrap_or(LevelFilter::Info),
            self.log_to_console,
            self.log_to_file.as_deref(),
        );
    }

    /// Enable debug logging
    pub fn enable_debug_logging(&mut self) {
        self.set_log_level(LevelFilter::Debug);
    }

    /// Disable logging
    pub fn disable_logging(&mut self) {
        self.set_log_level(LevelFilter::Off);
    }
}
