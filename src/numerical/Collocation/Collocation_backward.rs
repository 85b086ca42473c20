use crate::numerical::Collocation::Collocation_coeffs::SchemeCoefficients;
use crate::numerical::Collocation::Collocation_main::{
    BackwardDaeCallable, BackwardDaeDims, CollocationError, DaeDims,
};
use log::info;
use nalgebra::DVector;
use std::sync::Arc;

/// Inputs of the backward step relation. The forward-solved interval data
/// (t0, h, x0, p, u, v) enter as fixed values; the unknowns are the adjoint
/// seeds and the stacked adjoint node states rv.
#[derive(Debug, Clone)]
pub struct BackwardStepInput<'a> {
    pub t0: f64,
    pub h: f64,
    pub x0: &'a DVector<f64>,
    pub p: &'a DVector<f64>,
    pub u: &'a DVector<f64>,
    /// forward interior unknowns, already driven to the residual root
    pub v: &'a DVector<f64>,
    /// terminal adjoint seed
    pub rx0: &'a DVector<f64>,
    pub rp: &'a DVector<f64>,
    /// stacked adjoint unknowns, deg blocks of (rx_j, rz_j)
    pub rv: &'a DVector<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackwardStepOutput {
    pub rxf: DVector<f64>,
    pub residual: DVector<f64>,
    /// parameter sensitivity quadrature
    pub rqf: DVector<f64>,
    /// control sensitivity quadrature, kept separate from rqf
    pub uqf: DVector<f64>,
}

/// Backward (adjoint) step relation. The quadrature-weighted differentiation
/// coefficients b[r]*c[(j,r)] make this system the algebraic transpose of the
/// forward one, so adjoint sensitivities match forward-mode sensitivities to
/// machine precision whenever the backward DAE is the reverse-mode derivative
/// of the forward DAE.
pub struct BackwardStep {
    bdae: Arc<dyn BackwardDaeCallable>,
    pub coefficients: SchemeCoefficients,
    pub dims: DaeDims,
    pub rdims: BackwardDaeDims,
}

impl BackwardStep {
    pub(crate) fn assemble(
        bdae: Arc<dyn BackwardDaeCallable>,
        coefficients: SchemeCoefficients,
        dims: DaeDims,
        rdims: BackwardDaeDims,
    ) -> Result<BackwardStep, CollocationError> {
        let declared = bdae.dims();
        if declared != rdims {
            return Err(CollocationError::DimensionMismatch(format!(
                "backward DAE callable declares {:?}, configured {:?}",
                declared, rdims
            )));
        }
        info!(
            "assembled backward step relation: scheme = {}, deg = {}, {} adjoint unknowns",
            coefficients.scheme,
            coefficients.deg,
            coefficients.deg * (rdims.nrx + rdims.nrz)
        );
        Ok(BackwardStep {
            bdae,
            coefficients,
            dims,
            rdims,
        })
    }

    /// Size of the stacked adjoint unknown vector rv
    pub fn nrv(&self) -> usize {
        self.coefficients.deg * (self.rdims.nrx + self.rdims.nrz)
    }

    /// Pure evaluation of the adjoint step relation.
    /// Residual block of node j: h*b[j]*rode_j - rxp_j with
    /// rxp_j = -d[j]*rx0 + sum_{r=1..deg} (b[r]*c[(j,r)])*rx_r, stacked with ralg_j.
    pub fn evaluate(&self, input: &BackwardStepInput) -> BackwardStepOutput {
        let deg = self.coefficients.deg;
        let DaeDims { nx, nz, np, nu, .. } = self.dims;
        let BackwardDaeDims { nrx, nrz, nrp, nuq } = self.rdims;
        let block = nx + nz;
        let rblock = nrx + nrz;
        assert_eq!(input.x0.len(), nx, "x0 has wrong length");
        assert_eq!(input.p.len(), np, "p has wrong length");
        assert_eq!(input.u.len(), nu, "u has wrong length");
        assert_eq!(input.v.len(), deg * block, "v has wrong length");
        assert_eq!(input.rx0.len(), nrx, "rx0 has wrong length");
        assert_eq!(input.rp.len(), nrp, "rp has wrong length");
        assert_eq!(input.rv.len(), deg * rblock, "rv has wrong length");

        let tau = &self.coefficients.tau_root;
        let c = &self.coefficients.c;
        let d = &self.coefficients.d;
        let b = &self.coefficients.b;

        // forward node states are fixed inputs here
        let mut x: Vec<DVector<f64>> = Vec::with_capacity(deg + 1);
        let mut z: Vec<DVector<f64>> = Vec::with_capacity(deg + 1);
        let mut rx: Vec<DVector<f64>> = Vec::with_capacity(deg + 1);
        let mut rz: Vec<DVector<f64>> = Vec::with_capacity(deg + 1);
        x.push(input.x0.clone());
        z.push(DVector::zeros(nz));
        rx.push(input.rx0.clone());
        rz.push(DVector::zeros(nrz));
        for j in 1..=deg {
            let offset = (j - 1) * block;
            x.push(input.v.rows(offset, nx).into_owned());
            z.push(input.v.rows(offset + nx, nz).into_owned());
            let roffset = (j - 1) * rblock;
            rx.push(input.rv.rows(roffset, nrx).into_owned());
            rz.push(input.rv.rows(roffset + nrx, nrz).into_owned());
        }

        let mut rxf = d[0] * input.rx0;
        let mut rqf = DVector::zeros(np);
        let mut uqf = DVector::zeros(nuq);
        let mut residual = DVector::zeros(deg * rblock);

        for j in 1..=deg {
            let t_j = input.t0 + input.h * tau[j];
            let out = self
                .bdae
                .evaluate(t_j, &x[j], &z[j], input.p, input.u, &rx[j], &rz[j], input.rp);
            assert_eq!(out.rode.len(), nrx, "backward DAE rode output has wrong length");
            assert_eq!(out.ralg.len(), nrz, "backward DAE ralg output has wrong length");
            assert_eq!(out.rquad.len(), np, "backward DAE rquad output has wrong length");
            assert_eq!(out.uquad.len(), nuq, "backward DAE uquad output has wrong length");

            // adjoint state derivative: quadrature-weighted transpose of the
            // forward differentiation matrix
            let mut rxp_j = -d[j] * input.rx0;
            for r in 1..=deg {
                rxp_j += (b[r] * c[(j, r)]) * &rx[r];
            }

            let res_rx = (input.h * b[j]) * &out.rode - rxp_j;
            let roffset = (j - 1) * rblock;
            residual.rows_mut(roffset, nrx).copy_from(&res_rx);
            residual.rows_mut(roffset + nrx, nrz).copy_from(&out.ralg);

            rxf -= (b[j] * c[(0, j)]) * &rx[j];
            rqf += (input.h * b[j]) * &out.rquad;
            uqf += (input.h * b[j]) * &out.uquad;
        }

        BackwardStepOutput {
            rxf,
            residual,
            rqf,
            uqf,
        }
    }
}
