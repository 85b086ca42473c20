use crate::numerical::Collocation::Collocation_backward::BackwardStep;
use crate::numerical::Collocation::Collocation_coeffs::{CollocationScheme, SchemeCoefficients};
use crate::numerical::Collocation::Collocation_main::{
    BackwardDaeCallable, BackwardDaeDims, Collocation, CollocationError, DaeCallable, DaeDims,
    ForwardStep,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use simplelog::LevelFilter;
use std::fs;
use std::sync::Arc;

/// Version tag of the persisted record format. Restoring rejects any other
/// version; bump this when the layout below changes.
pub const RECORD_VERSION: u32 = 1;

/// Raw coefficient arrays of one assembled step relation - everything needed
/// to rebuild it without re-deriving the collocation coefficients. The
/// differentiation matrix is stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardRelationRecord {
    pub dims: DaeDims,
    pub tau_root: Vec<f64>,
    pub c: Vec<f64>,
    pub d: Vec<f64>,
    pub b: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackwardRelationRecord {
    pub rdims: BackwardDaeDims,
    pub tau_root: Vec<f64>,
    pub c: Vec<f64>,
    pub d: Vec<f64>,
    pub b: Vec<f64>,
}

/// Versioned persisted record of a collocation discretization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationRecord {
    pub version: u32,
    pub degree: usize,
    pub scheme: String,
    pub forward: ForwardRelationRecord,
    pub has_backward: bool,
    pub backward: Option<BackwardRelationRecord>,
}

fn flatten_row_major(coefficients: &SchemeCoefficients) -> Vec<f64> {
    let n = coefficients.deg + 1;
    let mut flat = Vec::with_capacity(n * n);
    for j in 0..n {
        for r in 0..n {
            flat.push(coefficients.c[(j, r)]);
        }
    }
    flat
}

impl Collocation {
    /// Pack the discretization into a versioned record. The DAE callables are
    /// opaque to the core and are not part of the record; the caller re-supplies
    /// them on restore.
    pub fn save(&self) -> CollocationRecord {
        let forward = ForwardRelationRecord {
            dims: self.fstep.dims,
            tau_root: self.coefficients.tau_root.as_slice().to_vec(),
            c: flatten_row_major(&self.coefficients),
            d: self.coefficients.d.as_slice().to_vec(),
            b: self.coefficients.b.as_slice().to_vec(),
        };
        let backward = self.bstep.as_ref().map(|bstep| BackwardRelationRecord {
            rdims: bstep.rdims,
            tau_root: bstep.coefficients.tau_root.as_slice().to_vec(),
            c: flatten_row_major(&bstep.coefficients),
            d: bstep.coefficients.d.as_slice().to_vec(),
            b: bstep.coefficients.b.as_slice().to_vec(),
        });
        CollocationRecord {
            version: RECORD_VERSION,
            degree: self.deg,
            scheme: self.scheme.name().to_string(),
            forward,
            has_backward: backward.is_some(),
            backward,
        }
    }

    /// Rebuild the discretization from a persisted record without re-deriving
    /// coefficients. A record carrying a backward relation degrades to
    /// forward-only (with a warning) when no backward callable is supplied.
    pub fn restore(
        record: &CollocationRecord,
        dae: Arc<dyn DaeCallable>,
        bdae: Option<Arc<dyn BackwardDaeCallable>>,
    ) -> Result<Collocation, CollocationError> {
        if record.version != RECORD_VERSION {
            return Err(CollocationError::SerializationVersionMismatch {
                found: record.version,
                supported: RECORD_VERSION,
            });
        }
        let scheme: CollocationScheme = record.scheme.parse()?;
        let coefficients = SchemeCoefficients::from_parts(
            record.degree,
            scheme,
            &record.forward.tau_root,
            &record.forward.c,
            &record.forward.d,
            &record.forward.b,
        )?;
        let fstep = ForwardStep::assemble(dae, coefficients.clone(), record.forward.dims)?;

        let bstep = if record.has_backward {
            let brecord = record.backward.as_ref().ok_or_else(|| {
                CollocationError::MalformedRecord(
                    "has_backward is set but the backward relation is missing".to_string(),
                )
            })?;
            match bdae {
                Some(bdae) => {
                    let bcoefficients = SchemeCoefficients::from_parts(
                        record.degree,
                        scheme,
                        &brecord.tau_root,
                        &brecord.c,
                        &brecord.d,
                        &brecord.b,
                    )?;
                    Some(BackwardStep::assemble(
                        bdae,
                        bcoefficients,
                        record.forward.dims,
                        brecord.rdims,
                    )?)
                }
                None => {
                    warn!("record has a backward relation but no backward DAE was supplied");
                    None
                }
            }
        } else {
            None
        };

        info!(
            "restored collocation discretization: scheme = {}, deg = {}, backward = {}",
            scheme,
            record.degree,
            bstep.is_some()
        );
        Ok(Collocation {
            deg: record.degree,
            scheme,
            coefficients,
            fstep,
            bstep,
            log_level: Some(LevelFilter::Warn),
            log_to_file: None,
            log_to_console: true,
        })
    }

    /// Serialize the record as tagged JSON
    pub fn save_json(&self) -> Result<String, CollocationError> {
        serde_json::to_string_pretty(&self.save())
            .map_err(|e| CollocationError::MalformedRecord(e.to_string()))
    }

    /// Restore from tagged JSON produced by save_json
    pub fn restore_json(
        json: &str,
        dae: Arc<dyn DaeCallable>,
        bdae: Option<Arc<dyn BackwardDaeCallable>>,
    ) -> Result<Collocation, CollocationError> {
        let record: CollocationRecord =
            serde_json::from_str(json).map_err(|e| CollocationError::MalformedRecord(e.to_string()))?;
        Collocation::restore(&record, dae, bdae)
    }

    pub fn save_to_file(&self, filename: &str) -> Result<(), CollocationError> {
        let json = self.save_json()?;
        fs::write(filename, json).map_err(|e| CollocationError::Io(e.to_string()))?;
        info!("collocation record saved to {}", filename);
        Ok(())
    }

    pub fn restore_from_file(
        filename: &str,
        dae: Arc<dyn DaeCallable>,
        bdae: Option<Arc<dyn BackwardDaeCallable>>,
    ) -> Result<Collocation, CollocationError> {
        let json = fs::read_to_string(filename).map_err(|e| CollocationError::Io(e.to_string()))?;
        Collocation::restore_json(&json, dae, bdae)
    }
}
