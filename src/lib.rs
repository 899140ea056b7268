pub mod assess;
pub mod classify;
pub mod config;
pub mod error;
pub mod fitting;
pub mod io;
pub mod landmarks;
pub mod repair;
pub mod utils;

#[cfg(feature = "python")]
pub mod binding;

pub use assess::{PostureAssessment, PostureAssessor, ReferenceModel};
pub use classify::LeftRightClassifier;
pub use config::{AssessParams, Config, RepairParams, TiePolicy};
pub use error::{LandmarkError, Result};
pub use fitting::{CurveFitter, CurveModel};
pub use landmarks::{LandmarkPoint, OrderedSide, Side};
pub use repair::{repair_landmarks, OmissionDetector, Patch, PatchGenerator, PatchStatus};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// This is the module importable from Python:
///
/// ```python
/// import landmarkrs as lm
/// outcome = lm.repair_landmarks(lm.load_landmarks("patient.csv"))
/// ref = lm.load_reference_model("reference.csv", "reference.obj")
/// result = lm.assess_posture(outcome.left, outcome.right, ref)
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn landmarkrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use binding::classes::{
        PyCurveModel, PyLandmarkPoint, PyPatch, PyPostureAssessment, PyReferenceModel,
        PyRepairOutcome,
    };

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(binding::classify_sides, m)?)?;
    m.add_function(wrap_pyfunction!(binding::fit_curve, m)?)?;
    m.add_function(wrap_pyfunction!(binding::detect_omissions, m)?)?;
    m.add_function(wrap_pyfunction!(binding::generate_patch, m)?)?;
    m.add_function(wrap_pyfunction!(binding::grow_patch, m)?)?;
    m.add_function(wrap_pyfunction!(binding::shrink_patch, m)?)?;
    m.add_function(wrap_pyfunction!(binding::apply_patch, m)?)?;
    m.add_function(wrap_pyfunction!(binding::repair_landmarks, m)?)?;
    m.add_function(wrap_pyfunction!(binding::assess_posture, m)?)?;
    m.add_function(wrap_pyfunction!(binding::cobb_angle, m)?)?;
    m.add_function(wrap_pyfunction!(binding::load_landmarks, m)?)?;
    m.add_function(wrap_pyfunction!(binding::load_reference_model, m)?)?;

    m.add_class::<PyLandmarkPoint>()?;
    m.add_class::<PyCurveModel>()?;
    m.add_class::<PyPatch>()?;
    m.add_class::<PyRepairOutcome>()?;
    m.add_class::<PyPostureAssessment>()?;
    m.add_class::<PyReferenceModel>()?;
    Ok(())
}
