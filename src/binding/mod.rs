pub mod classes;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::assess::PostureAssessor;
use crate::classify::LeftRightClassifier;
use crate::config::{Config, RepairParams, TiePolicy, DEFAULT_JITTER_SEED};
use crate::error::LandmarkError;
use crate::fitting::CurveFitter;
use crate::landmarks::{OrderedSide, Side};
use crate::repair::{OmissionDetector, PatchGenerator};
use classes::{
    side_from_str, to_landmarks, to_py_points, to_side, PyCurveModel, PyLandmarkPoint, PyPatch,
    PyPostureAssessment, PyReferenceModel, PyRepairOutcome,
};

/// Invalid caller parameters become `ValueError`, everything else `RuntimeError`.
pub(crate) fn to_py_err(err: LandmarkError) -> PyErr {
    match err {
        LandmarkError::InvalidParameter { .. } => PyValueError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn anyhow_to_py_err(err: anyhow::Error) -> PyErr {
    PyRuntimeError::new_err(format!("{:#}", err))
}

fn tie_policy_from_str(policy: &str) -> PyResult<TiePolicy> {
    match policy {
        "lateral_sign" => Ok(TiePolicy::LateralSign),
        "reject" => Ok(TiePolicy::Reject),
        other => Err(PyValueError::new_err(format!(
            "tie_policy must be 'lateral_sign' or 'reject', got '{}'",
            other
        ))),
    }
}

/// Knobs of a single operation go through the same range checks as
/// ``repair_landmarks``.
fn checked(params: RepairParams) -> PyResult<RepairParams> {
    params.validate().map_err(to_py_err)?;
    Ok(params)
}

fn checked_cap(max_side_points: usize) -> PyResult<usize> {
    if max_side_points == 0 {
        return Err(to_py_err(LandmarkError::invalid(
            "max_side_points",
            max_side_points,
            "a side holds at least one point",
        )));
    }
    Ok(max_side_points)
}

fn fit_params(degree: u32, boundary_multiplicity: u32) -> PyResult<RepairParams> {
    checked(RepairParams {
        poly_fit_degree: degree,
        boundary_multiplicity,
        ..RepairParams::default()
    })
}

/// Splits unlabeled landmarks into left and right sides.
///
/// Arguments:
///
/// - ``points`` – All landmarks of one patient, any order
/// - ``window_size`` (default: 4) – Points per k-means window (2-12)
/// - ``tie_policy`` (default: "lateral_sign") – "lateral_sign" or "reject"
///
/// Returns:
///
/// A tuple ``(left, right)`` of landmark lists, top of the spine first.
///
/// Example:
///
/// .. code-block:: python
///
///    import landmarkrs as lm
///    left, right = lm.classify_sides(points, window_size=4)
#[pyfunction]
#[pyo3(signature = (points, window_size = 4, tie_policy = "lateral_sign"))]
pub fn classify_sides(
    points: Vec<PyLandmarkPoint>,
    window_size: u32,
    tie_policy: &str,
) -> PyResult<(Vec<PyLandmarkPoint>, Vec<PyLandmarkPoint>)> {
    let params = checked(RepairParams {
        km_window_size: window_size,
        tie_policy: tie_policy_from_str(tie_policy)?,
        ..RepairParams::default()
    })?;
    let (left, right) = LeftRightClassifier::from_params(&params)
        .classify(&to_landmarks(&points))
        .map_err(to_py_err)?;
    Ok((to_py_points(left.points()), to_py_points(right.points())))
}

/// Fits centerline and frequency polynomials to the landmarks of one side.
///
/// Example:
///
/// .. code-block:: python
///
///    model = lm.fit_curve(left, degree=5, boundary_multiplicity=2)
///    model.point_at(-120.0)
#[pyfunction]
#[pyo3(signature = (
    points,
    degree = 5,
    boundary_multiplicity = 2,
    jitter_seed = DEFAULT_JITTER_SEED,
))]
pub fn fit_curve(
    points: Vec<PyLandmarkPoint>,
    degree: u32,
    boundary_multiplicity: u32,
    jitter_seed: u64,
) -> PyResult<PyCurveModel> {
    let params = fit_params(degree, boundary_multiplicity)?;
    let side = to_side(&points, Side::Left);
    let model = CurveFitter::from_params(&params)
        .with_seed(jitter_seed)
        .fit(&side)
        .map_err(to_py_err)?;
    Ok(model.into())
}

/// Returns the indices of intervals that likely hide a missing landmark.
///
/// Interval ``i`` lies between the ``i``-th and ``i+1``-th landmark, top first.
#[pyfunction]
#[pyo3(signature = (points, specificity = 1.0, degree = 5, boundary_multiplicity = 2))]
pub fn detect_omissions(
    points: Vec<PyLandmarkPoint>,
    specificity: f64,
    degree: u32,
    boundary_multiplicity: u32,
) -> PyResult<Vec<usize>> {
    let params = checked(RepairParams {
        omission_detection_specificity: specificity,
        ..fit_params(degree, boundary_multiplicity)?
    })?;
    let side = to_side(&points, Side::Left);
    let model = CurveFitter::from_params(&params)
        .fit(&side)
        .map_err(to_py_err)?;
    Ok(OmissionDetector::from_params(&params)
        .detect(&model, &model.spacing)
        .into_iter()
        .collect())
}

fn patch_generator(
    degree: u32,
    boundary_multiplicity: u32,
    imputation_specificity: f64,
    max_side_points: usize,
) -> PyResult<PatchGenerator> {
    let params = checked(RepairParams {
        imputation_specificity,
        ..fit_params(degree, boundary_multiplicity)?
    })?;
    Ok(PatchGenerator::from_params(&params).with_max_side_points(checked_cap(max_side_points)?))
}

/// Imputes points into a flagged interval of one side.
///
/// The returned patch is not applied; pass it to ``apply_patch``,
/// ``grow_patch`` or ``shrink_patch`` together with the same side.
/// Without ``patch_index`` the patch takes the first sub-patch index not
/// yet used by the side's synthesized points.
#[pyfunction]
#[pyo3(signature = (
    points,
    side,
    interval,
    imputation_specificity = 0.0,
    max_side_points = 17,
    degree = 5,
    boundary_multiplicity = 2,
    patch_index = None,
))]
pub fn generate_patch(
    points: Vec<PyLandmarkPoint>,
    side: &str,
    interval: usize,
    imputation_specificity: f64,
    max_side_points: usize,
    degree: u32,
    boundary_multiplicity: u32,
    patch_index: Option<usize>,
) -> PyResult<PyPatch> {
    let generator = patch_generator(
        degree,
        boundary_multiplicity,
        imputation_specificity,
        max_side_points,
    )?;
    let side = to_side(&points, side_from_str(side)?);
    let patch_index = patch_index.unwrap_or_else(|| side.next_patch_index());
    let patch = generator
        .generate(&side, interval, patch_index)
        .map_err(to_py_err)?;
    Ok(patch.into())
}

/// Adds one point to a patch ("add point to patch").
#[pyfunction]
#[pyo3(signature = (points, patch, max_side_points = 17, degree = 5, boundary_multiplicity = 2))]
pub fn grow_patch(
    points: Vec<PyLandmarkPoint>,
    patch: &PyPatch,
    max_side_points: usize,
    degree: u32,
    boundary_multiplicity: u32,
) -> PyResult<PyPatch> {
    let generator = patch_generator(degree, boundary_multiplicity, 0.0, max_side_points)?;
    let side = to_side(&points, patch.inner.side);
    let grown = generator.grow(&side, &patch.inner).map_err(to_py_err)?;
    Ok(grown.into())
}

/// Removes one point from a patch ("remove point").
#[pyfunction]
#[pyo3(signature = (points, patch, max_side_points = 17, degree = 5, boundary_multiplicity = 2))]
pub fn shrink_patch(
    points: Vec<PyLandmarkPoint>,
    patch: &PyPatch,
    max_side_points: usize,
    degree: u32,
    boundary_multiplicity: u32,
) -> PyResult<PyPatch> {
    let generator = patch_generator(degree, boundary_multiplicity, 0.0, max_side_points)?;
    let side = to_side(&points, patch.inner.side);
    let shrunk = generator.shrink(&side, &patch.inner).map_err(to_py_err)?;
    Ok(shrunk.into())
}

/// Merges an accepted patch into its side and returns the side, top first.
///
/// Raises ``ValueError`` if a patch label is already on the side.
#[pyfunction]
pub fn apply_patch(
    points: Vec<PyLandmarkPoint>,
    patch: &PyPatch,
) -> PyResult<Vec<PyLandmarkPoint>> {
    let side = to_side(&points, patch.inner.side);
    let patched = side.apply_patch(&patch.inner).map_err(to_py_err)?;
    Ok(to_py_points(patched.points()))
}

/// Classifies, detects omissions and imputes missing landmarks on both sides.
///
/// When ``config_path`` is given, the ``[repair]`` table of that TOML file
/// replaces the keyword parameters.
#[pyfunction]
#[pyo3(signature = (
    points,
    km_window_size = 4,
    poly_fit_degree = 5,
    boundary_multiplicity = 2,
    omission_detection_specificity = 1.0,
    imputation_specificity = 0.0,
    max_total_points = 34,
    config_path = None,
))]
pub fn repair_landmarks(
    points: Vec<PyLandmarkPoint>,
    km_window_size: u32,
    poly_fit_degree: u32,
    boundary_multiplicity: u32,
    omission_detection_specificity: f64,
    imputation_specificity: f64,
    max_total_points: u32,
    config_path: Option<&str>,
) -> PyResult<PyRepairOutcome> {
    let params = match config_path {
        Some(path) => Config::from_file(path).map_err(anyhow_to_py_err)?.repair,
        None => RepairParams {
            km_window_size,
            poly_fit_degree,
            boundary_multiplicity,
            omission_detection_specificity,
            imputation_specificity,
            max_total_points,
            ..RepairParams::default()
        },
    };
    let outcome =
        crate::repair::repair_landmarks(&to_landmarks(&points), &params).map_err(to_py_err)?;
    Ok(outcome.into())
}

/// Compares a patient's sides to the reference spine.
///
/// Example:
///
/// .. code-block:: python
///
///    ref = lm.load_reference_model("reference.csv", "reference.obj")
///    result = lm.assess_posture(left, right, ref)
///    result.cobb_angle, result.max_right, result.max_left
#[pyfunction]
#[pyo3(signature = (left, right, reference, poly_degree = 4, sample_points = 100))]
pub fn assess_posture(
    left: Vec<PyLandmarkPoint>,
    right: Vec<PyLandmarkPoint>,
    reference: &PyReferenceModel,
    poly_degree: u32,
    sample_points: u32,
) -> PyResult<PyPostureAssessment> {
    let assessment = PostureAssessor::new(poly_degree, sample_points)
        .assess(
            &to_side(&left, Side::Left),
            &to_side(&right, Side::Right),
            &reference.inner,
        )
        .map_err(to_py_err)?;
    Ok(assessment.into())
}

/// Cobb angle estimate as ``(angle_deg, top_level, bottom_level)``.
#[pyfunction]
pub fn cobb_angle(
    left: Vec<PyLandmarkPoint>,
    right: Vec<PyLandmarkPoint>,
) -> PyResult<(f64, usize, usize)> {
    let cobb = crate::assess::cobb_angle(
        &OrderedSide::new(Side::Left, to_landmarks(&left)),
        &OrderedSide::new(Side::Right, to_landmarks(&right)),
    )
    .map_err(to_py_err)?;
    Ok((cobb.angle_deg, cobb.top_level, cobb.bottom_level))
}

/// Reads ``label,x,y,z`` rows from a comma or tab separated file.
#[pyfunction]
pub fn load_landmarks(path: &str) -> PyResult<Vec<PyLandmarkPoint>> {
    let points = crate::io::read_landmarks(path).map_err(anyhow_to_py_err)?;
    Ok(to_py_points(&points))
}

/// Loads the reference landmarks and an optional OBJ surface mesh.
#[pyfunction]
#[pyo3(signature = (points_path, mesh_path = None))]
pub fn load_reference_model(
    points_path: &str,
    mesh_path: Option<&str>,
) -> PyResult<PyReferenceModel> {
    let model =
        crate::io::load_reference_model(points_path, mesh_path).map_err(anyhow_to_py_err)?;
    Ok(model.into())
}
