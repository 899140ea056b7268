use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;

use crate::assess::{Mesh, PostureAssessment, ReferenceModel};
use crate::fitting::CurveModel;
use crate::landmarks::{LandmarkPoint, OrderedSide, Side};
use crate::repair::{Patch, PatchStatus, RepairOutcome};

use super::to_py_err;

/// Python representation of a labeled landmark
///
/// Attributes:
///     label (str): Vertebra and side (e.g. "T7L") or provenance tag of an imputed point
///     x (float): Lateral coordinate in mm (negative is left)
///     y (float): Anterior-posterior coordinate in mm
///     z (float): Superior-inferior coordinate in mm
///
/// Example:
///     >>> point = PyLandmarkPoint("T7L", -31.2, 4.0, -150.5)
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyLandmarkPoint {
    #[pyo3(get, set)]
    pub label: String,
    #[pyo3(get, set)]
    pub x: f64,
    #[pyo3(get, set)]
    pub y: f64,
    #[pyo3(get, set)]
    pub z: f64,
}

#[pymethods]
impl PyLandmarkPoint {
    #[new]
    fn new(label: String, x: f64, y: f64, z: f64) -> Self {
        Self { label, x, y, z }
    }

    fn __repr__(&self) -> String {
        format!(
            "Landmark(label={}, x={:.2}, y={:.2}, z={:.2})",
            self.label, self.x, self.y, self.z
        )
    }

    /// Euclidean distance to another PyLandmarkPoint
    pub fn distance(&self, other: &PyLandmarkPoint) -> f64 {
        LandmarkPoint::from(self).distance_to(&LandmarkPoint::from(other))
    }
}

impl From<&LandmarkPoint> for PyLandmarkPoint {
    fn from(point: &LandmarkPoint) -> Self {
        Self {
            label: point.label.clone(),
            x: point.x,
            y: point.y,
            z: point.z,
        }
    }
}

impl From<&PyLandmarkPoint> for LandmarkPoint {
    fn from(point: &PyLandmarkPoint) -> Self {
        LandmarkPoint::new(point.label.clone(), point.x, point.y, point.z)
    }
}

pub fn to_landmarks(points: &[PyLandmarkPoint]) -> Vec<LandmarkPoint> {
    points.iter().map(LandmarkPoint::from).collect()
}

pub fn to_py_points(points: &[LandmarkPoint]) -> Vec<PyLandmarkPoint> {
    points.iter().map(PyLandmarkPoint::from).collect()
}

pub fn side_from_str(side: &str) -> PyResult<Side> {
    match side.to_ascii_lowercase().as_str() {
        "left" | "l" => Ok(Side::Left),
        "right" | "r" => Ok(Side::Right),
        _ => Err(pyo3::exceptions::PyValueError::new_err(format!(
            "side must be 'left' or 'right', got '{}'",
            side
        ))),
    }
}

pub fn to_side(points: &[PyLandmarkPoint], side: Side) -> OrderedSide {
    OrderedSide::new(side, to_landmarks(points))
}

/// Fitted curves of one side
///
/// Attributes:
///     s_top (float): Height of the top landmark
///     s_bottom (float): Height of the bottom landmark
///     interval_lengths ([float]): Arc length of every inter-landmark interval
///     residuals ([float]): Interval length minus frequency polynomial prediction
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyCurveModel {
    pub inner: CurveModel,
}

#[pymethods]
impl PyCurveModel {
    #[getter]
    fn s_top(&self) -> f64 {
        self.inner.s_top
    }

    #[getter]
    fn s_bottom(&self) -> f64 {
        self.inner.s_bottom
    }

    #[getter]
    fn interval_lengths(&self) -> Vec<f64> {
        self.inner.spacing.iter().map(|sp| sp.length).collect()
    }

    #[getter]
    fn midpoint_arcs(&self) -> Vec<f64> {
        self.inner.spacing.iter().map(|sp| sp.midpoint_arc).collect()
    }

    #[getter]
    fn residuals(&self) -> Vec<f64> {
        self.inner.residuals()
    }

    /// Point of the fitted centerline at height `s`
    ///
    /// Example:
    ///     >>> model.point_at(-120.0)
    ///     (-28.7, 3.1, -120.0)
    fn point_at(&self, s: f64) -> (f64, f64, f64) {
        let p = self.inner.point_at(s);
        (p.x, p.y, p.z)
    }

    fn __repr__(&self) -> String {
        format!(
            "CurveModel(intervals={}, length={:.1}, s=[{:.1}, {:.1}])",
            self.inner.spacing.len(),
            self.inner.total_length(),
            self.inner.s_top,
            self.inner.s_bottom
        )
    }
}

impl From<CurveModel> for PyCurveModel {
    fn from(inner: CurveModel) -> Self {
        Self { inner }
    }
}

/// Imputed points for one flagged interval, held by the caller until applied
///
/// Attributes:
///     index (int): Sub-patch index used in the point labels
///     side (str): "left" or "right"
///     interval (int): Interval of the unpatched side
///     points ([PyLandmarkPoint]): Synthesized points, top first
///     status (str): "converged", "no_improvement_found" or "point_count_cap_reached"
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyPatch {
    pub inner: Patch,
}

#[pymethods]
impl PyPatch {
    #[getter]
    fn index(&self) -> usize {
        self.inner.index
    }

    #[getter]
    fn side(&self) -> String {
        self.inner.side.to_string()
    }

    #[getter]
    fn interval(&self) -> usize {
        self.inner.interval
    }

    #[getter]
    fn upper_label(&self) -> String {
        self.inner.upper_label.clone()
    }

    #[getter]
    fn lower_label(&self) -> String {
        self.inner.lower_label.clone()
    }

    #[getter]
    fn points(&self) -> Vec<PyLandmarkPoint> {
        to_py_points(&self.inner.points)
    }

    #[getter]
    fn status(&self) -> &'static str {
        match self.inner.status {
            PatchStatus::Converged => "converged",
            PatchStatus::NoImprovementFound => "no_improvement_found",
            PatchStatus::PointCountCapReached => "point_count_cap_reached",
        }
    }

    #[getter]
    fn normalized_errors(&self) -> Vec<f64> {
        self.inner.normalized_errors.clone()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "Patch(index={}, side={}, interval={}, points={}, status={})",
            self.inner.index,
            self.inner.side,
            self.inner.interval,
            self.inner.len(),
            self.status()
        )
    }
}

impl From<Patch> for PyPatch {
    fn from(inner: Patch) -> Self {
        Self { inner }
    }
}

/// Result of the full repair pipeline
///
/// Attributes:
///     left ([PyLandmarkPoint]): Repaired left side, top first
///     right ([PyLandmarkPoint]): Repaired right side, top first
///     patches ([PyPatch]): Every generated patch, including empty ones
///     flagged_left ([int]): Flagged intervals of the unrepaired left side
///     flagged_right ([int]): Flagged intervals of the unrepaired right side
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyRepairOutcome {
    #[pyo3(get)]
    pub left: Vec<PyLandmarkPoint>,
    #[pyo3(get)]
    pub right: Vec<PyLandmarkPoint>,
    #[pyo3(get)]
    pub patches: Vec<PyPatch>,
    #[pyo3(get)]
    pub flagged_left: Vec<usize>,
    #[pyo3(get)]
    pub flagged_right: Vec<usize>,
}

#[pymethods]
impl PyRepairOutcome {
    fn __repr__(&self) -> String {
        format!(
            "RepairOutcome(left={}, right={}, patches={})",
            self.left.len(),
            self.right.len(),
            self.patches.len()
        )
    }
}

impl From<RepairOutcome> for PyRepairOutcome {
    fn from(outcome: RepairOutcome) -> Self {
        Self {
            left: to_py_points(outcome.left.points()),
            right: to_py_points(outcome.right.points()),
            patches: outcome.patches.into_iter().map(PyPatch::from).collect(),
            flagged_left: outcome.flagged_left.into_iter().collect(),
            flagged_right: outcome.flagged_right.into_iter().collect(),
        }
    }
}

/// Normative spine (34 labeled landmarks plus optional surface mesh)
///
/// Example:
///     >>> ref = PyReferenceModel(points, vertices=[(0, 0, 0), ...], triangles=[(0, 1, 2), ...])
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyReferenceModel {
    pub inner: ReferenceModel,
}

#[pymethods]
impl PyReferenceModel {
    #[new]
    #[pyo3(signature = (points, vertices = None, triangles = None))]
    fn new(
        points: Vec<PyLandmarkPoint>,
        vertices: Option<Vec<(f64, f64, f64)>>,
        triangles: Option<Vec<(usize, usize, usize)>>,
    ) -> PyResult<Self> {
        let mesh = match vertices {
            Some(vertices) => Some(
                Mesh::new(
                    vertices.into_iter().map(|(x, y, z)| [x, y, z]).collect(),
                    triangles
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(a, b, c)| [a, b, c])
                        .collect(),
                )
                .map_err(to_py_err)?,
            ),
            None => None,
        };
        let inner = ReferenceModel::from_points(&to_landmarks(&points), mesh).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn left(&self) -> Vec<PyLandmarkPoint> {
        to_py_points(self.inner.left.points())
    }

    #[getter]
    fn right(&self) -> Vec<PyLandmarkPoint> {
        to_py_points(self.inner.right.points())
    }

    #[getter]
    fn has_mesh(&self) -> bool {
        self.inner.mesh.is_some()
    }

    fn __repr__(&self) -> String {
        format!(
            "ReferenceModel(left={}, right={}, mesh={})",
            self.inner.left.len(),
            self.inner.right.len(),
            self.inner
                .mesh
                .as_ref()
                .map(|m| format!("{} vertices", m.vertices.len()))
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

impl From<ReferenceModel> for PyReferenceModel {
    fn from(inner: ReferenceModel) -> Self {
        Self { inner }
    }
}

/// Posture metrics of one patient
///
/// Lateral and anterior-posterior deviations are reference minus patient
/// midline, sampled over the heights both spines cover.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyPostureAssessment {
    pub inner: PostureAssessment,
}

#[pymethods]
impl PyPostureAssessment {
    #[getter]
    fn cobb_angle(&self) -> f64 {
        self.inner.cobb.angle_deg
    }

    /// (top, bottom) indices of the extremal levels
    #[getter]
    fn cobb_levels(&self) -> (usize, usize) {
        (self.inner.cobb.top_level, self.inner.cobb.bottom_level)
    }

    #[getter]
    fn cobb_level_names(&self) -> (String, String) {
        (
            self.inner.cobb.top_name.clone(),
            self.inner.cobb.bottom_name.clone(),
        )
    }

    #[getter]
    fn tilts(&self) -> Vec<f64> {
        self.inner.cobb.tilts_deg.clone()
    }

    #[getter]
    fn max_right(&self) -> f64 {
        self.inner.max_right()
    }

    #[getter]
    fn max_left(&self) -> f64 {
        self.inner.max_left()
    }

    #[getter]
    fn rms_lateral(&self) -> f64 {
        self.inner.rms_lateral()
    }

    #[getter]
    fn max_anterior(&self) -> f64 {
        self.inner.max_anterior()
    }

    #[getter]
    fn max_posterior(&self) -> f64 {
        self.inner.max_posterior()
    }

    #[getter]
    fn rms_anteroposterior(&self) -> f64 {
        self.inner.rms_anteroposterior()
    }

    /// Heights of (max right, max left, max anterior, max posterior)
    #[getter]
    fn extrema_heights(&self) -> (f64, f64, f64, f64) {
        (
            self.inner.lateral.max_positive_at,
            self.inner.lateral.max_negative_at,
            self.inner.anteroposterior.max_positive_at,
            self.inner.anteroposterior.max_negative_at,
        )
    }

    #[getter]
    fn patient_length(&self) -> f64 {
        self.inner.patient_length
    }

    #[getter]
    fn reference_length(&self) -> f64 {
        self.inner.reference_length
    }

    #[getter]
    fn scale_factor(&self) -> f64 {
        self.inner.registered.scale_factor
    }

    /// Reference landmarks after alignment and scaling, left then right
    #[getter]
    fn registered_points(&self) -> Vec<PyLandmarkPoint> {
        let registered = &self.inner.registered;
        registered
            .left
            .points()
            .iter()
            .chain(registered.right.points())
            .map(PyLandmarkPoint::from)
            .collect()
    }

    /// Registered reference mesh as (vertices, triangles), or None
    #[getter]
    fn registered_mesh(&self) -> Option<(Vec<(f64, f64, f64)>, Vec<(usize, usize, usize)>)> {
        self.inner.registered.mesh.as_ref().map(|mesh| {
            (
                mesh.vertices.iter().map(|&[x, y, z]| (x, y, z)).collect(),
                mesh.triangles.iter().map(|&[a, b, c]| (a, b, c)).collect(),
            )
        })
    }

    /// Serializes the assessment as pretty-printed JSON
    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string_pretty(&self.inner)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "PostureAssessment(cobb={:.1}, max_right={:.1}, max_left={:.1}, rms_lateral={:.2})",
            self.inner.cobb.angle_deg,
            self.inner.max_right(),
            self.inner.max_left(),
            self.inner.rms_lateral()
        )
    }
}

impl From<PostureAssessment> for PyPostureAssessment {
    fn from(inner: PostureAssessment) -> Self {
        Self { inner }
    }
}
