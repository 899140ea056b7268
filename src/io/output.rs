use anyhow::Context;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::assess::{Mesh, PostureAssessment};
use crate::landmarks::LandmarkPoint;

pub fn write_landmarks_csv<P: AsRef<Path>>(
    points: &[LandmarkPoint],
    path: P,
) -> anyhow::Result<()> {
    let file = File::create(&path)
        .with_context(|| format!("failed to create landmark file {:?}", path.as_ref()))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_assessment_json<P: AsRef<Path>>(
    assessment: &PostureAssessment,
    path: P,
) -> anyhow::Result<()> {
    let file = File::create(&path)
        .with_context(|| format!("failed to create assessment file {:?}", path.as_ref()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), assessment)
        .with_context(|| format!("failed to write assessment to {:?}", path.as_ref()))?;
    Ok(())
}

pub fn write_obj_mesh<P: AsRef<Path>>(mesh: &Mesh, path: P) -> anyhow::Result<()> {
    let file = File::create(&path)
        .with_context(|| format!("failed to create mesh file {:?}", path.as_ref()))?;
    let mut writer = BufWriter::new(file);
    for [x, y, z] in &mesh.vertices {
        writeln!(writer, "v {} {} {}", x, y, z)?;
    }
    // OBJ indices are 1-based
    for [a, b, c] in &mesh.triangles {
        writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    writer.flush()?;
    Ok(())
}
