use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

use crate::assess::{Mesh, ReferenceModel};
use crate::landmarks::LandmarkPoint;

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    if tabs > commas {
        Ok(b'\t')
    } else {
        Ok(b',')
    }
}

/// Reads `label,x,y,z` rows (with header). Malformed rows are skipped with a warning.
pub fn read_landmarks<P: AsRef<Path>>(path: P) -> Result<Vec<LandmarkPoint>> {
    let delim = detect_delimiter(&path)?;
    let file = File::open(&path)
        .with_context(|| format!("failed to open landmark file {:?}", path.as_ref()))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut points = Vec::new();
    for (row, result) in reader.deserialize::<LandmarkPoint>().enumerate() {
        match result {
            Ok(point) => points.push(point),
            Err(e) => warn!("skipping invalid landmark row {}: {}", row + 1, e),
        }
    }
    if points.is_empty() {
        bail!("no landmarks found in {:?}", path.as_ref());
    }
    Ok(points)
}

/// Reads vertices and faces of a Wavefront OBJ file. Polygons are fan-triangulated,
/// texture and normal references (`f 1/1/1 ...`) are ignored.
pub fn read_obj_mesh<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let file = File::open(&path)
        .with_context(|| format!("failed to open mesh file {:?}", path.as_ref()))?;
    let reader = BufReader::new(file);

    let mut vertices = Vec::new();
    let mut triangles = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let coords = tokens
                    .take(3)
                    .map(|t| t.parse::<f64>())
                    .collect::<std::result::Result<Vec<f64>, _>>()
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?;
                if coords.len() != 3 {
                    bail!("vertex on line {} has {} coordinates", line_no + 1, coords.len());
                }
                vertices.push([coords[0], coords[1], coords[2]]);
            }
            Some("f") => {
                let indices = tokens
                    .map(|t| parse_face_index(t, vertices.len()))
                    .collect::<Result<Vec<usize>>>()
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if indices.len() < 3 {
                    bail!("face on line {} has fewer than three vertices", line_no + 1);
                }
                for k in 1..indices.len() - 1 {
                    triangles.push([indices[0], indices[k], indices[k + 1]]);
                }
            }
            _ => {}
        }
    }

    Mesh::new(vertices, triangles)
        .with_context(|| format!("inconsistent mesh in {:?}", path.as_ref()))
}

/// OBJ indices are 1-based; negative values count back from the last vertex read.
fn parse_face_index(token: &str, vertex_count: usize) -> Result<usize> {
    let raw = token.split('/').next().unwrap_or(token);
    let idx: i64 = raw
        .parse()
        .with_context(|| format!("bad face index '{}'", token))?;
    let resolved = if idx > 0 {
        idx - 1
    } else {
        vertex_count as i64 + idx
    };
    if idx == 0 || resolved < 0 {
        bail!("face index {} out of range", idx);
    }
    Ok(resolved as usize)
}

/// Loads the reference landmarks and, when given, the reference surface mesh.
pub fn load_reference_model<P: AsRef<Path>>(
    points_path: P,
    mesh_path: Option<P>,
) -> Result<ReferenceModel> {
    let points = read_landmarks(&points_path)?;
    let mesh = match mesh_path {
        Some(path) => Some(read_obj_mesh(path)?),
        None => None,
    };
    ReferenceModel::from_points(&points, mesh)
        .with_context(|| format!("invalid reference landmarks in {:?}", points_path.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("landmarkrs_{}_{}", std::process::id(), name));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_landmarks_comma_and_tab() {
        let csv = temp_file("comma.csv", "label,x,y,z\nT1L,-30.0,1.5,0\nT1R, 30.0,1.5,0\n");
        let points = read_landmarks(&csv).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1], LandmarkPoint::new("T1R", 30.0, 1.5, 0.0));

        let tsv = temp_file("tab.tsv", "label\tx\ty\tz\nT2L\t-29\t2\t-25\nbroken\tx\t0\t0\n");
        let points = read_landmarks(&tsv).unwrap();
        assert_eq!(points, vec![LandmarkPoint::new("T2L", -29.0, 2.0, -25.0)]);

        std::fs::remove_file(csv).unwrap();
        std::fs::remove_file(tsv).unwrap();
    }

    #[test]
    fn test_empty_landmark_file_is_an_error() {
        let path = temp_file("empty.csv", "label,x,y,z\n");
        assert!(read_landmarks(&path).is_err());
        std::fs::remove_file(path).unwrap();
        assert!(read_landmarks("/nonexistent/landmarks.csv").is_err());
    }

    #[test]
    fn test_read_obj_mesh() {
        let path = temp_file(
            "quad.obj",
            concat!(
                "# quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\n",
                "f 1/1/1 2/2/1 3/3/1 4/4/1\nf -4 -3 -2\n",
            ),
        );
        let mesh = read_obj_mesh(&path).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3], [0, 1, 2]]);
        std::fs::remove_file(path).unwrap();

        let bad = temp_file("bad.obj", "v 0 0 0\nf 1 2 3\n");
        assert!(read_obj_mesh(&bad).is_err());
        std::fs::remove_file(bad).unwrap();
    }

    #[test]
    fn test_load_reference_model() {
        let mut csv = String::from("label,x,y,z\n");
        for level in 0..17 {
            let z = -25.0 * level as f64;
            csv.push_str(&format!(
                "{}L,-30,0,{}\n{}R,30,0,{}\n",
                crate::landmarks::VERTEBRA_LEVELS[level],
                z,
                crate::landmarks::VERTEBRA_LEVELS[level],
                z
            ));
        }
        let points = temp_file("reference.csv", &csv);
        let mesh = temp_file("reference.obj", "v 0 0 0\nv 1 0 0\nv 0 0 -1\nf 1 2 3\n");

        let model = load_reference_model(&points, Some(&mesh)).unwrap();
        assert_eq!(model.left.len(), 17);
        assert_eq!(model.right.points()[16].label, "L5R");
        assert_eq!(model.mesh.unwrap().triangles.len(), 1);

        let without_mesh = load_reference_model(&points, None).unwrap();
        assert!(without_mesh.mesh.is_none());

        std::fs::remove_file(points).unwrap();
        std::fs::remove_file(mesh).unwrap();
    }
}
