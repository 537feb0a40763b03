use std::path::Path;

use nalgebra::Point3;

use crate::error::{FactoryError, FactoryResult};

/// Triangle soup read from a Wavefront OBJ file.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl Mesh {
    pub fn load_obj(path: &Path) -> FactoryResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FactoryError::projection(format!("read mesh '{}': {e}", path.display()))
        })?;
        Self::parse_obj(&text)
            .map_err(|e| FactoryError::projection(format!("'{}': {e}", path.display())))
    }

    /// Only `v` and `f` records matter; everything else is skipped.
    /// Polygons are fan-triangulated.
    pub fn parse_obj(text: &str) -> FactoryResult<Self> {
        let mut mesh = Mesh::default();
        for (n, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut xyz = [0.0; 3];
                    for c in &mut xyz {
                        *c = tokens
                            .next()
                            .and_then(|t| t.parse::<f64>().ok())
                            .filter(|v| v.is_finite())
                            .ok_or_else(|| bad_line(n, "vertex needs three numbers"))?;
                    }
                    mesh.vertices.push(Point3::from(xyz));
                }
                Some("f") => {
                    let face = tokens
                        .map(|t| resolve_index(t, mesh.vertices.len()).ok_or_else(|| bad_line(n, t)))
                        .collect::<FactoryResult<Vec<_>>>()?;
                    if face.len() < 3 {
                        return Err(bad_line(n, "face needs at least three vertices"));
                    }
                    for i in 1..face.len() - 1 {
                        mesh.triangles.push([face[0], face[i], face[i + 1]]);
                    }
                }
                _ => {}
            }
        }
        if mesh.triangles.is_empty() {
            return Err(FactoryError::projection("mesh has no faces"));
        }
        Ok(mesh)
    }
}

// `f 3/1/2` style references; 1-based, negative counts back from the last vertex.
fn resolve_index(token: &str, vertex_count: usize) -> Option<usize> {
    let raw: i64 = token.split('/').next()?.parse().ok()?;
    let idx = match raw {
        0 => return None,
        r if r > 0 => r - 1,
        r => vertex_count as i64 + r,
    };
    (0..vertex_count as i64).contains(&idx).then_some(idx as usize)
}

fn bad_line(n: usize, what: &str) -> FactoryError {
    FactoryError::projection(format!("obj line {}: {what}", n + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "# quad\no gate\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1/1/1 2/2/1 3/3/1 4/4/1\n";

    #[test]
    fn quad_is_fan_triangulated() {
        let mesh = Mesh::parse_obj(QUAD).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let mesh = Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn broken_meshes_are_projection_failures() {
        for bad in [
            "",
            "v 0 0 0\n",
            "v 0 0\nf 1 1 1\n",
            "v 0 0 0\nv 1 0 0\nf 1 2\n",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n",
        ] {
            assert!(matches!(Mesh::parse_obj(bad), Err(FactoryError::Projection(_))), "{bad:?}");
        }
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Mesh::load_obj(Path::new("/nonexistent/gate.obj")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gate.obj"));
    }
}
