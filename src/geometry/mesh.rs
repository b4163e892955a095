// src/geometry/mesh.rs
//
// Polyhedral mesh decoded from a geometry dump.

use serde::Serialize;

use crate::protocol::{GEO_END, GEO_START};

/// Vertex positions, per-vertex hue, edges and faces.
///
/// `hues[i]` belongs to `vertices[i]`. Edges and faces reference vertices by
/// position in `vertices`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Mesh {
    pub vertices: Vec<[f64; 3]>,
    /// Normalised to [0, 1]
    pub hues: Vec<f64>,
    pub edges: Vec<(usize, usize)>,
    pub faces: Vec<Vec<usize>>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// A mesh with no vertices or no edges has nothing to show.
    pub fn is_displayable(&self) -> bool {
        !self.vertices.is_empty() && !self.edges.is_empty()
    }

    /// Drop edges and faces that reference a vertex past the end. Indices
    /// the parser could not represent (negative, overflowing) land here too.
    /// Returns the number of dropped edges and faces.
    pub fn retain_valid_references(&mut self) -> usize {
        let n = self.vertices.len();
        let before = self.edges.len() + self.faces.len();
        self.edges.retain(|&(a, b)| a < n && b < n);
        self.faces.retain(|face| face.iter().all(|&v| v < n));
        before - (self.edges.len() + self.faces.len())
    }

    /// Encode as protocol lines, `#geo#` through `#endgeo#`.
    /// Hues are quantised back to 0..=255.
    pub fn to_wire_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.faces.len() + 4);
        lines.push(GEO_START.to_string());

        let records: Vec<String> = self
            .vertices
            .iter()
            .zip(&self.hues)
            .enumerate()
            .map(|(i, (v, h))| {
                let hue = (h * 255.0).round().clamp(0.0, 255.0) as u32;
                format!("{},({},{},{},{})", i, v[0], v[1], v[2], hue)
            })
            .collect();
        lines.push(format!("V:{}", records.join(";")));

        let pairs: String = self
            .edges
            .iter()
            .map(|(a, b)| format!("({}-{})", a, b))
            .collect();
        lines.push(format!("E:{}", pairs));

        for (i, face) in self.faces.iter().enumerate() {
            let idxs: Vec<String> = face.iter().map(|v| v.to_string()).collect();
            lines.push(format!("f{}:{}", i, idxs.join(",")));
        }

        lines.push(GEO_END.to_string());
        lines
    }
}
