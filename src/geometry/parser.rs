// src/geometry/parser.rs
//
// Strict geometry dump parser. A dump either parses completely or fails with
// the first malformed entry; no partial mesh ever leaves this module.
//
// Line formats:
//   V:idx,(x,y,z,hue);idx,(x,y,z,hue);...   vertices, hue in 0..=255
//   E:(a-b)(a-b)...                          edges
//   f<n>:i,i,i,...                           one face per line
// Anything else (tags, future sections) is ignored.

use std::num::{IntErrorKind, ParseIntError};

use once_cell::sync::Lazy;
use regex::Regex;

use super::mesh::Mesh;
use crate::io::error::IoError;

static EDGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d+)-(\d+)\)").expect("edge pattern is valid"));

const HUE_SCALE: f64 = 255.0;

/// Stands in for an integer index that cannot name a vertex (negative or
/// too large); `Mesh::retain_valid_references` drops whatever holds it.
const OUT_OF_RANGE: usize = usize::MAX;

fn geo_error(message: String) -> IoError {
    IoError::protocol("geo", message)
}

/// Parse a geometry batch into a mesh.
///
/// Index ranges are not checked here; see `Mesh::retain_valid_references`.
/// Only a token that is not an integer at all fails the batch.
pub fn parse<S: AsRef<str>>(lines: &[S]) -> Result<Mesh, IoError> {
    let mut mesh = Mesh::default();

    for line in lines {
        let line = line.as_ref();
        if let Some(body) = line.strip_prefix("V:") {
            parse_vertex_section(body, &mut mesh)?;
        } else if line.starts_with("E:") {
            mesh.edges.extend(parse_edge_section(line)?);
        } else if line.starts_with('f') {
            mesh.faces.push(parse_face_line(line)?);
        }
    }

    Ok(mesh)
}

fn parse_vertex_section(body: &str, mesh: &mut Mesh) -> Result<(), IoError> {
    for record in body.trim().split(';') {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let (position, hue) = parse_vertex_record(record)?;
        mesh.vertices.push(position);
        mesh.hues.push(hue / HUE_SCALE);
    }
    Ok(())
}

/// `idx,(x,y,z,hue)` -> position and raw hue. The leading index is discarded.
fn parse_vertex_record(record: &str) -> Result<([f64; 3], f64), IoError> {
    let (_, rest) = record
        .split_once(',')
        .ok_or_else(|| geo_error(format!("vertex record without index: {:?}", record)))?;

    let fields: Vec<&str> = rest
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .collect();
    if fields.len() != 4 {
        return Err(geo_error(format!(
            "vertex record needs 4 fields, got {}: {:?}",
            fields.len(),
            record
        )));
    }

    let mut values = [0.0f64; 4];
    for (slot, field) in values.iter_mut().zip(&fields) {
        *slot = field
            .trim()
            .parse::<f64>()
            .map_err(|e| geo_error(format!("bad vertex field {:?} in {:?}: {}", field, record, e)))?;
    }

    Ok(([values[0], values[1], values[2]], values[3]))
}

/// Every `(a-b)` pair on the line. A line with no pair is malformed.
fn parse_edge_section(line: &str) -> Result<Vec<(usize, usize)>, IoError> {
    let mut edges = Vec::new();
    for caps in EDGE_RE.captures_iter(line) {
        // All digits, so the only possible failure is overflow
        let a = caps[1].parse::<usize>().unwrap_or(OUT_OF_RANGE);
        let b = caps[2].parse::<usize>().unwrap_or(OUT_OF_RANGE);
        edges.push((a, b));
    }
    if edges.is_empty() {
        return Err(geo_error(format!("no valid edge pairs in line: {:?}", line)));
    }
    Ok(edges)
}

/// `f<n>:i,i,i` -> vertex indices. Empty tokens are skipped.
fn parse_face_line(line: &str) -> Result<Vec<usize>, IoError> {
    let (_, body) = line
        .split_once(':')
        .ok_or_else(|| geo_error(format!("face line without ':': {:?}", line)))?;

    body.trim()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            parse_face_index(token)
                .map_err(|e| geo_error(format!("bad face index {:?} in {:?}: {}", token, line, e)))
        })
        .collect()
}

fn parse_face_index(token: &str) -> Result<usize, ParseIntError> {
    match token.parse::<i64>() {
        Ok(v) => Ok(usize::try_from(v).unwrap_or(OUT_OF_RANGE)),
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            Ok(OUT_OF_RANGE)
        }
        Err(e) => Err(e),
    }
}

// ============================================================================
// Tests
// ============================================================================
