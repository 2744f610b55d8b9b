//! Wavefront OBJ text mesh parser
//!
//! Reads `v`, `vn`, `s` and `f` directives; everything else is ignored. Faces are
//! fan-triangulated. Normals come from one of three places, decided once the whole
//! file has been read:
//!
//! - faces referencing `vn` entries: the referenced normals are summed per position
//!   and normalized,
//! - smoothing off (`s off` / `s 0` as the last `s` directive): every triangle gets
//!   three fresh vertices carrying its face normal, degenerate triangles are dropped,
//! - smoothing on (the default): face normals are summed per position, then summed
//!   again across positions with bit-identical coordinates, then normalized.
//!
//! A file without faces has no normals.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{AssetError, AssetResult};
use crate::foundation::math::Vec3;

/// Geometry read from a text mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMesh {
    /// Vertex positions
    pub positions: Vec<Vec3>,
    /// Triangle list, every entry `< positions.len()`
    pub indices: Vec<u32>,
    /// One normal per position, when supplied or derivable
    pub normals: Option<Vec<Vec3>>,
}

impl ParsedMesh {
    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Parse an OBJ file from disk
pub fn parse_obj_file(path: impl AsRef<Path>) -> AssetResult<ParsedMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AssetError::io(path, e))?;
    let mesh = parse_reader(BufReader::new(file), path)?;
    log::info!(
        "Parsed {:?}: {} positions, {} triangles, normals {}",
        path,
        mesh.positions.len(),
        mesh.triangle_count(),
        if mesh.normals.is_some() { "present" } else { "absent" }
    );
    Ok(mesh)
}

/// Parse OBJ text from any buffered reader
pub fn parse_obj<R: BufRead>(reader: R) -> AssetResult<ParsedMesh> {
    parse_reader(reader, Path::new("<reader>"))
}

fn parse_reader<R: BufRead>(reader: R, origin: &Path) -> AssetResult<ParsedMesh> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut file_normals: Vec<Vec3> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();
    let mut normal_sums: Vec<Vec3> = Vec::new();
    let mut normals_referenced = false;
    let mut smoothing = true;

    for (line_index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AssetError::io(origin, e))?;
        let line_number = line_index + 1;
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("v") => positions.push(parse_vec3(parts, line_number, "vertex")?),
            Some("vn") => file_normals.push(parse_vec3(parts, line_number, "normal")?),
            Some("s") => smoothing = !matches!(parts.next(), Some("off" | "0")),
            Some("f") => {
                let mut corners: Vec<usize> = Vec::new();
                for token in parts {
                    let mut fields = token.split('/');
                    let position = fields.next().unwrap_or_default();
                    let position = resolve_index(position, positions.len(), "position", line_number)?;

                    if let Some(normal) = fields.nth(1).filter(|field| !field.is_empty()) {
                        let normal = resolve_index(normal, file_normals.len(), "normal", line_number)?;
                        if normal_sums.len() < positions.len() {
                            normal_sums.resize(positions.len(), Vec3::zeros());
                        }
                        normal_sums[position] += file_normals[normal];
                        normals_referenced = true;
                    }

                    corners.push(position);
                }

                if corners.len() < 3 {
                    return Err(AssetError::Format(format!(
                        "line {line_number}: face with fewer than 3 vertices"
                    )));
                }

                for i in 1..corners.len() - 1 {
                    for corner in [corners[0], corners[i], corners[i + 1]] {
                        indices.push(to_index(corner)?);
                    }
                }
            }
            _ => {}
        }
    }

    let normals = if normals_referenced {
        normal_sums.resize(positions.len(), Vec3::zeros());
        for normal in &mut normal_sums {
            normalize_in_place(normal);
        }
        Some(normal_sums)
    } else if indices.is_empty() {
        None
    } else if smoothing {
        Some(smooth_normals(&positions, &indices))
    } else {
        let (flat_positions, flat_indices, flat_normals) = flat_rebuild(&positions, &indices)?;
        positions = flat_positions;
        indices = flat_indices;
        Some(flat_normals)
    };

    Ok(ParsedMesh {
        positions,
        indices,
        normals,
    })
}

fn parse_vec3<'a>(
    mut parts: impl Iterator<Item = &'a str>,
    line_number: usize,
    what: &str,
) -> AssetResult<Vec3> {
    let mut component = |axis: &str| -> AssetResult<f32> {
        parts
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| AssetError::Format(format!("line {line_number}: invalid {what} {axis}")))
    };
    Ok(Vec3::new(component("x")?, component("y")?, component("z")?))
}

/// `i` -> `i - 1`, `-k` -> `count - k`, `0` and anything out of range are errors.
fn resolve_index(token: &str, count: usize, kind: &str, line_number: usize) -> AssetResult<usize> {
    let reference: i64 = token.parse().map_err(|_| {
        AssetError::Format(format!("line {line_number}: invalid {kind} index '{token}'"))
    })?;

    let out_of_range =
        || AssetError::Format(format!("line {line_number}: {kind} index {reference} out of range"));

    match reference {
        0 => Err(AssetError::Format(format!(
            "line {line_number}: {kind} indices are 1-based and cannot be 0"
        ))),
        r if r > 0 => {
            let index = usize::try_from(r - 1).map_err(|_| out_of_range())?;
            if index < count {
                Ok(index)
            } else {
                Err(out_of_range())
            }
        }
        r => {
            let back = usize::try_from(r.unsigned_abs()).map_err(|_| out_of_range())?;
            count.checked_sub(back).ok_or_else(out_of_range)
        }
    }
}

fn to_index(index: usize) -> AssetResult<u32> {
    u32::try_from(index).map_err(|_| AssetError::Format(format!("index {index} does not fit in 32 bits")))
}

/// Unit face normal, `None` for degenerate triangles
fn face_normal(p0: &Vec3, p1: &Vec3, p2: &Vec3) -> Option<Vec3> {
    let normal = (p1 - p0).cross(&(p2 - p0));
    let length = normal.norm();
    (length != 0.0).then(|| normal / length)
}

fn normalize_in_place(normal: &mut Vec3) {
    let length = normal.norm();
    if length != 0.0 {
        *normal /= length;
    }
}

fn corner_positions<'a>(positions: &'a [Vec3], triangle: &[u32]) -> [&'a Vec3; 3] {
    [
        &positions[triangle[0] as usize],
        &positions[triangle[1] as usize],
        &positions[triangle[2] as usize],
    ]
}

fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut sums = vec![Vec3::zeros(); positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [p0, p1, p2] = corner_positions(positions, triangle);
        if let Some(normal) = face_normal(p0, p1, p2) {
            for &corner in triangle {
                sums[corner as usize] += normal;
            }
        }
    }

    // Un-welded duplicates share a normal when their coordinates match bit for bit.
    // `-0.0` and `0.0` differ in their bits, so they stay separate positions.
    let key = |p: &Vec3| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()];
    let mut merged: HashMap<[u32; 3], Vec3> = HashMap::with_capacity(positions.len());
    for (position, sum) in positions.iter().zip(&sums) {
        *merged.entry(key(position)).or_insert_with(Vec3::zeros) += sum;
    }

    positions
        .iter()
        .map(|position| {
            let mut normal = merged.get(&key(position)).copied().unwrap_or_else(Vec3::zeros);
            normalize_in_place(&mut normal);
            normal
        })
        .collect()
}

fn flat_rebuild(positions: &[Vec3], indices: &[u32]) -> AssetResult<(Vec<Vec3>, Vec<u32>, Vec<Vec3>)> {
    let mut flat_positions = Vec::with_capacity(indices.len());
    let mut flat_indices = Vec::with_capacity(indices.len());
    let mut flat_normals = Vec::with_capacity(indices.len());

    for triangle in indices.chunks_exact(3) {
        let corners = corner_positions(positions, triangle);
        let Some(normal) = face_normal(corners[0], corners[1], corners[2]) else {
            continue;
        };
        for position in corners {
            flat_indices.push(to_index(flat_positions.len())?);
            flat_positions.push(*position);
            flat_normals.push(normal);
        }
    }

    Ok((flat_positions, flat_indices, flat_normals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn parse(text: &str) -> AssetResult<ParsedMesh> {
        parse_obj(text.as_bytes())
    }

    fn format_message(result: AssetResult<ParsedMesh>) -> String {
        match result {
            Err(AssetError::Format(message)) => message,
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_quad_fan_triangulation() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_negative_indices_count_from_end() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_negative_index_is_relative_to_positions_so_far() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 -1\nv 5 5 5\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_index_rejected() {
        let message = format_message(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 0\n"));
        assert!(message.starts_with("line 4"), "{message}");
        assert!(message.contains("cannot be 0"));
    }

    #[test]
    fn test_out_of_range_rejected() {
        format_message(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n"));
        format_message(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 -4\n"));
        format_message(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//2 3//1\n"));
    }

    #[test]
    fn test_face_needs_three_corners() {
        let message = format_message(parse("v 0 0 0\nv 1 0 0\nf 1 2\n"));
        assert!(message.contains("fewer than 3"));
    }

    #[test]
    fn test_non_numeric_index_rejected() {
        format_message(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 x\n"));
    }

    #[test]
    fn test_comments_and_unknown_directives_ignored() {
        let mesh = parse(
            "# header\n\no object\ng group\nusemtl red\nv 0 0 0\nvt 0 0\nv 1 0 0\nv 0 1 0\nf 1/1 2/1 3/1\n",
        )
        .unwrap();
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.indices.len(), 3);
    }

    #[test]
    fn test_no_faces_means_no_normals() {
        let mesh = parse("v 0 0 0\nv 1 0 0\n").unwrap();
        assert!(mesh.normals.is_none());
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn test_smooth_default_single_triangle() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        let normals = mesh.normals.unwrap();
        assert_eq!(normals.len(), 3);
        for normal in normals {
            assert_relative_eq!(normal, Vec3::new(0.0, 0.0, 1.0));
        }
    }

    #[test]
    fn test_smooth_merges_bit_identical_positions() {
        // Two triangles sharing an edge, written with duplicated (un-welded) positions.
        let mesh = parse(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 0 0\nv 0 1 0\nv 1 1 1\nf 1 2 3\nf 4 6 5\n",
        )
        .unwrap();
        let normals = mesh.normals.unwrap();
        assert_eq!(normals[1], normals[3]);
        assert_eq!(normals[2], normals[4]);
        assert_relative_eq!(normals[1].norm(), 1.0, epsilon = 1e-6);
        assert!(normals[0] != normals[1]);
    }

    #[test]
    fn test_smooth_keeps_signed_zeros_apart() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nv -0 0 0\nv 0 1 0\nv 0 0 1\nf 1 2 3\nf 4 5 6\n").unwrap();
        let normals = mesh.normals.unwrap();
        assert_relative_eq!(normals[0], Vec3::z(), epsilon = 1e-6);
        assert_relative_eq!(normals[3], Vec3::x(), epsilon = 1e-6);
        // Same bits on both sides, so these two are merged
        assert_eq!(normals[2], normals[4]);
    }

    #[test]
    fn test_smooth_skips_degenerate_triangles() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 2 0 0\nv 0 1 0\nf 1 2 3\nf 1 2 4\n").unwrap();
        let normals = mesh.normals.unwrap();
        assert_eq!(normals[2], Vec3::zeros());
        assert_relative_eq!(normals[3], Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_flat_rebuild_duplicates_and_drops_degenerate() {
        let mesh = parse(
            "s off\nv 0 0 0\nv 1 0 0\nv 0 1 0\nv 2 0 0\nf 1 2 3\nf 1 2 4\nf 2 4 3\n",
        )
        .unwrap();
        // `f 1 2 4` is collinear and vanishes.
        assert_eq!(mesh.positions.len(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        let normals = mesh.normals.unwrap();
        assert_eq!(normals.len(), 6);
        for normal in &normals {
            assert_relative_eq!(normal.norm(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(mesh.positions[3], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_last_smoothing_directive_wins() {
        let mesh = parse("s 0\nv 0 0 0\nv 1 0 0\nv 0 1 0\ns 1\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.positions.len(), 3);
        let mesh = parse("s 1\nv 0 0 0\nv 1 0 0\nv 0 1 0\ns off\nf 1 2 3\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.normals.unwrap().len(), 3);
    }

    #[test]
    fn test_explicit_normals_summed_without_merging() {
        let mesh = parse(
            "s off\nv 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 0\nvn 0 0 2\nvn 0 2 0\nf 1//1 2//1 3//1\nf 4//2 2//2 3//2\n",
        )
        .unwrap();
        // Smoothing off is ignored once normals are referenced: no rebuild.
        assert_eq!(mesh.positions.len(), 4);
        let normals = mesh.normals.unwrap();
        assert_relative_eq!(normals[0], Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(normals[3], Vec3::new(0.0, 1.0, 0.0));
        let diagonal = Vec3::new(0.0, 1.0, 1.0).normalize();
        assert_relative_eq!(normals[1], diagonal, epsilon = 1e-6);
    }

    #[test]
    fn test_explicit_normals_cover_every_position() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\nv 9 9 9\n").unwrap();
        let normals = mesh.normals.unwrap();
        assert_eq!(normals.len(), 4);
        assert_eq!(normals[3], Vec3::zeros());
    }

    #[test]
    fn test_indices_within_positions() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3 4\nf -1 -2 -3\n").unwrap();
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.positions.len()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = parse_obj_file("definitely/not/here.obj").unwrap_err();
        assert!(err.is_io());
    }
}
