//! PCD (Point Cloud Data v0.7) encoder
//!
//! Writes `x y z intensity` as float32, one point per non-sentinel entry.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::ScanPoint;

/// DATA section encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcdEncoding {
    Ascii,
    #[default]
    Binary,
}

impl PcdEncoding {
    fn keyword(self) -> &'static str {
        match self {
            PcdEncoding::Ascii => "ascii",
            PcdEncoding::Binary => "binary",
        }
    }

    /// Parse from a params value ("ascii" / "binary")
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "ascii" => Some(Self::Ascii),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Encode points into `writer`, skipping sentinels
///
/// `viewpoint` is recorded in the header (translation + quaternion w x y z).
/// Returns the number of points written.
pub fn write_pcd<W: Write>(
    writer: &mut W,
    points: &[ScanPoint],
    encoding: PcdEncoding,
    viewpoint: Option<&Isometry3<f32>>,
) -> std::io::Result<usize> {
    let valid: Vec<&ScanPoint> = points.iter().filter(|p| !p.is_sentinel()).collect();
    let count = valid.len();

    let (t, q) = match viewpoint {
        Some(pose) => {
            let t = pose.translation.vector;
            let q = pose.rotation.quaternion();
            ([t.x, t.y, t.z], [q.w, q.i, q.j, q.k])
        }
        None => ([0.0; 3], [1.0, 0.0, 0.0, 0.0]),
    };

    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS x y z intensity")?;
    writeln!(writer, "SIZE 4 4 4 4")?;
    writeln!(writer, "TYPE F F F F")?;
    writeln!(writer, "COUNT 1 1 1 1")?;
    writeln!(writer, "WIDTH {count}")?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(
        writer,
        "VIEWPOINT {} {} {} {} {} {} {}",
        t[0], t[1], t[2], q[0], q[1], q[2], q[3]
    )?;
    writeln!(writer, "POINTS {count}")?;
    writeln!(writer, "DATA {}", encoding.keyword())?;

    match encoding {
        PcdEncoding::Ascii => {
            for p in &valid {
                writeln!(writer, "{} {} {} {}", p.x, p.y, p.z, p.weight)?;
            }
        }
        PcdEncoding::Binary => {
            for p in &valid {
                // little-endian float32 regardless of host
                for v in [p.x, p.y, p.z, p.weight] {
                    writer.write_all(&v.to_le_bytes())?;
                }
            }
        }
    }

    writer.flush()?;
    Ok(count)
}

/// Encode points into a new file at `path`
pub fn write_pcd_file(
    path: &Path,
    points: &[ScanPoint],
    encoding: PcdEncoding,
    viewpoint: Option<&Isometry3<f32>>,
) -> std::io::Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_pcd(&mut writer, points, encoding, viewpoint)
}
