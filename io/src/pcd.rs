//! PCD (Point Cloud Data) I/O
//!
//! PCD is the native format for Point Cloud Library (PCL). Reading handles
//! ASCII and uncompressed binary data sections; writing produces ASCII.
//! Points with non-finite coordinates (holes in organized clouds) are skipped.

use nalgebra::{Point3, Vector3};
use scan3d_core::{Error, PointCloud, Result};
use std::io::{BufRead, Read, Write};
use std::str::FromStr;

/// PCD data format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdData {
    Ascii,
    Binary,
    BinaryCompressed,
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    size: usize,
    kind: char,
    count: usize,
}

impl Field {
    /// Packed colors are stored as the raw bits of a 32-bit value.
    fn is_packed_color(&self) -> bool {
        self.name == "rgb" || self.name == "rgba"
    }
}

#[derive(Debug)]
struct PcdHeader {
    fields: Vec<Field>,
    points: usize,
    data: PcdData,
}

impl PcdHeader {
    fn position(&self, names: &[&str]) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| names.contains(&f.name.as_str()))
    }

    /// Bytes per point in a binary body, `None` on overflow.
    fn row_bytes(&self) -> Option<usize> {
        self.fields
            .iter()
            .try_fold(0usize, |acc, f| acc.checked_add(f.size.checked_mul(f.count)?))
    }
}

fn parse_list<T: FromStr>(values: &[&str], key: &str) -> Result<Vec<T>> {
    values
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|_| Error::Parse(format!("Invalid {} entry '{}'", key, s)))
        })
        .collect()
}

fn parse_single(parts: &[&str]) -> Result<usize> {
    parts
        .get(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Parse(format!("Invalid {} line", parts[0])))
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = 0;
    let mut height = 1;
    let mut points: Option<usize> = None;

    let mut line = String::new();
    let data = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Parse("Unexpected EOF in header".to_string()));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        match parts[0] {
            "VERSION" | "VIEWPOINT" => {}
            "FIELDS" => names = parts[1..].iter().map(|s| s.to_string()).collect(),
            "SIZE" => sizes = parse_list(&parts[1..], "SIZE")?,
            "TYPE" => types = parts[1..].iter().filter_map(|s| s.chars().next()).collect(),
            "COUNT" => counts = parse_list(&parts[1..], "COUNT")?,
            "WIDTH" => width = parse_single(&parts)?,
            "HEIGHT" => height = parse_single(&parts)?,
            "POINTS" => points = Some(parse_single(&parts)?),
            "DATA" => {
                break match parts.get(1).copied() {
                    Some("ascii") => PcdData::Ascii,
                    Some("binary") => PcdData::Binary,
                    Some("binary_compressed") => PcdData::BinaryCompressed,
                    other => {
                        return Err(Error::UnsupportedFormat(format!(
                            "PCD data section '{}'",
                            other.unwrap_or_default()
                        )))
                    }
                };
            }
            other => tracing::debug!(entry = other, "skipping unknown PCD header entry"),
        }
    };

    if names.is_empty() {
        return Err(Error::Parse("PCD header has no FIELDS".to_string()));
    }
    if sizes.is_empty() {
        sizes = vec![4; names.len()];
    }
    if types.is_empty() {
        types = vec!['F'; names.len()];
    }
    if counts.is_empty() {
        counts = vec![1; names.len()];
    }
    if sizes.len() != names.len() || types.len() != names.len() || counts.len() != names.len() {
        return Err(Error::Parse(format!(
            "PCD header declares {} fields but {} sizes, {} types, {} counts",
            names.len(),
            sizes.len(),
            types.len(),
            counts.len()
        )));
    }

    if counts.iter().try_fold(0usize, |acc, &c| acc.checked_add(c)).is_none() {
        return Err(Error::InvalidData("PCD COUNT entries overflow".to_string()));
    }
    let points = match points {
        Some(points) => points,
        None => width
            .checked_mul(height)
            .ok_or_else(|| Error::InvalidData(format!("PCD size {}x{} overflows", width, height)))?,
    };

    let fields = names
        .into_iter()
        .zip(sizes)
        .zip(types)
        .zip(counts)
        .map(|(((name, size), kind), count)| Field {
            name,
            size,
            kind,
            count,
        })
        .collect();

    Ok(PcdHeader {
        fields,
        points,
        data,
    })
}

fn bytes<const N: usize>(raw: &[u8]) -> Result<[u8; N]> {
    raw.get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::InvalidData("Truncated PCD field".to_string()))
}

/// First element of a binary field, widened to `f64`.
fn decode_binary(raw: &[u8], field: &Field) -> Result<f64> {
    let value = match (field.kind, field.size) {
        ('F', 4) => {
            let v = f32::from_le_bytes(bytes(raw)?);
            if field.is_packed_color() {
                v.to_bits() as f64
            } else {
                v as f64
            }
        }
        ('F', 8) => f64::from_le_bytes(bytes(raw)?),
        ('U', 1) => raw.first().copied().map(f64::from).unwrap_or(0.0),
        ('U', 2) => u16::from_le_bytes(bytes(raw)?) as f64,
        ('U', 4) => u32::from_le_bytes(bytes(raw)?) as f64,
        ('I', 1) => raw.first().map(|&b| b as i8 as f64).unwrap_or(0.0),
        ('I', 2) => i16::from_le_bytes(bytes(raw)?) as f64,
        ('I', 4) => i32::from_le_bytes(bytes(raw)?) as f64,
        (kind, size) => {
            return Err(Error::UnsupportedFormat(format!(
                "PCD field '{}' of type {}{}",
                field.name, kind, size
            )))
        }
    };
    Ok(value)
}

fn decode_ascii(token: &str, field: &Field) -> Result<f64> {
    let invalid = || Error::Parse(format!("Invalid number '{}' in field '{}'", token, field.name));
    if field.is_packed_color() {
        return match field.kind {
            'F' => token
                .parse::<f32>()
                .map(|v| v.to_bits() as f64)
                .map_err(|_| invalid()),
            _ => token.parse::<u32>().map(f64::from).map_err(|_| invalid()),
        };
    }
    // PCL writes "nan" for holes
    token.parse::<f64>().map_err(|_| invalid())
}

enum ColorLayout {
    Packed(usize),
    Channels([usize; 3]),
}

/// Collects decoded rows (first element of every field) into a cloud.
/// Upper bound on the up-front allocation; `POINTS` comes from the file.
const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

struct CloudBuilder {
    xyz: [usize; 3],
    normal: Option<[usize; 3]>,
    color: Option<ColorLayout>,
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
    colors: Vec<Point3<f64>>,
    skipped: usize,
}

impl CloudBuilder {
    fn new(header: &PcdHeader) -> Result<Self> {
        let xyz = match (
            header.position(&["x"]),
            header.position(&["y"]),
            header.position(&["z"]),
        ) {
            (Some(x), Some(y), Some(z)) => [x, y, z],
            _ => {
                return Err(Error::InvalidData(
                    "PCD file has no x/y/z fields".to_string(),
                ))
            }
        };

        let normal = match (
            header.position(&["normal_x", "nx"]),
            header.position(&["normal_y", "ny"]),
            header.position(&["normal_z", "nz"]),
        ) {
            (Some(x), Some(y), Some(z)) => Some([x, y, z]),
            _ => None,
        };

        let color = match header.position(&["rgb", "rgba"]) {
            Some(i) => Some(ColorLayout::Packed(i)),
            None => match (
                header.position(&["r"]),
                header.position(&["g"]),
                header.position(&["b"]),
            ) {
                (Some(r), Some(g), Some(b)) => Some(ColorLayout::Channels([r, g, b])),
                _ => None,
            },
        };

        Ok(Self {
            xyz,
            normal,
            color,
            points: Vec::with_capacity(header.points.min(MAX_PREALLOCATED_POINTS)),
            normals: Vec::new(),
            colors: Vec::new(),
            skipped: 0,
        })
    }

    fn push(&mut self, row: &[f64]) {
        let [x, y, z] = self.xyz.map(|i| row[i]);
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            self.skipped += 1;
            return;
        }
        self.points.push(Point3::new(x, y, z));

        if let Some([nx, ny, nz]) = self.normal {
            self.normals.push(Vector3::new(row[nx], row[ny], row[nz]));
        }

        match self.color {
            Some(ColorLayout::Packed(i)) => {
                let packed = row[i] as u32;
                let r = ((packed >> 16) & 0xFF) as f64 / 255.0;
                let g = ((packed >> 8) & 0xFF) as f64 / 255.0;
                let b = (packed & 0xFF) as f64 / 255.0;
                self.colors.push(Point3::new(r, g, b));
            }
            Some(ColorLayout::Channels([ri, gi, bi])) => {
                // Assume 0-255 range if values are large
                let norm = |v: f64| if v > 1.0 { v / 255.0 } else { v };
                self.colors
                    .push(Point3::new(norm(row[ri]), norm(row[gi]), norm(row[bi])));
            }
            None => {}
        }
    }

    fn finish(self) -> PointCloud {
        if self.skipped > 0 {
            tracing::debug!(skipped = self.skipped, "dropped non-finite PCD points");
        }
        let mut cloud = PointCloud::new(self.points);
        if self.normal.is_some() {
            cloud.normals = Some(self.normals);
        }
        if self.color.is_some() {
            cloud.colors = Some(self.colors);
        }
        cloud
    }
}

/// Read a PCD file
///
/// # Arguments
///
/// * `reader` - Source positioned at the start of the header
///
/// # Returns
///
/// The cloud with normals and colors when the file has them. Points with a
/// non-finite coordinate are skipped.
///
/// # Errors
///
/// * `Error::Parse` - malformed header
/// * `Error::InvalidData` - body shorter than `POINTS` or sizes that overflow
/// * `Error::UnsupportedFormat` - `binary_compressed` data
pub fn read_pcd<R: BufRead>(mut reader: R) -> Result<PointCloud> {
    let header = read_header(&mut reader)?;
    let mut builder = CloudBuilder::new(&header)?;
    let mut row = vec![0.0; header.fields.len()];

    match header.data {
        PcdData::Ascii => {
            // Column of the first element of every field
            let columns: Vec<usize> = header
                .fields
                .iter()
                .scan(0, |col, f| {
                    let start = *col;
                    *col += f.count;
                    Some(start)
                })
                .collect();
            let width: usize = header.fields.iter().map(|f| f.count).sum();

            let mut read = 0;
            for line in reader.lines() {
                if read >= header.points {
                    break;
                }
                let line = line?;
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens.len() < width {
                    return Err(Error::InvalidData(format!(
                        "PCD point {} has {} values, expected {}",
                        read,
                        tokens.len(),
                        width
                    )));
                }
                for (slot, (field, &col)) in row.iter_mut().zip(header.fields.iter().zip(&columns)) {
                    *slot = decode_ascii(tokens[col], field)?;
                }
                builder.push(&row);
                read += 1;
            }

            if read < header.points {
                return Err(Error::InvalidData(format!(
                    "PCD declares {} points but holds {}",
                    header.points, read
                )));
            }
        }
        PcdData::Binary => {
            let row_bytes = match header.row_bytes() {
                Some(n) if n > 0 => n,
                _ => {
                    return Err(Error::InvalidData(
                        "PCD field sizes do not describe a point".to_string(),
                    ))
                }
            };
            if row_bytes.checked_mul(header.points).is_none() {
                return Err(Error::InvalidData(format!(
                    "PCD declares {} points of {} bytes",
                    header.points, row_bytes
                )));
            }

            let offsets: Vec<usize> = header
                .fields
                .iter()
                .scan(0, |offset, f| {
                    let start = *offset;
                    *offset += f.size * f.count;
                    Some(start)
                })
                .collect();

            let mut raw = vec![0u8; row_bytes];
            for index in 0..header.points {
                reader.read_exact(&mut raw).map_err(|e| {
                    Error::InvalidData(format!(
                        "PCD binary section ends at point {} of {}: {}",
                        index, header.points, e
                    ))
                })?;
                for (slot, (field, &offset)) in row.iter_mut().zip(header.fields.iter().zip(&offsets)) {
                    *slot = decode_binary(&raw[offset..], field)?;
                }
                builder.push(&row);
            }
        }
        PcdData::BinaryCompressed => {
            return Err(Error::UnsupportedFormat(
                "Binary compressed PCD not supported".to_string(),
            ))
        }
    }

    Ok(builder.finish())
}

/// Write point cloud to PCD format (ASCII)
///
/// Coordinates and normals are written as 8-byte floats, colors packed into
/// one unsigned `rgb` field the way PCL lays them out.
pub fn write_pcd<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    let num_points = cloud.len();
    let has_normals = cloud.normals.is_some();
    let has_colors = cloud.colors.is_some();

    let mut fields = vec!["x y z"];
    let mut sizes = vec!["8 8 8"];
    let mut types = vec!["F F F"];
    let mut counts = vec!["1 1 1"];
    if has_normals {
        fields.push("normal_x normal_y normal_z");
        sizes.push("8 8 8");
        types.push("F F F");
        counts.push("1 1 1");
    }
    if has_colors {
        fields.push("rgb");
        sizes.push("4");
        types.push("U");
        counts.push("1");
    }

    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", fields.join(" "))?;
    writeln!(writer, "SIZE {}", sizes.join(" "))?;
    writeln!(writer, "TYPE {}", types.join(" "))?;
    writeln!(writer, "COUNT {}", counts.join(" "))?;
    writeln!(writer, "WIDTH {}", num_points)?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", num_points)?;
    writeln!(writer, "DATA ascii")?;

    for (i, p) in cloud.points.iter().enumerate() {
        write!(writer, "{} {} {}", p.x, p.y, p.z)?;

        if let Some(ref normals) = cloud.normals {
            let n = normals[i];
            write!(writer, " {} {} {}", n.x, n.y, n.z)?;
        }

        if let Some(ref colors) = cloud.colors {
            let c = colors[i];
            let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
            let packed: u32 = (channel(c.x) << 16) | (channel(c.y) << 8) | channel(c.z);
            write!(writer, " {}", packed)?;
        }

        writeln!(writer)?;
    }

    Ok(())
}
