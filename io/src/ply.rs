//! PLY (Polygon File Format) I/O
//!
//! Only ASCII PLY is handled. Vertex properties are located by name, so their
//! order in the header does not matter; other elements (faces) are ignored.

use nalgebra::{Point3, Vector3};
use scan3d_core::{Error, PointCloud, Result};
use std::io::{BufRead, Write};

const MAX_PREALLOCATED_VERTICES: usize = 1 << 20;

/// Read a PLY file from a reader
pub fn read_ply<R: BufRead>(reader: R) -> Result<PointCloud> {
    let mut lines = reader.lines();

    // Parse header
    let mut format = String::new();
    let mut num_vertices = 0;
    let mut in_vertex = false;
    let mut properties: Vec<String> = Vec::new();

    loop {
        let line = lines
            .next()
            .ok_or_else(|| Error::Parse("Unexpected EOF in header".to_string()))??;
        let line = line.trim();
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            ["format", fmt, ..] => format = fmt.to_string(),
            ["element", "vertex", count] => {
                num_vertices = count
                    .parse()
                    .map_err(|_| Error::Parse("Invalid vertex count number".to_string()))?;
                in_vertex = true;
            }
            ["element", ..] => in_vertex = false,
            ["property", "list", ..] => {}
            ["property", _, name] if in_vertex => properties.push(name.to_string()),
            ["end_header"] => break,
            _ => {}
        }
    }

    if format != "ascii" {
        return Err(Error::UnsupportedFormat(format!(
            "PLY format '{}' not supported, only ASCII",
            format
        )));
    }

    let index_of = |name: &str| properties.iter().position(|p| p == name);
    let xyz = match (index_of("x"), index_of("y"), index_of("z")) {
        (Some(x), Some(y), Some(z)) => [x, y, z],
        _ => {
            return Err(Error::InvalidData(
                "PLY vertex element has no x/y/z properties".to_string(),
            ))
        }
    };
    let normal_idx = match (index_of("nx"), index_of("ny"), index_of("nz")) {
        (Some(x), Some(y), Some(z)) => Some([x, y, z]),
        _ => None,
    };
    let color_idx = match (index_of("red"), index_of("green"), index_of("blue")) {
        (Some(r), Some(g), Some(b)) => Some([r, g, b]),
        _ => None,
    };

    // Parse data; the vertex count is untrusted, so cap the up-front allocation
    let capacity = num_vertices.min(MAX_PREALLOCATED_VERTICES);
    let mut points = Vec::with_capacity(capacity);
    let mut normals = normal_idx.map(|_| Vec::with_capacity(capacity));
    let mut colors = color_idx.map(|_| Vec::with_capacity(capacity));

    for _ in 0..num_vertices {
        let line = lines
            .next()
            .ok_or_else(|| Error::Parse("Unexpected EOF in data".to_string()))??;

        let values: Vec<f64> = line
            .split_whitespace()
            .map(|s| {
                s.parse()
                    .map_err(|_| Error::Parse(format!("Invalid number: {}", s)))
            })
            .collect::<Result<Vec<_>>>()?;

        if values.len() < properties.len() {
            return Err(Error::InvalidData(
                "Not enough values for vertex".to_string(),
            ));
        }

        let [x, y, z] = xyz.map(|i| values[i]);
        points.push(Point3::new(x, y, z));

        if let (Some(n), Some([nx, ny, nz])) = (normals.as_mut(), normal_idx) {
            n.push(Vector3::new(values[nx], values[ny], values[nz]));
        }

        if let (Some(c), Some([r, g, b])) = (colors.as_mut(), color_idx) {
            c.push(Point3::new(values[r], values[g], values[b]) / 255.0);
        }
    }

    let mut pc = PointCloud::new(points);
    pc.colors = colors;
    pc.normals = normals;
    Ok(pc)
}

/// Write a point cloud to PLY format
pub fn write_ply<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    let num_points = cloud.len();
    let has_colors = cloud.colors.is_some();
    let has_normals = cloud.normals.is_some();

    // Write header
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", num_points)?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;

    if has_normals {
        writeln!(writer, "property double nx")?;
        writeln!(writer, "property double ny")?;
        writeln!(writer, "property double nz")?;
    }

    if has_colors {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }

    writeln!(writer, "end_header")?;

    // Write data
    for (i, p) in cloud.points.iter().enumerate() {
        write!(writer, "{} {} {}", p.x, p.y, p.z)?;

        if let Some(ref normals) = cloud.normals {
            let n = normals[i];
            write!(writer, " {} {} {}", n.x, n.y, n.z)?;
        }

        if let Some(ref colors) = cloud.colors {
            let c = colors[i];
            let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            write!(writer, " {} {} {}", channel(c.x), channel(c.y), channel(c.z))?;
        }

        writeln!(writer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_properties_found_by_name() {
        let file = "ply
format ascii 1.0
comment colors before position
element vertex 2
property uchar red
property uchar green
property uchar blue
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
end_header
255 0 0 1 2 3
0 255 0 4 5 6
3 0 1 1
";
        let cloud = read_ply(Cursor::new(file)).unwrap();
        assert_eq!(
            cloud.points,
            vec![Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.0)]
        );
        let colors = cloud.colors.unwrap();
        assert_eq!(colors[0], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(colors[1], Point3::new(0.0, 1.0, 0.0));
        assert!(cloud.normals.is_none());
    }

    #[test]
    fn test_oversized_vertex_count_is_an_error() {
        let file = "ply\nformat ascii 1.0\nelement vertex 18446744073709551615\nproperty float x\nproperty float y\nproperty float z\nend_header\n1 2 3\n";
        assert!(matches!(read_ply(Cursor::new(file)), Err(Error::Parse(_))));
    }

    #[test]
    fn test_binary_ply_is_unsupported() {
        let file = "ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n";
        assert!(matches!(
            read_ply(Cursor::new(file)),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_short_vertex_line() {
        let file = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nend_header\n1 2\n";
        assert!(matches!(
            read_ply(Cursor::new(file)),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_write_then_read() {
        let cloud = PointCloud::new(vec![Point3::new(0.5, -0.25, 3.0)])
            .with_normals(vec![Vector3::y()])
            .unwrap();
        let mut buf = Vec::new();
        write_ply(&mut buf, &cloud).unwrap();
        let back = read_ply(Cursor::new(buf)).unwrap();
        assert_eq!(back, cloud);
    }
}
