use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use nalgebra::Vector3;

use crate::network::{ControlNetwork, ControlPoint, PointKind};

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Writes positioned control points into a binary PLY point cloud.
///
/// Points without a position are skipped. Returns the number of written vertices.
pub fn write_ply<P: AsRef<Path>>(network: &ControlNetwork, path: P) -> Result<usize, OutputError> {
    let mut writer = PlyWriter::new(path.as_ref())?;
    let vertices = network
        .iter()
        .filter_map(|point| Some((point, point.position()?)))
        .collect::<Vec<_>>();

    writer.output_header(vertices.len())?;
    for (point, position) in &vertices {
        writer.output_vertex(point, position)?;
    }
    writer.complete()?;
    Ok(vertices.len())
}

struct PlyWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
}

impl PlyWriter<BufWriter<File>> {
    fn new(path: &Path) -> Result<PlyWriter<BufWriter<File>>, OutputError> {
        let writer = BufWriter::new(File::create(path)?);
        Ok(PlyWriter::from_writer(writer))
    }
}

impl<W: Write> PlyWriter<W> {
    fn from_writer(writer: W) -> PlyWriter<W> {
        PlyWriter {
            writer,
            buffer: Vec::with_capacity(WRITE_BUFFER_SIZE),
        }
    }

    fn check_flush_buffer(&mut self) -> Result<(), std::io::Error> {
        let buffer = &mut self.buffer;
        let w = &mut self.writer;
        if buffer.len() >= WRITE_BUFFER_SIZE {
            w.write_all(buffer)?;
            buffer.clear();
        }
        Ok(())
    }

    fn output_header(&mut self, nvertices: usize) -> Result<(), std::io::Error> {
        self.check_flush_buffer()?;
        let w = &mut self.buffer;
        writeln!(w, "ply")?;
        writeln!(w, "format binary_big_endian 1.0")?;
        writeln!(w, "comment Control network points")?;
        writeln!(w, "element vertex {}", nvertices)?;
        writeln!(w, "property double x")?;
        writeln!(w, "property double y")?;
        writeln!(w, "property double z")?;
        writeln!(w, "property uchar kind")?;
        writeln!(w, "property uchar measures")?;
        writeln!(w, "end_header")
    }

    fn output_vertex(
        &mut self,
        point: &ControlPoint,
        position: &Vector3<f64>,
    ) -> Result<(), OutputError> {
        if !position.iter().all(|v| v.is_finite()) {
            return Err("Point has invalid 3D coordinates".into());
        }
        self.check_flush_buffer()?;
        let w = &mut self.buffer;

        w.write_all(&position.x.to_be_bytes())?;
        w.write_all(&position.y.to_be_bytes())?;
        w.write_all(&position.z.to_be_bytes())?;
        let kind: u8 = match point.kind() {
            PointKind::Free => 0,
            PointKind::GroundControl => 1,
        };
        let measures = point.len().min(u8::MAX as usize) as u8;
        w.write_all(&[kind, measures])?;
        Ok(())
    }

    fn complete(&mut self) -> Result<(), OutputError> {
        let buffer = &mut self.buffer;
        let w = &mut self.writer;
        w.write_all(buffer)?;
        buffer.clear();
        w.flush()?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum OutputError {
    Internal(&'static str),
    Io(std::io::Error),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OutputError::Internal(msg) => f.write_str(msg),
            OutputError::Io(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            OutputError::Internal(_msg) => None,
            OutputError::Io(ref err) => Some(err),
        }
    }
}

impl From<&'static str> for OutputError {
    fn from(msg: &'static str) -> OutputError {
        OutputError::Internal(msg)
    }
}

impl From<std::io::Error> for OutputError {
    fn from(e: std::io::Error) -> OutputError {
        OutputError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::Point2D, network::ControlMeasure};

    fn network() -> ControlNetwork {
        let mut network = ControlNetwork::new();
        let mut free = ControlPoint::free();
        for image_i in 0..300 {
            free.add_measure(ControlMeasure::new(
                Point2D::new(1.0, 2.0),
                Point2D::new(1.0, 1.0),
                image_i,
                "image",
            ));
        }
        free.set_position(Vector3::new(1.0, -2.0, 3.5));
        network.add_control_point(free);
        network.add_control_point(ControlPoint::free());
        network.add_control_point(ControlPoint::ground_control(
            "7",
            Vector3::new(-4.0, 0.5, 8.0),
            Vector3::repeat(1.0),
        ));
        network
    }

    fn header_len(data: &[u8]) -> usize {
        let marker = b"end_header\n";
        data.windows(marker.len())
            .position(|window| window == marker)
            .unwrap()
            + marker.len()
    }

    #[test]
    fn header_and_vertices() {
        let path = std::env::temp_dir().join(format!("cnetbuild-{}.ply", std::process::id()));
        let written = write_ply(&network(), &path).unwrap();
        assert_eq!(written, 2);

        let data = std::fs::read(&path).unwrap();
        let header_len = header_len(&data);
        let header = std::str::from_utf8(&data[..header_len]).unwrap();
        assert!(header.starts_with("ply\nformat binary_big_endian 1.0\n"));
        assert!(header.contains("element vertex 2\n"));
        assert!(header.contains("property uchar measures\n"));

        let body = &data[header_len..];
        assert_eq!(body.len(), 2 * 26);
        let read_f64 = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&body[offset..offset + 8]);
            f64::from_be_bytes(bytes)
        };
        assert_eq!(read_f64(0), 1.0);
        assert_eq!(read_f64(8), -2.0);
        assert_eq!(read_f64(16), 3.5);
        assert_eq!(&body[24..26], &[0, 255]);
        assert_eq!(read_f64(26), -4.0);
        assert_eq!(&body[50..52], &[1, 0]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalid_coordinates() {
        let mut network = ControlNetwork::new();
        let mut point = ControlPoint::free();
        point.set_position(Vector3::new(f64::NAN, 0.0, 0.0));
        network.add_control_point(point);

        let mut writer = PlyWriter::from_writer(Vec::new());
        let position = network[0].position().unwrap();
        assert!(matches!(
            writer.output_vertex(&network[0], &position),
            Err(OutputError::Internal(_))
        ));
    }
}
