use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::data::Point2D;

const MATCH_FILE_EXTENSION: &str = "match";
const MAX_PREALLOCATED_POINTS: usize = 1 << 16;
const MAX_DESCRIPTOR_LENGTH: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq)]
pub struct InterestPoint {
    pub x: f32,
    pub y: f32,
    pub ix: i32,
    pub iy: i32,
    pub orientation: f32,
    pub scale: f32,
    pub interest: f32,
    pub polarity: bool,
    pub octave: u32,
    pub scale_lvl: u32,
    pub descriptor: Vec<f32>,
}

impl InterestPoint {
    pub fn new(x: f32, y: f32, scale: f32) -> InterestPoint {
        InterestPoint {
            x,
            y,
            ix: x.round() as i32,
            iy: y.round() as i32,
            orientation: 0.0,
            scale,
            interest: 0.0,
            polarity: false,
            octave: 0,
            scale_lvl: 0,
            descriptor: vec![],
        }
    }

    #[inline]
    pub fn location(&self) -> Point2D<f64> {
        Point2D::new(self.x as f64, self.y as f64)
    }

    fn read<R: Read>(reader: &mut R) -> Result<InterestPoint, MatchFileError> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let ix = reader.read_i32::<LittleEndian>()?;
        let iy = reader.read_i32::<LittleEndian>()?;
        let orientation = reader.read_f32::<LittleEndian>()?;
        let scale = reader.read_f32::<LittleEndian>()?;
        let interest = reader.read_f32::<LittleEndian>()?;
        let polarity = reader.read_u8()? != 0;
        let octave = reader.read_u32::<LittleEndian>()?;
        let scale_lvl = reader.read_u32::<LittleEndian>()?;
        let descriptor_len = reader.read_u64::<LittleEndian>()?;
        if descriptor_len > MAX_DESCRIPTOR_LENGTH {
            return Err(MatchFileError::Format("Descriptor is too long"));
        }
        let mut descriptor = vec![0.0f32; descriptor_len as usize];
        reader.read_f32_into::<LittleEndian>(&mut descriptor)?;

        Ok(InterestPoint {
            x,
            y,
            ix,
            iy,
            orientation,
            scale,
            interest,
            polarity,
            octave,
            scale_lvl,
            descriptor,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<(), MatchFileError> {
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_i32::<LittleEndian>(self.ix)?;
        writer.write_i32::<LittleEndian>(self.iy)?;
        writer.write_f32::<LittleEndian>(self.orientation)?;
        writer.write_f32::<LittleEndian>(self.scale)?;
        writer.write_f32::<LittleEndian>(self.interest)?;
        writer.write_u8(self.polarity as u8)?;
        writer.write_u32::<LittleEndian>(self.octave)?;
        writer.write_u32::<LittleEndian>(self.scale_lvl)?;
        writer.write_u64::<LittleEndian>(self.descriptor.len() as u64)?;
        self.descriptor
            .iter()
            .try_for_each(|value| writer.write_f32::<LittleEndian>(*value))?;
        Ok(())
    }
}

/// Name of the file holding matches between `image1` and `image2`.
///
/// Only the file stems are used; the name is not symmetric, callers pass images in list order.
pub fn match_filename<P1: AsRef<Path>, P2: AsRef<Path>>(
    prefix: &str,
    image1: P1,
    image2: P2,
) -> PathBuf {
    let stem = |path: &Path| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    };
    PathBuf::from(format!(
        "{}-{}__{}.{}",
        prefix,
        stem(image1.as_ref()),
        stem(image2.as_ref()),
        MATCH_FILE_EXTENSION
    ))
}

pub type Matches = (Vec<InterestPoint>, Vec<InterestPoint>);

pub fn read_match_file<P: AsRef<Path>>(path: P) -> Result<Matches, MatchFileError> {
    let mut reader = BufReader::new(File::open(path)?);
    read_matches(&mut reader)
}

pub fn read_matches<R: Read>(reader: &mut R) -> Result<Matches, MatchFileError> {
    let size1 = reader.read_u64::<LittleEndian>()? as usize;
    let size2 = reader.read_u64::<LittleEndian>()? as usize;
    if size1 != size2 {
        return Err(MatchFileError::Format(
            "Match file contains a different number of points for each image",
        ));
    }
    let read_points = |reader: &mut R, count: usize| {
        let mut points = Vec::with_capacity(count.min(MAX_PREALLOCATED_POINTS));
        for _ in 0..count {
            points.push(InterestPoint::read(reader)?);
        }
        Ok::<_, MatchFileError>(points)
    };
    let ip1 = read_points(reader, size1)?;
    let ip2 = read_points(reader, size2)?;
    Ok((ip1, ip2))
}

pub fn write_match_file<P: AsRef<Path>>(
    path: P,
    ip1: &[InterestPoint],
    ip2: &[InterestPoint],
) -> Result<(), MatchFileError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_matches(&mut writer, ip1, ip2)?;
    writer.flush()?;
    Ok(())
}

pub fn write_matches<W: Write>(
    writer: &mut W,
    ip1: &[InterestPoint],
    ip2: &[InterestPoint],
) -> Result<(), MatchFileError> {
    writer.write_u64::<LittleEndian>(ip1.len() as u64)?;
    writer.write_u64::<LittleEndian>(ip2.len() as u64)?;
    ip1.iter()
        .chain(ip2.iter())
        .try_for_each(|ip| ip.write(writer))
}

#[derive(Debug)]
pub enum MatchFileError {
    Format(&'static str),
    Io(std::io::Error),
}

impl fmt::Display for MatchFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MatchFileError::Format(msg) => f.write_str(msg),
            MatchFileError::Io(ref err) => err.fmt(f),
        }
    }
}

impl std::error::Error for MatchFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            MatchFileError::Format(_msg) => None,
            MatchFileError::Io(ref err) => Some(err),
        }
    }
}

impl From<std::io::Error> for MatchFileError {
    fn from(e: std::io::Error) -> MatchFileError {
        MatchFileError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn filename_uses_stems() {
        assert_eq!(
            match_filename("out/run", "images/left.tif", "/data/right.cub"),
            PathBuf::from("out/run-left__right.match")
        );
        assert_ne!(
            match_filename("run", "a.tif", "b.tif"),
            match_filename("run", "b.tif", "a.tif")
        );
    }

    #[test]
    fn stored_points_are_preserved() {
        let mut ip1 = InterestPoint::new(10.5, 20.25, 2.0);
        ip1.descriptor = vec![0.1, 0.2, 0.3];
        ip1.polarity = true;
        ip1.octave = 2;
        let ip2 = InterestPoint::new(-3.0, 400.75, 0.0);

        let mut buffer = vec![];
        write_matches(&mut buffer, &[ip1.clone()], &[ip2.clone()]).unwrap();
        // Header, two points with the fixed part, one descriptor.
        assert_eq!(buffer.len(), 16 + 2 * 45 + 3 * 4);

        let (read1, read2) = read_matches(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(read1, vec![ip1]);
        assert_eq!(read2, vec![ip2]);
    }

    #[test]
    fn truncated_file() {
        let ip = InterestPoint::new(1.0, 2.0, 1.0);
        let mut buffer = vec![];
        write_matches(&mut buffer, &[ip.clone()], &[ip]).unwrap();
        buffer.truncate(buffer.len() - 3);

        let result = read_matches(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(MatchFileError::Io(_))));
    }

    #[test]
    fn mismatched_counts() {
        let ip = InterestPoint::new(1.0, 2.0, 1.0);
        let mut buffer = vec![];
        write_matches(&mut buffer, &[ip.clone(), ip.clone()], &[ip]).unwrap();

        let result = read_matches(&mut Cursor::new(buffer));
        assert!(matches!(result, Err(MatchFileError::Format(_))));
    }

    #[test]
    fn missing_file() {
        let path = std::env::temp_dir().join("cnetbuild-does-not-exist.match");
        assert!(matches!(
            read_match_file(path),
            Err(MatchFileError::Io(_))
        ));
    }
}
