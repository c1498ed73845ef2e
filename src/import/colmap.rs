/// COLMAP sparse model reader
///
/// Reads `cameras`, `images` and `points3D` from a sparse model directory.
/// The binary files (`*.bin`) are preferred; the text export (`*.txt`) is
/// used when no binary model is present.

use std::path::Path;
use std::str::FromStr;

use super::{ImportPayload, ImportedCamera, ImportedImage, ImportedPoint};
use crate::error::{EditorError, Result};

/// Point3D id COLMAP stores for 2D points without a 3D point
const INVALID_POINT3D_ID: u64 = u64::MAX;

/// Camera model names and parameter counts, indexed by model id
const CAMERA_MODELS: [(&str, usize); 11] = [
    ("SIMPLE_PINHOLE", 3),
    ("PINHOLE", 4),
    ("SIMPLE_RADIAL", 4),
    ("RADIAL", 5),
    ("OPENCV", 8),
    ("OPENCV_FISHEYE", 8),
    ("FULL_OPENCV", 12),
    ("FOV", 5),
    ("SIMPLE_RADIAL_FISHEYE", 4),
    ("RADIAL_FISHEYE", 5),
    ("THIN_PRISM_FISHEYE", 12),
];

/// Read a sparse model, binary first, then text
pub fn read_sparse_dir(dir: &Path) -> Result<ImportPayload> {
    let has_all = |ext: &str| {
        ["cameras", "images", "points3D"]
            .iter()
            .all(|name| dir.join(format!("{}.{}", name, ext)).is_file())
    };

    let payload = if has_all("bin") {
        ImportPayload {
            cameras: read_cameras_binary(&std::fs::read(dir.join("cameras.bin"))?)?,
            images: read_images_binary(&std::fs::read(dir.join("images.bin"))?)?,
            points: read_points3d_binary(&std::fs::read(dir.join("points3D.bin"))?)?,
        }
    } else if has_all("txt") {
        ImportPayload {
            cameras: read_cameras_text(&std::fs::read_to_string(dir.join("cameras.txt"))?)?,
            images: read_images_text(&std::fs::read_to_string(dir.join("images.txt"))?)?,
            points: read_points3d_text(&std::fs::read_to_string(dir.join("points3D.txt"))?)?,
        }
    } else {
        tracing::error!("❌ cameras, images, points3D files do not exist at {}", dir.display());
        return Err(EditorError::Import(format!(
            "no COLMAP model (cameras, images, points3D) in {}",
            dir.display()
        )));
    };

    tracing::info!(
        "📷 Loaded COLMAP model: {} cameras, {} images, {} 3D points",
        payload.cameras.len(),
        payload.images.len(),
        payload.points.len()
    );
    Ok(payload)
}

fn param_count(model_id: i32) -> Result<usize> {
    usize::try_from(model_id)
        .ok()
        .and_then(|id| CAMERA_MODELS.get(id))
        .map(|(_, count)| *count)
        .ok_or_else(|| EditorError::Import(format!("unknown camera model id {}", model_id)))
}

// ========== Binary format ==========

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraHeader {
    camera_id: u32,
    model_id: i32,
    width: u64,
    height: u64,
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ImageHeader {
    image_id: u32,
    qvec: [f64; 4],
    tvec: [f64; 3],
    camera_id: u32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Point2DRecord {
    x: f64,
    y: f64,
    point3d_id: u64,
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct Point3DHeader {
    point3d_id: u64,
    xyz: [f64; 3],
    color: [u8; 3],
    error: f64,
    track_length: u64,
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct TrackElement {
    image_id: u32,
    point2d_idx: u32,
}

/// Bounds-checked little-endian cursor over a model file
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    file: &'static str,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8], file: &'static str) -> Self {
        Self { bytes, pos: 0, file }
    }

    fn read<T: bytemuck::Pod>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                EditorError::Import(format!("{} is truncated at byte {}", self.file, self.pos))
            })?;
        let value = bytemuck::pod_read_unaligned(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(value)
    }

    fn read_count(&mut self) -> Result<usize> {
        let count: u64 = self.read()?;
        usize::try_from(count)
            .map_err(|_| EditorError::Import(format!("{}: count {} too large", self.file, count)))
    }

    /// Capacity hint that cannot exceed what the remaining bytes could hold
    fn capacity_for<T>(&self, count: usize) -> usize {
        count.min((self.bytes.len() - self.pos) / std::mem::size_of::<T>().max(1))
    }

    fn read_cstr(&mut self) -> Result<String> {
        let rest = &self.bytes[self.pos..];
        let len = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            EditorError::Import(format!("{}: unterminated string at byte {}", self.file, self.pos))
        })?;
        let value = String::from_utf8_lossy(&rest[..len]).to_string();
        self.pos += len + 1;
        Ok(value)
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.bytes.len() {
            return Err(EditorError::Import(format!(
                "{}: {} trailing bytes",
                self.file,
                self.bytes.len() - self.pos
            )));
        }
        Ok(())
    }
}

pub fn read_cameras_binary(bytes: &[u8]) -> Result<Vec<ImportedCamera>> {
    let mut reader = ByteReader::new(bytes, "cameras.bin");
    let count = reader.read_count()?;
    let mut cameras = Vec::with_capacity(reader.capacity_for::<CameraHeader>(count));
    for _ in 0..count {
        let header: CameraHeader = reader.read()?;
        let params = (0..param_count(header.model_id)?)
            .map(|_| reader.read::<f64>())
            .collect::<Result<Vec<_>>>()?;
        cameras.push(ImportedCamera {
            camera_id: header.camera_id,
            model_id: header.model_id,
            width: header.width,
            height: header.height,
            params,
        });
    }
    reader.finish()?;
    Ok(cameras)
}

pub fn read_images_binary(bytes: &[u8]) -> Result<Vec<ImportedImage>> {
    let mut reader = ByteReader::new(bytes, "images.bin");
    let count = reader.read_count()?;
    let mut images = Vec::with_capacity(reader.capacity_for::<ImageHeader>(count));
    for _ in 0..count {
        let header: ImageHeader = reader.read()?;
        let name = reader.read_cstr()?;
        let num_points = reader.read_count()?;

        let mut points2d = Vec::with_capacity(reader.capacity_for::<Point2DRecord>(num_points));
        let mut point3d_ids = Vec::with_capacity(points2d.capacity());
        for _ in 0..num_points {
            let point: Point2DRecord = reader.read()?;
            points2d.push([point.x, point.y]);
            point3d_ids.push((point.point3d_id != INVALID_POINT3D_ID).then_some(point.point3d_id));
        }
        tracing::debug!("{} ({} points)", name, points2d.len());
        images.push(ImportedImage {
            image_id: header.image_id,
            camera_id: header.camera_id,
            name,
            points2d,
            point3d_ids,
        });
    }
    reader.finish()?;
    Ok(images)
}

pub fn read_points3d_binary(bytes: &[u8]) -> Result<Vec<ImportedPoint>> {
    let mut reader = ByteReader::new(bytes, "points3D.bin");
    let count = reader.read_count()?;
    let mut points = Vec::with_capacity(reader.capacity_for::<Point3DHeader>(count));
    for _ in 0..count {
        let header: Point3DHeader = reader.read()?;
        let track_length = usize::try_from(header.track_length)
            .map_err(|_| EditorError::Import("points3D.bin: track too long".to_string()))?;
        let mut track = Vec::with_capacity(reader.capacity_for::<TrackElement>(track_length));
        for _ in 0..track_length {
            let element: TrackElement = reader.read()?;
            track.push((element.image_id, element.point2d_idx));
        }
        points.push(ImportedPoint {
            point3d_id: header.point3d_id,
            xyz: header.xyz,
            color: header.color,
            error: header.error,
            track,
        });
    }
    reader.finish()?;
    Ok(points)
}

// ========== Text format ==========

/// Parse one whitespace-separated field
fn field<T: FromStr>(token: Option<&str>, what: &str, file: &str, line: usize) -> Result<T> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| EditorError::Import(format!("{}:{}: invalid or missing {}", file, line, what)))
}

/// Lines with their 1-based numbers, without comment lines
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.starts_with('#'))
}

pub fn read_cameras_text(text: &str) -> Result<Vec<ImportedCamera>> {
    let mut cameras = Vec::new();
    for (line_no, line) in content_lines(text).filter(|(_, l)| !l.is_empty()) {
        let mut tokens = line.split_whitespace();
        let camera_id = field(tokens.next(), "camera id", "cameras.txt", line_no)?;
        let model: String = field(tokens.next(), "camera model", "cameras.txt", line_no)?;
        let model_id = CAMERA_MODELS
            .iter()
            .position(|(name, _)| *name == model)
            .ok_or_else(|| EditorError::Import(format!("cameras.txt:{}: unknown model {}", line_no, model)))?;
        let width = field(tokens.next(), "width", "cameras.txt", line_no)?;
        let height = field(tokens.next(), "height", "cameras.txt", line_no)?;
        let params = tokens
            .map(|t| field(Some(t), "camera parameter", "cameras.txt", line_no))
            .collect::<Result<Vec<f64>>>()?;
        if params.len() != CAMERA_MODELS[model_id].1 {
            return Err(EditorError::Import(format!(
                "cameras.txt:{}: {} expects {} parameters, got {}",
                line_no,
                model,
                CAMERA_MODELS[model_id].1,
                params.len()
            )));
        }
        cameras.push(ImportedCamera {
            camera_id,
            model_id: model_id as i32,
            width,
            height,
            params,
        });
    }
    Ok(cameras)
}

pub fn read_images_text(text: &str) -> Result<Vec<ImportedImage>> {
    let mut images = Vec::new();
    // Every image is a header line followed by its (possibly empty) points line
    let mut lines = content_lines(text);
    while let Some((line_no, line)) = lines.next() {
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 10 {
            return Err(EditorError::Import(format!("images.txt:{}: incomplete image header", line_no)));
        }
        let image_id = field(Some(tokens[0]), "image id", "images.txt", line_no)?;
        let camera_id = field(Some(tokens[8]), "camera id", "images.txt", line_no)?;
        // Names may contain spaces
        let name = tokens[9..].join(" ");

        let (points_no, points_line) = lines.next().unwrap_or((line_no + 1, ""));
        let values: Vec<&str> = points_line.split_whitespace().collect();
        if values.len() % 3 != 0 {
            return Err(EditorError::Import(format!(
                "images.txt:{}: expected X Y POINT3D_ID triples",
                points_no
            )));
        }
        let mut points2d = Vec::with_capacity(values.len() / 3);
        let mut point3d_ids = Vec::with_capacity(values.len() / 3);
        for triple in values.chunks_exact(3) {
            let x = field(Some(triple[0]), "x", "images.txt", points_no)?;
            let y = field(Some(triple[1]), "y", "images.txt", points_no)?;
            let id: i64 = field(Some(triple[2]), "point3D id", "images.txt", points_no)?;
            points2d.push([x, y]);
            point3d_ids.push(u64::try_from(id).ok());
        }

        images.push(ImportedImage {
            image_id,
            camera_id,
            name,
            points2d,
            point3d_ids,
        });
    }
    Ok(images)
}

pub fn read_points3d_text(text: &str) -> Result<Vec<ImportedPoint>> {
    let mut points = Vec::new();
    for (line_no, line) in content_lines(text).filter(|(_, l)| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 8 || (tokens.len() - 8) % 2 != 0 {
            return Err(EditorError::Import(format!("points3D.txt:{}: malformed point", line_no)));
        }
        let f = |i: usize, what: &str| field::<f64>(Some(tokens[i]), what, "points3D.txt", line_no);
        let c = |i: usize| field::<u8>(Some(tokens[i]), "color", "points3D.txt", line_no);

        let track = tokens[8..]
            .chunks_exact(2)
            .map(|pair| -> Result<(u32, u32)> {
                Ok((
                    field(Some(pair[0]), "track image id", "points3D.txt", line_no)?,
                    field(Some(pair[1]), "track point2D index", "points3D.txt", line_no)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        points.push(ImportedPoint {
            point3d_id: field(Some(tokens[0]), "point3D id", "points3D.txt", line_no)?,
            xyz: [f(1, "x")?, f(2, "y")?, f(3, "z")?],
            color: [c(4)?, c(5)?, c(6)?],
            error: f(7, "error")?,
            track,
        });
    }
    Ok(points)
}
