use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::DMatrix;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, compression::Lzw, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{EtError, Result};

pub const DEFAULT_NODATA: f32 = -9999.0;

// GeoKey ids used when writing/reading the key directory
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Single-band float grid; rows follow the image's y axis.
pub type Grid = DMatrix<f32>;

// North-up affine transform: pixel (0, 0) upper-left corner at (origin_x, origin_y)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,  // [CRS units]
    pub pixel_height: f64, // [CRS units], positive; y decreases down the rows
}

impl GeoTransform {
    pub fn from_origin(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        GeoTransform {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: usize,
    pub height: usize,
    pub transform: Option<GeoTransform>,
    pub epsg: Option<u16>,
    pub nodata: Option<f32>,
}

impl RasterProfile {
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    // Same profile with a different declared nodata
    pub fn with_nodata(&self, nodata: f32) -> Self {
        RasterProfile {
            nodata: Some(nodata),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub grid: Grid,
    pub profile: RasterProfile,
}

impl Raster {
    pub fn new(grid: Grid, profile: RasterProfile) -> Result<Self> {
        let found = grid.shape();
        if found != profile.shape() {
            return Err(EtError::ShapeMismatch {
                expected: profile.shape(),
                found,
            });
        }
        Ok(Raster { grid, profile })
    }

    /// Replace the file's own nodata marker and NaNs with `sentinel`, and
    /// declare `sentinel` as the nodata value.
    pub fn normalize_nodata(mut self, sentinel: f32) -> Self {
        let declared = self.profile.nodata;
        self.grid.apply(|v| {
            if v.is_nan() || declared.is_some_and(|nd| *v == nd) {
                *v = sentinel;
            }
        });
        self.profile.nodata = Some(sentinel);
        self
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EtError::io(path, e))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| EtError::tiff(path, e))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().map_err(|e| EtError::tiff(path, e))?;
        let (width, height) = (width as usize, height as usize);

        let transform = read_transform(&mut decoder).map_err(|e| EtError::tiff(path, e))?;
        let epsg = read_epsg(&mut decoder).map_err(|e| EtError::tiff(path, e))?;
        let nodata = read_nodata(&mut decoder).map_err(|e| EtError::tiff(path, e))?;

        let pixels: Vec<f32> = match decoder.read_image().map_err(|e| EtError::tiff(path, e))? {
            DecodingResult::F32(v) => v,
            DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
            DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
            _ => {
                return Err(EtError::UnsupportedRaster(format!(
                    "{}: unsupported sample type",
                    path.display()
                )));
            }
        };
        if pixels.len() != width * height {
            return Err(EtError::UnsupportedRaster(format!(
                "{}: expected a single band of {}x{} pixels, found {} samples",
                path.display(),
                width,
                height,
                pixels.len()
            )));
        }

        debug!("Read {}x{} raster from {}", width, height, path.display());
        Raster::new(
            Grid::from_row_slice(height, width, &pixels),
            RasterProfile {
                width,
                height,
                transform,
                epsg,
                nodata,
            },
        )
    }

    /// Write as an LZW-compressed float32 GeoTIFF, creating parent
    /// directories as needed.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EtError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| EtError::io(path, e))?;
        self.encode(BufWriter::new(file))
            .map_err(|e| EtError::tiff(path, e))?;
        debug!("Wrote raster {}", path.display());
        Ok(())
    }

    fn encode<W: std::io::Write + std::io::Seek>(&self, writer: W) -> tiff::TiffResult<()> {
        let mut encoder = TiffEncoder::new(writer)?;
        let mut image = encoder.new_image_with_compression::<colortype::Gray32Float, _>(
            self.profile.width as u32,
            self.profile.height as u32,
            Lzw::default(),
        )?;

        if let Some(t) = self.profile.transform {
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, &[t.pixel_width, t.pixel_height, 0.0][..])?;
            image.encoder().write_tag(
                Tag::ModelTiepointTag,
                &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..],
            )?;
        }
        if let Some(epsg) = self.profile.epsg {
            let keys = geo_key_directory(epsg);
            image
                .encoder()
                .write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;
        }
        if let Some(nodata) = self.profile.nodata {
            image
                .encoder()
                .write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
        }

        // Row-major sample order
        let samples: Vec<f32> = self.grid.transpose().as_slice().to_vec();
        image.write_data(&samples)
    }
}

/// Where the fusion engine reads snapshots from and writes ETc rasters to.
pub trait RasterStore {
    fn read(&mut self, path: &Path) -> Result<Raster>;
    fn write(&mut self, path: &Path, raster: &Raster) -> Result<()>;
}

// GeoTIFF files on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffStore;

impl RasterStore for GeoTiffStore {
    fn read(&mut self, path: &Path) -> Result<Raster> {
        Raster::read(path)
    }

    fn write(&mut self, path: &Path, raster: &Raster) -> Result<()> {
        raster.write(path)
    }
}

// 4326 and friends are geographic, everything else is treated as projected
fn is_geographic(epsg: u16) -> bool {
    (4000..5000).contains(&epsg)
}

fn geo_key_directory(epsg: u16) -> [u16; 16] {
    let (model_type, crs_key) = if is_geographic(epsg) {
        (2, GEOGRAPHIC_TYPE)
    } else {
        (1, PROJECTED_CS_TYPE)
    };
    #[rustfmt::skip]
    let keys = [
        1, 1, 0, 3, // version, revision, minor, key count
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, epsg,
    ];
    keys
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<Option<GeoTransform>> {
    let scale = match decoder.find_tag(Tag::ModelPixelScaleTag)? {
        Some(value) => value.into_f64_vec()?,
        None => return Ok(None),
    };
    let tiepoint = match decoder.find_tag(Tag::ModelTiepointTag)? {
        Some(value) => value.into_f64_vec()?,
        None => return Ok(None),
    };
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Ok(None);
    }
    // Tie point (i, j) → (x, y); shift back to the raster origin
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    Ok(Some(GeoTransform {
        origin_x: x - i * scale[0],
        origin_y: y + j * scale[1],
        pixel_width: scale[0],
        pixel_height: scale[1],
    }))
}

fn read_epsg<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<Option<u16>> {
    let keys = match decoder.find_tag(Tag::GeoKeyDirectoryTag)? {
        Some(value) => value.into_u16_vec()?,
        None => return Ok(None),
    };
    // Header is 4 shorts, then 4 shorts per key
    Ok(keys
        .get(4..)
        .unwrap_or(&[])
        .chunks_exact(4)
        .find(|key| {
            (key[0] == PROJECTED_CS_TYPE || key[0] == GEOGRAPHIC_TYPE) && key[1] == 0
        })
        .map(|key| key[3]))
}

fn read_nodata<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<Option<f32>> {
    let text = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => value.into_string()?,
        None => return Ok(None),
    };
    Ok(text.trim_matches(char::from(0)).trim().parse::<f32>().ok())
}
