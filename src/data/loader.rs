use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use glob::glob;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::RasterError;
use super::dates::DatePattern;
use super::model::{GeoTransform, LayerInfo, Raster, RasterStack};

/// GeoTIFF `ModelPixelScaleTag`.
pub(crate) const TAG_PIXEL_SCALE: u16 = 33550;
/// GeoTIFF `ModelTiepointTag`.
pub(crate) const TAG_TIEPOINT: u16 = 33922;
/// GDAL's ASCII no-data tag.
pub(crate) const TAG_GDAL_NODATA: u16 = 42113;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Where the time series lives on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSource {
    pub dir: PathBuf,
    pub glob: String,
    pub date_pattern: DatePattern,
}

impl Default for StackSource {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            glob: "*.tif".to_string(),
            date_pattern: DatePattern::default(),
        }
    }
}

impl StackSource {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Glob the source directory, date every file by name and stack the rasters
/// in acquisition order.
///
/// Files whose name carries no date are skipped with a warning; every
/// remaining raster must share the first one's grid.
pub fn load_stack(source: &StackSource) -> Result<RasterStack, RasterError> {
    let pattern = source.dir.join(&source.glob).to_string_lossy().to_string();
    let dates = source.date_pattern.compile()?;
    log::info!("Scanning for rasters with pattern: {pattern}");

    let mut dated: Vec<(NaiveDate, PathBuf)> = Vec::new();
    for entry in glob(&pattern)? {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Bad path from glob: {e:?}");
                continue;
            }
        };
        let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        match dates.parse(file_name) {
            Ok(date) => dated.push((date, path)),
            Err(e) => log::warn!("Skipping {file_name}: {e}"),
        }
    }

    if dated.is_empty() {
        return Err(RasterError::NoRasters(pattern));
    }
    dated.sort();

    let mut transform: Option<GeoTransform> = None;
    let mut layers = Vec::with_capacity(dated.len());
    for (date, path) in dated {
        let raster = read_raster(&path)?;
        match &transform {
            None => transform = Some(raster.transform),
            Some(reference) if !reference.aligned_with(&raster.transform) => {
                return Err(RasterError::Misaligned {
                    what: path.display().to_string(),
                    detail: format!("{:?} vs {:?}", raster.transform, reference),
                });
            }
            Some(_) => {}
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        log::debug!("Layer {name} dated {date}");
        layers.push((LayerInfo::new(name, Some(date)), raster.data));
    }

    let stack = RasterStack::from_layers(transform.unwrap_or_default(), layers)?;
    log::info!(
        "Stacked {} layers of {}x{} cells",
        stack.nlayers(),
        stack.rows(),
        stack.cols()
    );
    Ok(stack)
}

/// Read the first page of a (Geo)TIFF as a single band.
pub fn read_raster(path: &Path) -> Result<Raster, RasterError> {
    let mut decoder = open_decoder(path)?;
    let transform = read_transform(&mut decoder, path)?;
    let data = read_page(&mut decoder, path)?;
    Ok(Raster::new(transform, data))
}

/// Read a multi-page TIFF written by [`super::writer::write_stack`].
///
/// Each page's `ImageDescription` holds `name` or `name@YYYY-MM-DD`.
pub fn read_stack_file(path: &Path) -> Result<RasterStack, RasterError> {
    let mut decoder = open_decoder(path)?;
    let transform = read_transform(&mut decoder, path)?;
    let mut layers = Vec::new();

    loop {
        let description = decoder
            .find_tag(Tag::ImageDescription)
            .map_err(|e| RasterError::tiff(path, e))?
            .map(|v| v.into_string())
            .transpose()
            .map_err(|e| RasterError::tiff(path, e))?;
        let index = layers.len();
        let info = description
            .map(|d| parse_layer_description(&d))
            .unwrap_or_else(|| LayerInfo::new(format!("layer_{}", index + 1), None));
        let band = read_page(&mut decoder, path)?;
        layers.push((info, band));

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| RasterError::tiff(path, e))?;
    }

    RasterStack::from_layers(transform, layers)
}

pub(crate) fn parse_layer_description(description: &str) -> LayerInfo {
    let description = description.trim_end_matches('\0');
    match description.rsplit_once('@') {
        Some((name, date)) => match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(d) => LayerInfo::new(name, Some(d)),
            Err(_) => LayerInfo::new(description, None),
        },
        None => LayerInfo::new(description, None),
    }
}

// ---------------------------------------------------------------------------
// TIFF helpers
// ---------------------------------------------------------------------------

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, RasterError> {
    let file = File::open(path).map_err(|e| RasterError::io(path, e))?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| RasterError::tiff(path, e))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

fn read_transform(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<GeoTransform, RasterError> {
    let scale = find_f64_tag(decoder, TAG_PIXEL_SCALE, path)?;
    let tiepoint = find_f64_tag(decoder, TAG_TIEPOINT, path)?;

    match (scale, tiepoint) {
        (Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (sx, sy) = (scale[0], scale[1]);
            Ok(GeoTransform::new(
                tie[3] - tie[0] * sx,
                tie[4] + tie[1] * sy,
                sx,
                sy,
            ))
        }
        _ => {
            log::warn!(
                "{} carries no georeferencing, using a unit grid",
                path.display()
            );
            Ok(GeoTransform::default())
        }
    }
}

fn find_f64_tag(
    decoder: &mut Decoder<BufReader<File>>,
    code: u16,
    path: &Path,
) -> Result<Option<Vec<f64>>, RasterError> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))
        .map_err(|e| RasterError::tiff(path, e))?
        .map(|v| v.into_f64_vec())
        .transpose()
        .map_err(|e| RasterError::tiff(path, e))
}

fn find_nodata(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<Option<f64>, RasterError> {
    let text = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
        .map_err(|e| RasterError::tiff(path, e))?
        .map(|v| v.into_string())
        .transpose()
        .map_err(|e| RasterError::tiff(path, e))?;
    Ok(text.and_then(|t| t.trim_end_matches('\0').trim().parse::<f64>().ok()))
}

/// Decode the current page into `f64`, mapping no-data cells to `NaN`.
fn read_page(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<Array2<f64>, RasterError> {
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| RasterError::tiff(path, e))?;
    let nodata = find_nodata(decoder, path)?;
    let image = decoder
        .read_image()
        .map_err(|e| RasterError::tiff(path, e))?;

    let values: Vec<f64> = match image {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        _ => return Err(RasterError::UnsupportedPixelFormat(path.to_path_buf())),
    };

    let (rows, cols) = (height as usize, width as usize);
    if values.len() != rows * cols {
        // Multi-sample (RGB etc.) pages are not single-band rasters.
        return Err(RasterError::UnsupportedPixelFormat(path.to_path_buf()));
    }

    let mut band = Array2::from_shape_vec((rows, cols), values)?;
    if let Some(nd) = nodata.filter(|v| !v.is_nan()) {
        band.mapv_inplace(|v| if v == nd { f64::NAN } else { v });
    }
    Ok(band)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::writer::{write_raster, write_stack};
    use ndarray::array;

    fn transform() -> GeoTransform {
        GeoTransform::new(-150.0, 65.0, 0.25, 0.25)
    }

    #[test]
    fn raster_roundtrip_keeps_georeferencing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.tif");
        let raster = Raster::new(transform(), array![[0.1, 0.2], [f64::NAN, 0.4]]);
        write_raster(&path, &raster).unwrap();

        let back = read_raster(&path).unwrap();
        assert!(back.transform.aligned_with(&transform()));
        assert!((back.data[[0, 1]] - 0.2).abs() < 1e-6);
        assert!(back.data[[1, 0]].is_nan());
    }

    #[test]
    fn load_stack_orders_by_date_and_skips_undated() {
        let dir = tempfile::tempdir().unwrap();
        for (name, v) in [("ndvi_2005_200.tif", 2.0), ("ndvi_2005_150.tif", 1.0)] {
            let raster = Raster::new(transform(), Array2::from_elem((2, 3), v));
            write_raster(&dir.path().join(name), &raster).unwrap();
        }
        let undated = Raster::new(transform(), Array2::zeros((2, 3)));
        write_raster(&dir.path().join("mask.tif"), &undated).unwrap();

        let stack = load_stack(&StackSource::in_dir(dir.path())).unwrap();
        assert_eq!(stack.nlayers(), 2);
        assert_eq!(stack.layers[0].name, "ndvi_2005_150");
        assert_eq!(stack.layers[0].doy(), Some(150));
        assert_eq!(stack.pixel(1, 2).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn load_stack_rejects_misaligned_rasters() {
        let dir = tempfile::tempdir().unwrap();
        let a = Raster::new(transform(), Array2::zeros((2, 2)));
        let b = Raster::new(transform().shifted(1, 0), Array2::zeros((2, 2)));
        write_raster(&dir.path().join("ndvi_2005_100.tif"), &a).unwrap();
        write_raster(&dir.path().join("ndvi_2005_101.tif"), &b).unwrap();
        let err = load_stack(&StackSource::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, RasterError::Misaligned { .. }));
    }

    #[test]
    fn empty_directory_has_no_rasters() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_stack(&StackSource::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, RasterError::NoRasters(_)));
    }

    #[test]
    fn stack_file_keeps_names_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        let d = NaiveDate::from_ymd_opt(2005, 6, 1).unwrap();
        let stack = RasterStack::from_layers(
            transform(),
            vec![
                (LayerInfo::new("june", Some(d)), array![[1.0, 2.0]]),
                (LayerInfo::new("PC2", None), array![[3.0, 4.0]]),
            ],
        )
        .unwrap();
        write_stack(&path, &stack).unwrap();

        let back = read_stack_file(&path).unwrap();
        assert_eq!(back.layers, stack.layers);
        assert_eq!(back.pixel(0, 1).to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn layer_description_parsing() {
        let info = parse_layer_description("ndvi_2005_129@2005-05-09\0");
        assert_eq!(info.name, "ndvi_2005_129");
        assert_eq!(info.doy(), Some(129));
        assert_eq!(parse_layer_description("PC1").date, None);
    }

    #[test]
    fn integer_nodata_reads_as_nan() {
        use tiff::encoder::{TiffEncoder, colortype};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndvi_int.tif");
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        let mut image = encoder.new_image::<colortype::GrayI16>(3, 2).unwrap();
        let tags = image.encoder();
        tags.write_tag(Tag::from_u16_exhaustive(TAG_PIXEL_SCALE), &[0.25, 0.25, 0.0][..])
            .unwrap();
        tags.write_tag(
            Tag::from_u16_exhaustive(TAG_TIEPOINT),
            &[0.0, 0.0, 0.0, -150.0, 65.0, 0.0][..],
        )
        .unwrap();
        tags.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), "-9999")
            .unwrap();
        image
            .write_data(&[8000i16, -9999, 4500, -9999, -200, 0])
            .unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.transform, transform());
        assert_eq!(raster.data[[0, 0]], 8000.0);
        assert!(raster.data[[0, 1]].is_nan());
        assert!(raster.data[[1, 0]].is_nan());
        assert_eq!(raster.data[[1, 1]], -200.0);
        assert_eq!(raster.data[[1, 2]], 0.0);
    }

    #[test]
    fn missing_georeferencing_uses_unit_grid() {
        use tiff::encoder::{TiffEncoder, colortype};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
        encoder
            .write_image::<colortype::Gray8>(2, 2, &[1, 2, 3, 4])
            .unwrap();

        let raster = read_raster(&path).unwrap();
        assert_eq!(raster.transform, GeoTransform::default());
        assert_eq!(raster.data, array![[1.0, 2.0], [3.0, 4.0]]);
    }
}
