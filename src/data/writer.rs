use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use ndarray::ArrayView2;
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use super::RasterError;
use super::loader::{TAG_GDAL_NODATA, TAG_PIXEL_SCALE, TAG_TIEPOINT};
use super::model::{GeoTransform, LayerInfo, Raster, RasterStack};
use crate::ramp::ColorRamp;

// ---------------------------------------------------------------------------
// GeoTIFF output
// ---------------------------------------------------------------------------

/// Write a single band as a float32 GeoTIFF.
pub fn write_raster(path: &Path, raster: &Raster) -> Result<(), RasterError> {
    let mut encoder = create_encoder(path)?;
    write_page(&mut encoder, path, &raster.transform, raster.data.view(), None)
}

/// Write every layer of a stack as one page of a multi-page float32 GeoTIFF.
pub fn write_stack(path: &Path, stack: &RasterStack) -> Result<(), RasterError> {
    let mut encoder = create_encoder(path)?;
    for (i, info) in stack.layers.iter().enumerate() {
        write_page(
            &mut encoder,
            path,
            &stack.transform,
            stack.layer(i),
            Some(layer_description(info)),
        )?;
    }
    log::debug!("Wrote {} layers to {}", stack.nlayers(), path.display());
    Ok(())
}

pub(crate) fn layer_description(info: &LayerInfo) -> String {
    match info.date {
        Some(d) => format!("{}@{}", info.name, d.format("%Y-%m-%d")),
        None => info.name.clone(),
    }
}

fn create_encoder(path: &Path) -> Result<TiffEncoder<BufWriter<File>>, RasterError> {
    let file = File::create(path).map_err(|e| RasterError::io(path, e))?;
    TiffEncoder::new(BufWriter::new(file)).map_err(|e| RasterError::tiff(path, e))
}

fn write_page<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    path: &Path,
    transform: &GeoTransform,
    band: ArrayView2<'_, f64>,
    description: Option<String>,
) -> Result<(), RasterError> {
    let (rows, cols) = band.dim();
    let buf: Vec<f32> = band.iter().map(|&v| v as f32).collect();
    let scale = [transform.pixel_width, transform.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];

    let tiff_err = |e| RasterError::tiff(path, e);
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_err)?;
    let dir = image.encoder();
    dir.write_tag(Tag::from_u16_exhaustive(TAG_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err)?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err)?;
    dir.write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), "nan")
        .map_err(tiff_err)?;
    if let Some(text) = description {
        dir.write_tag(Tag::ImageDescription, text.as_str())
            .map_err(tiff_err)?;
    }
    image.write_data(&buf).map_err(tiff_err)
}

// ---------------------------------------------------------------------------
// PNG quicklook
// ---------------------------------------------------------------------------

/// Render a band through a colour ramp and save it as PNG.
pub fn write_png(path: &Path, raster: &Raster, ramp: ColorRamp) -> Result<(), RasterError> {
    let rgba = ramp.render_rgba(&raster.data);
    let image = image::RgbaImage::from_raw(raster.cols() as u32, raster.rows() as u32, rgba)
        .ok_or_else(|| RasterError::Misaligned {
            what: path.display().to_string(),
            detail: "RGBA buffer does not match raster size".to_string(),
        })?;
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::array;

    #[test]
    fn description_carries_date() {
        let d = NaiveDate::from_ymd_opt(2005, 8, 29).unwrap();
        assert_eq!(
            layer_description(&LayerInfo::new("ndvi_2005_241", Some(d))),
            "ndvi_2005_241@2005-08-29"
        );
        assert_eq!(layer_description(&LayerInfo::new("PC1", None)), "PC1");
    }

    #[test]
    fn png_has_raster_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pc1.png");
        let raster = Raster::new(
            GeoTransform::default(),
            array![[-1.0, 0.0, 1.0], [f64::NAN, 0.5, -0.5]],
        );
        write_png(&path, &raster, ColorRamp::Diverging).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }
}
