//! Reading frames and writing single-channel output.

use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

use crate::error::FrameError;

/// Color encodings a blockface frame may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameColor {
    Grayscale,
    Truecolor,
}

/// Map a decoder color type onto the two accepted encodings.
pub fn classify_color(color: ColorType) -> Option<FrameColor> {
    match color {
        ColorType::L8 | ColorType::L16 => Some(FrameColor::Grayscale),
        ColorType::Rgb8 | ColorType::Rgb16 => Some(FrameColor::Truecolor),
        _ => None,
    }
}

fn image_error(path: &Path, source: image::ImageError) -> FrameError {
    FrameError::Image {
        path: path.to_path_buf(),
        source,
    }
}

/// Read only the header of `path` and report its color encoding.
pub fn probe_color(path: &Path) -> Result<FrameColor, FrameError> {
    let reader = ImageReader::open(path).map_err(|source| FrameError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = reader
        .with_guessed_format()
        .map_err(|source| FrameError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .into_decoder()
        .map_err(|e| image_error(path, e))?;

    let color = decoder.color_type();
    classify_color(color).ok_or_else(|| FrameError::UnsupportedColor {
        path: path.to_path_buf(),
        color: format!("{:?}", color),
    })
}

pub fn load_image(path: &Path) -> Result<DynamicImage, FrameError> {
    let start = std::time::Instant::now();
    let img = image::open(path).map_err(|e| image_error(path, e))?;
    log::debug!(
        "Loaded {} in {:?} - Size: {}x{}, Color: {:?}",
        path.display(),
        start.elapsed(),
        img.width(),
        img.height(),
        img.color()
    );
    Ok(img)
}

/// Convert to single-channel luma, keeping 16-bit depth when present.
pub fn to_grayscale(img: DynamicImage, path: &Path) -> Result<DynamicImage, FrameError> {
    let color = img.color();
    match (classify_color(color), color) {
        (Some(FrameColor::Grayscale), _) => Ok(img),
        (Some(FrameColor::Truecolor), ColorType::Rgb16) => {
            Ok(DynamicImage::ImageLuma16(img.to_luma16()))
        }
        (Some(FrameColor::Truecolor), _) => Ok(DynamicImage::ImageLuma8(img.to_luma8())),
        (None, _) => Err(FrameError::UnsupportedColor {
            path: path.to_path_buf(),
            color: format!("{:?}", color),
        }),
    }
}

/// Copy `source` to `destination` as a single-channel image.
///
/// Grayscale files are copied byte for byte. Truecolor files are decoded,
/// converted and re-encoded in the format implied by the destination
/// extension. Any other encoding is rejected before the destination is
/// touched.
pub fn copy_as_grayscale(source: &Path, destination: &Path) -> Result<FrameColor, FrameError> {
    let color = probe_color(source)?;
    match color {
        FrameColor::Grayscale => {
            std::fs::copy(source, destination).map_err(|source_err| FrameError::Io {
                path: destination.to_path_buf(),
                source: source_err,
            })?;
        }
        FrameColor::Truecolor => write_grayscale(source, destination)?,
    }
    Ok(color)
}

/// Decode any accepted frame, convert it to luma and encode it at `destination`.
pub fn write_grayscale(source: &Path, destination: &Path) -> Result<(), FrameError> {
    let gray = to_grayscale(load_image(source)?, source)?;
    gray.save(destination)
        .map_err(|e| image_error(destination, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, RgbaImage};

    #[test]
    fn rejects_alpha_encodings() {
        assert_eq!(classify_color(ColorType::La8), None);
        assert_eq!(classify_color(ColorType::Rgba16), None);
        assert_eq!(classify_color(ColorType::Rgb16), Some(FrameColor::Truecolor));
    }

    #[test]
    fn truecolor_is_converted_on_copy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("color.png");
        let dst = dir.path().join("out.png");
        RgbImage::from_pixel(4, 3, Rgb([200, 100, 50])).save(&src).unwrap();

        assert_eq!(copy_as_grayscale(&src, &dst).unwrap(), FrameColor::Truecolor);
        let out = image::open(&dst).unwrap();
        assert_eq!(out.color(), ColorType::L8);
        assert_eq!((out.width(), out.height()), (4, 3));
    }

    #[test]
    fn grayscale_is_copied_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("gray.png");
        let dst = dir.path().join("out.png");
        GrayImage::from_pixel(5, 5, Luma([77])).save(&src).unwrap();

        copy_as_grayscale(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&dst).unwrap());
    }

    #[test]
    fn alpha_frame_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("alpha.png");
        let dst = dir.path().join("out.png");
        RgbaImage::new(2, 2).save(&src).unwrap();

        let err = copy_as_grayscale(&src, &dst).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedColor { .. }));
        assert!(!dst.exists());
    }
}
