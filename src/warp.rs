//! Inverse-mapping affine warp over `image` buffers.

use image::{DynamicImage, ImageBuffer, Pixel};
use nalgebra::{Matrix3, Point2};
use rayon::prelude::*;

use crate::config::Interpolation;

/// Warp `src` so that a point `p` of the source lands on `forward * p`.
///
/// The output canvas has the source size, pixels mapped from outside the
/// source are black. Returns `None` for color types the warp cannot handle
/// or when `forward` is singular.
pub fn warp_image(
    src: &DynamicImage,
    forward: &Matrix3<f64>,
    interpolation: Interpolation,
) -> Option<DynamicImage> {
    // destination -> source lookup
    let inverse = forward.try_inverse()?;

    let warped = match src {
        DynamicImage::ImageLuma8(buf) => {
            DynamicImage::ImageLuma8(warp_buffer(buf, &inverse, interpolation, to_u8))
        }
        DynamicImage::ImageLuma16(buf) => {
            DynamicImage::ImageLuma16(warp_buffer(buf, &inverse, interpolation, to_u16))
        }
        DynamicImage::ImageRgb8(buf) => {
            DynamicImage::ImageRgb8(warp_buffer(buf, &inverse, interpolation, to_u8))
        }
        DynamicImage::ImageRgb16(buf) => {
            DynamicImage::ImageRgb16(warp_buffer(buf, &inverse, interpolation, to_u16))
        }
        _ => return None,
    };
    Some(warped)
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, u8::MAX as f32) as u8
}

fn to_u16(v: f32) -> u16 {
    v.round().clamp(0.0, u16::MAX as f32) as u16
}

fn warp_buffer<P>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    inverse: &Matrix3<f64>,
    interpolation: Interpolation,
    from_f32: fn(f32) -> P::Subpixel,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
    P::Subpixel: Into<f32> + Send + Sync,
{
    let (width, height) = src.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let mut dst = ImageBuffer::<P, Vec<P::Subpixel>>::new(width, height);
    if width == 0 || height == 0 {
        return dst;
    }

    let sampler = Sampler {
        raw: src.as_raw(),
        width: width as usize,
        height: height as usize,
        channels,
    };
    let row_len = width as usize * channels;
    let out: &mut [P::Subpixel] = &mut dst;

    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let p = inverse.transform_point(&Point2::new(x as f64, y as f64));
                for c in 0..channels {
                    let v = match interpolation {
                        Interpolation::Nearest => sampler.nearest(p.x, p.y, c),
                        Interpolation::Bilinear => sampler.bilinear(p.x, p.y, c),
                    };
                    row[x * channels + c] = from_f32(v);
                }
            }
        });

    dst
}

struct Sampler<'a, S> {
    raw: &'a [S],
    width: usize,
    height: usize,
    channels: usize,
}

impl<S: Copy + Into<f32>> Sampler<'_, S> {
    fn at(&self, x: isize, y: isize, c: usize) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0.0;
        }
        self.raw[(y as usize * self.width + x as usize) * self.channels + c].into()
    }

    fn nearest(&self, x: f64, y: f64, c: usize) -> f32 {
        self.at(x.round() as isize, y.round() as isize, c)
    }

    fn bilinear(&self, x: f64, y: f64, c: usize) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = (x - x0) as f32;
        let fy = (y - y0) as f32;
        let (x0, y0) = (x0 as isize, y0 as isize);

        let v00 = self.at(x0, y0, c);
        let v10 = self.at(x0 + 1, y0, c);
        let v01 = self.at(x0, y0 + 1, c);
        let v11 = self.at(x0 + 1, y0 + 1, c);

        let v0 = v00 * (1.0 - fx) + v10 * fx;
        let v1 = v01 * (1.0 - fx) + v11 * fx;
        v0 * (1.0 - fy) + v1 * fy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::AffineTransform;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn translation_moves_bright_pixel() {
        let mut img = GrayImage::new(8, 8);
        img.put_pixel(2, 2, Luma([255]));

        let shift = AffineTransform::translation(2.0, 1.0);
        let out = warp_image(
            &DynamicImage::ImageLuma8(img),
            shift.matrix(),
            Interpolation::Nearest,
        )
        .unwrap()
        .to_luma8();

        assert_eq!(out.get_pixel(4, 3)[0], 255);
        assert_eq!(out.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn identity_keeps_pixels_bilinear() {
        let mut img = RgbImage::new(5, 4);
        img.put_pixel(3, 1, Rgb([10, 20, 30]));

        let out = warp_image(
            &DynamicImage::ImageRgb8(img),
            AffineTransform::identity().matrix(),
            Interpolation::Bilinear,
        )
        .unwrap()
        .to_rgb8();

        assert_eq!(out.get_pixel(3, 1), &Rgb([10, 20, 30]));
        assert_eq!(out.dimensions(), (5, 4));
    }

    #[test]
    fn uncovered_area_is_black() {
        let img = GrayImage::from_pixel(4, 4, Luma([100]));
        let out = warp_image(
            &DynamicImage::ImageLuma8(img),
            AffineTransform::translation(10.0, 0.0).matrix(),
            Interpolation::Bilinear,
        )
        .unwrap()
        .to_luma8();
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn singular_transform_is_refused() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(2, 2));
        let singular = AffineTransform::from_rows([[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert!(warp_image(&img, singular.matrix(), Interpolation::Nearest).is_none());
    }
}
