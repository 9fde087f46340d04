//! Raster helpers: codec inference, JPEG header probing, flattening, encoding

use crate::error::{Error, Result};
use crate::intake::InputFile;
use crate::pdf::library::ImageCodec;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{imageops, DynamicImage, ImageDecoder, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

/// Pick the embedding codec from the declared MIME type or the file
/// extension. Anything unrecognized is tried as JPEG.
pub fn infer_codec(file: &InputFile) -> ImageCodec {
    let mime = file.mime.as_deref().unwrap_or("");
    let ext = file.extension();
    let ext = ext.as_deref().unwrap_or("");

    if mime == "image/jpeg" || ext == "jpg" || ext == "jpeg" {
        ImageCodec::Jpeg
    } else if mime == "image/png" || ext == "png" {
        ImageCodec::Png
    } else {
        ImageCodec::Jpeg
    }
}

/// Frame header fields of a JPEG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub bits_per_component: u8,
}

fn not_jpeg(reason: impl std::fmt::Display) -> Error {
    Error::UnsupportedImage {
        reason: reason.to_string(),
    }
}

/// Read dimensions and color layout from the JPEG headers
pub fn probe_jpeg(data: &[u8]) -> Result<JpegInfo> {
    let decoder = JpegDecoder::new(Cursor::new(data)).map_err(not_jpeg)?;
    let (width, height) = decoder.dimensions();
    if width == 0 || height == 0 {
        return Err(not_jpeg("JPEG frame has zero dimension"));
    }

    let color = decoder.original_color_type();
    let components = color.channel_count();
    Ok(JpegInfo {
        width,
        height,
        components,
        bits_per_component: (color.bits_per_pixel() / components as u16) as u8,
    })
}

/// Composite any transparency over an opaque white background
pub fn flatten_onto_white(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let top = image.to_rgba8();
    let mut canvas = RgbaImage::from_pixel(top.width(), top.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &top, 0, 0);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(image)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb};
    use rstest::rstest;

    #[rstest]
    #[case("photo.jpg", None, ImageCodec::Jpeg)]
    #[case("photo.JPEG", None, ImageCodec::Jpeg)]
    #[case("scan.png", None, ImageCodec::Png)]
    #[case("blob", Some("image/png"), ImageCodec::Png)]
    #[case("blob", Some("image/jpeg"), ImageCodec::Jpeg)]
    #[case("diagram.webp", Some("image/webp"), ImageCodec::Jpeg)]
    #[case("noext", None, ImageCodec::Jpeg)]
    fn test_infer_codec(#[case] name: &str, #[case] mime: Option<&str>, #[case] expected: ImageCodec) {
        let file = InputFile::new(name, mime.map(str::to_string), Vec::new());
        assert_eq!(infer_codec(&file), expected);
    }

    #[test]
    fn test_probe_encoded_jpeg() {
        let img = RgbImage::from_pixel(33, 17, Rgb([200, 10, 10]));
        let bytes = encode_jpeg(&img, 85).unwrap();
        let info = probe_jpeg(&bytes).unwrap();
        assert_eq!(
            info,
            JpegInfo {
                width: 33,
                height: 17,
                components: 3,
                bits_per_component: 8,
            }
        );
    }

    #[test]
    fn test_probe_grayscale_jpeg() {
        let img = GrayImage::from_pixel(8, 5, Luma([90]));
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        let info = probe_jpeg(&bytes).unwrap();
        assert_eq!((info.width, info.height), (8, 5));
        assert_eq!(info.components, 1);
        assert_eq!(info.bits_per_component, 8);
    }

    #[test]
    fn test_probe_rejects_png_and_garbage() {
        let mut png = Vec::new();
        RgbaImage::new(2, 2)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        assert!(probe_jpeg(&png).is_err());
        assert!(probe_jpeg(b"").is_err());
        assert!(probe_jpeg(&[0xFF, 0xD8, 0xFF]).is_err());
        assert!(probe_jpeg(&[0xFF, 0xD8, 0xFF, 0xD9]).is_err());
    }

    #[test]
    fn test_flatten_transparent_pixels_become_white() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_onto_white(DynamicImage::ImageRgba8(img));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_flatten_half_transparent() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 128]));
        let flat = flatten_onto_white(DynamicImage::ImageRgba8(img));
        let px = flat.get_pixel(0, 0);
        assert!(px[0] > 120 && px[0] < 135);
    }
}
