//! Decode, resize and normalize

use crate::{DecodeError, NormalizedTensor};
use artifact_bundle::{ArtifactBundle, Interpolation, PreprocessSpec, CHANNELS};
use image::imageops::{self, FilterType};
use ndarray::Array3;
use tracing::debug;

/// Uploaded image bytes plus the media type the client declared
#[derive(Debug, Clone)]
pub struct RawImage {
    bytes: Vec<u8>,
    media_type: String,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

/// Preprocessor bound to one bundle's spec
#[derive(Debug, Clone)]
pub struct Preprocessor {
    spec: PreprocessSpec,
}

impl Preprocessor {
    /// Preprocessor for an explicit spec
    pub fn new(spec: PreprocessSpec) -> Self {
        Self { spec }
    }

    /// Preprocessor using the bundle's spec, the normal serving path
    pub fn from_bundle(bundle: &ArtifactBundle) -> Self {
        Self::new(bundle.preprocess_spec().clone())
    }

    /// Spec every image is processed with
    pub fn spec(&self) -> &PreprocessSpec {
        &self.spec
    }

    /// Decode and normalize one upload
    pub fn process(&self, raw: &RawImage) -> Result<NormalizedTensor, DecodeError> {
        process(raw, &self.spec)
    }
}

/// Turn raw bytes into a normalized CHW tensor
///
/// Pure function of `raw` and `spec`: same inputs give bit-identical output.
pub fn process(raw: &RawImage, spec: &PreprocessSpec) -> Result<NormalizedTensor, DecodeError> {
    // Format comes from the content; the declared media type was only used for validation
    let decoded = image::load_from_memory(raw.bytes())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::Empty { width, height });
    }

    // Alpha is dropped without compositing; greyscale is replicated to RGB
    let rgb = decoded.to_rgb8();

    let side = spec.image_size();
    let resized = imageops::resize(&rgb, side, side, filter_type(spec.interpolation()));
    debug!(
        "Preprocessing {}x{} -> {}x{} ({})",
        width,
        height,
        side,
        side,
        spec.interpolation().as_str()
    );

    let mean = spec.normalize_mean();
    let std = spec.normalize_std();
    let side = side as usize;
    let mut data = Array3::<f32>::zeros((CHANNELS, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..CHANNELS {
            let scaled = pixel[c] as f32 / 255.0;
            data[[c, y as usize, x as usize]] = (scaled - mean[c]) / std[c];
        }
    }

    Ok(NormalizedTensor::new(data))
}

fn filter_type(interpolation: Interpolation) -> FilterType {
    match interpolation {
        Interpolation::Nearest => FilterType::Nearest,
        Interpolation::Bilinear => FilterType::Triangle,
        Interpolation::Lanczos3 => FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_bundle::{IMAGENET_MEAN, IMAGENET_STD};
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn solid_png(width: u32, height: u32, color: [u8; 3]) -> RawImage {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        RawImage::new(encode(DynamicImage::ImageRgb8(img), ImageFormat::Png), "image/png")
    }

    fn gradient_png(width: u32, height: u32) -> RawImage {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 13 % 256) as u8, (y * 7 % 256) as u8, ((x + y) * 5 % 256) as u8])
        });
        RawImage::new(encode(DynamicImage::ImageRgb8(img), ImageFormat::Png), "image/png")
    }

    fn unit_spec(size: u32) -> PreprocessSpec {
        PreprocessSpec::new("test", size, [0.0; 3], [1.0; 3])
            .unwrap()
            .with_interpolation(Interpolation::Nearest)
    }

    #[test]
    fn test_shape_follows_spec() {
        let raw = gradient_png(40, 30);

        let small = process(&raw, &PreprocessSpec::imagenet("r", 8).unwrap()).unwrap();
        let large = process(&raw, &PreprocessSpec::imagenet("r", 32).unwrap()).unwrap();

        assert_eq!(small.shape(), [3, 8, 8]);
        assert_eq!(large.shape(), [3, 32, 32]);
    }

    #[test]
    fn test_scaling_to_unit_range() {
        let tensor = process(&solid_png(10, 6, [255, 0, 51]), &unit_spec(4)).unwrap();
        let array = tensor.as_array();

        assert!(array.index_axis(ndarray::Axis(0), 0).iter().all(|&v| v == 1.0));
        assert!(array.index_axis(ndarray::Axis(0), 1).iter().all(|&v| v == 0.0));
        assert!(array
            .index_axis(ndarray::Axis(0), 2)
            .iter()
            .all(|&v| (v - 0.2).abs() < 1e-6));
        assert_eq!(tensor.value_range(), (0.0, 1.0));
    }

    #[test]
    fn test_per_channel_normalization() {
        let spec = PreprocessSpec::imagenet("r", 4)
            .unwrap()
            .with_interpolation(Interpolation::Nearest);
        let tensor = process(&solid_png(5, 5, [0, 0, 0]), &spec).unwrap();

        for c in 0..3 {
            let expected = -IMAGENET_MEAN[c] / IMAGENET_STD[c];
            assert_eq!(tensor.as_array()[[c, 2, 2]], expected);
        }
    }

    #[test]
    fn test_alpha_dropped_and_grey_replicated() {
        let rgba = RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 0]));
        let raw = RawImage::new(encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png), "image/png");
        let tensor = process(&raw, &unit_spec(3)).unwrap();
        assert_eq!(tensor.shape(), [3, 3, 3]);
        assert!((tensor.as_array()[[0, 0, 0]] - 10.0 / 255.0).abs() < 1e-6);
        assert!((tensor.as_array()[[2, 1, 1]] - 30.0 / 255.0).abs() < 1e-6);

        let grey = GrayImage::from_pixel(6, 6, Luma([200]));
        let raw = RawImage::new(encode(DynamicImage::ImageLuma8(grey), ImageFormat::Png), "image/png");
        let tensor = process(&raw, &unit_spec(3)).unwrap();
        let v = tensor.as_array()[[0, 1, 1]];
        assert_eq!(tensor.as_array()[[1, 1, 1]], v);
        assert_eq!(tensor.as_array()[[2, 1, 1]], v);
    }

    #[test]
    fn test_jpeg_is_decoded() {
        let img = RgbImage::from_pixel(16, 12, Rgb([90, 140, 60]));
        let raw = RawImage::new(encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg), "image/jpeg");
        let tensor = process(&raw, &PreprocessSpec::imagenet("r", 8).unwrap()).unwrap();
        assert_eq!(tensor.shape(), [3, 8, 8]);
    }

    #[test]
    fn test_repeated_runs_are_bit_identical() {
        let raw = gradient_png(33, 21);
        let spec = PreprocessSpec::imagenet("r", 17).unwrap();

        let first: Vec<u32> = process(&raw, &spec).unwrap().to_vec().iter().map(|v| v.to_bits()).collect();
        let second: Vec<u32> = process(&raw, &spec).unwrap().to_vec().iter().map(|v| v.to_bits()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_text_is_a_decode_error() {
        let raw = RawImage::new(b"just some notes, not a leaf".to_vec(), "image/jpeg");
        let err = process(&raw, &unit_spec(8)).unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));

        let raw = RawImage::new(Vec::new(), "image/png");
        assert!(process(&raw, &unit_spec(8)).is_err());
    }

    #[test]
    fn test_truncated_png_is_a_decode_error() {
        let mut bytes = gradient_png(20, 20).bytes().to_vec();
        bytes.truncate(bytes.len() / 2);
        let raw = RawImage::new(bytes, "image/png");
        assert!(process(&raw, &unit_spec(8)).is_err());
    }

    #[test]
    fn test_preprocessor_uses_bound_spec() {
        let pre = Preprocessor::new(unit_spec(5));
        let tensor = pre.process(&solid_png(9, 9, [1, 2, 3])).unwrap();
        assert_eq!(tensor.shape(), pre.spec().tensor_shape());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_output_shape_depends_only_on_spec(
            width in 1u32..24,
            height in 1u32..24,
            size in 1u32..20,
        ) {
            let spec = PreprocessSpec::imagenet("r", size).unwrap();
            let tensor = process(&gradient_png(width, height), &spec).unwrap();

            prop_assert_eq!(tensor.shape(), [3, size as usize, size as usize]);
            let floor = (0..3).map(|c| -IMAGENET_MEAN[c] / IMAGENET_STD[c]).fold(f32::INFINITY, f32::min);
            let ceiling = (0..3).map(|c| (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c]).fold(f32::NEG_INFINITY, f32::max);
            let (lo, hi) = tensor.value_range();
            prop_assert!(lo >= floor - 1e-5);
            prop_assert!(hi <= ceiling + 1e-5);
        }
    }
}
