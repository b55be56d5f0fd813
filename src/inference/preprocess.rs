//! Image preprocessing
//!
//! Turns raw image bytes into the normalized tensor the classifier expects:
//! decode, force RGB, resize to a square with an anti-aliased bilinear
//! filter (the same sampling as PIL's `Image.resize(..., BILINEAR)`), scale
//! to [0, 1] and normalize with the ImageNet statistics. Output is CHW.

use std::io::Cursor;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{DynamicImage, ImageReader, RgbImage};

use crate::utils::error::{LeafbotError, Result};
use crate::{IMAGE_SIZE, NUM_CHANNELS};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Normalized image in CHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Vec<f32>,
    pub size: usize,
}

impl ImageTensor {
    /// Batch of one: [1, 3, size, size]
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let data = TensorData::new(
            self.data.clone(),
            [1, NUM_CHANNELS, self.size, self.size],
        );
        Tensor::<B, 4>::from_floats(data, device)
    }
}

/// Decode + resize + normalize
#[derive(Debug, Clone)]
pub struct PreprocessingPipeline {
    pub image_size: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessingPipeline {
    fn default() -> Self {
        Self::new(IMAGE_SIZE)
    }
}

impl PreprocessingPipeline {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    /// Decode bytes in any supported format; the format is sniffed from content
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(LeafbotError::ImageDecode("empty input".to_string()));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| LeafbotError::ImageDecode(e.to_string()))?;

        if reader.format().is_none() {
            return Err(LeafbotError::ImageDecode("unrecognized image format".to_string()));
        }

        Ok(reader.decode()?)
    }

    /// Resize and normalize a decoded image
    pub fn transform(&self, image: &DynamicImage) -> ImageTensor {
        let size = self.image_size;
        let rgb = bilinear_resize(&image.to_rgb8(), size as u32, size as u32);
        let num_pixels = size * size;

        let mut data = vec![0.0f32; NUM_CHANNELS * num_pixels];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..NUM_CHANNELS {
                data[c * num_pixels + i] = (pixel[c] as f32 / 255.0 - self.mean[c]) / self.std[c];
            }
        }

        ImageTensor { data, size }
    }

    pub fn process(&self, bytes: &[u8]) -> Result<ImageTensor> {
        let image = self.decode(bytes)?;
        Ok(self.transform(&image))
    }
}

/// Contributing source pixels for one output coordinate
struct Taps {
    start: usize,
    weights: Vec<f32>,
}

/// Triangle-filter taps along one axis, widened when downscaling
fn axis_taps(in_size: usize, out_size: usize) -> Vec<Taps> {
    let scale = in_size as f32 / out_size as f32;
    let filter_scale = scale.max(1.0);
    let support = filter_scale;

    (0..out_size)
        .map(|i| {
            let center = (i as f32 + 0.5) * scale;
            let start = ((center - support + 0.5).floor().max(0.0)) as usize;
            let end = ((center + support + 0.5).floor() as usize).min(in_size);

            let mut weights: Vec<f32> = (start..end)
                .map(|x| {
                    let d = ((x as f32 - center + 0.5) / filter_scale).abs();
                    if d < 1.0 {
                        1.0 - d
                    } else {
                        0.0
                    }
                })
                .collect();

            let total: f32 = weights.iter().sum();
            if total > 0.0 {
                weights.iter_mut().for_each(|w| *w /= total);
            }

            Taps { start, weights }
        })
        .collect()
}

fn sample(taps: &Taps, pixel: impl Fn(usize) -> [u8; 3]) -> [u8; 3] {
    let mut acc = [0.0f32; 3];
    for (offset, w) in taps.weights.iter().enumerate() {
        let p = pixel(taps.start + offset);
        for c in 0..3 {
            acc[c] += p[c] as f32 * w;
        }
    }
    acc.map(|v| v.round().clamp(0.0, 255.0) as u8)
}

/// Separable anti-aliased bilinear resize: horizontal pass, then vertical
fn bilinear_resize(src: &RgbImage, target_width: u32, target_height: u32) -> RgbImage {
    let (src_width, src_height) = src.dimensions();
    if (src_width, src_height) == (target_width, target_height) {
        return src.clone();
    }

    let x_taps = axis_taps(src_width as usize, target_width as usize);
    let y_taps = axis_taps(src_height as usize, target_height as usize);

    let mut horizontal = RgbImage::new(target_width, src_height);
    for y in 0..src_height {
        for (dx, taps) in x_taps.iter().enumerate() {
            let value = sample(taps, |sx| src.get_pixel(sx as u32, y).0);
            horizontal.put_pixel(dx as u32, y, image::Rgb(value));
        }
    }

    let mut dst = RgbImage::new(target_width, target_height);
    for (dy, taps) in y_taps.iter().enumerate() {
        for x in 0..target_width {
            let value = sample(taps, |sy| horizontal.get_pixel(x, sy as u32).0);
            dst.put_pixel(x, dy as u32, image::Rgb(value));
        }
    }

    dst
}
