use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};

use crate::core::geometry::BlobBox;
use crate::core::model::{MathExpressionFinderResults, ResultType, Segmentation};
use crate::export::Exporter;

const OUTLINE: i32 = 2;

pub fn result_color(result_type: ResultType) -> Rgb<u8> {
    match result_type {
        ResultType::Displayed => Rgb([255, 0, 0]),
        ResultType::Embedded => Rgb([0, 0, 255]),
        ResultType::Label => Rgb([0, 160, 0]),
    }
}

/// Outlines a box, clipped to the image.
pub fn draw_box(img: &mut RgbImage, bbox: &BlobBox, color: Rgb<u8>) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < w && y < h {
            img.put_pixel(x as u32, y as u32, color);
        }
    };
    for t in 0..OUTLINE {
        for x in bbox.left..=bbox.right {
            put(x, bbox.top + t);
            put(x, bbox.bottom - t);
        }
        for y in bbox.top..=bbox.bottom {
            put(bbox.left + t, y);
            put(bbox.right - t, y);
        }
    }
}

/// Loads the page image and outlines every segment in its type's color.
pub fn render_overlay(image_path: &Path, segments: &[Segmentation]) -> Result<RgbImage> {
    let mut img = image::open(image_path)
        .with_context(|| format!("failed to open page image {}", image_path.display()))?
        .to_rgb8();
    for seg in segments {
        draw_box(&mut img, &seg.bbox, result_color(seg.result_type));
    }
    Ok(img)
}

/// Writes each page's overlay image, when one was rendered, as
/// `<out>/<results_dir_name>/<results_name>.png`.
#[derive(Debug, Clone)]
pub struct OverlayExporter {
    out_dir: PathBuf,
}

impl OverlayExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for OverlayExporter {
    fn export(&self, results: &[MathExpressionFinderResults]) -> Result<()> {
        for r in results {
            let Some(img) = &r.visual_display else {
                continue;
            };
            let dir = self.out_dir.join(&r.results_dir_name);
            fs::create_dir_all(&dir)?;
            let stem = Path::new(&r.results_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| r.results_name.clone());
            let path = dir.join(format!("{stem}.png"));
            img.save(&path)
                .with_context(|| format!("failed to write overlay {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn outline_is_drawn_and_clipped() {
        let mut img = RgbImage::new(20, 20);
        draw_box(&mut img, &BlobBox::new(2, 2, 10, 10), result_color(ResultType::Embedded));
        draw_box(&mut img, &BlobBox::new(15, 15, 30, 30), result_color(ResultType::Displayed));
        assert_eq!(*img.get_pixel(2, 5), Rgb([0, 0, 255]));
        assert_eq!(*img.get_pixel(3, 5), Rgb([0, 0, 255]));
        assert_eq!(*img.get_pixel(5, 5), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(16, 19), Rgb([255, 0, 0]));
    }
}
