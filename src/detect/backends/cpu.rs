use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::{DetectorBackend, FaceBox};

const CELL: u32 = 16;
const SKIN_CELL_RATIO: f32 = 0.5;
const MIN_REGION_CELLS: usize = 2;

/// CPU fallback backend: skin-tone blob detector.
///
/// Lower accuracy than a model backend. It grids the frame into
/// 16x16 cells, marks cells dominated by skin-tone pixels, and merges
/// 4-connected marked cells into candidate face boxes. Regions with an
/// implausible aspect ratio are dropped.
#[derive(Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let (width, height) = image.dimensions();
        if width < CELL || height < CELL {
            return Ok(Vec::new());
        }

        let cols = width / CELL;
        let rows = height / CELL;
        let mut marked = vec![false; (cols * rows) as usize];

        for row in 0..rows {
            for col in 0..cols {
                let mut skin = 0u32;
                for dy in 0..CELL {
                    for dx in 0..CELL {
                        let p = image.get_pixel(col * CELL + dx, row * CELL + dy);
                        if is_skin_tone(p.0[0], p.0[1], p.0[2]) {
                            skin += 1;
                        }
                    }
                }
                let ratio = skin as f32 / (CELL * CELL) as f32;
                marked[(row * cols + col) as usize] = ratio >= SKIN_CELL_RATIO;
            }
        }

        Ok(merge_regions(&marked, cols, rows))
    }
}

/// Classic RGB skin-tone rule (Kovac et al.).
fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    let (ri, gi, bi) = (r as i16, g as i16, b as i16);
    r > 95
        && g > 40
        && b > 20
        && ri - gi > 15
        && ri > bi
        && (ri.max(gi).max(bi) - ri.min(gi).min(bi)) > 15
}

fn merge_regions(marked: &[bool], cols: u32, rows: u32) -> Vec<FaceBox> {
    let mut visited = vec![false; marked.len()];
    let mut boxes = Vec::new();

    for start in 0..marked.len() {
        if !marked[start] || visited[start] {
            continue;
        }
        // Flood fill over 4-connected marked cells.
        let mut stack = vec![start];
        let mut cells = 0usize;
        let (mut min_c, mut min_r) = (cols, rows);
        let (mut max_c, mut max_r) = (0u32, 0u32);
        while let Some(idx) = stack.pop() {
            if visited[idx] || !marked[idx] {
                continue;
            }
            visited[idx] = true;
            cells += 1;
            let col = idx as u32 % cols;
            let row = idx as u32 / cols;
            min_c = min_c.min(col);
            min_r = min_r.min(row);
            max_c = max_c.max(col);
            max_r = max_r.max(row);
            if col > 0 {
                stack.push(idx - 1);
            }
            if col + 1 < cols {
                stack.push(idx + 1);
            }
            if row > 0 {
                stack.push(idx - cols as usize);
            }
            if row + 1 < rows {
                stack.push(idx + cols as usize);
            }
        }

        if cells < MIN_REGION_CELLS {
            continue;
        }
        let w = (max_c - min_c + 1) as f32;
        let h = (max_r - min_r + 1) as f32;
        let aspect = w / h;
        if !(0.4..=2.5).contains(&aspect) {
            continue;
        }
        boxes.push(FaceBox::new(
            min_c * CELL,
            min_r * CELL,
            (max_c + 1) * CELL,
            (max_r + 1) * CELL,
        ));
    }

    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn uniform_dark_frame_has_no_faces() {
        let img = RgbImage::from_pixel(64, 64, Rgb([10, 10, 10]));
        let boxes = CpuBackend::new().detect(&img).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn skin_patch_is_boxed() {
        let mut img = RgbImage::from_pixel(128, 128, Rgb([10, 60, 10]));
        for y in 32..96 {
            for x in 32..96 {
                img.put_pixel(x, y, Rgb([200, 140, 110]));
            }
        }
        let boxes = CpuBackend::new().detect(&img).unwrap();
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!(b.x1 <= 32 && b.x2 >= 96);
        assert!(b.y1 <= 32 && b.y2 >= 96);
    }

    #[test]
    fn tiny_frames_are_skipped() {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 140, 110]));
        assert!(CpuBackend::new().detect(&img).unwrap().is_empty());
    }
}
