use anyhow::Result;
use std::collections::VecDeque;

use crate::config::{ModelVariant, PipelineConfig};
use crate::detect::backend::{DetectorBackend, RunningMode};
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::{Frame, BYTES_PER_PIXEL};

const MIN_SATURATION: f32 = 0.35;
const MIN_VALUE: f32 = 0.2;
const MIN_REGION_CELLS: usize = 2;

/// Hue bands (degrees, upper bound exclusive) and the produce they stand for.
const HUE_CLASSES: [(f32, &str); 6] = [
    (15.0, "tomato"),
    (40.0, "orange"),
    (70.0, "banana"),
    (170.0, "lettuce"),
    (260.0, "blueberry"),
    (345.0, "grape"),
];

/// CPU colour-region detector.
///
/// Averages the frame over a square grid, classifies saturated cells by hue
/// and reports each 4-connected run of same-class cells as one detection.
pub struct CpuBackend {
    grid_columns: u32,
}

impl CpuBackend {
    pub fn new(config: &PipelineConfig) -> Self {
        let grid_columns = match config.model_variant {
            ModelVariant::EfficientDetLite0 => 32,
            ModelVariant::EfficientDetLite2 => 64,
        };
        Self { grid_columns }
    }

    pub fn with_grid_columns(mut self, columns: u32) -> Self {
        self.grid_columns = columns.max(1);
        self
    }

    fn classify_cells(
        &self,
        frame: &Frame,
        cell: u32,
        cols: u32,
        rows: u32,
    ) -> Vec<Option<(usize, f32)>> {
        let stride = frame.width() as usize * BYTES_PER_PIXEL;
        let pixels = frame.pixels();
        let step = (cell / 4).max(1);
        let mut cells = Vec::with_capacity((cols * rows) as usize);

        for row in 0..rows {
            for col in 0..cols {
                let (mut r, mut g, mut b, mut n) = (0u32, 0u32, 0u32, 0u32);
                for y in (row * cell..(row + 1) * cell).step_by(step as usize) {
                    for x in (col * cell..(col + 1) * cell).step_by(step as usize) {
                        let offset = y as usize * stride + x as usize * BYTES_PER_PIXEL;
                        r += pixels[offset] as u32;
                        g += pixels[offset + 1] as u32;
                        b += pixels[offset + 2] as u32;
                        n += 1;
                    }
                }
                let scale = n.max(1) as f32 * 255.0;
                let (hue, saturation, value) =
                    rgb_to_hsv(r as f32 / scale, g as f32 / scale, b as f32 / scale);
                cells.push(if saturation >= MIN_SATURATION && value >= MIN_VALUE {
                    Some((hue_class(hue), saturation))
                } else {
                    None
                });
            }
        }
        cells
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn supports(&self, _mode: RunningMode) -> bool {
        true
    }

    fn detect(
        &mut self,
        frame: &Frame,
        _mode: RunningMode,
        _timestamp_ms: u64,
    ) -> Result<Vec<Detection>> {
        let cell = (frame.width() / self.grid_columns).max(1);
        let cols = frame.width() / cell;
        let rows = frame.height() / cell;
        if cols == 0 || rows == 0 {
            return Ok(Vec::new());
        }

        let cells = self.classify_cells(frame, cell, cols, rows);
        let mut visited = vec![false; cells.len()];
        let mut detections = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..cells.len() {
            let Some((class, _)) = cells[start] else {
                continue;
            };
            if visited[start] {
                continue;
            }

            visited[start] = true;
            queue.push_back(start);
            let (mut min_c, mut min_r, mut max_c, mut max_r) = (u32::MAX, u32::MAX, 0u32, 0u32);
            let mut count = 0usize;
            let mut saturation_sum = 0.0f32;

            while let Some(idx) = queue.pop_front() {
                let col = idx as u32 % cols;
                let row = idx as u32 / cols;
                min_c = min_c.min(col);
                max_c = max_c.max(col);
                min_r = min_r.min(row);
                max_r = max_r.max(row);
                count += 1;
                saturation_sum += cells[idx].map_or(0.0, |(_, s)| s);

                let mut neighbours = Vec::with_capacity(4);
                if col > 0 {
                    neighbours.push(idx - 1);
                }
                if col + 1 < cols {
                    neighbours.push(idx + 1);
                }
                if row > 0 {
                    neighbours.push(idx - cols as usize);
                }
                if row + 1 < rows {
                    neighbours.push(idx + cols as usize);
                }
                for next in neighbours {
                    if !visited[next] && matches!(cells[next], Some((c, _)) if c == class) {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }

            if count < MIN_REGION_CELLS {
                continue;
            }
            let box_cells = ((max_c - min_c + 1) * (max_r - min_r + 1)) as f32;
            let fill = count as f32 / box_cells;
            let mean_saturation = saturation_sum / count as f32;
            detections.push(Detection::new(
                HUE_CLASSES[class].1,
                0.5 * fill + 0.5 * mean_saturation,
                BoundingBox::new(
                    (min_c * cell) as f32,
                    (min_r * cell) as f32,
                    ((max_c - min_c + 1) * cell) as f32,
                    ((max_r - min_r + 1) * cell) as f32,
                ),
            ));
        }

        Ok(detections)
    }
}

fn hue_class(hue: f32) -> usize {
    HUE_CLASSES
        .iter()
        .position(|(upper, _)| hue < *upper)
        // Hues from 345 wrap back to red.
        .unwrap_or(0)
}

/// RGB in `[0, 1]` to (hue degrees, saturation, value).
fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> CpuBackend {
        CpuBackend::new(&PipelineConfig::default())
    }

    #[test]
    fn hsv_of_primaries() {
        let (h, s, v) = rgb_to_hsv(1.0, 0.0, 0.0);
        assert_eq!((h, s, v), (0.0, 1.0, 1.0));
        let (h, _, _) = rgb_to_hsv(0.0, 1.0, 0.0);
        assert_eq!(h, 120.0);
        let (_, s, _) = rgb_to_hsv(0.5, 0.5, 0.5);
        assert_eq!(s, 0.0);
    }

    #[test]
    fn hue_bands_wrap_to_red() {
        assert_eq!(HUE_CLASSES[hue_class(350.0)].1, "tomato");
        assert_eq!(HUE_CLASSES[hue_class(55.0)].1, "banana");
        assert_eq!(HUE_CLASSES[hue_class(120.0)].1, "lettuce");
    }

    #[test]
    fn finds_one_region_per_coloured_patch() {
        let mut frame = Frame::filled(320, 320, [128, 128, 128, 255]).unwrap();
        // 10px cells on a 32 column grid; patches are cell aligned.
        frame.fill_rect(20, 20, 60, 40, [220, 20, 20, 255]);
        frame.fill_rect(200, 150, 50, 100, [40, 200, 40, 255]);

        let mut detections = backend().detect(&frame, RunningMode::Image, 0).unwrap();
        detections.sort_by(|a, b| a.label().cmp(b.label()));

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label(), "lettuce");
        assert_eq!(
            detections[0].bounding_box(),
            BoundingBox::new(200.0, 150.0, 50.0, 100.0)
        );
        assert_eq!(detections[1].label(), "tomato");
        assert_eq!(
            detections[1].bounding_box(),
            BoundingBox::new(20.0, 20.0, 60.0, 40.0)
        );
        assert!(detections.iter().all(|d| d.score() > 0.85));
    }

    #[test]
    fn grey_frame_has_no_detections() {
        let frame = Frame::filled(64, 64, [90, 90, 90, 255]).unwrap();
        assert!(backend().detect(&frame, RunningMode::Video, 0).unwrap().is_empty());
    }

    #[test]
    fn single_cell_specks_are_ignored() {
        let mut frame = Frame::filled(320, 320, [0, 0, 0, 255]).unwrap();
        frame.fill_rect(100, 100, 10, 10, [250, 220, 0, 255]);
        assert!(backend().detect(&frame, RunningMode::Image, 0).unwrap().is_empty());
    }
}
