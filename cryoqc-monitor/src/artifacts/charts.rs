//! Raster chart rendering
//!
//! Charts are drawn straight onto an `RgbImage`: framed plot areas, bars,
//! polylines and vertical markers, with a one-line caption above each panel.
//! Resolution panels caption the 0.8 and 0.5 limits next to the panel title.

use super::text::draw_text;
use crate::analysis::{ConfidenceBand, Panel, ResolutionAnalysis, ResolutionLimits, ShiftTrace};
use image::{Rgb, RgbImage};

pub const CHART_SIZE: u32 = 800;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const LIGHT_GRAY: Rgb<u8> = Rgb([200, 200, 200]);
const GRAY: Rgb<u8> = Rgb([128, 128, 128]);
const BLUE: Rgb<u8> = Rgb([31, 119, 180]);
const GREEN: Rgb<u8> = Rgb([0, 128, 0]);
const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
const RED: Rgb<u8> = Rgb([220, 20, 20]);

/// Y range of the resolution plot
const CCC_Y_RANGE: (f64, f64) = (-0.2, 1.2);

/// Renders diagnostic charts
pub trait ChartRenderer: Send + Sync {
    /// Two stacked bar panels of per-frame x and y shift deltas
    fn shift_plot(&self, trace: &ShiftTrace) -> RgbImage;

    /// 2×2 panels of CTF, normalized EPA and CCC bands with limit markers
    fn resolution_plot(&self, panels: &[(Panel, ResolutionAnalysis)]) -> RgbImage;
}

/// Default [`ChartRenderer`] drawing with the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCharts;

impl ChartRenderer for RasterCharts {
    fn shift_plot(&self, trace: &ShiftTrace) -> RgbImage {
        let mut img = RgbImage::from_pixel(CHART_SIZE, CHART_SIZE, WHITE);
        let half = CHART_SIZE / 2;

        let rows = [
            ("Shift X (px/frame)", trace.x_deltas()),
            ("Shift Y (px/frame)", trace.y_deltas()),
        ];
        for (row, (caption, deltas)) in rows.iter().enumerate() {
            let area = PlotArea::inset(0, row as u32 * half, CHART_SIZE, half);
            area.draw_caption(&mut img, caption);
            let extent = deltas.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            let extent = if extent > 0.0 { extent } else { 1.0 };
            let area = area.with_ranges((0.0, deltas.len().max(1) as f64), (-extent, extent));

            area.draw_frame(&mut img);
            area.draw_hline(&mut img, 0.0, LIGHT_GRAY);
            draw_bars(&mut img, &area, deltas, BLUE);
        }

        img
    }

    fn resolution_plot(&self, panels: &[(Panel, ResolutionAnalysis)]) -> RgbImage {
        let mut img = RgbImage::from_pixel(CHART_SIZE, CHART_SIZE, WHITE);
        let half = CHART_SIZE / 2;

        for (idx, (panel, analysis)) in panels.iter().take(4).enumerate() {
            let x0 = (idx as u32 % 2) * half;
            let y0 = (idx as u32 / 2) * half;
            let base = PlotArea::inset(x0, y0, half, half);
            base.draw_caption(
                &mut img,
                &format!("{}  {}", panel.title, limits_caption(&analysis.limits)),
            );

            let Some((lo, hi)) = analysis.frequency_span() else {
                base.draw_frame(&mut img);
                continue;
            };
            let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.01, hi + 0.01) };
            let area = base.with_ranges((lo, hi), CCC_Y_RANGE);

            area.draw_frame(&mut img);
            area.draw_hline(&mut img, 0.0, LIGHT_GRAY);

            let ctf: Vec<(f64, f64)> = zip_points(&analysis.frequencies, &analysis.ctf_sim);
            area.draw_polyline(&mut img, &ctf, GRAY, 1);

            let epa: Vec<(f64, f64)> = zip_points(&analysis.frequencies, &analysis.epa_normalized);
            area.draw_polyline(&mut img, &epa, BLUE, 1);

            for band in ConfidenceBand::ALL {
                let points: Vec<(f64, f64)> = analysis
                    .bands
                    .band(band)
                    .iter()
                    .map(|p| (p.frequency, p.ccc))
                    .collect();
                area.draw_polyline(&mut img, &points, band_color(band), 2);
            }

            if let Some(res) = analysis.limits.at_0_8 {
                area.draw_vline(&mut img, 1.0 / res, ORANGE);
            }
            if let Some(res) = analysis.limits.at_0_5 {
                area.draw_vline(&mut img, 1.0 / res, RED);
            }
        }

        img
    }
}

/// `0.8: 9.0 A  0.5: -`; unreached limits show as `-`
pub fn limits_caption(limits: &ResolutionLimits) -> String {
    let show = |limit: Option<f64>| match limit {
        Some(res) => format!("{:.1} A", res),
        None => "-".to_string(),
    };
    format!("0.8: {}  0.5: {}", show(limits.at_0_8), show(limits.at_0_5))
}

fn band_color(band: ConfidenceBand) -> Rgb<u8> {
    match band {
        ConfidenceBand::High => GREEN,
        ConfidenceBand::Medium => ORANGE,
        ConfidenceBand::Low => RED,
    }
}

fn zip_points(xs: &[f64], ys: &[f64]) -> Vec<(f64, f64)> {
    xs.iter().copied().zip(ys.iter().copied()).collect()
}

/// Bars of width 2/3 of their slot, from zero to the value
fn draw_bars(img: &mut RgbImage, area: &PlotArea, values: &[f64], color: Rgb<u8>) {
    let width = 2.0 / 3.0;
    for (i, v) in values.iter().enumerate() {
        let center = i as f64 + 0.5;
        let (left, top) = area.to_pixel(center - width / 2.0, v.max(0.0));
        let (right, bottom) = area.to_pixel(center + width / 2.0, v.min(0.0));
        fill_rect(img, left, top, right.max(left + 1), bottom.max(top + 1), color);
    }
}

fn fill_rect(img: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    for y in y0..y1 {
        for x in x0..x1 {
            put(img, x, y, color);
        }
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line with a square pen of `thickness` pixels
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, thickness: i64) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        for ox in 0..thickness {
            for oy in 0..thickness {
                put(img, x + ox, y + oy, color);
            }
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Pixel rectangle with data ranges mapped onto it
#[derive(Debug, Clone, Copy)]
struct PlotArea {
    left: i64,
    top: i64,
    width: i64,
    height: i64,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl PlotArea {
    const MARGIN_LEFT: u32 = 50;
    const MARGIN_RIGHT: u32 = 20;
    const MARGIN_Y: u32 = 30;

    fn inset(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            left: (x + Self::MARGIN_LEFT) as i64,
            top: (y + Self::MARGIN_Y) as i64,
            width: width.saturating_sub(Self::MARGIN_LEFT + Self::MARGIN_RIGHT) as i64,
            height: height.saturating_sub(2 * Self::MARGIN_Y) as i64,
            x_range: (0.0, 1.0),
            y_range: (0.0, 1.0),
        }
    }

    fn with_ranges(mut self, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        self.x_range = x_range;
        self.y_range = y_range;
        self
    }

    fn to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let fx = (x - self.x_range.0) / (self.x_range.1 - self.x_range.0);
        let fy = (y - self.y_range.0) / (self.y_range.1 - self.y_range.0);
        let px = self.left as f64 + fx * self.width as f64;
        let py = (self.top + self.height) as f64 - fy * self.height as f64;
        (px.round() as i64, py.round() as i64)
    }

    fn contains_x(&self, x: f64) -> bool {
        x >= self.x_range.0 && x <= self.x_range.1
    }

    fn draw_frame(&self, img: &mut RgbImage) {
        let (l, t) = (self.left, self.top);
        let (r, b) = (self.left + self.width, self.top + self.height);
        draw_line(img, (l, t), (r, t), BLACK, 1);
        draw_line(img, (r, t), (r, b), BLACK, 1);
        draw_line(img, (r, b), (l, b), BLACK, 1);
        draw_line(img, (l, b), (l, t), BLACK, 1);
    }

    /// Caption line in the top margin, left-aligned with the frame
    fn draw_caption(&self, img: &mut RgbImage, caption: &str) {
        draw_text(img, self.left, self.top - 8, caption, BLACK);
    }

    fn draw_hline(&self, img: &mut RgbImage, y: f64, color: Rgb<u8>) {
        if y < self.y_range.0 || y > self.y_range.1 {
            return;
        }
        let (_, py) = self.to_pixel(self.x_range.0, y);
        draw_line(img, (self.left + 1, py), (self.left + self.width - 1, py), color, 1);
    }

    fn draw_vline(&self, img: &mut RgbImage, x: f64, color: Rgb<u8>) {
        if !self.contains_x(x) {
            return;
        }
        let (px, _) = self.to_pixel(x, self.y_range.0);
        draw_line(img, (px, self.top + 1), (px, self.top + self.height - 1), color, 1);
    }

    fn draw_polyline(&self, img: &mut RgbImage, points: &[(f64, f64)], color: Rgb<u8>, thickness: i64) {
        let pixels: Vec<(i64, i64)> = points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(x, y)| self.to_pixel(*x, y.clamp(self.y_range.0, self.y_range.1)))
            .collect();

        match pixels.as_slice() {
            [] => {}
            [single] => draw_line(img, *single, *single, color, thickness),
            _ => {
                for pair in pixels.windows(2) {
                    draw_line(img, pair[0], pair[1], color, thickness);
                }
            }
        }
    }
}
