use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{AxisConfig, SegmentationConfig};
use crate::detection::preprocessing::is_axis_color;
use crate::error::{DigitizeError, Result};
use crate::frame::ImageFrame;
use crate::models::{AxisFrame, Color, CurveCluster, PixelBox};
use crate::pipeline::{PipelineContext, Stage};

const NONE: u32 = u32::MAX;

/// Separates curve pixels from background, gridlines and text, and groups them by color.
///
/// Curves drawn in near-identical colors (within `color_threshold`) end up in
/// the same cluster. Lowering the threshold separates them; the resulting
/// clusters never share a pixel.
#[derive(Debug, Clone, Default)]
pub struct CurveSegmenter {
    pub config: SegmentationConfig,
    /// Axis color rules, used to recognise tick marks and text
    pub axis: AxisConfig,
}

/// Row-major view of the pixels inside the segmentation region
struct Region {
    bounds: PixelBox,
    width: usize,
    height: usize,
}

impl Region {
    fn new(bounds: PixelBox) -> Self {
        Self {
            bounds,
            width: bounds.width() as usize,
            height: bounds.height() as usize,
        }
    }

    fn len(&self) -> usize {
        self.width * self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y - self.bounds.top) as usize * self.width + (x - self.bounds.left) as usize
    }

    fn coords(&self, idx: usize) -> (u32, u32) {
        (
            self.bounds.left + (idx % self.width) as u32,
            self.bounds.top + (idx / self.width) as u32,
        )
    }
}

impl CurveSegmenter {
    pub fn new(config: SegmentationConfig, axis: AxisConfig) -> Self {
        Self { config, axis }
    }

    pub fn segment(&self, frame: &ImageFrame, axes: &AxisFrame) -> Result<Vec<CurveCluster>> {
        let cfg = &self.config;
        let Some(bounds) = axes.plot_box.inset(cfg.axis_margin) else {
            return Err(DigitizeError::NoCurvesDetected);
        };
        let region = Region::new(bounds);

        let excluded = self.inner_tick_mask(frame, axes, &region);
        let background = dominant_color(frame, &region, &excluded);

        let mut foreground: Vec<bool> = (0..region.len())
            .map(|idx| {
                if excluded[idx] {
                    return false;
                }
                let (x, y) = region.coords(idx);
                frame.color_at(x, y).distance(background) > cfg.background_distance
            })
            .collect();
        let grid_pixels = self.remove_gridlines(frame, &region, &mut foreground);

        let (palette, assignment) = self.build_palette(frame, &region, &foreground);
        debug!(
            background = %background.hex(),
            palette = palette.len(),
            grid_pixels,
            "segmentation palette"
        );

        // Palette entry per region pixel, NONE for background and noise
        let mut labels: Vec<u32> = (0..region.len())
            .map(|idx| {
                if !foreground[idx] {
                    return NONE;
                }
                let (x, y) = region.coords(idx);
                assignment
                    .get(&frame.color_at(x, y).packed())
                    .copied()
                    .flatten()
                    .map(|p| p as u32)
                    .unwrap_or(NONE)
            })
            .collect();

        if cfg.close_gaps > 0 {
            let filled = self.close_strokes(&region, &mut labels, palette.len());
            debug!(filled, radius = cfg.close_gaps, "closed stroke gaps");
        }

        let components: Vec<Vec<usize>> = self
            .components(&region, &labels)
            .into_iter()
            .filter(|c| c.len() >= cfg.min_component_pixels)
            .collect();
        let text = self.text_components(&region, &labels, &palette, &components);

        // Merge surviving components of each palette entry into one cluster
        let mut by_palette: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
        let mut dropped = 0usize;
        for (component, is_text) in components.into_iter().zip(text) {
            if is_text {
                dropped += 1;
                continue;
            }
            let palette_idx = labels[component[0]];
            by_palette
                .entry(palette_idx)
                .or_default()
                .extend(component.iter().map(|&idx| region.coords(idx)));
        }

        let mut clusters: Vec<CurveCluster> = by_palette
            .into_iter()
            .filter(|(_, pixels)| pixels.len() >= cfg.min_cluster_pixels)
            .map(|(palette_idx, mut pixels)| {
                pixels.sort_by_key(|&(x, y)| (y, x));
                let mut bbox = PixelBox::at(pixels[0].0, pixels[0].1);
                for &(x, y) in &pixels {
                    bbox.include(x, y);
                }
                CurveCluster {
                    id: 0,
                    color: palette[palette_idx as usize],
                    pixels,
                    bbox,
                }
            })
            .collect();

        // Number clusters by their first pixel in scan order
        clusters.sort_by_key(|c| (c.pixels[0].1, c.pixels[0].0));
        for (id, cluster) in clusters.iter_mut().enumerate() {
            cluster.id = id;
        }

        info!(
            "Segmented {} curve cluster(s), dropped {} text component(s)",
            clusters.len(),
            dropped
        );
        if clusters.is_empty() {
            return Err(DigitizeError::NoCurvesDetected);
        }
        Ok(clusters)
    }

    /// Mark axis-colored pixels of tick marks that reach into the plot area
    fn inner_tick_mask(&self, frame: &ImageFrame, axes: &AxisFrame, region: &Region) -> Vec<bool> {
        let mut excluded = vec![false; region.len()];
        let reach = self.axis.max_tick_len;
        let b = region.bounds;
        let mut mark = |x: u32, y: u32| {
            if b.contains(x, y) && is_axis_color(frame.color_at(x, y), &self.axis) {
                excluded[region.index(x, y)] = true;
            }
        };

        let x_band = axes.x_axis.band;
        for &tick in &axes.x_axis.ticks {
            let cx = tick.round() as i64;
            for x in (cx - 2).max(0)..=cx + 2 {
                for y in x_band.0.saturating_sub(reach)..x_band.0 {
                    mark(x as u32, y);
                }
            }
        }

        let y_band = axes.y_axis.band;
        for &tick in &axes.y_axis.ticks {
            let cy = tick.round() as i64;
            for y in (cy - 2).max(0)..=cy + 2 {
                for x in y_band.1 + 1..=y_band.1 + reach {
                    mark(x, y as u32);
                }
            }
        }
        excluded
    }

    /// Clear light achromatic pixels on rows/columns they dominate; returns pixels removed
    fn remove_gridlines(&self, frame: &ImageFrame, region: &Region, foreground: &mut [bool]) -> usize {
        let cfg = &self.config;
        let light: Vec<bool> = (0..region.len())
            .map(|idx| {
                if !foreground[idx] {
                    return false;
                }
                let (x, y) = region.coords(idx);
                let color = frame.color_at(x, y);
                color.luma() >= cfg.gridline_min_luma as f32 && color.chroma() <= self.axis.axis_max_chroma
            })
            .collect();

        let row_min = (cfg.gridline_fraction * region.width as f64).ceil() as usize;
        let col_min = (cfg.gridline_fraction * region.height as f64).ceil() as usize;
        let mut removed = 0;

        let grid_rows: Vec<usize> = (0..region.height)
            .filter(|&row| (0..region.width).filter(|&col| light[row * region.width + col]).count() >= row_min)
            .collect();
        let grid_cols: Vec<usize> = (0..region.width)
            .filter(|&col| (0..region.height).filter(|&row| light[row * region.width + col]).count() >= col_min)
            .collect();

        for &row in &grid_rows {
            for col in 0..region.width {
                let idx = row * region.width + col;
                if light[idx] && foreground[idx] {
                    foreground[idx] = false;
                    removed += 1;
                }
            }
        }
        for &col in &grid_cols {
            for row in 0..region.height {
                let idx = row * region.width + col;
                if light[idx] && foreground[idx] {
                    foreground[idx] = false;
                    removed += 1;
                }
            }
        }

        if !grid_rows.is_empty() || !grid_cols.is_empty() {
            debug!(rows = grid_rows.len(), cols = grid_cols.len(), "removed gridlines");
        }
        removed
    }

    /// Greedy palette over the foreground color histogram.
    ///
    /// Returns the palette and, per packed color, its palette entry or None for noise.
    fn build_palette(
        &self,
        frame: &ImageFrame,
        region: &Region,
        foreground: &[bool],
    ) -> (Vec<Color>, BTreeMap<u32, Option<usize>>) {
        let mut histogram: BTreeMap<u32, (Color, usize)> = BTreeMap::new();
        for idx in (0..region.len()).filter(|&i| foreground[i]) {
            let (x, y) = region.coords(idx);
            let color = frame.color_at(x, y);
            histogram.entry(color.packed()).or_insert((color, 0)).1 += 1;
        }

        let mut colors: Vec<(Color, usize)> = histogram.into_values().collect();
        colors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.packed().cmp(&b.0.packed())));

        let mut palette: Vec<Color> = Vec::new();
        let mut assignment = BTreeMap::new();
        for (color, count) in colors {
            let nearest = palette
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.distance(color)))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

            let entry = match nearest {
                Some((i, d)) if d <= self.config.color_threshold => Some(i),
                _ if count >= self.config.min_seed_pixels => {
                    palette.push(color);
                    Some(palette.len() - 1)
                }
                _ => None,
            };
            assignment.insert(color.packed(), entry);
        }
        (palette, assignment)
    }

    /// Connected components of same-palette pixels, linked within `link_radius`.
    ///
    /// Each component lists region indices in scan order.
    fn components(&self, region: &Region, labels: &[u32]) -> Vec<Vec<usize>> {
        // Arena of foreground pixels, addressed by position in `arena`
        let arena: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] != NONE).collect();
        let mut slot = vec![NONE; labels.len()];
        for (a, &idx) in arena.iter().enumerate() {
            slot[idx] = a as u32;
        }

        let r = self.config.link_radius as i64;
        let (w, h) = (region.width as i64, region.height as i64);
        let mut sets = UnionFind::new(arena.len());

        for (a, &idx) in arena.iter().enumerate() {
            let (x, y) = ((idx % region.width) as i64, (idx / region.width) as i64);
            // Forward half of the window; the rest is covered from the other side
            for dy in 0..=r {
                for dx in -r..=r {
                    if dy == 0 && dx <= 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if labels[nidx] == labels[idx] {
                        sets.union(a, slot[nidx] as usize);
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (a, &idx) in arena.iter().enumerate() {
            groups.entry(sets.find(a)).or_default().push(idx);
        }
        let mut components: Vec<Vec<usize>> = groups.into_values().collect();
        components.sort_by_key(|c| c[0]);
        components
    }

    /// Morphological closing of each palette entry's pixels.
    ///
    /// Background pixels the closing covers join that entry; pixels already
    /// owned by another entry keep their label. Returns the pixels filled.
    fn close_strokes(&self, region: &Region, labels: &mut [u32], entries: usize) -> usize {
        let (w, h) = (region.width as u32, region.height as u32);
        let mut filled = 0;
        for entry in 0..entries as u32 {
            let mask = GrayImage::from_fn(w, h, |x, y| {
                Luma([if labels[(y * w + x) as usize] == entry { 255 } else { 0 }])
            });
            let closed = morphology::close(&mask, Norm::LInf, self.config.close_gaps);
            for (x, y, pixel) in closed.enumerate_pixels() {
                let idx = (y * w + x) as usize;
                if pixel[0] > 0 && labels[idx] == NONE {
                    labels[idx] = entry;
                    filled += 1;
                }
            }
        }
        filled
    }

    /// Flags compact dark components that are annotations rather than data.
    ///
    /// Compact achromatic components of one palette entry chain together when
    /// their boxes lie within `series_link_gap`. A chain of enough marks that
    /// spans a sizeable part of the plot is a marker or dash series and is
    /// kept; any other compact component is text.
    fn text_components(
        &self,
        region: &Region,
        labels: &[u32],
        palette: &[Color],
        components: &[Vec<usize>],
    ) -> Vec<bool> {
        let cfg = &self.config;
        let mut is_text = vec![false; components.len()];
        if cfg.max_text_extent == 0 {
            return is_text;
        }

        let boxes: Vec<PixelBox> = components.iter().map(|c| component_box(region, c)).collect();
        let compact: Vec<usize> = (0..components.len())
            .filter(|&i| {
                let color = palette[labels[components[i][0]] as usize];
                is_axis_color(color, &self.axis)
                    && boxes[i].width() <= cfg.max_text_extent
                    && boxes[i].height() <= cfg.max_text_extent
            })
            .collect();

        let mut chains = UnionFind::new(compact.len());
        for (a, &i) in compact.iter().enumerate() {
            for (b, &j) in compact.iter().enumerate().skip(a + 1) {
                if labels[components[i][0]] == labels[components[j][0]]
                    && box_gap(&boxes[i], &boxes[j]) <= cfg.series_link_gap
                {
                    chains.union(a, b);
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (a, &i) in compact.iter().enumerate() {
            groups.entry(chains.find(a)).or_default().push(i);
        }
        for members in groups.into_values() {
            let mut span = boxes[members[0]];
            for &i in &members[1..] {
                span.include(boxes[i].left, boxes[i].top);
                span.include(boxes[i].right, boxes[i].bottom);
            }
            let spread = span.width() as f64 >= cfg.min_series_span * region.width as f64
                || span.height() as f64 >= cfg.min_series_span * region.height as f64;
            if members.len() < cfg.min_series_marks || !spread {
                for i in members {
                    is_text[i] = true;
                }
            }
        }
        is_text
    }
}

impl Stage for CurveSegmenter {
    type Input = (ImageFrame, AxisFrame);
    type Output = Vec<CurveCluster>;

    fn process(&self, (frame, axes): Self::Input, _context: &PipelineContext) -> Result<Vec<CurveCluster>> {
        self.segment(&frame, &axes)
    }

    fn name(&self) -> &str {
        "Curve Segmentation"
    }
}

/// Most frequent color in the region; ties go to the lowest packed value
fn dominant_color(frame: &ImageFrame, region: &Region, excluded: &[bool]) -> Color {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for idx in (0..region.len()).filter(|&i| !excluded[i]) {
        let (x, y) = region.coords(idx);
        *counts.entry(frame.color_at(x, y).packed()).or_default() += 1;
    }

    let mut best = (0xFF_FF_FFu32, 0usize);
    for (packed, count) in counts {
        if count > best.1 {
            best = (packed, count);
        }
    }
    let packed = best.0;
    Color::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
}

fn component_box(region: &Region, component: &[usize]) -> PixelBox {
    let (x0, y0) = region.coords(component[0]);
    let mut bbox = PixelBox::at(x0, y0);
    for &idx in component {
        let (x, y) = region.coords(idx);
        bbox.include(x, y);
    }
    bbox
}

/// Chebyshev distance between the nearest pixels of two boxes, 0 when they overlap
fn box_gap(a: &PixelBox, b: &PixelBox) -> u32 {
    let dx = b.left.saturating_sub(a.right).max(a.left.saturating_sub(b.right));
    let dy = b.top.saturating_sub(a.bottom).max(a.top.saturating_sub(b.bottom));
    dx.max(dy).saturating_sub(1)
}

/// Disjoint sets over arena indices
#[derive(Debug)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra] < self.rank[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        if self.rank[ra] == self.rank[rb] {
            self.rank[ra] = self.rank[ra].saturating_add(1);
        }
    }
}
