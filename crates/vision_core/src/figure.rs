//! Plotting surfaces: a grid of titled image cells.
//!
//! `PlotSurface` is the seam the inspection helpers draw through. `Figure` is the
//! on-disk implementation: it composes tiles into one RGB canvas and writes the
//! cell titles next to it as JSON, since the canvas itself carries no text.

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, Rgb32FImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type FigureResult<T> = Result<T, FigureError>;

#[derive(Debug, Error)]
pub enum FigureError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image encode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cell {index} out of range for a {rows}x{cols} grid")]
    CellOutOfRange {
        index: usize,
        rows: usize,
        cols: usize,
    },
    #[error("no grid started on this surface")]
    NoGrid,
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error("tensor data error: {0}")]
    TensorData(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
}

impl GridLayout {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Row/column of a row-major cell index.
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.cols.max(1), index % self.cols.max(1))
    }
}

/// Something images can be drawn onto, one grid cell at a time.
pub trait PlotSurface {
    /// Start a fresh grid, discarding anything drawn before.
    fn begin_grid(&mut self, layout: GridLayout);
    /// Make `index` (row-major, zero-based) the cell subsequent draws land in.
    fn select_cell(&mut self, index: usize) -> FigureResult<()>;
    /// Draw a channel-last image in [0, 1] into the current cell.
    fn draw_image(&mut self, image: &Rgb32FImage, title: Option<&str>) -> FigureResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellCaption {
    pub index: usize,
    pub row: usize,
    pub col: usize,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureCaptions {
    pub layout: GridLayout,
    pub cells: Vec<CellCaption>,
}

#[derive(Debug, Clone)]
pub struct Figure {
    tile: u32,
    gap: u32,
    layout: Option<GridLayout>,
    canvas: RgbImage,
    titles: Vec<Option<String>>,
    current: usize,
}

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

impl Default for Figure {
    fn default() -> Self {
        Self::new(224)
    }
}

impl Figure {
    /// A figure whose cells are `tile` pixels square.
    pub fn new(tile: u32) -> Self {
        Self {
            tile: tile.max(1),
            gap: 4,
            layout: None,
            canvas: RgbImage::new(1, 1),
            titles: Vec::new(),
            current: 0,
        }
    }

    pub fn with_gap(mut self, gap: u32) -> Self {
        self.gap = gap;
        self
    }

    pub fn layout(&self) -> Option<GridLayout> {
        self.layout
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    pub fn titles(&self) -> &[Option<String>] {
        &self.titles
    }

    pub fn captions(&self) -> FigureResult<FigureCaptions> {
        let layout = self.layout.ok_or(FigureError::NoGrid)?;
        let cells = self
            .titles
            .iter()
            .enumerate()
            .filter_map(|(index, title)| {
                title.as_ref().map(|t| {
                    let (row, col) = layout.position(index);
                    CellCaption {
                        index,
                        row,
                        col,
                        title: t.clone(),
                    }
                })
            })
            .collect();
        Ok(FigureCaptions { layout, cells })
    }

    /// Write the canvas as an image (format from the extension) and its captions
    /// to the same path with a `.json` extension.
    pub fn save(&self, path: &Path) -> FigureResult<()> {
        let captions = self.captions()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| FigureError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.canvas.save(path).map_err(|source| FigureError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let captions_path = path.with_extension("json");
        let json = serde_json::to_vec_pretty(&captions).map_err(|source| FigureError::Json {
            path: captions_path.clone(),
            source,
        })?;
        fs::write(&captions_path, json).map_err(|source| FigureError::Io {
            path: captions_path,
            source,
        })
    }

    fn cell_origin(&self, layout: GridLayout, index: usize) -> (u32, u32) {
        let (row, col) = layout.position(index);
        let stride = self.tile + self.gap;
        (
            self.gap + col as u32 * stride,
            self.gap + row as u32 * stride,
        )
    }
}

impl PlotSurface for Figure {
    fn begin_grid(&mut self, layout: GridLayout) {
        let stride = self.tile + self.gap;
        let width = self.gap + layout.cols as u32 * stride;
        let height = self.gap + layout.rows as u32 * stride;
        self.canvas = RgbImage::from_pixel(width.max(1), height.max(1), BACKGROUND);
        self.titles = vec![None; layout.cells()];
        self.layout = Some(layout);
        self.current = 0;
    }

    fn select_cell(&mut self, index: usize) -> FigureResult<()> {
        let layout = self.layout.ok_or(FigureError::NoGrid)?;
        if index >= layout.cells() {
            return Err(FigureError::CellOutOfRange {
                index,
                rows: layout.rows,
                cols: layout.cols,
            });
        }
        self.current = index;
        Ok(())
    }

    fn draw_image(&mut self, image: &Rgb32FImage, title: Option<&str>) -> FigureResult<()> {
        let layout = self.layout.ok_or(FigureError::NoGrid)?;
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(FigureError::Shape("cannot draw an empty image".to_string()));
        }
        let rgb = DynamicImage::ImageRgb32F(image.clone()).to_rgb8();

        // Fit inside the tile, preserving aspect ratio.
        let scale = f32::min(self.tile as f32 / w as f32, self.tile as f32 / h as f32);
        let new_w = ((w as f32 * scale).round() as u32).clamp(1, self.tile);
        let new_h = ((h as f32 * scale).round() as u32).clamp(1, self.tile);
        let resized = image::imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

        let (x0, y0) = self.cell_origin(layout, self.current);
        let off_x = (self.tile - new_w) / 2;
        let off_y = (self.tile - new_h) / 2;
        image::imageops::replace(
            &mut self.canvas,
            &resized,
            (x0 + off_x).into(),
            (y0 + off_y).into(),
        );
        self.titles[self.current] = title.map(str::to_string);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, value: [f32; 3]) -> Rgb32FImage {
        Rgb32FImage::from_pixel(w, h, Rgb(value))
    }

    #[test]
    fn draw_requires_grid() {
        let mut fig = Figure::new(8);
        assert!(matches!(fig.select_cell(0), Err(FigureError::NoGrid)));
        assert!(matches!(
            fig.draw_image(&solid(2, 2, [1.0, 0.0, 0.0]), None),
            Err(FigureError::NoGrid)
        ));
    }

    #[test]
    fn cells_land_in_row_major_order() {
        let mut fig = Figure::new(8).with_gap(0);
        fig.begin_grid(GridLayout::new(2, 2));
        assert_eq!(fig.canvas().dimensions(), (16, 16));

        fig.select_cell(3).unwrap();
        fig.draw_image(&solid(4, 4, [1.0, 0.0, 0.0]), Some("red"))
            .unwrap();
        assert_eq!(fig.canvas().get_pixel(12, 12), &Rgb([255, 0, 0]));
        assert_eq!(fig.canvas().get_pixel(2, 2), &BACKGROUND);
        assert_eq!(fig.titles()[3].as_deref(), Some("red"));
        assert!(fig.titles()[0].is_none());
    }

    #[test]
    fn select_out_of_range_is_rejected() {
        let mut fig = Figure::new(4);
        fig.begin_grid(GridLayout::new(1, 2));
        let err = fig.select_cell(2).unwrap_err();
        assert!(matches!(
            err,
            FigureError::CellOutOfRange {
                index: 2,
                rows: 1,
                cols: 2
            }
        ));
    }

    #[test]
    fn save_writes_canvas_and_captions() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("figs").join("grid.png");
        let mut fig = Figure::new(6);
        fig.begin_grid(GridLayout::new(1, 2));
        fig.select_cell(1).unwrap();
        fig.draw_image(&solid(3, 3, [0.0, 1.0, 0.0]), Some("predicted: bees"))
            .unwrap();
        fig.save(&out).unwrap();

        assert!(out.exists());
        let captions: FigureCaptions =
            serde_json::from_slice(&fs::read(out.with_extension("json")).unwrap()).unwrap();
        assert_eq!(captions.layout, GridLayout::new(1, 2));
        assert_eq!(captions.cells.len(), 1);
        assert_eq!(captions.cells[0].col, 1);
        assert_eq!(captions.cells[0].title, "predicted: bees");
    }
}
