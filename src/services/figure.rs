//! The plotting surface generated code draws on.
//!
//! Lifecycle per turn: acquire a fresh surface, let the script draw zero or
//! more charts, capture the most recently drawn one, drain the rest. The
//! drain happens on every exit path so figure state never leaks into the
//! next turn.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use plotters::prelude::*;

use crate::models::turn::CapturedFigure;

const FIGURE_WIDTH: u32 = 640;
const FIGURE_HEIGHT: u32 = 480;
const DEFAULT_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    Bar { labels: Vec<String>, values: Vec<f64> },
    Line { xs: Vec<f64>, ys: Vec<f64> },
    Scatter { xs: Vec<f64>, ys: Vec<f64> },
    Histogram { values: Vec<f64>, bins: usize },
}

impl ChartData {
    fn chart_type(&self) -> &'static str {
        match self {
            ChartData::Bar { .. } => "bar",
            ChartData::Line { .. } => "line",
            ChartData::Scatter { .. } => "scatter",
            ChartData::Histogram { .. } => "histogram",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            ChartData::Bar { values, .. } => values.is_empty(),
            ChartData::Line { xs, .. } | ChartData::Scatter { xs, .. } => xs.is_empty(),
            ChartData::Histogram { values, .. } => values.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingFigure {
    data: ChartData,
    title: Option<String>,
}

/// Surface with matplotlib-like semantics: every draw call adds an active
/// figure, `title` applies to the current one, capture keeps only the last.
#[derive(Debug, Default)]
pub struct PlotSurface {
    figures: Vec<PendingFigure>,
    queued_title: Option<String>,
}

impl PlotSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, data: ChartData) {
        let title = self.queued_title.take();
        self.figures.push(PendingFigure { data, title });
    }

    /// Title the current figure, or the next one if none is active yet.
    pub fn set_title(&mut self, title: String) {
        match self.figures.last_mut() {
            Some(figure) => figure.title = Some(title),
            None => self.queued_title = Some(title),
        }
    }

    pub fn active_figures(&self) -> usize {
        self.figures.len()
    }

    /// Render the most recently drawn figure (if any) and drain the surface.
    /// The surface is left empty even when rendering fails.
    pub fn capture(&mut self) -> Result<Option<CapturedFigure>> {
        let last = self.figures.pop();
        self.clear();
        let figure = match last {
            Some(figure) => figure,
            None => return Ok(None),
        };
        if figure.data.is_empty() {
            return Err(anyhow!("cannot render a chart from an empty selection"));
        }
        let svg = render_svg(&figure)?;
        Ok(Some(CapturedFigure {
            chart_type: figure.data.chart_type().to_string(),
            title: figure.title,
            width: FIGURE_WIDTH,
            height: FIGURE_HEIGHT,
            svg_base64: STANDARD.encode(svg.as_bytes()),
        }))
    }

    pub fn clear(&mut self) {
        self.figures.clear();
        self.queued_title = None;
    }
}

fn render_svg(figure: &PendingFigure) -> Result<String> {
    let mut svg = String::new();
    {
        let root =
            SVGBackend::with_string(&mut svg, (FIGURE_WIDTH, FIGURE_HEIGHT)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| anyhow!("failed to prepare chart canvas: {}", e))?;
        let title = figure.title.as_deref().unwrap_or("");
        match &figure.data {
            ChartData::Bar { labels, values } => draw_bars(&root, title, labels, values)?,
            ChartData::Line { xs, ys } => draw_xy(&root, title, xs, ys, false)?,
            ChartData::Scatter { xs, ys } => draw_xy(&root, title, xs, ys, true)?,
            ChartData::Histogram { values, bins } => {
                let (labels, counts) = bin_values(values, *bins);
                draw_bars(&root, title, &labels, &counts)?;
            }
        }
        root.present()
            .map_err(|e| anyhow!("failed to finalize chart: {}", e))?;
    }
    Ok(svg)
}

type SvgArea<'a> = DrawingArea<SVGBackend<'a>, plotters::coord::Shift>;

fn draw_bars(root: &SvgArea, title: &str, labels: &[String], values: &[f64]) -> Result<()> {
    let top = values.iter().cloned().fold(f64::MIN, f64::max).max(0.0);
    let bottom = values.iter().cloned().fold(0.0f64, f64::min);
    let span = (top - bottom).abs().max(1.0);
    let labels = labels.to_vec();

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            0f64..labels.len() as f64,
            bottom - span * 0.05..top + span * 0.1,
        )
        .map_err(|e| anyhow!("failed to build chart axes: {}", e))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len().min(20))
        .x_label_formatter(&|x| {
            let idx = *x as usize;
            labels.get(idx).cloned().unwrap_or_default()
        })
        .draw()
        .map_err(|e| anyhow!("failed to draw chart mesh: {}", e))?;

    chart
        .draw_series(values.iter().enumerate().map(|(i, v)| {
            Rectangle::new(
                [(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *v)],
                BLUE.filled(),
            )
        }))
        .map_err(|e| anyhow!("failed to draw bars: {}", e))?;
    Ok(())
}

fn draw_xy(root: &SvgArea, title: &str, xs: &[f64], ys: &[f64], points: bool) -> Result<()> {
    let (x_min, x_max) = padded_range(xs);
    let (y_min, y_max) = padded_range(ys);

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| anyhow!("failed to build chart axes: {}", e))?;

    chart
        .configure_mesh()
        .draw()
        .map_err(|e| anyhow!("failed to draw chart mesh: {}", e))?;

    let pairs: Vec<(f64, f64)> = xs.iter().cloned().zip(ys.iter().cloned()).collect();
    if points {
        chart
            .draw_series(pairs.iter().map(|&(x, y)| Circle::new((x, y), 3, BLUE.filled())))
            .map_err(|e| anyhow!("failed to draw points: {}", e))?;
    } else {
        chart
            .draw_series(LineSeries::new(pairs, &BLUE))
            .map_err(|e| anyhow!("failed to draw line: {}", e))?;
    }
    Ok(())
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).abs();
    if span < f64::EPSILON {
        (min - 1.0, max + 1.0)
    } else {
        (min - span * 0.05, max + span * 0.05)
    }
}

/// Bucket raw values into equal-width bins for histogram rendering.
pub fn bin_values(values: &[f64], bins: usize) -> (Vec<String>, Vec<f64>) {
    let bins = bins.max(1).min(values.len().max(1));
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = ((max - min) / bins as f64).max(f64::EPSILON);

    let mut counts = vec![0f64; bins];
    for v in values {
        let mut idx = ((v - min) / width) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1.0;
    }
    let labels = (0..bins)
        .map(|i| format!("{:.1}", min + width * i as f64))
        .collect();
    (labels, counts)
}

pub fn default_bins() -> usize {
    DEFAULT_BINS
}
