//! Conversion between data space and the pixel space of the rendering surface.
//!
//! Screen coordinates are relative to the surface's top-left corner with `y`
//! growing downward, so the vertical ratio is inverted on the way in and out.

use shared::domain::{AxisLimits, DataPoint};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: f32,
    pub height: f32,
}

impl SurfaceSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, point: ScreenPoint) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("axis limits are not available yet")]
    MissingAxisLimits,
    #[error("cannot map across a zero-width range")]
    DegenerateRange,
}

fn checked_spans(
    limits: Option<&AxisLimits>,
    surface: SurfaceSize,
) -> Result<(&AxisLimits, f64, f64), MappingError> {
    let limits = limits.ok_or(MappingError::MissingAxisLimits)?;
    let (x_span, y_span) = (limits.x_span(), limits.y_span());
    if x_span == 0.0 || y_span == 0.0 || surface.width <= 0.0 || surface.height <= 0.0 {
        return Err(MappingError::DegenerateRange);
    }
    Ok((limits, x_span, y_span))
}

pub fn to_screen(
    point: DataPoint,
    limits: Option<&AxisLimits>,
    surface: SurfaceSize,
) -> Result<ScreenPoint, MappingError> {
    let (limits, x_span, y_span) = checked_spans(limits, surface)?;
    let x_ratio = (point.x - limits.x_min()) / x_span;
    let y_ratio = (point.y - limits.y_min()) / y_span;
    Ok(ScreenPoint::new(
        (x_ratio * f64::from(surface.width)) as f32,
        ((1.0 - y_ratio) * f64::from(surface.height)) as f32,
    ))
}

pub fn to_data(
    point: ScreenPoint,
    limits: Option<&AxisLimits>,
    surface: SurfaceSize,
) -> Result<DataPoint, MappingError> {
    let (limits, x_span, y_span) = checked_spans(limits, surface)?;
    let x_ratio = f64::from(point.x) / f64::from(surface.width);
    let y_ratio = 1.0 - f64::from(point.y) / f64::from(surface.height);
    Ok(DataPoint::new(
        limits.x_min() + x_ratio * x_span,
        limits.y_min() + y_ratio * y_span,
    ))
}
