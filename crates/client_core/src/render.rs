//! Live scatter overlay drawn from session state.

use shared::domain::{AxisLimits, Centroid, DataPoint};
use tracing::debug;

use crate::mapping::{to_screen, MappingError, ScreenPoint, SurfaceSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerStyle {
    /// Dataset member.
    Point,
    /// Centroid, drawn larger and after every point.
    Centroid,
}

impl MarkerStyle {
    pub fn radius(self) -> f32 {
        match self {
            MarkerStyle::Point => 3.0,
            MarkerStyle::Centroid => 7.0,
        }
    }
}

pub trait Canvas {
    fn clear(&mut self);
    fn fill_marker(&mut self, center: ScreenPoint, radius: f32, style: MarkerStyle);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    Clear,
    Marker {
        center: ScreenPoint,
        radius: f32,
        style: MarkerStyle,
    },
}

/// Retained canvas; the GUI replays it onto its painter every frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn markers(&self) -> impl Iterator<Item = (ScreenPoint, f32, MarkerStyle)> + '_ {
        self.commands.iter().filter_map(|command| match *command {
            DrawCommand::Marker {
                center,
                radius,
                style,
            } => Some((center, radius, style)),
            DrawCommand::Clear => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.markers().next().is_none()
    }
}

impl Canvas for DisplayList {
    fn clear(&mut self) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear);
    }

    fn fill_marker(&mut self, center: ScreenPoint, radius: f32, style: MarkerStyle) {
        self.commands.push(DrawCommand::Marker {
            center,
            radius,
            style,
        });
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSurface {
    size: SurfaceSize,
}

impl RenderSurface {
    pub fn new(size: SurfaceSize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn render<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        dataset: &[DataPoint],
        centroids: &[Centroid],
        limits: Option<&AxisLimits>,
    ) {
        let Some(limits) = limits else {
            return;
        };

        let points = dataset.iter().map(|point| (*point, MarkerStyle::Point));
        let centers = centroids
            .iter()
            .map(|centroid| (DataPoint::from(*centroid), MarkerStyle::Centroid));
        let markers = points
            .chain(centers)
            .map(|(point, style)| Ok((to_screen(point, Some(limits), self.size)?, style)))
            .collect::<Result<Vec<_>, MappingError>>();
        let markers = match markers {
            Ok(markers) => markers,
            Err(err) => {
                debug!(%err, "keeping previous frame; markers cannot be mapped");
                return;
            }
        };

        canvas.clear();
        for (center, style) in markers {
            canvas.fill_marker(center, style.radius(), style);
        }
    }
}
