use crate::config::LayoutConfig;
use crate::geometry::ScreenGeometry;
use log::warn;
use std::fmt;

/// Where one instance's window goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstancePlacement {
    pub index: usize,
    pub column: usize,
    pub row: usize,
    pub logical_x: f64,
    pub logical_y: f64,
    pub physical_x: i32,
    pub physical_y: i32,
}

impl InstancePlacement {
    pub fn is_partly_off_screen(&self) -> bool {
        self.logical_x < 0.0 || self.logical_y < 0.0
    }
}

impl fmt::Display for InstancePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "instance {}: column {}, row {}, logical ({}, {}), physical ({}, {})",
            self.index,
            self.column,
            self.row,
            self.logical_x,
            self.logical_y,
            self.physical_x,
            self.physical_y
        )
    }
}

/// Compute the placement of instance `index`.
///
/// Columns are packed leftward from the right screen edge. Rows start below
/// the menu bar and leave room for each window's title bar. Positions are not
/// clamped: with more columns than fit, windows run off the left edge.
pub fn place(index: usize, layout: &LayoutConfig, screen: &ScreenGeometry) -> InstancePlacement {
    let columns = layout.columns.max(1) as usize;
    let column = index % columns;
    let row = index / columns;

    let width = f64::from(layout.window_width);
    let height = f64::from(layout.window_height);
    let gap = f64::from(layout.gap);
    let titlebar = f64::from(layout.titlebar_height);

    let logical_x =
        screen.logical_width - (column as f64 + 1.0) * width - gap - column as f64 * gap;
    let logical_y = f64::from(layout.menubar_height)
        + gap
        + titlebar
        + row as f64 * (height + titlebar + gap);

    InstancePlacement {
        index,
        column,
        row,
        logical_x,
        logical_y,
        physical_x: to_physical(logical_x, screen.scale_factor),
        physical_y: to_physical(logical_y, screen.scale_factor),
    }
}

// Truncates toward zero; saturates at the i32 bounds.
fn to_physical(logical: f64, scale_factor: f64) -> i32 {
    let scaled = (logical * scale_factor).trunc();
    if scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
        warn!(
            "Logical coordinate {} at scale {} is outside the physical range, clamping",
            logical, scale_factor
        );
    }
    scaled as i32
}

/// Placements for instances `0..count`, in launch order.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    placements: Vec<InstancePlacement>,
}

impl LaunchPlan {
    pub fn new(count: usize, layout: &LayoutConfig, screen: &ScreenGeometry) -> Self {
        let placements: Vec<_> = (0..count).map(|i| place(i, layout, screen)).collect();

        for placement in placements.iter().filter(|p| p.is_partly_off_screen()) {
            warn!(
                "Instance {} starts off screen at logical ({}, {}); too many columns for a {} point wide display?",
                placement.index, placement.logical_x, placement.logical_y, screen.logical_width
            );
        }

        Self { placements }
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstancePlacement> {
        self.placements.iter()
    }
}
