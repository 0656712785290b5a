use crate::error::LaunchError;
use crate::geometry::DisplayProbe;
use core_graphics::display::{CGDisplay, CGDisplayBounds, CGMainDisplayID};
use log::debug;

/// The main display as seen by Core Graphics.
///
/// Display bounds are reported in points; the current display mode carries
/// the backing pixel size.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainDisplay;

impl DisplayProbe for MainDisplay {
    fn name(&self) -> &str {
        "core-graphics"
    }

    fn physical_size(&self) -> Result<(u32, u32), LaunchError> {
        let display_id = unsafe { CGMainDisplayID() };
        let mode = CGDisplay::new(display_id).display_mode().ok_or_else(|| {
            LaunchError::GeometryUnavailable(format!(
                "display {} has no current display mode",
                display_id
            ))
        })?;

        let size = (mode.pixel_width() as u32, mode.pixel_height() as u32);
        debug!("Display {} pixel size {}x{}", display_id, size.0, size.1);
        Ok(size)
    }

    fn logical_size(&self) -> Result<(u32, u32), LaunchError> {
        let display_id = unsafe { CGMainDisplayID() };
        let bounds = unsafe { CGDisplayBounds(display_id) };

        if !(bounds.size.width > 0.0 && bounds.size.height > 0.0) {
            return Err(LaunchError::GeometryUnavailable(format!(
                "display {} reported empty bounds",
                display_id
            )));
        }

        let size = (bounds.size.width as u32, bounds.size.height as u32);
        debug!("Display {} point size {}x{}", display_id, size.0, size.1);
        Ok(size)
    }
}
