use crate::config::GeometryConfig;
use crate::error::LaunchError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GeometryStrategy {
    #[default]
    Measured,
    AssumedScale { factor: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub physical_width: u32,
    pub physical_height: u32,
    pub logical_width: f64,
    pub logical_height: f64,
    pub scale_factor: f64,
}

impl fmt::Display for ScreenGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "physical {}x{}, logical {}x{}, scale {:.3}",
            self.physical_width,
            self.physical_height,
            self.logical_width,
            self.logical_height,
            self.scale_factor
        )
    }
}

pub trait DisplayProbe {
    fn name(&self) -> &str;
    fn physical_size(&self) -> Result<(u32, u32), LaunchError>;
    fn logical_size(&self) -> Result<(u32, u32), LaunchError>;
}

/// Probe that reports configured values instead of asking the OS.
#[derive(Debug, Clone, Copy)]
pub struct FixedDisplay {
    pub physical: (u32, u32),
    pub logical: Option<(u32, u32)>,
}

impl DisplayProbe for FixedDisplay {
    fn name(&self) -> &str {
        "fixed"
    }

    fn physical_size(&self) -> Result<(u32, u32), LaunchError> {
        Ok(self.physical)
    }

    fn logical_size(&self) -> Result<(u32, u32), LaunchError> {
        self.logical.ok_or_else(|| {
            LaunchError::GeometryUnavailable(
                "no logical resolution configured for the fixed display".to_string(),
            )
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDisplay;

impl DisplayProbe for UnsupportedDisplay {
    fn name(&self) -> &str {
        "unsupported"
    }

    fn physical_size(&self) -> Result<(u32, u32), LaunchError> {
        Err(LaunchError::GeometryUnavailable(format!(
            "display probing is not supported on {}; set geometry.override_physical",
            std::env::consts::OS
        )))
    }

    fn logical_size(&self) -> Result<(u32, u32), LaunchError> {
        self.physical_size()
    }
}

/// Pick the probe for this run: configured overrides win over the host display.
pub fn probe_for(config: &GeometryConfig) -> Box<dyn DisplayProbe> {
    if let Some([width, height]) = config.override_physical {
        return Box::new(FixedDisplay {
            physical: (width, height),
            logical: config.override_logical.map(|[w, h]| (w, h)),
        });
    }
    host_probe()
}

#[cfg(target_os = "macos")]
pub fn host_probe() -> Box<dyn DisplayProbe> {
    Box::new(crate::macos::MainDisplay)
}

#[cfg(not(target_os = "macos"))]
pub fn host_probe() -> Box<dyn DisplayProbe> {
    Box::new(UnsupportedDisplay)
}

pub fn resolve(
    probe: &dyn DisplayProbe,
    strategy: GeometryStrategy,
) -> Result<ScreenGeometry, LaunchError> {
    let (physical_width, physical_height) = probe.physical_size()?;
    if physical_width == 0 || physical_height == 0 {
        return Err(LaunchError::GeometryUnavailable(format!(
            "{} probe reported degenerate physical size {}x{}",
            probe.name(),
            physical_width,
            physical_height
        )));
    }

    let (logical_width, logical_height, scale_factor) = match strategy {
        GeometryStrategy::Measured => {
            let (width, height) = probe.logical_size()?;
            if width == 0 || height == 0 {
                return Err(LaunchError::GeometryUnavailable(format!(
                    "{} probe reported degenerate logical size {}x{}",
                    probe.name(),
                    width,
                    height
                )));
            }
            let scale = f64::from(physical_width) / f64::from(width);
            (f64::from(width), f64::from(height), scale)
        }
        GeometryStrategy::AssumedScale { factor } => {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(LaunchError::GeometryUnavailable(format!(
                    "assumed scale factor must be positive, got {}",
                    factor
                )));
            }
            (
                f64::from(physical_width) / factor,
                f64::from(physical_height) / factor,
                factor,
            )
        }
    };

    Ok(ScreenGeometry {
        physical_width,
        physical_height,
        logical_width,
        logical_height,
        scale_factor,
    })
}
