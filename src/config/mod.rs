//! Configuration and serialization module.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Session configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Canonical rectangle all layers and composites are expressed in.
    pub canvas: CanvasConfig,
    /// Maximum sensor range in millimetres; readings beyond clamp to 1.0.
    pub max_depth: f32,
    /// Depth flicker suppression.
    pub smoothing: SmoothingConfig,
    /// Fossil placement.
    pub placement: PlacementConfig,
    /// Seed for scene randomness. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    /// What to do when a fossil raster cannot be read.
    pub load_error_policy: LoadErrorPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            max_depth: 630.0,
            smoothing: SmoothingConfig::default(),
            placement: PlacementConfig::default(),
            seed: None,
            load_error_policy: LoadErrorPolicy::default(),
        }
    }
}

impl SandboxConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SandboxConfig =
            serde_json::from_str(&contents).map_err(|source| SandboxError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(SandboxError::Config(format!(
                "canvas must be non-empty, got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        if !(self.max_depth.is_finite() && self.max_depth > 0.0) {
            return Err(SandboxError::Config(format!(
                "max_depth must be positive, got {}",
                self.max_depth
            )));
        }
        let alpha = self.smoothing.alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(SandboxError::Config(format!(
                "smoothing alpha must lie in (0, 1], got {}",
                alpha
            )));
        }
        if let Some(kernel) = self.smoothing.blur_kernel {
            if kernel < 3 || kernel % 2 == 0 {
                return Err(SandboxError::Config(format!(
                    "blur kernel must be odd and at least 3, got {}",
                    kernel
                )));
            }
        }
        if self.placement.max_attempts == 0 {
            return Err(SandboxError::Config(
                "placement needs at least one attempt".to_string(),
            ));
        }
        if self.placement.edge_feather_sigma < 0.0 {
            return Err(SandboxError::Config(format!(
                "edge feather sigma must not be negative, got {}",
                self.placement.edge_feather_sigma
            )));
        }
        let [lo, hi] = self.placement.reveal_depth_range;
        if !(0.0..1.0).contains(&lo) || !(hi > lo && hi <= 1.0) {
            return Err(SandboxError::Config(format!(
                "reveal depth range must satisfy 0 <= lo < hi <= 1, got [{}, {})",
                lo, hi
            )));
        }
        Ok(())
    }
}

/// Canonical rectangle size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Temporal and spatial smoothing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Weight of the newest frame in the exponential blend.
    pub alpha: f32,
    /// Gaussian kernel size applied before blending. `None` disables it.
    pub blur_kernel: Option<usize>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            blur_kernel: Some(5),
        }
    }
}

/// Scene placement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Random positions tried per fossil before it is dropped.
    pub max_attempts: u32,
    /// Flat background color.
    pub fill_color: [u8; 3],
    /// Gaussian sigma used to soften alpha edges when stamping.
    pub edge_feather_sigma: f32,
    /// Half-open interval reveal depths are sampled from.
    pub reveal_depth_range: [f32; 2],
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            fill_color: [255, 255, 255],
            edge_feather_sigma: 1.0,
            reveal_depth_range: [0.0, 1.0],
        }
    }
}

/// Propagation policy for unreadable fossil rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadErrorPolicy {
    /// Fail the whole scene build.
    #[default]
    Abort,
    /// Record the failure and continue with the remaining fossils.
    Skip,
}

/// One fossil entry of a scene manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FossilSpec {
    /// Display name.
    pub name: String,
    /// Raster file (PNG with or without alpha, JPEG, ...).
    pub path: PathBuf,
    /// Uniform resize factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f32>,
    /// Explicit pixel size `[width, height]`; wins over `scale_factor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
    /// Fixed rotation in degrees. Random when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    /// Fixed reveal depth in [0, 1). Random when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_depth: Option<f32>,
}

impl FossilSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            scale_factor: None,
            size: None,
            rotation: None,
            reveal_depth: None,
        }
    }

    pub fn with_scale(mut self, scale_factor: f32) -> Self {
        self.scale_factor = Some(scale_factor);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some([width, height]);
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = Some(degrees);
        self
    }

    pub fn with_reveal_depth(mut self, depth: f32) -> Self {
        self.reveal_depth = Some(depth);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SandboxError::Config("fossil name must not be empty".to_string()));
        }
        if let Some(scale) = self.scale_factor {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(SandboxError::Config(format!(
                    "fossil '{}': scale factor must be positive, got {}",
                    self.name, scale
                )));
            }
        }
        if let Some([w, h]) = self.size {
            if w == 0 || h == 0 {
                return Err(SandboxError::Config(format!(
                    "fossil '{}': size must be non-empty, got {}x{}",
                    self.name, w, h
                )));
            }
        }
        if let Some(rotation) = self.rotation {
            if !(0.0..=360.0).contains(&rotation) {
                return Err(SandboxError::Config(format!(
                    "fossil '{}': rotation must lie in [0, 360], got {}",
                    self.name, rotation
                )));
            }
        }
        if let Some(depth) = self.reveal_depth {
            if !(0.0..1.0).contains(&depth) {
                return Err(SandboxError::Config(format!(
                    "fossil '{}': reveal depth must lie in [0, 1), got {}",
                    self.name, depth
                )));
            }
        }
        Ok(())
    }
}

/// Load a JSON array of fossil specs.
///
/// Relative raster paths resolve against the manifest's directory.
pub fn load_fossil_specs(path: &Path) -> Result<Vec<FossilSpec>> {
    let contents = std::fs::read_to_string(path)?;
    let mut specs: Vec<FossilSpec> =
        serde_json::from_str(&contents).map_err(|source| SandboxError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for spec in &mut specs {
        spec.validate()?;
        if spec.path.is_relative() {
            spec.path = base.join(&spec.path);
        }
    }

    Ok(specs)
}
