//! Projector output
//!
//! Composited frames go to a [`DisplaySink`]. The sinks here write to disk or
//! memory; a windowed fullscreen sink would implement the same trait.

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Destination for composited frames.
pub trait DisplaySink {
    /// Show one frame. Errors abort the session.
    fn present(&mut self, frame: &RgbImage) -> Result<()>;
}

/// Information about a connected display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Display name from the operating system
    pub name: String,
    /// Position in the virtual desktop (top-left corner)
    pub position: (i32, i32),
    /// Physical resolution in pixels
    pub size: (u32, u32),
    /// Whether this is the primary display
    #[serde(default)]
    pub is_primary: bool,
}

impl Monitor {
    pub fn new(name: impl Into<String>, position: (i32, i32), size: (u32, u32)) -> Self {
        Self {
            name: name.into(),
            position,
            size,
            is_primary: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Label with resolution, for logs.
    pub fn label(&self) -> String {
        format!("{} ({}x{})", self.name, self.size.0, self.size.1)
    }
}

/// Read a JSON list of connected displays, as exported by the windowing
/// layer.
pub fn load_monitors(path: &Path) -> Result<Vec<Monitor>> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| SandboxError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pick the display the projector is most likely attached to.
///
/// HDMI outputs win. Otherwise the first non-primary display, then whatever
/// is left.
pub fn select_projector(monitors: &[Monitor]) -> Option<Monitor> {
    if let Some(hdmi) = monitors
        .iter()
        .find(|m| m.name.to_ascii_uppercase().contains("HDMI"))
    {
        tracing::info!(display = %hdmi.label(), "Selected HDMI display for projection");
        return Some(hdmi.clone());
    }

    let fallback = monitors
        .iter()
        .find(|m| !m.is_primary)
        .or_else(|| monitors.first())?;
    tracing::warn!(
        display = %fallback.label(),
        "No HDMI display found, projecting on fallback display"
    );
    Some(fallback.clone())
}

const FRAME_PREFIX: &str = "frame";

/// Writes each frame to `<dir>/frame_<n>.png`.
pub struct ImageSequenceSink {
    dir: PathBuf,
    output_size: Option<(u32, u32)>,
    written: u64,
}

impl ImageSequenceSink {
    /// Create the output directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            output_size: None,
            written: 0,
        })
    }

    /// Resize frames to the projector resolution before writing.
    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = Some((width.max(1), height.max(1)));
        self
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{FRAME_PREFIX}_{index:06}.png"))
    }
}

impl DisplaySink for ImageSequenceSink {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.path_for(self.written);
        let saved = match self.output_size {
            Some((w, h)) if (w, h) != frame.dimensions() => {
                imageops::resize(frame, w, h, FilterType::Triangle).save(&path)
            }
            _ => frame.save(&path),
        };
        saved.map_err(|e| SandboxError::Display(format!("{}: {}", path.display(), e)))?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps presented frames in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<RgbImage>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&RgbImage> {
        self.frames.last()
    }
}

impl DisplaySink for MemorySink {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn present(&mut self, _frame: &RgbImage) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_select_prefers_hdmi() {
        let monitors = vec![
            Monitor::new("eDP-1", (0, 0), (1920, 1080)).primary(),
            Monitor::new("DP-2", (1920, 0), (1920, 1080)),
            Monitor::new("hdmi-a-1", (3840, 0), (1280, 800)),
        ];
        assert_eq!(select_projector(&monitors).unwrap().name, "hdmi-a-1");
    }

    #[test]
    fn test_select_falls_back_to_secondary() {
        let monitors = vec![
            Monitor::new("eDP-1", (0, 0), (1920, 1080)).primary(),
            Monitor::new("DP-2", (1920, 0), (1024, 768)),
        ];
        assert_eq!(select_projector(&monitors).unwrap().name, "DP-2");
    }

    #[test]
    fn test_select_single_and_empty() {
        let only = vec![Monitor::new("eDP-1", (0, 0), (1920, 1080)).primary()];
        assert_eq!(select_projector(&only).unwrap().name, "eDP-1");
        assert!(select_projector(&[]).is_none());
    }

    #[test]
    fn test_load_monitors_defaults_primary_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitors.json");
        std::fs::write(
            &path,
            r#"[
                {"name": "eDP-1", "position": [0, 0], "size": [1920, 1080], "is_primary": true},
                {"name": "HDMI-1", "position": [1920, 0], "size": [1280, 800]}
            ]"#,
        )
        .unwrap();

        let monitors = load_monitors(&path).unwrap();
        assert_eq!(monitors.len(), 2);
        assert!(!monitors[1].is_primary);
        assert_eq!(select_projector(&monitors).unwrap().size, (1280, 800));

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(load_monitors(&path), Err(SandboxError::Parse { .. })));
    }

    #[test]
    fn test_image_sequence_sink_numbers_and_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageSequenceSink::new(&dir.path().join("out"))
            .unwrap()
            .with_output_size(8, 6);
        let frame = RgbImage::from_pixel(4, 3, Rgb([9, 8, 7]));
        sink.present(&frame).unwrap();
        sink.present(&frame).unwrap();
        assert_eq!(sink.frames_written(), 2);

        let second = image::open(dir.path().join("out").join("frame_000001.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(second.dimensions(), (8, 6));
        assert_eq!(*second.get_pixel(4, 3), Rgb([9, 8, 7]));
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        assert!(sink.last().is_none());
        sink.present(&RgbImage::new(2, 2)).unwrap();
        assert_eq!(sink.frames.len(), 1);
        assert!(NullSink.present(&RgbImage::new(1, 1)).is_ok());
    }
}
