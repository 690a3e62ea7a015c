//! Fossil texture loading.

use image::{DynamicImage, RgbaImage};

use crate::config::FossilSpec;
use crate::error::{Result, SandboxError};

/// A fossil raster loaded from its spec, before scaling and rotation.
#[derive(Debug, Clone)]
pub struct FossilAsset {
    pub spec: FossilSpec,
    pub raster: RgbaImage,
    /// Whether the source raster carried an alpha channel.
    pub has_alpha: bool,
}

impl FossilAsset {
    /// Read the raster referenced by `spec.path`.
    pub fn load(spec: &FossilSpec) -> Result<Self> {
        spec.validate()?;
        let image = image::open(&spec.path).map_err(|source| SandboxError::FossilLoad {
            name: spec.name.clone(),
            path: spec.path.clone(),
            source,
        })?;

        tracing::debug!(
            name = %spec.name,
            path = %spec.path.display(),
            width = image.width(),
            height = image.height(),
            "Loaded fossil texture"
        );

        Ok(Self::from_image(spec.clone(), image))
    }

    /// Wrap an already decoded image.
    pub fn from_image(spec: FossilSpec, image: DynamicImage) -> Self {
        let has_alpha = image.color().has_alpha();
        Self {
            spec,
            raster: image.to_rgba8(),
            has_alpha,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn test_load_png_with_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bone.png");
        RgbaImage::from_pixel(6, 4, Rgba([10, 20, 30, 128]))
            .save(&path)
            .unwrap();

        let asset = FossilAsset::load(&FossilSpec::new("bone", &path)).unwrap();
        assert!(asset.has_alpha);
        assert_eq!(asset.dimensions(), (6, 4));
    }

    #[test]
    fn test_load_opaque_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.png");
        RgbImage::from_pixel(3, 3, Rgb([1, 2, 3])).save(&path).unwrap();

        let asset = FossilAsset::load(&FossilSpec::new("shell", &path)).unwrap();
        assert!(!asset.has_alpha);
        assert!(asset.raster.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = FossilAsset::load(&FossilSpec::new("ghost", "/nonexistent/ghost.png")).unwrap_err();
        assert!(matches!(err, SandboxError::FossilLoad { ref name, .. } if name == "ghost"));
    }
}
