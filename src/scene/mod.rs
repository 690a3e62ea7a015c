//! Scene layers and procedural fossil placement.
//!
//! A scene is four co-registered rasters of the canonical size:
//! - `background`: flat fill color
//! - `texture`: fossils composited over the background
//! - `depth_threshold`: reveal depth of the owning fossil, `-1` where none
//! - `ids`: index of the owning fossil, `-1` where none
//!
//! The scalar layers are indexed `[[y, x]]`, matching depth frames.

mod asset;
mod builder;
mod transform;

use image::{Rgb, RgbImage};
use ndarray::Array2;

pub use asset::FossilAsset;
pub use builder::{Fossil, PlacementOutcome, SceneBuild, SceneBuilder, SkipReason};
pub use transform::{resize, rotate_expand, rotated_bounds};

/// `ids` value for pixels no fossil owns.
pub const NO_FOSSIL: i32 = -1;
/// `depth_threshold` value for pixels no fossil owns.
pub const NO_THRESHOLD: f32 = -1.0;

/// Where a placed fossil ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedFossil {
    /// Position of the entry in the build input; the value written to `ids`.
    pub index: usize,
    pub name: String,
    pub reveal_depth: f32,
    /// Center of the bounding box in canonical pixels.
    pub center: (u32, u32),
    /// Bounding box size after scaling and rotation.
    pub size: (u32, u32),
}

/// Immutable scene layers for one session.
#[derive(Debug, Clone)]
pub struct Scene {
    background: RgbImage,
    texture: RgbImage,
    depth_threshold: Array2<f32>,
    ids: Array2<i32>,
    fossils: Vec<PlacedFossil>,
}

impl Scene {
    /// Scene with no fossils.
    pub fn empty(width: u32, height: u32, fill: [u8; 3]) -> Self {
        let background = RgbImage::from_pixel(width, height, Rgb(fill));
        Self {
            texture: background.clone(),
            background,
            depth_threshold: Array2::from_elem((height as usize, width as usize), NO_THRESHOLD),
            ids: Array2::from_elem((height as usize, width as usize), NO_FOSSIL),
            fossils: Vec::new(),
        }
    }

    pub(crate) fn from_layers(
        background: RgbImage,
        texture: RgbImage,
        depth_threshold: Array2<f32>,
        ids: Array2<i32>,
        fossils: Vec<PlacedFossil>,
    ) -> Self {
        debug_assert_eq!(background.dimensions(), texture.dimensions());
        debug_assert_eq!(depth_threshold.dim(), ids.dim());
        debug_assert_eq!(
            (ids.ncols() as u32, ids.nrows() as u32),
            background.dimensions()
        );
        Self {
            background,
            texture,
            depth_threshold,
            ids,
            fossils,
        }
    }

    pub fn width(&self) -> u32 {
        self.background.width()
    }

    pub fn height(&self) -> u32 {
        self.background.height()
    }

    /// `(width, height)`
    pub fn size(&self) -> (u32, u32) {
        self.background.dimensions()
    }

    pub fn background(&self) -> &RgbImage {
        &self.background
    }

    pub fn texture(&self) -> &RgbImage {
        &self.texture
    }

    pub fn depth_threshold(&self) -> &Array2<f32> {
        &self.depth_threshold
    }

    pub fn ids(&self) -> &Array2<i32> {
        &self.ids
    }

    pub fn fossils(&self) -> &[PlacedFossil] {
        &self.fossils
    }

    /// Fossil owning pixel `(x, y)`, if any.
    pub fn fossil_at(&self, x: u32, y: u32) -> Option<&PlacedFossil> {
        let id = *self.ids.get((y as usize, x as usize))?;
        if id == NO_FOSSIL {
            return None;
        }
        self.fossils.iter().find(|f| f.index as i32 == id)
    }

    /// Number of pixels owned by any fossil.
    pub fn covered_pixels(&self) -> usize {
        self.ids.iter().filter(|&&id| id != NO_FOSSIL).count()
    }

    /// Check the layer invariant: a pixel has an id exactly when it has a
    /// threshold, and that threshold is the owning fossil's reveal depth.
    pub fn is_consistent(&self) -> bool {
        self.ids
            .iter()
            .zip(self.depth_threshold.iter())
            .all(|(&id, &threshold)| {
                if id == NO_FOSSIL {
                    threshold == NO_THRESHOLD
                } else {
                    self.fossils
                        .iter()
                        .find(|f| f.index as i32 == id)
                        .map(|f| f.reveal_depth == threshold)
                        .unwrap_or(false)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scene() {
        let scene = Scene::empty(8, 4, [255, 255, 255]);
        assert_eq!(scene.size(), (8, 4));
        assert_eq!(scene.ids().dim(), (4, 8));
        assert_eq!(scene.background(), scene.texture());
        assert_eq!(scene.covered_pixels(), 0);
        assert!(scene.fossil_at(3, 3).is_none());
        assert!(scene.is_consistent());
    }
}
