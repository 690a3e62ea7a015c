//! Collision-free fossil placement.
//!
//! Fossils are processed in input order. Each one is scaled, rotated, given a
//! reveal depth and then dropped at up to `max_attempts` random positions
//! whose bounding box lies inside the canvas. A position is accepted when no
//! pixel under the bounding box belongs to an earlier fossil. Fossils that
//! never find room are left out of the scene.

use image::imageops;
use image::{GrayImage, Luma, Rgb, RgbImage, RgbaImage};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::asset::FossilAsset;
use super::transform::{resize, rotate_expand, rotation_pads};
use super::{PlacedFossil, Scene, NO_FOSSIL, NO_THRESHOLD};
use crate::config::{FossilSpec, LoadErrorPolicy, PlacementConfig, SandboxConfig};
use crate::error::Result;

/// A fossil instance after scaling, rotation and depth sampling.
#[derive(Debug, Clone)]
pub struct Fossil {
    /// Position of the entry in the build input.
    pub index: usize,
    pub name: String,
    pub raster: RgbaImage,
    /// Whether stamping alpha-composites (`true`) or overwrites the box.
    pub has_alpha: bool,
    pub rotation: f32,
    pub reveal_depth: f32,
    /// Bounding box center, `None` while unplaced.
    pub center: Option<(u32, u32)>,
}

/// Why a loaded fossil is missing from the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The bounding box is larger than the canvas.
    TooLarge,
    /// Every attempted position collided with an earlier fossil.
    NoFreeSpace { attempts: u32 },
}

/// Per-fossil result of a scene build.
#[derive(Debug, Clone)]
pub enum PlacementOutcome {
    Placed(Fossil),
    Skipped { fossil: Fossil, reason: SkipReason },
    LoadFailed { index: usize, name: String, reason: String },
}

impl PlacementOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, PlacementOutcome::Placed(_))
    }

    pub fn name(&self) -> &str {
        match self {
            PlacementOutcome::Placed(f) => f.name.as_str(),
            PlacementOutcome::Skipped { fossil, .. } => fossil.name.as_str(),
            PlacementOutcome::LoadFailed { name, .. } => name.as_str(),
        }
    }
}

/// A finished scene plus what happened to each input fossil.
#[derive(Debug, Clone)]
pub struct SceneBuild {
    pub scene: Scene,
    pub outcomes: Vec<PlacementOutcome>,
}

impl SceneBuild {
    pub fn placed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_placed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PlacementOutcome::Skipped { .. }))
            .count()
    }

    pub fn load_failures(&self) -> impl Iterator<Item = &PlacementOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PlacementOutcome::LoadFailed { .. }))
    }
}

/// Mutable layers while fossils are being stamped.
struct Canvas {
    background: RgbImage,
    texture: RgbImage,
    depth_threshold: Array2<f32>,
    ids: Array2<i32>,
    placed: Vec<PlacedFossil>,
}

impl Canvas {
    fn new(width: u32, height: u32, fill: [u8; 3]) -> Self {
        let background = RgbImage::from_pixel(width, height, Rgb(fill));
        Self {
            texture: background.clone(),
            background,
            depth_threshold: Array2::from_elem((height as usize, width as usize), NO_THRESHOLD),
            ids: Array2::from_elem((height as usize, width as usize), NO_FOSSIL),
            placed: Vec::new(),
        }
    }

    fn width(&self) -> u32 {
        self.background.width()
    }

    fn height(&self) -> u32 {
        self.background.height()
    }

    /// True when no earlier fossil owns any pixel of the box. Stamps only
    /// touch owned pixels, so this is also "texture still at the fill value".
    fn region_is_free(&self, x0: u32, y0: u32, w: u32, h: u32) -> bool {
        let rows = y0 as usize..(y0 + h) as usize;
        let cols = x0 as usize..(x0 + w) as usize;
        self.ids
            .slice(ndarray::s![rows, cols])
            .iter()
            .all(|&id| id == NO_FOSSIL)
    }

    fn stamp(&mut self, fossil: &Fossil, x0: u32, y0: u32, feather_sigma: f32) {
        let raster = &fossil.raster;
        let id = fossil.index as i32;

        let feathered: Option<GrayImage> = (fossil.has_alpha && feather_sigma > 0.0).then(|| {
            let alpha = GrayImage::from_fn(raster.width(), raster.height(), |x, y| {
                Luma([raster.get_pixel(x, y)[3]])
            });
            imageops::blur(&alpha, feather_sigma)
        });

        for (fx, fy, src) in raster.enumerate_pixels() {
            let (cx, cy) = (x0 + fx, y0 + fy);
            if fossil.has_alpha {
                if src[3] == 0 {
                    continue;
                }
                let coverage = match &feathered {
                    Some(mask) => mask.get_pixel(fx, fy)[0],
                    None => src[3],
                };
                let a = coverage as f32 / 255.0;
                let dst = self.texture.get_pixel_mut(cx, cy);
                for c in 0..3 {
                    let blended = a * src[c] as f32 + (1.0 - a) * dst[c] as f32;
                    dst[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            } else {
                self.texture.put_pixel(cx, cy, Rgb([src[0], src[1], src[2]]));
            }

            self.ids[[cy as usize, cx as usize]] = id;
            self.depth_threshold[[cy as usize, cx as usize]] = fossil.reveal_depth;
        }
    }

    fn into_scene(self) -> Scene {
        Scene::from_layers(
            self.background,
            self.texture,
            self.depth_threshold,
            self.ids,
            self.placed,
        )
    }
}

/// Builds scenes from fossil specs with an explicit random source.
pub struct SceneBuilder<R: Rng = StdRng> {
    placement: PlacementConfig,
    load_error_policy: LoadErrorPolicy,
    rng: R,
}

impl SceneBuilder<StdRng> {
    /// Builder seeded from `config.seed`, or from OS entropy when unset.
    pub fn from_config(config: &SandboxConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(config.placement.clone(), config.load_error_policy, rng)
    }
}

impl<R: Rng> SceneBuilder<R> {
    pub fn new(placement: PlacementConfig, load_error_policy: LoadErrorPolicy, rng: R) -> Self {
        Self {
            placement,
            load_error_policy,
            rng,
        }
    }

    /// Load every fossil entry and place it on a `width x height` canvas.
    ///
    /// With [`LoadErrorPolicy::Abort`] the first unreadable raster fails the
    /// build; with [`LoadErrorPolicy::Skip`] it is recorded as
    /// [`PlacementOutcome::LoadFailed`] and the build continues.
    pub fn build(&mut self, specs: &[FossilSpec], width: u32, height: u32) -> Result<SceneBuild> {
        let mut canvas = Canvas::new(width, height, self.placement.fill_color);
        let mut outcomes = Vec::with_capacity(specs.len());

        for (index, spec) in specs.iter().enumerate() {
            match FossilAsset::load(spec) {
                Ok(asset) => outcomes.push(self.place(&mut canvas, index, asset)),
                Err(e) => match self.load_error_policy {
                    LoadErrorPolicy::Abort => return Err(e),
                    LoadErrorPolicy::Skip => {
                        tracing::warn!(name = %spec.name, "Skipping fossil: {}", e);
                        outcomes.push(PlacementOutcome::LoadFailed {
                            index,
                            name: spec.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        Ok(self.finish(canvas, outcomes))
    }

    /// Place already loaded assets. Indices follow the order of `assets`.
    pub fn build_from_assets(
        &mut self,
        assets: impl IntoIterator<Item = FossilAsset>,
        width: u32,
        height: u32,
    ) -> SceneBuild {
        let mut canvas = Canvas::new(width, height, self.placement.fill_color);
        let outcomes = assets
            .into_iter()
            .enumerate()
            .map(|(index, asset)| self.place(&mut canvas, index, asset))
            .collect();
        self.finish(canvas, outcomes)
    }

    fn finish(&self, canvas: Canvas, outcomes: Vec<PlacementOutcome>) -> SceneBuild {
        let scene = canvas.into_scene();
        let build = SceneBuild { scene, outcomes };
        tracing::info!(
            placed = build.placed_count(),
            skipped = build.skipped_count(),
            failed = build.load_failures().count(),
            width = build.scene.width(),
            height = build.scene.height(),
            "Scene built"
        );
        build
    }

    /// Scale, rotate and sample the reveal depth.
    fn prepare(&mut self, index: usize, asset: FossilAsset) -> Fossil {
        let spec = &asset.spec;
        if spec.scale_factor.is_some() && spec.size.is_some() {
            tracing::debug!(name = %spec.name, "Both scale_factor and size given, using size");
        }
        let scaled = resize(&asset.raster, spec.scale_factor, spec.size);

        let rotation = match spec.rotation {
            Some(degrees) => degrees,
            None => self.rng.random_range(0.0..360.0),
        };
        let raster = rotate_expand(&scaled, rotation);
        let has_alpha = asset.has_alpha || rotation_pads(rotation);

        let reveal_depth = match spec.reveal_depth {
            Some(depth) => depth,
            None => {
                let [lo, hi] = self.placement.reveal_depth_range;
                if hi > lo {
                    self.rng.random_range(lo..hi)
                } else {
                    lo
                }
            }
        };

        Fossil {
            index,
            name: spec.name.clone(),
            raster,
            has_alpha,
            rotation,
            reveal_depth,
            center: None,
        }
    }

    fn place(&mut self, canvas: &mut Canvas, index: usize, asset: FossilAsset) -> PlacementOutcome {
        let mut fossil = self.prepare(index, asset);
        let (fw, fh) = fossil.raster.dimensions();

        if fw > canvas.width() || fh > canvas.height() {
            tracing::warn!(
                name = %fossil.name,
                size = ?(fw, fh),
                canvas = ?(canvas.width(), canvas.height()),
                "Fossil larger than the canvas, skipping"
            );
            return PlacementOutcome::Skipped {
                fossil,
                reason: SkipReason::TooLarge,
            };
        }

        let attempts = self.placement.max_attempts;
        for attempt in 0..attempts {
            let x0 = self.rng.random_range(0..=canvas.width() - fw);
            let y0 = self.rng.random_range(0..=canvas.height() - fh);

            if !canvas.region_is_free(x0, y0, fw, fh) {
                tracing::trace!(name = %fossil.name, attempt, x0, y0, "Placement collided");
                continue;
            }

            canvas.stamp(&fossil, x0, y0, self.placement.edge_feather_sigma);
            let center = (x0 + fw / 2, y0 + fh / 2);
            fossil.center = Some(center);
            canvas.placed.push(PlacedFossil {
                index,
                name: fossil.name.clone(),
                reveal_depth: fossil.reveal_depth,
                center,
                size: (fw, fh),
            });

            tracing::debug!(
                name = %fossil.name,
                index,
                ?center,
                reveal_depth = fossil.reveal_depth,
                rotation = fossil.rotation,
                attempt,
                "Fossil placed"
            );
            return PlacementOutcome::Placed(fossil);
        }

        tracing::info!(name = %fossil.name, attempts, "No free space for fossil, leaving it out");
        PlacementOutcome::Skipped {
            fossil,
            reason: SkipReason::NoFreeSpace { attempts },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};

    fn builder(seed: u64) -> SceneBuilder<StdRng> {
        SceneBuilder::new(
            PlacementConfig::default(),
            LoadErrorPolicy::Abort,
            StdRng::seed_from_u64(seed),
        )
    }

    fn opaque_asset(name: &str, w: u32, h: u32, color: [u8; 3]) -> FossilAsset {
        let spec = FossilSpec::new(name, format!("{}.png", name))
            .with_rotation(0.0)
            .with_reveal_depth(0.5);
        FossilAsset::from_image(
            spec,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(color))),
        )
    }

    /// Filled disc on a transparent square.
    fn disc_asset(name: &str, diameter: u32) -> FossilAsset {
        let r = diameter as f32 / 2.0;
        let img = RgbaImage::from_fn(diameter, diameter, |x, y| {
            let dx = x as f32 + 0.5 - r;
            let dy = y as f32 + 0.5 - r;
            if dx * dx + dy * dy <= (r - 1.0) * (r - 1.0) {
                Rgba([90, 60, 30, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        FossilAsset::from_image(
            FossilSpec::new(name, format!("{}.png", name)).with_rotation(0.0),
            DynamicImage::ImageRgba8(img),
        )
    }

    #[test]
    fn test_single_opaque_fossil_owns_its_box() {
        let build = builder(1).build_from_assets([opaque_asset("bone", 10, 6, [1, 2, 3])], 40, 30);
        assert_eq!(build.placed_count(), 1);

        let scene = &build.scene;
        assert_eq!(scene.covered_pixels(), 60);
        assert!(scene.is_consistent());

        let placed = &scene.fossils()[0];
        assert_eq!(placed.size, (10, 6));
        let (cx, cy) = placed.center;
        assert_eq!(scene.ids()[[cy as usize, cx as usize]], 0);
        assert_eq!(*scene.texture().get_pixel(cx, cy), Rgb([1, 2, 3]));
        assert_eq!(scene.depth_threshold()[[cy as usize, cx as usize]], 0.5);
    }

    #[test]
    fn test_alpha_silhouette_defines_ownership() {
        let build = builder(2).build_from_assets([disc_asset("shell", 12)], 30, 30);
        let scene = &build.scene;
        let placed = &scene.fossils()[0];
        let x0 = placed.center.0 - 6;
        let y0 = placed.center.1 - 6;

        // corner of the bounding box is transparent: not owned, untouched
        assert_eq!(scene.ids()[[y0 as usize, x0 as usize]], NO_FOSSIL);
        assert_eq!(scene.texture().get_pixel(x0, y0), scene.background().get_pixel(x0, y0));
        // center is opaque: owned
        assert_eq!(scene.fossil_at(placed.center.0, placed.center.1).map(|f| f.index), Some(0));
        assert!(scene.covered_pixels() < 144);

        // every changed texture pixel is owned
        for (x, y, p) in scene.texture().enumerate_pixels() {
            if p != scene.background().get_pixel(x, y) {
                assert_ne!(scene.ids()[[y as usize, x as usize]], NO_FOSSIL);
            }
        }
        assert!(scene.is_consistent());
    }

    #[test]
    fn test_too_large_is_skipped_without_attempts() {
        let build = builder(3).build_from_assets([opaque_asset("mammoth", 50, 5, [0, 0, 0])], 40, 30);
        assert_eq!(build.placed_count(), 0);
        assert!(matches!(
            build.outcomes[0],
            PlacementOutcome::Skipped { reason: SkipReason::TooLarge, .. }
        ));
        assert_eq!(build.scene.covered_pixels(), 0);
    }

    #[test]
    fn test_full_canvas_blocks_second_fossil() {
        let build = builder(4).build_from_assets(
            [
                opaque_asset("slab", 20, 20, [9, 9, 9]),
                opaque_asset("chip", 2, 2, [7, 7, 7]),
            ],
            20,
            20,
        );
        assert_eq!(build.placed_count(), 1);
        assert!(matches!(
            build.outcomes[1],
            PlacementOutcome::Skipped { reason: SkipReason::NoFreeSpace { attempts: 10 }, .. }
        ));
        assert!(build.scene.ids().iter().all(|&id| id == 0));
    }

    #[test]
    fn test_no_overlap_between_fossils() {
        let assets: Vec<FossilAsset> = (0..15)
            .map(|i| opaque_asset(&format!("f{}", i), 8, 8, [i as u8, 0, 0]))
            .collect();
        let build = builder(5).build_from_assets(assets, 64, 64);
        let scene = &build.scene;

        // each placed fossil owns exactly its full box
        for placed in scene.fossils() {
            let owned = scene.ids().iter().filter(|&&id| id == placed.index as i32).count();
            assert_eq!(owned, 64);
        }
        assert_eq!(scene.covered_pixels(), 64 * scene.fossils().len());
        assert!(scene.is_consistent());
    }

    #[test]
    fn test_same_seed_same_scene() {
        let make = || {
            let assets = vec![disc_asset("a", 10), disc_asset("b", 14), disc_asset("c", 9)];
            let mut b = builder(42);
            b.build_from_assets(
                assets
                    .into_iter()
                    .map(|mut a| {
                        a.spec.rotation = None;
                        a.spec.reveal_depth = None;
                        a
                    }),
                80,
                60,
            )
        };
        let first = make();
        let second = make();
        assert_eq!(first.scene.fossils(), second.scene.fossils());
        assert_eq!(first.scene.texture(), second.scene.texture());
    }

    #[test]
    fn test_random_reveal_depth_in_range() {
        let mut placement = PlacementConfig::default();
        placement.reveal_depth_range = [0.97, 1.0];
        let mut b = SceneBuilder::new(placement, LoadErrorPolicy::Abort, StdRng::seed_from_u64(9));
        let assets = (0..5).map(|i| {
            let mut a = opaque_asset(&format!("f{}", i), 4, 4, [0, 0, 0]);
            a.spec.reveal_depth = None;
            a
        });
        let build = b.build_from_assets(assets, 50, 50);
        for f in build.scene.fossils() {
            assert!((0.97..1.0).contains(&f.reveal_depth));
        }
    }

    #[test]
    fn test_load_error_policies() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::from_pixel(4, 4, Rgb([5, 5, 5])).save(&good).unwrap();
        let specs = vec![
            FossilSpec::new("missing", dir.path().join("missing.png")),
            FossilSpec::new("good", &good).with_rotation(0.0),
        ];

        assert!(builder(6).build(&specs, 20, 20).is_err());

        let mut skipping = SceneBuilder::new(
            PlacementConfig::default(),
            LoadErrorPolicy::Skip,
            StdRng::seed_from_u64(6),
        );
        let build = skipping.build(&specs, 20, 20).unwrap();
        assert_eq!(build.load_failures().count(), 1);
        assert_eq!(build.placed_count(), 1);
        // ids keep the input position of the entry
        assert_eq!(build.scene.fossils()[0].index, 1);
        assert_eq!(build.outcomes[0].name(), "missing");
    }
}
