use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Rc;

use nalgebra::{Point3, Vector3};
use serde::Serialize;

use crate::config::{PipelineConfig, ProjectionMode};
use crate::error::{PipelineError, PipelineResult};
use crate::extrude::{extrude, BufferGeometry, ExtrudedSolid};
use crate::geojson_features::{parse_feature_collection, GeoFeature};
use crate::height_policy::{FixedLevels, HeightPolicy};
use crate::map_sync::{CameraState, MapView};
use crate::models::{Camera, Color, Light, Material, PlanarPoint, ShadowFlags};
use crate::normalize::{compute_context, project_features, NormalizationContext, ProjectedRing};
use crate::projection::{projector_for, Projector};
use crate::{console_error, console_log, console_warn};

const GROUND_COLOR: &str = "#e6e6cc";
// Ground plane edge length relative to the larger side of the normalized dataset
const GROUND_MARGIN: f64 = 4.0;
const SHADOW_OPACITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SolidHandle(pub u64);

/// Square reference plane at z = 0, centered on the scene origin, facing +Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundPlane {
    pub size: f64,
}

impl GroundPlane {
    pub fn normal(&self) -> Vector3<f64> {
        Vector3::z()
    }

    /// Corners counter-clockwise seen from above.
    pub fn corners(&self) -> [Point3<f64>; 4] {
        let h = self.size / 2.0;
        [
            Point3::new(-h, -h, 0.0),
            Point3::new(h, -h, 0.0),
            Point3::new(h, h, 0.0),
            Point3::new(-h, h, 0.0),
        ]
    }

    pub fn to_buffer_geometry(&self) -> BufferGeometry {
        let corners = self.corners();
        let vertices = corners
            .iter()
            .flat_map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();
        let normals = std::iter::repeat([0.0, 0.0, 1.0]).take(4).flatten().collect();

        BufferGeometry {
            vertices,
            normals,
            indices: vec![0, 1, 2, 0, 2, 3],
            colors: None,
            has_data: true,
        }
    }
}

/// Anything the scene assembler hands to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Drawable {
    Building { feature_id: String, solid: ExtrudedSolid },
    Ground(GroundPlane),
}

/// The renderer collaborator: owns the render graph and draws frames on demand.
pub trait Renderer {
    type Scene;

    fn create_scene(&mut self) -> Self::Scene;

    fn add_solid(
        &mut self,
        scene: &mut Self::Scene,
        drawable: Drawable,
        material: Material,
        shadows: ShadowFlags,
    ) -> PipelineResult<SolidHandle>;

    /// Returns false if the handle was not part of the scene.
    fn remove_solid(&mut self, scene: &mut Self::Scene, handle: SolidHandle) -> bool;

    fn add_light(&mut self, scene: &mut Self::Scene, light: Light);

    fn render(&mut self, scene: &Self::Scene, camera: &Camera) -> PipelineResult<()>;

    fn drawable_count(&self, scene: &Self::Scene) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFeature {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub added: Vec<(String, SolidHandle)>,
    pub skipped: Vec<SkippedFeature>,
}

/// Result of one asynchronous dataset load. Failures are reported, never propagated.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(LoadReport),
    Failed(PipelineError),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded(_))
    }
}

/// Everything one pipeline needs: renderer, scene, camera, projector and the state of
/// the current dataset. Owned by the caller and passed to every component.
pub struct PipelineContext<R: Renderer> {
    renderer: R,
    scene: R::Scene,
    camera: Camera,
    config: PipelineConfig,
    projector: Box<dyn Projector>,
    height_policy: Box<dyn HeightPolicy>,
    features: HashMap<String, SolidHandle>,
    ground: Option<(SolidHandle, GroundPlane)>,
    normalization: Option<NormalizationContext>,
}

impl<R: Renderer> PipelineContext<R> {
    /// Build the scene: lights, camera, and the ground plane when enabled. `map` is
    /// required in map-linked mode and ignored otherwise.
    pub fn new(mut renderer: R, config: PipelineConfig, map: Option<Rc<dyn MapView>>) -> PipelineResult<Self> {
        config.validate()?;
        let projector = projector_for(&config, map)?;
        let mut scene = renderer.create_scene();

        if config.shadows_enabled {
            renderer.add_light(&mut scene, Light::Ambient { color: Color::WHITE, intensity: 0.5 });
        } else {
            renderer.add_light(
                &mut scene,
                Light::Directional {
                    direction: Vector3::new(1.0, 1.0, 1.0).normalize(),
                    color: Color::WHITE,
                    intensity: 1.0,
                },
            );
        }

        let mut camera = Camera::default();
        camera.position = match config.projection_mode {
            ProjectionMode::Fixed => {
                let [x, y, z] = config.fixed_camera_position;
                Point3::new(x, y, z)
            }
            ProjectionMode::MapLinked => Point3::new(0.0, 0.0, config.map_camera_altitude),
        };
        camera.look_at(Point3::origin());

        let height_policy: Box<dyn HeightPolicy> = Box::new(FixedLevels::from_config(&config));

        let mut ctx = Self {
            renderer,
            scene,
            camera,
            config,
            projector,
            height_policy,
            features: HashMap::new(),
            ground: None,
            normalization: None,
        };

        if ctx.config.ground_plane_enabled {
            let plane = GroundPlane { size: ctx.config.ground_plane_size };
            let handle = ctx.add_drawable(Drawable::Ground(plane))?;
            ctx.ground = Some((handle, plane));
        }

        Ok(ctx)
    }

    pub fn with_height_policy(mut self, policy: impl HeightPolicy + 'static) -> Self {
        self.height_policy = Box::new(policy);
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn scene(&self) -> &R::Scene {
        &self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn height_policy(&self) -> &dyn HeightPolicy {
        self.height_policy.as_ref()
    }

    pub fn normalization(&self) -> Option<&NormalizationContext> {
        self.normalization.as_ref()
    }

    pub fn ground_plane(&self) -> Option<GroundPlane> {
        self.ground.map(|(_, plane)| plane)
    }

    pub fn feature_handle(&self, id: &str) -> Option<SolidHandle> {
        self.features.get(id).copied()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn drawable_count(&self) -> usize {
        self.renderer.drawable_count(&self.scene)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.set_aspect(width, height);
    }

    pub fn apply_camera_state(&mut self, state: &CameraState) {
        self.camera.position = state.position;
        self.camera.look_at(state.target);
    }

    pub fn render_frame(&mut self) -> PipelineResult<()> {
        self.renderer.render(&self.scene, &self.camera)
    }

    fn building_material(&self) -> (Material, ShadowFlags) {
        let color = Color::from_hex(&self.config.building_color);
        if self.config.shadows_enabled {
            (Material::standard(color), ShadowFlags { cast: true, receive: true })
        } else {
            (Material::basic(color), ShadowFlags::default())
        }
    }

    fn ground_material(&self) -> (Material, ShadowFlags) {
        if self.config.shadows_enabled {
            (Material::shadow_only(SHADOW_OPACITY), ShadowFlags { cast: false, receive: true })
        } else {
            (Material::basic(Color::from_hex(GROUND_COLOR)), ShadowFlags::default())
        }
    }

    fn add_drawable(&mut self, drawable: Drawable) -> PipelineResult<SolidHandle> {
        let (material, shadows) = match drawable {
            Drawable::Ground(_) => self.ground_material(),
            Drawable::Building { .. } => self.building_material(),
        };
        self.renderer.add_solid(&mut self.scene, drawable, material, shadows)
    }

    // Normalize and extrude one projected ring; pure with respect to the scene
    fn build_solid(
        &self,
        feature: &GeoFeature,
        ring: &ProjectedRing,
        context: &NormalizationContext,
        height_policy: &dyn HeightPolicy,
    ) -> PipelineResult<ExtrudedSolid> {
        let normalized: Vec<PlanarPoint> = context.normalize_ring(ring)?;
        extrude(&normalized, height_policy.height(feature))
    }

    /// Normalize, extrude and insert a single feature. A feature that is already in
    /// the scene is rejected with `DuplicateFeature`; the existing mesh stays. The
    /// ground plane grows if the new solid would overhang it.
    pub fn add_feature(
        &mut self,
        feature: &GeoFeature,
        context: &NormalizationContext,
        height_policy: &dyn HeightPolicy,
    ) -> PipelineResult<SolidHandle> {
        if self.features.contains_key(&feature.id) {
            return Err(PipelineError::DuplicateFeature(feature.id.clone()));
        }

        let ring = project_features(std::slice::from_ref(feature), self.projector.as_ref())?
            .pop()
            .ok_or(PipelineError::EmptyDataset)?;
        let solid = self.build_solid(feature, &ring, context, height_policy)?;
        let (width, height) = context.normalized_extent();
        let span = width.max(height).max(2.0 * reach(&solid));

        let handle = self.add_drawable(Drawable::Building {
            feature_id: feature.id.clone(),
            solid,
        })?;
        if let Err(err) = self.fit_ground_plane(span) {
            self.renderer.remove_solid(&mut self.scene, handle);
            return Err(err);
        }

        self.features.insert(feature.id.clone(), handle);
        Ok(handle)
    }

    /// Parse a GeoJSON `FeatureCollection` and load it.
    pub fn load_geojson_str(&mut self, json: &str) -> PipelineResult<LoadReport> {
        let features = parse_feature_collection(json)?;
        self.load_features(&features)
    }

    /// Run the whole pipeline over one dataset.
    ///
    /// Nothing touches the scene until every feature has been projected, normalized and
    /// extruded, so an aborted load leaves the render graph as it was. Degenerate or
    /// duplicate features are skipped and reported; anything else aborts the load.
    pub fn load_features(&mut self, features: &[GeoFeature]) -> PipelineResult<LoadReport> {
        if features.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }

        let rings = project_features(features, self.projector.as_ref())?;
        let context = compute_context(&rings, self.config.scale_factor())?;

        let mut report = LoadReport::default();
        let mut prepared: Vec<(String, ExtrudedSolid)> = Vec::with_capacity(features.len());
        let mut seen: HashSet<&str> = HashSet::new();

        for (feature, ring) in features.iter().zip(&rings) {
            let result = if self.features.contains_key(&feature.id) || !seen.insert(feature.id.as_str()) {
                Err(PipelineError::DuplicateFeature(feature.id.clone()))
            } else {
                self.build_solid(feature, ring, &context, self.height_policy.as_ref())
            };

            match result {
                Ok(solid) => prepared.push((feature.id.clone(), solid)),
                Err(err) if !err.is_dataset_fatal() => {
                    console_warn!("Skipping feature {}: {}", feature.id, err);
                    report.skipped.push(SkippedFeature {
                        id: feature.id.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let inserted = self.commit(prepared)?;
        let (width, height) = context.normalized_extent();
        if let Err(err) = self.fit_ground_plane(width.max(height)) {
            self.remove_all(&inserted);
            return Err(err);
        }

        for (feature_id, handle) in &inserted {
            self.features.insert(feature_id.clone(), *handle);
        }
        report.added = inserted;
        self.normalization = Some(context);

        console_log!(
            "Loaded {} buildings ({} skipped)",
            report.added.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    // Insert prepared solids, rolling back every insertion if the renderer refuses one.
    // Feature ids are recorded by the caller once the whole load has succeeded.
    fn commit(&mut self, prepared: Vec<(String, ExtrudedSolid)>) -> PipelineResult<Vec<(String, SolidHandle)>> {
        let mut inserted: Vec<(String, SolidHandle)> = Vec::with_capacity(prepared.len());

        for (feature_id, solid) in prepared {
            match self.add_drawable(Drawable::Building {
                feature_id: feature_id.clone(),
                solid,
            }) {
                Ok(handle) => inserted.push((feature_id, handle)),
                Err(err) => {
                    self.remove_all(&inserted);
                    return Err(err);
                }
            }
        }

        Ok(inserted)
    }

    fn remove_all(&mut self, inserted: &[(String, SolidHandle)]) {
        for (_, handle) in inserted {
            self.renderer.remove_solid(&mut self.scene, *handle);
        }
    }

    // Grow the single ground plane when content spanning `span` units would overhang it
    fn fit_ground_plane(&mut self, span: f64) -> PipelineResult<()> {
        let Some((old_handle, plane)) = self.ground else {
            return Ok(());
        };

        let needed = span * GROUND_MARGIN;
        if needed <= plane.size {
            return Ok(());
        }

        let grown = GroundPlane { size: needed };
        let handle = self.add_drawable(Drawable::Ground(grown))?;
        self.renderer.remove_solid(&mut self.scene, old_handle);
        self.ground = Some((handle, grown));
        Ok(())
    }

    /// Await the fetch, then run the pipeline. Every failure is logged and reported in
    /// the outcome; the scene keeps whatever it had before.
    pub async fn load_dataset<F>(&mut self, fetch: F) -> LoadOutcome
    where
        F: Future<Output = PipelineResult<String>>,
    {
        let result = match fetch.await {
            Ok(json) => self.load_geojson_str(&json),
            Err(err) => Err(err),
        };

        match result {
            Ok(report) => LoadOutcome::Loaded(report),
            Err(err) => {
                console_error!("Error loading GeoJSON: {}", err);
                LoadOutcome::Failed(err)
            }
        }
    }
}

// Twice this is the width of a square around the origin that holds the solid
fn reach(solid: &ExtrudedSolid) -> f64 {
    solid
        .base_ring()
        .iter()
        .fold(0.0_f64, |m, p| m.max(p.x.abs()).max(p.y.abs()))
}
