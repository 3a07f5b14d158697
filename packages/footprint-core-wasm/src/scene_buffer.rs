use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};
use crate::extrude::BufferGeometry;
use crate::models::{Camera, Light, Material, ShadowFlags};
use crate::scene::{Drawable, Renderer, SolidHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DrawableKind {
    Building,
    Ground,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedDrawable {
    pub handle: SolidHandle,
    pub kind: DrawableKind,
    pub feature_id: Option<String>,
    pub geometry: BufferGeometry,
    pub material: Material,
    pub shadows: ShadowFlags,
}

/// Everything a JS host needs to rebuild the scene with its own renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordedScene {
    pub drawables: Vec<RecordedDrawable>,
    pub lights: Vec<Light>,
}

/// Renderer that flattens every solid to `BufferGeometry` instead of drawing it.
#[derive(Debug, Default)]
pub struct SceneBuffer {
    next_handle: u64,
    frames_rendered: u64,
    last_camera: Option<Camera>,
    max_drawables: Option<usize>,
}

impl SceneBuffer {
    /// Refuse insertions beyond `max` drawables, like a GPU running out of buffers.
    pub fn with_limit(max: usize) -> Self {
        Self {
            max_drawables: Some(max),
            ..Self::default()
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn last_camera(&self) -> Option<&Camera> {
        self.last_camera.as_ref()
    }
}

impl Renderer for SceneBuffer {
    type Scene = RecordedScene;

    fn create_scene(&mut self) -> RecordedScene {
        RecordedScene::default()
    }

    fn add_solid(
        &mut self,
        scene: &mut RecordedScene,
        drawable: Drawable,
        material: Material,
        shadows: ShadowFlags,
    ) -> PipelineResult<SolidHandle> {
        if let Some(max) = self.max_drawables {
            if scene.drawables.len() >= max {
                return Err(PipelineError::Renderer(format!("scene is full ({} drawables)", max)));
            }
        }

        let (kind, feature_id, geometry) = match drawable {
            Drawable::Building { feature_id, solid } => (
                DrawableKind::Building,
                Some(feature_id),
                solid.to_buffer_geometry(Some(material.color)),
            ),
            Drawable::Ground(plane) => (DrawableKind::Ground, None, plane.to_buffer_geometry()),
        };

        self.next_handle += 1;
        let handle = SolidHandle(self.next_handle);
        scene.drawables.push(RecordedDrawable {
            handle,
            kind,
            feature_id,
            geometry,
            material,
            shadows,
        });
        Ok(handle)
    }

    fn remove_solid(&mut self, scene: &mut RecordedScene, handle: SolidHandle) -> bool {
        let before = scene.drawables.len();
        scene.drawables.retain(|d| d.handle != handle);
        scene.drawables.len() != before
    }

    fn add_light(&mut self, scene: &mut RecordedScene, light: Light) {
        scene.lights.push(light);
    }

    fn render(&mut self, _scene: &RecordedScene, camera: &Camera) -> PipelineResult<()> {
        self.frames_rendered += 1;
        self.last_camera = Some(camera.clone());
        Ok(())
    }

    fn drawable_count(&self, scene: &RecordedScene) -> usize {
        scene.drawables.len()
    }
}
