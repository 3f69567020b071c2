//! 3D preview of the project's parts.
//!
//! [`Scene`] flattens the session into plain drawable data: per-part
//! positions, triangles, unique edges and colour, plus a camera fitted to the
//! first non-empty part. Drawing it needs the `visualization` feature, which
//! pulls in macroquad.

use crate::geom::Mesh;
use crate::project::Rgba;
use crate::project_file::RenderMode;
use crate::session::Session;


/// Camera distance in multiples of the fitted part's bounding diagonal.
pub const CAMERA_DISTANCE_FACTOR: f32 = 1.6;
/// Smallest extent the camera is fitted to.
const MIN_EXTENT: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct ScenePart {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub triangles: Vec<[usize; 3]>,
    pub edges: Vec<(usize, usize)>,
    pub color: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFit {
    pub target: [f32; 3],
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub parts: Vec<ScenePart>,
    pub camera: Option<CameraFit>,
    pub mode: RenderMode,
}

impl Scene {
    /// Parts in display order, coloured by material and selection.
    pub fn from_session(session: &Session) -> Self {
        let mode = session.settings.render_mode;
        let highlight = session.highlight();

        let parts: Vec<ScenePart> = session
            .display_parts()
            .into_iter()
            .filter(|p| !p.mesh.is_empty())
            .map(|p| ScenePart {
                name: p.name.clone(),
                positions: p
                    .mesh
                    .vertices
                    .iter()
                    .map(|v| [v.x as f32, v.y as f32, v.z as f32])
                    .collect(),
                triangles: p.mesh.faces.clone(),
                edges: p.mesh.edges_unique(),
                color: session.state.part_color(&p.name, mode, highlight),
            })
            .collect();

        let camera = session
            .display_parts()
            .into_iter()
            .find(|p| !p.mesh.is_empty())
            .and_then(|p| fit_camera(&p.mesh));

        Self {
            parts,
            camera,
            mode,
        }
    }
}

/// Looks at the centre of `mesh` from 1.6 bounding diagonals away.
pub fn fit_camera(mesh: &Mesh) -> Option<CameraFit> {
    let bounds = mesh.bounds()?;
    let center = bounds.center();
    Some(CameraFit {
        target: [center.x as f32, center.y as f32, center.z as f32],
        distance: (bounds.diagonal() as f32).max(MIN_EXTENT) * CAMERA_DISTANCE_FACTOR,
    })
}

#[cfg(feature = "visualization")]
pub use window::show;

#[cfg(feature = "visualization")]
mod window {
    use macroquad::models::{Mesh as DrawMesh, Vertex};
    use macroquad::prelude::*;

    use super::{Scene, ScenePart};
    use crate::project_file::RenderMode;

    /// Triangles per draw call; keeps vertex indices within u16.
    const TRIANGLES_PER_BATCH: usize = 20_000;
    const ORBIT_SPEED: f32 = 1.5;
    const ZOOM_STEP: f32 = 0.1;

    /// Opens a window showing `scene` and blocks until it is closed.
    /// Arrow keys orbit, the mouse wheel zooms, Escape closes.
    pub fn show(scene: Scene, title: &str) {
        let conf = Conf {
            window_title: title.to_string(),
            window_width: 1280,
            window_height: 800,
            window_resizable: true,
            high_dpi: true,
            sample_count: 4,
            ..Default::default()
        };
        macroquad::Window::from_config(conf, run(scene));
    }

    fn to_color(rgba: [f32; 4]) -> Color {
        Color::new(rgba[0], rgba[1], rgba[2], rgba[3])
    }

    fn position(part: &ScenePart, i: usize) -> Vec3 {
        let [x, y, z] = part.positions[i];
        vec3(x, y, z)
    }

    /// Flat-shaded triangle batches, one vertex triple per face.
    fn shaded_batches(part: &ScenePart) -> Vec<DrawMesh> {
        let light = vec3(0.3, 0.5, 0.8).normalize();
        let base = to_color(part.color);
        part.triangles
            .chunks(TRIANGLES_PER_BATCH)
            .map(|chunk| {
                let mut vertices = Vec::with_capacity(chunk.len() * 3);
                for &[a, b, c] in chunk {
                    let (pa, pb, pc) = (position(part, a), position(part, b), position(part, c));
                    let normal = (pb - pa).cross(pc - pa).normalize_or_zero();
                    let shade = 0.35 + 0.65 * normal.dot(light).abs();
                    let color = Color::new(base.r * shade, base.g * shade, base.b * shade, base.a);
                    for p in [pa, pb, pc] {
                        vertices.push(Vertex::new(p.x, p.y, p.z, 0.0, 0.0, color));
                    }
                }
                let indices = (0..vertices.len() as u16).collect();
                DrawMesh {
                    vertices,
                    indices,
                    texture: None,
                }
            })
            .collect()
    }

    async fn run(scene: Scene) {
        let (target, mut distance) = scene
            .camera
            .map(|c| (Vec3::from(c.target), c.distance))
            .unwrap_or((Vec3::ZERO, 10.0));
        let batches: Vec<Vec<DrawMesh>> = match scene.mode {
            RenderMode::Shaded => scene.parts.iter().map(shaded_batches).collect(),
            RenderMode::Wireframe => Vec::new(),
        };
        let (mut yaw, mut pitch) = (0.8f32, 0.5f32);

        loop {
            if is_key_pressed(KeyCode::Escape) {
                break;
            }
            let dt = get_frame_time();
            if is_key_down(KeyCode::Left) {
                yaw -= ORBIT_SPEED * dt;
            }
            if is_key_down(KeyCode::Right) {
                yaw += ORBIT_SPEED * dt;
            }
            if is_key_down(KeyCode::Up) {
                pitch = (pitch + ORBIT_SPEED * dt).min(1.5);
            }
            if is_key_down(KeyCode::Down) {
                pitch = (pitch - ORBIT_SPEED * dt).max(-1.5);
            }
            let (_, wheel) = mouse_wheel();
            if wheel != 0.0 {
                distance *= 1.0 - ZOOM_STEP * wheel.signum();
            }

            clear_background(BLACK);
            let eye = target
                + distance * vec3(pitch.cos() * yaw.cos(), pitch.sin(), pitch.cos() * yaw.sin());
            set_camera(&Camera3D {
                position: eye,
                target,
                up: Vec3::Y,
                ..Default::default()
            });

            match scene.mode {
                RenderMode::Shaded => {
                    for mesh in batches.iter().flatten() {
                        draw_mesh(mesh);
                    }
                }
                RenderMode::Wireframe => {
                    for part in &scene.parts {
                        let color = to_color(part.color);
                        for &(a, b) in &part.edges {
                            draw_line_3d(position(part, a), position(part, b), color);
                        }
                    }
                }
            }

            set_default_camera();
            draw_text(
                &format!("{} parts | arrows: orbit | wheel: zoom | esc: close", scene.parts.len()),
                10.0,
                24.0,
                22.0,
                WHITE,
            );
            next_frame().await
        }
    }
}
