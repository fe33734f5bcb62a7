use bevy::{
    input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel},
    prelude::*,
};
use bevy_egui::EguiContexts;
use std::f32::consts::FRAC_PI_2;

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_camera)
            .add_systems(PostUpdate, camera_control_system);
    }
}

const MIN_DISTANCE: f32 = 0.5;
const MAX_DISTANCE: f32 = 60.0;

fn spawn_camera(mut commands: Commands, mut clearcolor: ResMut<ClearColor>) {
    *clearcolor = ClearColor(Color::BLACK);
    let camera_main = CameraMain::default();
    commands.spawn((
        Camera3d::default(),
        Transform::from_translation(camera_main.translation()).looking_at(Vec3::ZERO, Vec3::Y),
        camera_main,
    ));
}

/// Orbits the galaxy center.
#[derive(Component, Clone)]
pub struct CameraMain {
    yaw: f32,
    pitch: f32,
    distance: f32,
    smooth_zoom_buffer: f32,
}

impl Default for CameraMain {
    // looking at the origin from (3, 3, 3)
    fn default() -> Self {
        Self {
            yaw: std::f32::consts::FRAC_PI_4,
            pitch: (1.0f32 / 3.0).sqrt().asin(),
            distance: 27.0f32.sqrt(),
            smooth_zoom_buffer: 0.0,
        }
    }
}

impl CameraMain {
    fn translation(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        vec3(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch) * self.distance
    }

    /// Moves part of the buffered scroll into the distance, for a smooth zoom.
    fn apply_zoom_step(&mut self) {
        let smooth_zoom_min = 0.001f32;
        let smooth_zoom_factor = 0.2f32;

        let amount = if self.smooth_zoom_buffer < 0.0 {
            f32::min(
                self.smooth_zoom_buffer * smooth_zoom_factor,
                (-smooth_zoom_min).max(self.smooth_zoom_buffer),
            )
        } else {
            f32::max(
                self.smooth_zoom_buffer * smooth_zoom_factor,
                smooth_zoom_min.min(self.smooth_zoom_buffer),
            )
        };
        self.distance = (self.distance * (1.0 - amount)).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.smooth_zoom_buffer -= amount;
    }
}

pub fn camera_control_system(
    mut query: Query<(&mut Transform, &mut CameraMain)>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mut motion_evr: EventReader<MouseMotion>,
    mut scroll_evr: EventReader<MouseWheel>,
    mut contexts: EguiContexts,
) {
    let Ok((mut transform, mut camera_main)) = query.single_mut() else {
        return;
    };

    // the panel keeps the pointer while it is being used
    let panel_has_pointer = contexts
        .try_ctx_mut()
        .is_some_and(|ctx| ctx.wants_pointer_input() || ctx.is_pointer_over_area());

    let motion: Vec2 = motion_evr.read().map(|ev| ev.delta).sum();
    if !panel_has_pointer && mouse_buttons.pressed(MouseButton::Left) {
        camera_main.yaw -= motion.x * 0.005;
        camera_main.pitch =
            (camera_main.pitch + motion.y * 0.005).clamp(-FRAC_PI_2 + 0.01, FRAC_PI_2 - 0.01);
    }

    for ev in scroll_evr.read() {
        if panel_has_pointer {
            continue;
        }
        match ev.unit {
            MouseScrollUnit::Line => {
                camera_main.smooth_zoom_buffer += ev.y * 0.05;
            }
            MouseScrollUnit::Pixel => {
                camera_main.smooth_zoom_buffer += ev.y * 0.005;
            }
        }
    }
    camera_main.apply_zoom_step();

    transform.translation = camera_main.translation();
    transform.look_at(Vec3::ZERO, Vec3::Y);
}
