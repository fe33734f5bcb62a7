use bevy::prelude::*;

mod point_cloud;

pub use point_cloud::GalaxyStats;

pub struct GraphicsPlugin;

impl Plugin for GraphicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(point_cloud::PointCloudPlugin);
    }
}
