mod galaxy_config;
mod generator;
mod regeneration;

pub use galaxy_config::{GalaxyConfig, GalaxyConfigPlugin, GalaxyParams, RegenerateGalaxy};
pub use generator::{generate, generate_parallel, GalaxyPointSet};
pub use regeneration::RegenerationQueue;
