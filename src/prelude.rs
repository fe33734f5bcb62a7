pub use crate::galaxy::{GalaxyConfig, GalaxyParams, GalaxyPointSet, RegenerateGalaxy};
pub use crate::graphics::GalaxyStats;
