use super::GalaxyParams;
use bevy::color::Mix;
use bevy::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::f32::consts::TAU;

/// Points handled by one rayon job in [`generate_parallel`]. Also the unit each
/// chunk's random stream is keyed on, so changing it changes seeded output.
pub const PARALLEL_CHUNK: usize = 8192;

/// Randomness drawn by the generator.
///
/// Implemented for every [`Rng`], tests can implement it directly to feed
/// known branch positions.
pub trait StarRandom {
    /// Distance along a branch, uniform in `[0, radius]`.
    fn branch_progress(&mut self, radius: f32) -> f32;
    /// `pow(U(0, 1), power)` with a random sign.
    fn jitter(&mut self, power: f32) -> f32;
}

impl<R: Rng + ?Sized> StarRandom for R {
    fn branch_progress(&mut self, radius: f32) -> f32 {
        self.random::<f32>() * radius
    }

    fn jitter(&mut self, power: f32) -> f32 {
        let magnitude = self.random::<f32>().powf(power);
        if self.random_bool(0.5) {
            magnitude
        } else {
            -magnitude
        }
    }
}

/// Flat xyz / rgb buffers, three floats per point.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct GalaxyPointSet {
    pub positions: Vec<f32>,
    pub colors: Vec<f32>,
}

impl GalaxyPointSet {
    pub fn len(&self) -> usize {
        self.positions.len() / 3
    }

    #[cfg(test)]
    pub fn position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.positions[index * 3..index * 3 + 3])
    }

    #[cfg(test)]
    pub fn color(&self, index: usize) -> LinearRgba {
        let c = &self.colors[index * 3..index * 3 + 3];
        LinearRgba::rgb(c[0], c[1], c[2])
    }

    fn zeroed(count: usize) -> Self {
        Self {
            positions: vec![0.0; count * 3],
            colors: vec![0.0; count * 3],
        }
    }
}

/// Builds the whole galaxy from `params`, drawing every random value from `rng`.
///
/// Point `i` sits on branch `i % branches` at a random distance along it, pushed
/// off the ideal spiral by per-axis jitter that grows with that distance.
pub fn generate<R: StarRandom + ?Sized>(params: GalaxyParams, rng: &mut R) -> GalaxyPointSet {
    let mut set = GalaxyPointSet::zeroed(params.count as usize);

    for (i, (position, color)) in set
        .positions
        .chunks_exact_mut(3)
        .zip(set.colors.chunks_exact_mut(3))
        .enumerate()
    {
        write_point(&params, i, &mut *rng, position, color);
    }

    set
}

/// Same distribution as [`generate`], spread over the rayon pool.
///
/// Chunk `k` draws from a `ChaCha8Rng` seeded with `seed` on stream `k`, which
/// keeps the output identical for a given seed whatever the scheduling.
pub fn generate_parallel(params: GalaxyParams, seed: u64) -> GalaxyPointSet {
    let mut set = GalaxyPointSet::zeroed(params.count as usize);

    set.positions
        .par_chunks_mut(PARALLEL_CHUNK * 3)
        .zip(set.colors.par_chunks_mut(PARALLEL_CHUNK * 3))
        .enumerate()
        .for_each(|(chunk, (positions, colors))| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(chunk as u64);

            for (j, (position, color)) in positions
                .chunks_exact_mut(3)
                .zip(colors.chunks_exact_mut(3))
                .enumerate()
            {
                write_point(&params, chunk * PARALLEL_CHUNK + j, &mut rng, position, color);
            }
        });

    set
}

fn write_point<R: StarRandom + ?Sized>(
    params: &GalaxyParams,
    index: usize,
    rng: &mut R,
    position: &mut [f32],
    color: &mut [f32],
) {
    let branch_progress = rng.branch_progress(params.radius);
    let spin_angle = branch_progress * params.spin;

    let branches = params.branches.max(1) as usize;
    let branch_angle = (index % branches) as f32 / branches as f32 * TAU;

    let mut jitter = [0.0f32; 3];
    for axis in jitter.iter_mut() {
        *axis = rng.jitter(params.randomness_power) * params.randomness * branch_progress;
    }

    let angle = branch_angle + spin_angle;
    position[0] = angle.cos() * branch_progress + jitter[0];
    position[1] = jitter[1];
    position[2] = angle.sin() * branch_progress + jitter[2];

    let t = if params.radius > 0.0 {
        branch_progress / params.radius
    } else {
        0.0
    };
    let mixed = params.inside_color.mix(&params.outside_color, t);
    color.copy_from_slice(&[mixed.red, mixed.green, mixed.blue]);
}
