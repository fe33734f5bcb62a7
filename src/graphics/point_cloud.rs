use crate::galaxy::{generate, generate_parallel, RegenerationQueue};
use crate::prelude::*;
use bevy::{
    pbr::{MaterialPipeline, MaterialPipelineKey, NotShadowCaster},
    prelude::*,
    reflect::TypePath,
    render::{
        mesh::{Indices, MeshVertexBufferLayoutRef, PrimitiveTopology},
        render_asset::RenderAssetUsages,
        render_resource::{
            AsBindGroup, RenderPipelineDescriptor, ShaderRef, SpecializedMeshPipelineError,
        },
        view::NoFrustumCulling,
    },
    platform::time::Instant,
    tasks::{block_on, futures_lite::future, AsyncComputeTaskPool, Task},
};
use std::time::Duration;

const SHADER_ASSET_PATH: &str = "shaders/galaxy_points.wgsl";

/// Above this many points generation is split across the rayon pool.
const PARALLEL_THRESHOLD: u32 = 50_000;

/// Billboard corners, one quad per point. The vertex shader expands them in view space.
const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

pub struct PointCloudPlugin;

impl Plugin for PointCloudPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(MaterialPlugin::<GalaxyPointMaterial>::default());
        add_regeneration(app);
    }
}

/// Request queue, background generation and install. Needs `Assets<Mesh>`,
/// `Assets<GalaxyPointMaterial>` and the `RegenerateGalaxy` event.
fn add_regeneration(app: &mut App) {
    app.init_resource::<Regeneration>()
        .init_resource::<GalaxyStats>()
        .add_systems(
            Update,
            (queue_requests, start_generation, install_generated).chain(),
        );
}

/// What the panel shows about the installed galaxy.
#[derive(Resource, Default, Debug)]
pub struct GalaxyStats {
    pub points: usize,
    pub last_generation: Duration,
    pub superseded: u32,
    pub generating: bool,
}

#[derive(Resource, Default)]
struct Regeneration {
    queue: RegenerationQueue,
    task: Option<Task<GeneratedGalaxy>>,
}

struct GeneratedGalaxy {
    params: GalaxyParams,
    points: GalaxyPointSet,
    elapsed: Duration,
}

/// The one rendered galaxy. Its mesh asset is rewritten on every regeneration.
#[derive(Resource)]
struct GalaxyPointCloud {
    entity: Entity,
    mesh: Handle<Mesh>,
    material: Handle<GalaxyPointMaterial>,
}

#[derive(Component)]
pub struct GalaxyPointsMarker;

fn queue_requests(
    mut events: EventReader<RegenerateGalaxy>,
    mut regeneration: ResMut<Regeneration>,
    mut stats: ResMut<GalaxyStats>,
) {
    if events.is_empty() {
        return;
    }
    for RegenerateGalaxy(params) in events.read() {
        let superseded = regeneration.queue.superseded();
        regeneration.queue.request(*params);
        if regeneration.queue.superseded() != superseded {
            debug!("Dropped stale galaxy request in favour of a newer one");
        }
        debug!("Galaxy regeneration requested ({} points)", params.count);
    }
    stats.superseded = regeneration.queue.superseded();
}

fn start_generation(mut regeneration: ResMut<Regeneration>, mut stats: ResMut<GalaxyStats>) {
    let Some(requested) = regeneration.queue.start_next() else {
        return;
    };

    let params = match requested.validate() {
        Ok(()) => requested,
        Err(err) => {
            warn!("Galaxy parameters out of range ({err}), clamping");
            requested.clamped()
        }
    };

    let pool = AsyncComputeTaskPool::get();
    regeneration.task = Some(pool.spawn(async move { generate_galaxy(params) }));
    stats.generating = regeneration.queue.is_in_flight();
}

fn generate_galaxy(params: GalaxyParams) -> GeneratedGalaxy {
    let start = Instant::now();
    let points = if params.count >= PARALLEL_THRESHOLD {
        generate_parallel(params, rand::random())
    } else {
        generate(params, &mut rand::rng())
    };

    GeneratedGalaxy {
        params,
        points,
        elapsed: start.elapsed(),
    }
}

fn install_generated(
    mut commands: Commands,
    mut regeneration: ResMut<Regeneration>,
    point_cloud: Option<ResMut<GalaxyPointCloud>>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<GalaxyPointMaterial>>,
    mut stats: ResMut<GalaxyStats>,
) {
    let Some(task) = regeneration.task.as_mut() else {
        return;
    };
    let Some(generated) = block_on(future::poll_once(task)) else {
        return;
    };
    regeneration.task = None;
    regeneration.queue.finish();
    if regeneration.queue.has_pending() {
        debug!("Newer galaxy request waiting, starting it next frame");
    }

    match point_cloud {
        Some(mut cloud) => {
            if !install(&mut meshes, &cloud.mesh, &generated.points) {
                warn!("Galaxy mesh asset missing, adding a new one");
                cloud.mesh = meshes.add(build_point_mesh(&generated.points));
                commands
                    .entity(cloud.entity)
                    .try_insert(Mesh3d(cloud.mesh.clone()));
            }
            if let Some(material) = materials.get_mut(&cloud.material) {
                material.point_size = generated.params.size;
            }
        }
        None => {
            let mesh = meshes.add(build_point_mesh(&generated.points));
            let material = materials.add(GalaxyPointMaterial::new(generated.params.size));
            let entity = commands
                .spawn((
                    Mesh3d(mesh.clone()),
                    MeshMaterial3d(material.clone()),
                    Transform::IDENTITY,
                    NoFrustumCulling,
                    NotShadowCaster,
                    GalaxyPointsMarker,
                ))
                .id();
            commands.insert_resource(GalaxyPointCloud {
                entity,
                mesh,
                material,
            });
        }
    }

    info!(
        "Installed galaxy: {} points in {:.1} ms",
        generated.points.len(),
        generated.elapsed.as_secs_f32() * 1000.0
    );
    stats.points = generated.points.len();
    stats.last_generation = generated.elapsed;
    stats.generating = false;
}

/// Replaces the mesh behind `handle` with one built from `points`.
///
/// The old vertex data is dropped by the assignment, so the render world only
/// ever extracts a complete old or a complete new galaxy.
fn install(meshes: &mut Assets<Mesh>, handle: &Handle<Mesh>, points: &GalaxyPointSet) -> bool {
    let Some(mesh) = meshes.get_mut(handle) else {
        return false;
    };
    *mesh = build_point_mesh(points);
    true
}

/// Four vertices per point, each carrying the point's center, its corner and its color.
pub fn build_point_mesh(points: &GalaxyPointSet) -> Mesh {
    let centers: &[[f32; 3]] = bytemuck::cast_slice(&points.positions);
    let colors: &[[f32; 3]] = bytemuck::cast_slice(&points.colors);

    let vertex_count = centers.len() * CORNERS.len();
    let mut positions = Vec::with_capacity(vertex_count);
    let mut corners = Vec::with_capacity(vertex_count);
    let mut vertex_colors = Vec::with_capacity(vertex_count);
    let mut indices = Vec::with_capacity(centers.len() * 6);

    for (i, (center, color)) in centers.iter().zip(colors).enumerate() {
        let base = (i * CORNERS.len()) as u32;
        for corner in CORNERS {
            positions.push(*center);
            corners.push(corner);
            vertex_colors.push([color[0], color[1], color[2], 1.0]);
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, corners)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, vertex_colors)
        .with_inserted_indices(Indices::U32(indices))
}

#[derive(Asset, TypePath, AsBindGroup, Debug, Clone)]
pub struct GalaxyPointMaterial {
    #[uniform(0)]
    point_size: f32,
    alpha_mode: AlphaMode,
}

impl GalaxyPointMaterial {
    fn new(point_size: f32) -> Self {
        Self {
            point_size,
            alpha_mode: AlphaMode::Add,
        }
    }
}

impl Material for GalaxyPointMaterial {
    fn vertex_shader() -> ShaderRef {
        SHADER_ASSET_PATH.into()
    }

    fn fragment_shader() -> ShaderRef {
        SHADER_ASSET_PATH.into()
    }

    fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        layout: &MeshVertexBufferLayoutRef,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        let vertex_layout = layout.0.get_layout(&[
            Mesh::ATTRIBUTE_POSITION.at_shader_location(0),
            Mesh::ATTRIBUTE_UV_0.at_shader_location(1),
            Mesh::ATTRIBUTE_COLOR.at_shader_location(2),
        ])?;
        descriptor.vertex.buffers = vec![vertex_layout];
        descriptor.primitive.cull_mode = None;
        // additive points must not occlude each other
        if let Some(depth_stencil) = descriptor.depth_stencil.as_mut() {
            depth_stencil.depth_write_enabled = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::VertexAttributeValues;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn points(count: u32) -> GalaxyPointSet {
        let params = GalaxyParams {
            count,
            ..default()
        };
        generate(params, &mut ChaCha8Rng::seed_from_u64(count as u64))
    }

    #[test]
    fn mesh_has_a_quad_per_point() {
        let set = points(250);
        let mesh = build_point_mesh(&set);

        assert_eq!(mesh.count_vertices(), 250 * 4);
        assert_eq!(mesh.indices().map(Indices::len), Some(250 * 6));
    }

    #[test]
    fn quad_vertices_share_the_point_data() {
        let set = points(120);
        let mesh = build_point_mesh(&set);

        let Some(VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            panic!("positions missing");
        };
        let Some(VertexAttributeValues::Float32x4(colors)) = mesh.attribute(Mesh::ATTRIBUTE_COLOR)
        else {
            panic!("colors missing");
        };

        for i in 0..set.len() {
            let center = set.position(i).to_array();
            let color = set.color(i);
            for v in i * 4..i * 4 + 4 {
                assert_eq!(positions[v], center);
                assert_eq!(colors[v], [color.red, color.green, color.blue, 1.0]);
            }
        }
    }

    #[test]
    fn indices_stay_inside_their_quad() {
        let mesh = build_point_mesh(&points(100));
        let Some(Indices::U32(indices)) = mesh.indices() else {
            panic!("expected u32 indices");
        };

        for (quad, triangles) in indices.chunks_exact(6).enumerate() {
            let base = quad as u32 * 4;
            assert!(triangles.iter().all(|i| (base..base + 4).contains(i)));
        }
    }

    #[test]
    fn install_swaps_the_mesh_in_place() {
        let mut meshes = Assets::<Mesh>::default();
        let handle = meshes.add(build_point_mesh(&points(100)));

        assert!(install(&mut meshes, &handle, &points(300)));
        assert_eq!(meshes.len(), 1);
        assert_eq!(
            meshes.get(&handle).map(Mesh::count_vertices),
            Some(300 * 4)
        );
    }

    #[test]
    fn install_reports_a_missing_mesh() {
        let mut meshes = Assets::<Mesh>::default();
        let handle = meshes.add(build_point_mesh(&points(100)));
        meshes.remove(&handle);

        assert!(!install(&mut meshes, &handle, &points(100)));
    }

    #[test]
    fn small_galaxies_take_the_sequential_path() {
        let generated = generate_galaxy(GalaxyParams {
            count: 500,
            ..default()
        });
        assert_eq!(generated.points.len(), 500);
        assert_eq!(generated.params.count, 500);
    }

    #[test]
    fn large_galaxies_take_the_parallel_path() {
        let generated = generate_galaxy(GalaxyParams {
            count: PARALLEL_THRESHOLD + 1,
            ..default()
        });
        assert_eq!(generated.points.len(), PARALLEL_THRESHOLD as usize + 1);
    }

    fn regeneration_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_asset::<GalaxyPointMaterial>()
            .add_event::<RegenerateGalaxy>();
        add_regeneration(&mut app);
        app
    }

    fn request(app: &mut App, count: u32) {
        app.world_mut().send_event(RegenerateGalaxy(GalaxyParams {
            count,
            ..default()
        }));
    }

    /// Runs frames until nothing is queued, generating or waiting to be installed.
    fn settle(app: &mut App) {
        for _ in 0..5000 {
            app.update();
            let regeneration = app.world().resource::<Regeneration>();
            if regeneration.task.is_none()
                && !regeneration.queue.is_in_flight()
                && !regeneration.queue.has_pending()
            {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("galaxy generation did not finish");
    }

    fn installed_vertices(app: &App) -> Option<usize> {
        let cloud = app.world().resource::<GalaxyPointCloud>();
        app.world()
            .resource::<Assets<Mesh>>()
            .get(&cloud.mesh)
            .map(Mesh::count_vertices)
    }

    fn marker_count(app: &mut App) -> usize {
        let mut markers = app
            .world_mut()
            .query_filtered::<Entity, With<GalaxyPointsMarker>>();
        markers.iter(app.world()).count()
    }

    #[test]
    fn out_of_range_request_installs_the_clamped_galaxy() {
        let mut app = regeneration_app();
        app.world_mut().send_event(RegenerateGalaxy(GalaxyParams {
            count: 10,
            size: 4.0,
            ..default()
        }));
        settle(&mut app);

        let stats = app.world().resource::<GalaxyStats>();
        assert_eq!(stats.points, 100);
        assert!(!stats.generating);
        assert_eq!(installed_vertices(&app), Some(100 * 4));

        let cloud = app.world().resource::<GalaxyPointCloud>();
        let material = app
            .world()
            .resource::<Assets<GalaxyPointMaterial>>()
            .get(&cloud.material)
            .map(|material| material.point_size);
        assert_eq!(material, Some(GalaxyParams::MAX.size));
    }

    #[test]
    fn second_install_rewrites_the_same_mesh() {
        let mut app = regeneration_app();
        request(&mut app, 200);
        settle(&mut app);
        let first = app.world().resource::<GalaxyPointCloud>().mesh.clone();

        request(&mut app, 300);
        settle(&mut app);

        let cloud = app.world().resource::<GalaxyPointCloud>();
        assert_eq!(cloud.mesh, first);
        assert_eq!(app.world().resource::<Assets<Mesh>>().len(), 1);
        assert_eq!(installed_vertices(&app), Some(300 * 4));
        assert_eq!(app.world().resource::<GalaxyStats>().points, 300);
        assert_eq!(marker_count(&mut app), 1);
    }

    #[test]
    fn burst_of_requests_builds_only_the_newest() {
        let mut app = regeneration_app();
        request(&mut app, 100);
        request(&mut app, 200);
        request(&mut app, 300);
        settle(&mut app);

        let stats = app.world().resource::<GalaxyStats>();
        assert_eq!(stats.superseded, 2);
        assert_eq!(stats.points, 300);
        assert_eq!(marker_count(&mut app), 1);
    }

    #[test]
    fn missing_mesh_is_added_again() {
        let mut app = regeneration_app();
        request(&mut app, 200);
        settle(&mut app);
        let lost = app.world().resource::<GalaxyPointCloud>().mesh.clone();
        app.world_mut().resource_mut::<Assets<Mesh>>().remove(&lost);

        request(&mut app, 300);
        settle(&mut app);

        assert!(!app.world().resource::<GalaxyStats>().generating);
        assert_eq!(installed_vertices(&app), Some(300 * 4));

        let cloud = app.world().resource::<GalaxyPointCloud>();
        assert_ne!(cloud.mesh, lost);
        let shown = app.world().get::<Mesh3d>(cloud.entity).map(|mesh| mesh.0.clone());
        assert_eq!(shown, Some(cloud.mesh.clone()));
        assert_eq!(marker_count(&mut app), 1);
    }
}
