use crate::genome::{Genome, MIN_RAY_RADIUS};
use crate::model::Tag;
use glam::{DQuat, DVec3};

/// Range multiplier of the extra forward ray.
pub const FORWARD_SIGHT_FACTOR: f64 = 1.5;

/// Closest object struck by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub tag: Tag,
    pub distance: f64,
}

/// Object found by an overlap query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub tag: Tag,
    pub position: DVec3,
}

/// Read-only queries an agent may issue against the world.
pub trait WorldQuery {
    /// Nearest object along `direction` within `max_distance`, if any.
    fn cast_ray(&self, origin: DVec3, direction: DVec3, max_distance: f64) -> Option<Hit>;

    /// Every object whose footprint intersects the sphere.
    fn overlap_sphere(&self, center: DVec3, radius: f64) -> Vec<Sighting>;
}

/// Outcome of a single ray of the fan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptionSample {
    /// Probe direction on the ground plane.
    pub direction: DVec3,
    /// Range the ray was cast with.
    pub range: f64,
    pub hit: Option<Hit>,
}

/// Project a heading onto the ground plane.
pub fn ground_forward(heading: DQuat) -> DVec3 {
    let forward = heading * DVec3::Z;
    DVec3::new(forward.x, 0.0, forward.z)
        .try_normalize()
        .unwrap_or(DVec3::Z)
}

/// Probe the world with a fan of rays centred on `forward`.
///
/// The fan has `ray_radius + 1` rays spaced by `360 / ray_radius` degrees,
/// symmetric about `forward`. One more ray is cast straight ahead with
/// `FORWARD_SIGHT_FACTOR` times the sight range, so the result always
/// holds `ray_radius + 2` samples.
pub fn sample_fan<W: WorldQuery + ?Sized>(
    world: &W,
    origin: DVec3,
    forward: DVec3,
    genome: &Genome,
) -> Vec<PerceptionSample> {
    let ray_radius = genome.ray_radius.max(MIN_RAY_RADIUS);
    let step = genome.step_degrees();
    let forward = DVec3::new(forward.x, 0.0, forward.z)
        .try_normalize()
        .unwrap_or(DVec3::Z);

    let step_rot = DQuat::from_rotation_y(step.to_radians());
    let mut ray_dir =
        DQuat::from_rotation_y((-step * ray_radius as f64 / 2.0).to_radians()) * forward;

    let mut samples = Vec::with_capacity(ray_radius as usize + 2);
    for _ in 0..=ray_radius {
        samples.push(sample_ray(world, origin, ray_dir, genome.sight_range));
        ray_dir = step_rot * ray_dir;
    }
    samples.push(sample_ray(
        world,
        origin,
        forward,
        genome.sight_range * FORWARD_SIGHT_FACTOR,
    ));

    samples
}

fn sample_ray<W: WorldQuery + ?Sized>(
    world: &W,
    origin: DVec3,
    direction: DVec3,
    range: f64,
) -> PerceptionSample {
    let direction = DVec3::new(direction.x, 0.0, direction.z);
    let hit = world
        .cast_ray(origin, direction, range)
        .filter(|hit| hit.distance <= range);
    PerceptionSample {
        direction,
        range,
        hit,
    }
}
