use crate::model::{Species, Tag};
use crate::motion::Kinematics;
use crate::perception::{Hit, Sighting, WorldQuery};
use anyhow::Result;
use glam::{DQuat, DVec2, DVec3};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;

/// Attempts made to find a free spot for each spawned object.
const SPAWN_ATTEMPTS: usize = 3;
/// Thickness of the boundary walls.
const WALL_THICKNESS: f64 = 1.0;

/// Axis-aligned rectangle on the ground plane, as `[x, z]` corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Area {
    pub fn square(half_size: f64) -> Self {
        Self {
            min: [-half_size, -half_size],
            max: [half_size, half_size],
        }
    }

    fn lo(&self) -> DVec2 {
        DVec2::from(self.min)
    }

    fn hi(&self) -> DVec2 {
        DVec2::from(self.max)
    }

    fn closest_point(&self, point: DVec2) -> DVec2 {
        point.clamp(self.lo(), self.hi())
    }

    fn overlaps_circle(&self, center: DVec2, radius: f64) -> bool {
        self.closest_point(center).distance_squared(center) < radius * radius
    }

    fn contains(&self, point: DVec2) -> bool {
        point.cmpge(self.lo()).all() && point.cmple(self.hi()).all()
    }

    /// Entry distance of a ray, or `None` if it misses or starts inside.
    fn ray_entry(&self, origin: DVec2, dir: DVec2) -> Option<f64> {
        if self.contains(origin) {
            return None;
        }
        let (lo, hi) = (self.lo(), self.hi());
        let mut t_min = 0.0_f64;
        let mut t_max = f64::INFINITY;
        for axis in 0..2 {
            if dir[axis].abs() < f64::EPSILON {
                if origin[axis] < lo[axis] || origin[axis] > hi[axis] {
                    return None;
                }
                continue;
            }
            let t_a = (lo[axis] - origin[axis]) / dir[axis];
            let t_b = (hi[axis] - origin[axis]) / dir[axis];
            t_min = t_min.max(t_a.min(t_b));
            t_max = t_max.min(t_a.max(t_b));
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<DVec2> {
        let x_dist = Uniform::new_inclusive(self.min[0], self.max[0])?;
        let z_dist = Uniform::new_inclusive(self.min[1], self.max[1])?;
        Ok(DVec2::new(x_dist.sample(rng), z_dist.sample(rng)))
    }
}

/// Circular patch of cover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bush {
    pub center: [f64; 2],
    pub radius: f64,
    /// Predator A bodies entering the bush reappear within this distance.
    pub teleport_range: f64,
}

impl Bush {
    fn center(&self) -> DVec2 {
        DVec2::from(self.center)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(u64);

/// Describes one group of objects that is cleared and respawned together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spawner {
    pub key: usize,
    pub species: Species,
    pub area: Area,
    pub radius: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    id: BodyId,
    species: Species,
    spawner: usize,
    position: DVec3,
    heading: DQuat,
    velocity: DVec3,
    radius: f64,
}

impl Body {
    pub fn position(&self) -> DVec3 {
        self.position
    }

    fn flat(&self) -> DVec2 {
        DVec2::new(self.position.x, self.position.z)
    }
}

impl Kinematics for Body {
    fn velocity(&self) -> DVec3 {
        self.velocity
    }

    fn set_horizontal_velocity(&mut self, x: f64, z: f64) {
        self.velocity.x = x;
        self.velocity.z = z;
    }

    fn heading(&self) -> DQuat {
        self.heading
    }

    fn set_heading(&mut self, heading: DQuat) {
        self.heading = heading;
    }
}

/// Two bodies touching each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub a: (BodyId, Species),
    pub b: (BodyId, Species),
}

/// Flat square world with walls, bushes and circular bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena {
    half_size: f64,
    walls: Vec<Area>,
    bushes: Vec<Bush>,
    bodies: BTreeMap<BodyId, Body>,
    next_id: u64,
}

impl Arena {
    /// Create an arena enclosed by boundary walls.
    pub fn new(half_size: f64, walls: &[Area], bushes: &[Bush]) -> Self {
        let (h, t) = (half_size, WALL_THICKNESS);
        let mut wall_vec = vec![
            Area {
                min: [-h - t, -h - t],
                max: [-h, h + t],
            },
            Area {
                min: [h, -h - t],
                max: [h + t, h + t],
            },
            Area {
                min: [-h, -h - t],
                max: [h, -h],
            },
            Area {
                min: [-h, h],
                max: [h, h + t],
            },
        ];
        wall_vec.extend_from_slice(walls);

        Self {
            half_size,
            walls: wall_vec,
            bushes: bushes.to_vec(),
            bodies: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(&id)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn count(&self, species: Species) -> usize {
        self.bodies
            .values()
            .filter(|body| body.species == species)
            .count()
    }

    pub fn despawn(&mut self, id: BodyId) -> bool {
        self.bodies.remove(&id).is_some()
    }

    /// Place a body directly, without any free-space check.
    #[cfg(test)]
    pub fn insert(&mut self, species: Species, position: DVec3, radius: f64) -> BodyId {
        self.insert_body(species, usize::MAX, position, DQuat::IDENTITY, radius)
    }

    fn insert_body(
        &mut self,
        species: Species,
        spawner: usize,
        position: DVec3,
        heading: DQuat,
        radius: f64,
    ) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        self.bodies.insert(
            id,
            Body {
                id,
                species,
                spawner,
                position,
                heading,
                velocity: DVec3::ZERO,
                radius,
            },
        );
        id
    }

    /// Clear everything the spawner placed before and place a fresh batch.
    ///
    /// Each object gets a few tries at a random spot that is clear of walls
    /// and bushes. Objects that find none are skipped.
    pub fn regenerate<R: Rng + ?Sized>(
        &mut self,
        spawner: &Spawner,
        rng: &mut R,
    ) -> Result<Vec<BodyId>> {
        self.bodies.retain(|_, body| body.spawner != spawner.key);

        let yaw_dist = Uniform::new(0.0, TAU)?;
        let mut id_vec = Vec::with_capacity(spawner.count);
        for _ in 0..spawner.count {
            for _ in 0..SPAWN_ATTEMPTS {
                let spot = spawner.area.sample(rng)?;
                let heading = DQuat::from_rotation_y(yaw_dist.sample(rng));
                if self.is_clear(spot, spawner.radius) {
                    let position = DVec3::new(spot.x, 0.0, spot.y);
                    id_vec.push(self.insert_body(
                        spawner.species,
                        spawner.key,
                        position,
                        heading,
                        spawner.radius,
                    ));
                    break;
                }
            }
        }

        if id_vec.len() < spawner.count {
            log::debug!(
                "spawned {} of {} {} bodies",
                id_vec.len(),
                spawner.count,
                spawner.species
            );
        }
        Ok(id_vec)
    }

    fn is_clear(&self, spot: DVec2, radius: f64) -> bool {
        let blocked_by_wall = self
            .walls
            .iter()
            .any(|wall| wall.overlaps_circle(spot, radius));
        let blocked_by_bush = self
            .bushes
            .iter()
            .any(|bush| bush.center().distance(spot) < bush.radius + radius);
        !blocked_by_wall && !blocked_by_bush
    }

    fn blocked(&self, spot: DVec2, radius: f64) -> bool {
        self.walls
            .iter()
            .any(|wall| wall.overlaps_circle(spot, radius))
    }

    /// Advance every body by its velocity.
    ///
    /// Horizontal moves into walls are cancelled axis by axis. The vertical
    /// component is carried as is.
    pub fn integrate(&mut self, dt: f64) {
        let ids: Vec<_> = self.bodies.keys().copied().collect();
        for id in ids {
            let Some(body) = self.bodies.get(&id) else {
                continue;
            };
            let (mut spot, radius, velocity) = (body.flat(), body.radius, body.velocity());

            let step_x = DVec2::new(spot.x + velocity.x * dt, spot.y);
            if !self.blocked(step_x, radius) {
                spot = step_x;
            }
            let step_z = DVec2::new(spot.x, spot.y + velocity.z * dt);
            if !self.blocked(step_z, radius) {
                spot = step_z;
            }
            let limit = (self.half_size - radius).max(0.0);
            spot = spot.clamp(DVec2::splat(-limit), DVec2::splat(limit));

            if let Some(body) = self.bodies.get_mut(&id) {
                body.position = DVec3::new(spot.x, body.position.y + velocity.y * dt, spot.y);
            }
        }
    }

    /// Move predator A bodies touching a bush to a random spot around it.
    pub fn apply_cover<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let limit = self.half_size;
        for bush in &self.bushes {
            let offset_dist = Uniform::new_inclusive(-bush.teleport_range, bush.teleport_range)?;
            for body in self.bodies.values_mut() {
                if body.species != Species::PredatorA
                    || body.flat().distance(bush.center()) >= bush.radius + body.radius
                {
                    continue;
                }
                let offset = DVec2::new(offset_dist.sample(rng), offset_dist.sample(rng));
                let edge = (limit - body.radius).max(0.0);
                let spot = (bush.center() + offset).clamp(DVec2::splat(-edge), DVec2::splat(edge));
                body.position = DVec3::new(spot.x, body.position.y, spot.y);
            }
        }
        Ok(())
    }

    /// Every pair of overlapping bodies that involves at least one predator.
    pub fn contacts(&self) -> Vec<Contact> {
        let body_vec: Vec<_> = self.bodies.values().collect();
        let mut contact_vec = Vec::new();
        for (i_body, a) in body_vec.iter().enumerate() {
            for b in &body_vec[i_body + 1..] {
                if a.species == Species::Prey && b.species == Species::Prey {
                    continue;
                }
                if a.flat().distance(b.flat()) < a.radius + b.radius {
                    contact_vec.push(Contact {
                        a: (a.id, a.species),
                        b: (b.id, b.species),
                    });
                }
            }
        }
        contact_vec
    }
}

impl WorldQuery for Arena {
    fn cast_ray(&self, origin: DVec3, direction: DVec3, max_distance: f64) -> Option<Hit> {
        let from = DVec2::new(origin.x, origin.z);
        let dir = DVec2::new(direction.x, direction.z).try_normalize()?;

        let bodies = self.bodies.values().filter_map(|body| {
            let distance = circle_entry(from, dir, body.flat(), body.radius)?;
            Some((distance, body.species.tag()))
        });
        let bushes = self.bushes.iter().filter_map(|bush| {
            let distance = circle_entry(from, dir, bush.center(), bush.radius)?;
            Some((distance, Tag::Cover))
        });
        let walls = self
            .walls
            .iter()
            .filter_map(|wall| Some((wall.ray_entry(from, dir)?, Tag::Obstacle)));

        bodies
            .chain(bushes)
            .chain(walls)
            .filter(|&(distance, _)| distance <= max_distance)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(distance, tag)| Hit { tag, distance })
    }

    fn overlap_sphere(&self, center: DVec3, radius: f64) -> Vec<Sighting> {
        let at = DVec2::new(center.x, center.z);
        let mut sighting_vec: Vec<_> = self
            .bodies
            .values()
            .filter(|body| body.flat().distance(at) <= radius + body.radius)
            .map(|body| Sighting {
                tag: body.species.tag(),
                position: body.position,
            })
            .collect();
        sighting_vec.extend(
            self.bushes
                .iter()
                .filter(|bush| bush.center().distance(at) <= radius + bush.radius)
                .map(|bush| Sighting {
                    tag: Tag::Cover,
                    position: DVec3::new(bush.center[0], 0.0, bush.center[1]),
                }),
        );
        sighting_vec.extend(
            self.walls
                .iter()
                .map(|wall| wall.closest_point(at))
                .filter(|point| point.distance(at) <= radius)
                .map(|point| Sighting {
                    tag: Tag::Obstacle,
                    position: DVec3::new(point.x, 0.0, point.y),
                }),
        );
        sighting_vec
    }
}

/// Entry distance of a ray into a circle, or `None` if it misses or starts inside.
fn circle_entry(origin: DVec2, dir: DVec2, center: DVec2, radius: f64) -> Option<f64> {
    let m = origin - center;
    let c = m.length_squared() - radius * radius;
    if c <= 0.0 {
        return None;
    }
    let b = m.dot(dir);
    if b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    Some(-b - disc.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn arena() -> Arena {
        Arena::new(
            20.0,
            &[Area {
                min: [5.0, -2.0],
                max: [6.0, 2.0],
            }],
            &[Bush {
                center: [-10.0, 0.0],
                radius: 2.0,
                teleport_range: 6.0,
            }],
        )
    }

    #[test]
    fn ray_reports_nearest_object() {
        let mut arena = arena();
        arena.insert(Species::Prey, DVec3::new(0.0, 0.0, 3.0), 0.5);
        arena.insert(Species::PredatorB, DVec3::new(0.0, 0.0, 8.0), 0.5);

        let hit = arena.cast_ray(DVec3::ZERO, DVec3::Z, 10.0).unwrap();
        assert_eq!(hit.tag, Tag::Prey);
        assert!((hit.distance - 2.5).abs() < 1e-12);

        let wall = arena.cast_ray(DVec3::ZERO, DVec3::X, 10.0).unwrap();
        assert_eq!(wall.tag, Tag::Obstacle);
        assert!((wall.distance - 5.0).abs() < 1e-12);

        let bush = arena.cast_ray(DVec3::ZERO, DVec3::NEG_X, 10.0).unwrap();
        assert_eq!(bush.tag, Tag::Cover);
        assert!((bush.distance - 8.0).abs() < 1e-12);

        assert_eq!(arena.cast_ray(DVec3::ZERO, DVec3::NEG_Z, 10.0), None);
    }

    #[test]
    fn ray_respects_range_and_ignores_own_body() {
        let mut arena = arena();
        arena.insert(Species::PredatorA, DVec3::ZERO, 0.5);
        arena.insert(Species::Prey, DVec3::new(0.0, 0.0, 9.0), 0.5);
        assert_eq!(arena.cast_ray(DVec3::ZERO, DVec3::Z, 8.0), None);
        assert_eq!(
            arena.cast_ray(DVec3::ZERO, DVec3::Z, 9.0).map(|hit| hit.tag),
            Some(Tag::Prey)
        );
    }

    #[test]
    fn overlap_finds_nearby_bodies() {
        let mut arena = arena();
        arena.insert(Species::PredatorB, DVec3::new(0.0, 0.0, -2.5), 0.5);
        arena.insert(Species::PredatorB, DVec3::new(0.0, 0.0, -7.0), 0.5);
        let tags: Vec<_> = arena
            .overlap_sphere(DVec3::ZERO, 4.5)
            .iter()
            .map(|sighting| sighting.tag)
            .collect();
        assert_eq!(tags, [Tag::PredatorB]);
    }

    #[test]
    fn regenerate_replaces_previous_batch() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let mut arena = arena();
        let spawner = Spawner {
            key: 0,
            species: Species::Prey,
            area: Area::square(15.0),
            radius: 0.3,
            count: 25,
        };
        let first = arena.regenerate(&spawner, &mut rng).unwrap();
        assert!(!first.is_empty());
        assert_eq!(arena.count(Species::Prey), first.len());

        let second = arena.regenerate(&spawner, &mut rng).unwrap();
        assert_eq!(arena.count(Species::Prey), second.len());
        assert!(first.iter().all(|&id| !arena.contains(id)));

        for id in second {
            let spot = arena.body(id).unwrap().flat();
            assert!(arena.is_clear(spot, 0.3));
        }
    }

    #[test]
    fn walls_block_motion() {
        let mut arena = arena();
        let id = arena.insert(Species::PredatorA, DVec3::new(4.0, 0.0, 0.0), 0.5);
        arena.body_mut(id).unwrap().set_horizontal_velocity(10.0, 0.0);
        arena.integrate(0.1);
        assert_eq!(arena.body(id).unwrap().position(), DVec3::new(4.0, 0.0, 0.0));

        arena.body_mut(id).unwrap().set_horizontal_velocity(0.0, 10.0);
        arena.integrate(0.1);
        assert_eq!(arena.body(id).unwrap().position(), DVec3::new(4.0, 0.0, 1.0));
    }

    #[test]
    fn bodies_stay_inside_boundary() {
        let mut arena = arena();
        let id = arena.insert(Species::PredatorB, DVec3::new(0.0, 0.0, 19.0), 0.5);
        arena.body_mut(id).unwrap().set_horizontal_velocity(0.0, 100.0);
        for _ in 0..10 {
            arena.integrate(0.1);
        }
        assert!(arena.body(id).unwrap().position().z <= 19.5);
    }

    #[test]
    fn contacts_skip_prey_pairs() {
        let mut arena = arena();
        let prey_a = arena.insert(Species::Prey, DVec3::new(0.0, 0.0, 0.0), 0.5);
        arena.insert(Species::Prey, DVec3::new(0.5, 0.0, 0.0), 0.5);
        let hunter = arena.insert(Species::PredatorA, DVec3::new(0.0, 0.0, -0.8), 0.5);
        arena.insert(Species::PredatorB, DVec3::new(12.0, 0.0, 12.0), 0.5);

        let contacts = arena.contacts();
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().all(|c| c.b.0 == hunter));
        assert!(contacts.iter().any(|c| c.a.0 == prey_a));
    }

    #[test]
    fn cover_teleports_predator_a_only() {
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let mut arena = arena();
        let sneaky = arena.insert(Species::PredatorA, DVec3::new(-10.0, 0.0, 1.0), 0.5);
        let brute = arena.insert(Species::PredatorB, DVec3::new(-10.0, 0.0, -1.0), 0.5);
        arena.apply_cover(&mut rng).unwrap();

        let moved = arena.body(sneaky).unwrap().position();
        assert!((moved.x + 10.0).abs() <= 6.0 && moved.z.abs() <= 6.0);
        assert_ne!(moved, DVec3::new(-10.0, 0.0, 1.0));
        assert_eq!(arena.body(brute).unwrap().position(), DVec3::new(-10.0, 0.0, -1.0));
    }
}
