use glam::{DQuat, DVec3};

/// Motion capability of a simulated body.
///
/// The vertical velocity belongs to whoever integrates gravity, so only the
/// horizontal components can be written.
pub trait Kinematics {
    fn velocity(&self) -> DVec3;

    /// Overwrite the x and z components of the velocity, keeping y.
    fn set_horizontal_velocity(&mut self, x: f64, z: f64);

    fn heading(&self) -> DQuat;

    fn set_heading(&mut self, heading: DQuat);
}

/// Rotation about the vertical axis that looks along `direction`.
pub fn look_rotation(direction: DVec3) -> Option<DQuat> {
    let flat = DVec3::new(direction.x, 0.0, direction.z).try_normalize()?;
    Some(DQuat::from_rotation_y(flat.x.atan2(flat.z)))
}

/// Turn towards `direction` by `turn_rate` and move along it at `speed`.
///
/// `turn_rate` is applied once per tick regardless of the tick length.
pub fn steer<K: Kinematics + ?Sized>(body: &mut K, direction: DVec3, speed: f64, turn_rate: f64) {
    if let Some(target) = look_rotation(direction) {
        let heading = body.heading().slerp(target, turn_rate);
        body.set_heading(heading);
    }
    body.set_horizontal_velocity(direction.x * speed, direction.z * speed);
}

pub fn halt<K: Kinematics + ?Sized>(body: &mut K) {
    body.set_horizontal_velocity(0.0, 0.0);
}
