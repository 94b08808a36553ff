//! Attack Cast / Targeting Resolver
//!
//! Geometric targeting volumes (sphere or box) evaluated against the actors'
//! colliders. These are pure queries: evaluating a cast never mutates
//! anything. Consumers apply their own post-filters (caster exclusion,
//! single vs. multi target, hit caps).
//!
//! The collider model is deliberately thin - every actor is a sphere on a
//! collision layer - because the simulation only ever needs "which actors
//! overlap this volume" and "what does this ray hit first".

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Collision layer bits.
pub mod layers {
    pub const PLAYER: u32 = 1 << 0;
    pub const MOB: u32 = 1 << 1;
}

/// Sphere collider on a collision layer. The only physics shape actors need.
#[derive(Component, Debug, Clone, Copy)]
pub struct Collider {
    pub radius: f32,
    pub layers: u32,
}

/// The shape of a targeting volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CastShape {
    Sphere { radius: f32 },
    Box { half_extents: [f32; 3] },
}

/// A targeting volume: shape plus an offset from the origin transform and a
/// layer filter. Stateless; shared read-only between evaluations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackCast {
    pub shape: CastShape,
    /// Offset from the origin transform, rotated by the origin's rotation.
    #[serde(default)]
    pub offset: [f32; 3],
    /// Collision layers the cast detects.
    pub layer_mask: u32,
}

/// A detected collider: the entity and its position at evaluation time.
pub type Detection = (Entity, Vec3);

impl AttackCast {
    fn center(&self, origin_pos: Vec3, origin_rot: Quat) -> Vec3 {
        origin_pos + origin_rot * Vec3::from(self.offset)
    }

    fn overlaps(&self, center: Vec3, origin_rot: Quat, pos: Vec3, radius: f32) -> bool {
        match self.shape {
            CastShape::Sphere { radius: cast_radius } => {
                pos.distance(center) <= cast_radius + radius
            }
            CastShape::Box { half_extents } => {
                // Test in the box's local space, inflating it by the target
                // radius per axis.
                let local = origin_rot.inverse() * (pos - center);
                let he = Vec3::from(half_extents);
                local.x.abs() <= he.x + radius
                    && local.y.abs() <= he.y + radius
                    && local.z.abs() <= he.z + radius
            }
        }
    }

    /// Evaluate the volume at `origin_pos`/`origin_rot` against the given
    /// colliders, returning every overlapping entity on a matching layer.
    pub fn detect_objects<'a>(
        &self,
        origin_pos: Vec3,
        origin_rot: Quat,
        colliders: impl Iterator<Item = (Entity, Vec3, &'a Collider)>,
    ) -> SmallVec<[Detection; 8]> {
        let center = self.center(origin_pos, origin_rot);
        let mut detected = SmallVec::new();
        for (entity, pos, collider) in colliders {
            if collider.layers & self.layer_mask == 0 {
                continue;
            }
            if self.overlaps(center, origin_rot, pos, collider.radius) {
                detected.push((entity, pos));
            }
        }
        detected
    }

    /// Per-frame contact check during projectile flight: the first valid
    /// collider overlapping the volume, excluding the launcher.
    pub fn check_contact<'a>(
        &self,
        origin_pos: Vec3,
        origin_rot: Quat,
        launcher: Entity,
        colliders: impl Iterator<Item = (Entity, Vec3, &'a Collider)>,
    ) -> Option<Detection> {
        self.detect_objects(origin_pos, origin_rot, colliders)
            .into_iter()
            .find(|(entity, _)| *entity != launcher)
    }
}

/// Result of a raycast against the actor colliders or the ground plane.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    /// Hit actor, if the ray struck a collider rather than the ground.
    pub entity: Option<Entity>,
    /// World-space hit point.
    pub point: Vec3,
}

/// Cast a ray against actor colliders (nearest hit on a matching layer),
/// falling back to the ground plane (y = 0). Used by the confirmation-click
/// flow to turn a screen click into a world target.
pub fn raycast<'a>(
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    layer_mask: u32,
    colliders: impl Iterator<Item = (Entity, Vec3, &'a Collider)>,
) -> Option<RayHit> {
    let dir = direction.normalize_or_zero();
    if dir == Vec3::ZERO {
        return None;
    }

    let mut nearest: Option<(f32, Entity, Vec3)> = None;
    for (entity, pos, collider) in colliders {
        if collider.layers & layer_mask == 0 {
            continue;
        }
        // Ray vs sphere: project the center onto the ray and compare the
        // perpendicular distance against the radius.
        let to_center = pos - origin;
        let along = to_center.dot(dir);
        if along < 0.0 || along > max_distance {
            continue;
        }
        let perp_sq = to_center.length_squared() - along * along;
        let radius_sq = collider.radius * collider.radius;
        if perp_sq > radius_sq {
            continue;
        }
        let t = along - (radius_sq - perp_sq).sqrt();
        let t = t.max(0.0);
        if nearest.map_or(true, |(best, _, _)| t < best) {
            nearest = Some((t, entity, origin + dir * t));
        }
    }
    if let Some((_, entity, point)) = nearest {
        return Some(RayHit {
            entity: Some(entity),
            point,
        });
    }

    // Ground plane fallback.
    if dir.y.abs() > 1e-6 {
        let t = -origin.y / dir.y;
        if t >= 0.0 && t <= max_distance {
            return Some(RayHit {
                entity: None,
                point: origin + dir * t,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collider(radius: f32, layer: u32) -> Collider {
        Collider {
            radius,
            layers: layer,
        }
    }

    #[test]
    fn sphere_cast_detects_overlapping_colliders() {
        let cast = AttackCast {
            shape: CastShape::Sphere { radius: 2.0 },
            offset: [0.0, 0.0, 0.0],
            layer_mask: layers::MOB,
        };
        let near = collider(0.5, layers::MOB);
        let far = collider(0.5, layers::MOB);
        let colliders = vec![
            (Entity::from_raw(1), Vec3::new(1.5, 0.0, 0.0), &near),
            (Entity::from_raw(2), Vec3::new(5.0, 0.0, 0.0), &far),
        ];
        let hits = cast.detect_objects(Vec3::ZERO, Quat::IDENTITY, colliders.into_iter());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, Entity::from_raw(1));
    }

    #[test]
    fn layer_mask_filters_detections() {
        let cast = AttackCast {
            shape: CastShape::Sphere { radius: 3.0 },
            offset: [0.0, 0.0, 0.0],
            layer_mask: layers::MOB,
        };
        let player = collider(0.5, layers::PLAYER);
        let colliders = vec![(Entity::from_raw(1), Vec3::ZERO, &player)];
        let hits = cast.detect_objects(Vec3::ZERO, Quat::IDENTITY, colliders.into_iter());
        assert!(hits.is_empty());
    }

    #[test]
    fn box_cast_respects_origin_rotation() {
        // A long thin box pointing +X, rotated 90 degrees around Y so it
        // points +Z (-Z forward convention aside, pure math here).
        let cast = AttackCast {
            shape: CastShape::Box {
                half_extents: [4.0, 1.0, 0.5],
            },
            offset: [0.0, 0.0, 0.0],
            layer_mask: layers::MOB,
        };
        let target = collider(0.1, layers::MOB);
        let rot = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);

        // On the rotated long axis: detected.
        let on_axis = vec![(Entity::from_raw(1), Vec3::new(0.0, 0.0, -3.5), &target)];
        assert_eq!(
            cast.detect_objects(Vec3::ZERO, rot, on_axis.into_iter()).len(),
            1
        );

        // Where the unrotated long axis used to be: not detected.
        let off_axis = vec![(Entity::from_raw(2), Vec3::new(3.5, 0.0, 0.0), &target)];
        assert!(cast
            .detect_objects(Vec3::ZERO, rot, off_axis.into_iter())
            .is_empty());
    }

    #[test]
    fn offset_moves_the_volume() {
        let cast = AttackCast {
            shape: CastShape::Sphere { radius: 1.0 },
            offset: [0.0, 0.0, 5.0],
            layer_mask: layers::MOB,
        };
        let target = collider(0.2, layers::MOB);
        let colliders = vec![(Entity::from_raw(1), Vec3::new(0.0, 0.0, 5.0), &target)];
        let hits = cast.detect_objects(Vec3::ZERO, Quat::IDENTITY, colliders.into_iter());
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn contact_check_skips_launcher() {
        let cast = AttackCast {
            shape: CastShape::Sphere { radius: 1.0 },
            offset: [0.0, 0.0, 0.0],
            layer_mask: layers::MOB | layers::PLAYER,
        };
        let launcher = Entity::from_raw(1);
        let self_col = collider(0.5, layers::PLAYER);
        let other_col = collider(0.5, layers::MOB);
        let colliders = vec![
            (launcher, Vec3::ZERO, &self_col),
            (Entity::from_raw(2), Vec3::new(0.5, 0.0, 0.0), &other_col),
        ];
        let contact = cast.check_contact(Vec3::ZERO, Quat::IDENTITY, launcher, colliders.into_iter());
        assert_eq!(contact.map(|(e, _)| e), Some(Entity::from_raw(2)));
    }

    #[test]
    fn raycast_prefers_nearest_collider_over_ground() {
        let near = collider(0.5, layers::MOB);
        let far = collider(0.5, layers::MOB);
        let colliders = vec![
            (Entity::from_raw(1), Vec3::new(0.0, 1.0, -5.0), &near),
            (Entity::from_raw(2), Vec3::new(0.0, 1.0, -9.0), &far),
        ];
        let hit = raycast(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
            100.0,
            layers::MOB,
            colliders.into_iter(),
        )
        .expect("hit");
        assert_eq!(hit.entity, Some(Entity::from_raw(1)));
        assert!((hit.point.z - -4.5).abs() < 1e-3);
    }

    #[test]
    fn raycast_falls_back_to_ground_plane() {
        let hit = raycast(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::new(0.0, -1.0, 1.0),
            100.0,
            layers::MOB,
            std::iter::empty(),
        )
        .expect("ground hit");
        assert_eq!(hit.entity, None);
        assert!((hit.point.y).abs() < 1e-3);
        assert!((hit.point.z - 10.0).abs() < 1e-3);
    }
}
