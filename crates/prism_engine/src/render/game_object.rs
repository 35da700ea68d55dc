//! Scene objects
//!
//! A [`GameObject`] is an id plus a small set of optional capabilities: a
//! mesh makes it drawable, a [`PointLightComponent`] makes it emit light.
//! Systems filter on those capabilities rather than on object kinds.
//!
//! Objects live in a [`World`], which owns the id allocator so ids are
//! unique for the world's lifetime and never reused.

use std::collections::HashMap;
use std::rc::Rc;

use crate::foundation::math::{Mat2, Mat3, Mat4, Vec2, Vec3};
use crate::render::model::Model;

/// Unique object identifier
pub type GameObjectId = u32;

/// Objects keyed by id
pub type GameObjectMap<M = Model> = HashMap<GameObjectId, GameObject<M>>;

/// Intensity used by lights created without an explicit value
pub const DEFAULT_LIGHT_INTENSITY: f32 = 10.0;

/// Billboard radius used by lights created without an explicit value
pub const DEFAULT_LIGHT_RADIUS: f32 = 0.1;

/// Translation, scale and Tait-Bryan rotation (radians, applied Y, X, Z)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformComponent {
    pub translation: Vec3,
    pub scale: Vec3,
    pub rotation: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            rotation: Vec3::zeros(),
        }
    }
}

impl TransformComponent {
    /// Model matrix `T * Ry * Rx * Rz * S`
    #[rustfmt::skip]
    pub fn mat4(&self) -> Mat4 {
        let [u, v, w] = self.rotation_columns();
        let s = self.scale;
        let t = self.translation;
        Mat4::new(
            u.x * s.x, v.x * s.y, w.x * s.z, t.x,
            u.y * s.x, v.y * s.y, w.y * s.z, t.y,
            u.z * s.x, v.z * s.y, w.z * s.z, t.z,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// Inverse-transpose of the model matrix's upper 3x3, i.e. `R * S^-1`
    pub fn normal_matrix(&self) -> Mat3 {
        let [u, v, w] = self.rotation_columns();
        let inv = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        Mat3::from_columns(&[u * inv.x, v * inv.y, w * inv.z])
    }

    // Columns of Ry * Rx * Rz
    fn rotation_columns(&self) -> [Vec3; 3] {
        let (s1, c1) = self.rotation.y.sin_cos();
        let (s2, c2) = self.rotation.x.sin_cos();
        let (s3, c3) = self.rotation.z.sin_cos();
        [
            Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1),
            Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3),
            Vec3::new(c2 * s1, -s2, c1 * c2),
        ]
    }
}

/// Planar transform; translation is applied after [`Transform2dComponent::mat2`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2dComponent {
    pub translation: Vec2,
    pub scale: Vec2,
    /// Radians, counter-clockwise
    pub rotation: f32,
}

impl Default for Transform2dComponent {
    fn default() -> Self {
        Self {
            translation: Vec2::zeros(),
            scale: Vec2::new(1.0, 1.0),
            rotation: 0.0,
        }
    }
}

impl Transform2dComponent {
    /// `R * S`
    #[rustfmt::skip]
    pub fn mat2(&self) -> Mat2 {
        let (s, c) = self.rotation.sin_cos();
        Mat2::new(
            c * self.scale.x, -s * self.scale.y,
            s * self.scale.x, c * self.scale.y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLightComponent {
    pub light_intensity: f32,
}

impl Default for PointLightComponent {
    fn default() -> Self {
        Self { light_intensity: 1.0 }
    }
}

/// Entity with optional mesh and light capabilities
pub struct GameObject<M = Model> {
    id: GameObjectId,
    pub model: Option<Rc<M>>,
    pub color: Vec3,
    pub transform: TransformComponent,
    pub point_light: Option<PointLightComponent>,
}

impl<M> GameObject<M> {
    fn new(id: GameObjectId) -> Self {
        Self {
            id,
            model: None,
            color: Vec3::zeros(),
            transform: TransformComponent::default(),
            point_light: None,
        }
    }

    pub fn id(&self) -> GameObjectId {
        self.id
    }

    /// Has a mesh to draw
    pub fn is_drawable(&self) -> bool {
        self.model.is_some()
    }

    /// Has a point light component
    pub fn is_light(&self) -> bool {
        self.point_light.is_some()
    }
}

/// Monotonic id source, never hands out the same id twice
#[derive(Debug, Default)]
pub struct GameObjectIdAllocator {
    next: GameObjectId,
}

impl GameObjectIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> GameObjectId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Object collection together with its id allocator
pub struct World<M = Model> {
    ids: GameObjectIdAllocator,
    objects: GameObjectMap<M>,
}

impl<M> Default for World<M> {
    fn default() -> Self {
        Self {
            ids: GameObjectIdAllocator::new(),
            objects: GameObjectMap::new(),
        }
    }
}

impl<M> World<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// New bare object with a fresh id, not yet inserted
    pub fn create_game_object(&mut self) -> GameObject<M> {
        GameObject::new(self.ids.allocate())
    }

    /// New light object; the billboard radius is stored in `transform.scale.x`
    pub fn make_point_light(&mut self, intensity: f32, radius: f32, color: Vec3) -> GameObject<M> {
        let mut object = self.create_game_object();
        object.color = color;
        object.transform.scale.x = radius;
        object.point_light = Some(PointLightComponent {
            light_intensity: intensity,
        });
        object
    }

    /// Light with the given intensity and default radius and colour
    pub fn make_default_point_light(&mut self, intensity: f32) -> GameObject<M> {
        self.make_point_light(intensity, DEFAULT_LIGHT_RADIUS, Vec3::new(1.0, 1.0, 1.0))
    }

    pub fn insert(&mut self, object: GameObject<M>) -> GameObjectId {
        let id = object.id;
        self.objects.insert(id, object);
        id
    }

    pub fn remove(&mut self, id: GameObjectId) -> Option<GameObject<M>> {
        self.objects.remove(&id)
    }

    pub fn get(&self, id: GameObjectId) -> Option<&GameObject<M>> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: GameObjectId) -> Option<&mut GameObject<M>> {
        self.objects.get_mut(&id)
    }

    pub fn objects(&self) -> &GameObjectMap<M> {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut GameObjectMap<M> {
        &mut self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{constants::PI, Rotation3, Vector3};
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_2d_scales_then_rotates() {
        let transform = Transform2dComponent {
            translation: Vec2::new(5.0, -1.0),
            scale: Vec2::new(2.0, 0.5),
            rotation: PI / 2.0,
        };
        let m = transform.mat2();
        // x axis scaled by 2 then turned onto +y, y axis scaled by 0.5 onto -x
        assert_relative_eq!(m * Vec2::new(1.0, 0.0), Vec2::new(0.0, 2.0), epsilon = 1e-6);
        assert_relative_eq!(m * Vec2::new(0.0, 1.0), Vec2::new(-0.5, 0.0), epsilon = 1e-6);
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_transform_2d_default_is_identity() {
        assert_relative_eq!(Transform2dComponent::default().mat2(), Mat2::identity());
    }

    fn reference_mat4(t: &TransformComponent) -> Mat4 {
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), t.rotation.y).to_homogeneous();
        let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), t.rotation.x).to_homogeneous();
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), t.rotation.z).to_homogeneous();
        Mat4::new_translation(&t.translation) * ry * rx * rz * Mat4::new_nonuniform_scaling(&t.scale)
    }

    #[test]
    fn test_default_transform_is_identity() {
        let transform = TransformComponent::default();
        assert_relative_eq!(transform.mat4(), Mat4::identity());
        assert_relative_eq!(transform.normal_matrix(), Mat3::identity());
    }

    #[test]
    fn test_mat4_matches_translate_ry_rx_rz_scale() {
        let cases = [
            (Vec3::new(1.0, -2.0, 3.5), Vec3::new(0.3, 1.2, -0.7), Vec3::new(2.0, 0.5, 1.5)),
            (Vec3::new(-0.5, 0.5, 0.0), Vec3::new(0.0, 0.0, 0.0), Vec3::new(3.0, 1.5, 3.0)),
            (Vec3::new(0.0, 0.0, 0.0), Vec3::new(-2.1, 0.4, 3.0), Vec3::new(1.0, 1.0, 1.0)),
        ];
        for (translation, rotation, scale) in cases {
            let transform = TransformComponent {
                translation,
                rotation,
                scale,
            };
            assert_relative_eq!(transform.mat4(), reference_mat4(&transform), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_normal_matrix_is_inverse_transpose() {
        let transform = TransformComponent {
            translation: Vec3::new(4.0, 5.0, 6.0),
            rotation: Vec3::new(0.4, -0.9, 0.2),
            scale: Vec3::new(2.0, 1.0, 1.0),
        };
        let upper: Mat3 = transform.mat4().fixed_view::<3, 3>(0, 0).into_owned();
        let expected = upper.try_inverse().map(|m| m.transpose()).unwrap_or_else(Mat3::zeros);
        assert_relative_eq!(transform.normal_matrix(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_naive_normal_transform_diverges_under_nonuniform_scale() {
        let transform = TransformComponent {
            scale: Vec3::new(2.0, 1.0, 1.0),
            ..Default::default()
        };
        // Surface normal of the plane x + y = 0
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize();
        let upper: Mat3 = transform.mat4().fixed_view::<3, 3>(0, 0).into_owned();

        let naive = (upper * normal).normalize();
        let correct = (transform.normal_matrix() * normal).normalize();

        // A tangent of the scaled plane must stay perpendicular to its normal
        let tangent = upper * Vec3::new(1.0, -1.0, 0.0);
        assert_relative_eq!(correct.dot(&tangent), 0.0, epsilon = 1e-6);
        assert!(naive.dot(&tangent).abs() > 0.1);
        assert!((naive - correct).norm() > 0.1);
    }

    #[test]
    fn test_uniform_scale_normal_matrix_matches_rotation() {
        let transform = TransformComponent {
            rotation: Vec3::new(0.1, 0.7, -0.3),
            scale: Vec3::new(2.0, 2.0, 2.0),
            ..Default::default()
        };
        let upper: Mat3 = transform.mat4().fixed_view::<3, 3>(0, 0).into_owned();
        assert_relative_eq!(transform.normal_matrix() * 4.0, upper, epsilon = 1e-5);
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut world: World<()> = World::new();
        let a = world.create_game_object();
        let b = world.create_game_object();
        assert!(b.id() > a.id());

        let a_id = world.insert(a);
        world.remove(a_id);
        let c = world.create_game_object();
        assert!(c.id() > b.id());
        assert_ne!(c.id(), a_id);
    }

    #[test]
    fn test_point_light_capabilities() {
        let mut world: World<()> = World::new();
        let light = world.make_point_light(0.2, 0.05, Vec3::new(1.0, 0.1, 0.1));
        assert!(light.is_light());
        assert!(!light.is_drawable());
        assert_relative_eq!(light.transform.scale.x, 0.05);
        assert_eq!(light.point_light.map(|p| p.light_intensity), Some(0.2));

        let default_light = world.make_default_point_light(DEFAULT_LIGHT_INTENSITY);
        assert_relative_eq!(default_light.transform.scale.x, DEFAULT_LIGHT_RADIUS);
        assert_relative_eq!(default_light.color, Vec3::new(1.0, 1.0, 1.0));

        let mut mesh_object = world.create_game_object();
        mesh_object.model = Some(Rc::new(()));
        assert!(mesh_object.is_drawable());
        assert!(!mesh_object.is_light());
    }

    #[test]
    fn test_world_insert_get_remove() {
        let mut world: World<()> = World::new();
        let object = world.create_game_object();
        let id = world.insert(object);
        assert_eq!(world.len(), 1);
        assert!(world.get(id).is_some());
        if let Some(object) = world.get_mut(id) {
            object.transform.translation.x = 3.0;
        }
        assert_relative_eq!(world.objects()[&id].transform.translation.x, 3.0);
        assert!(world.remove(id).is_some());
        assert!(world.is_empty());
        assert!(world.remove(id).is_none());
    }
}
