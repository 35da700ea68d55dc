//! # 3D Camera
//!
//! Projection and view matrices for the forward and shadow passes.
//!
//! ## Conventions
//! - View space looks down +Z with +Y pointing down the screen, matching
//!   Vulkan's clip space, so no extra Y flip is applied afterwards.
//! - Projections map depth to the `[0, 1]` range Vulkan expects.
//! - The camera keeps the inverse view matrix alongside the view matrix so
//!   shaders can recover the eye position without inverting on the GPU.

use crate::foundation::math::{Mat4, Vec3};

/// Camera holding a projection, a view and the inverse view
///
/// The matrices are set explicitly by the `set_*` methods and returned as
/// they were last set; nothing is derived lazily.
///
/// # Example
/// ```rust
/// use prism_engine::foundation::math::Vec3;
/// use prism_engine::render::Camera;
///
/// let mut camera = Camera::new();
/// camera.set_perspective_projection(50f32.to_radians(), 4.0 / 3.0, 0.1, 10.0);
/// camera.set_view_target(Vec3::new(0.0, -1.0, -2.5), Vec3::zeros(), Vec3::new(0.0, -1.0, 0.0));
/// assert!((camera.position() - Vec3::new(0.0, -1.0, -2.5)).norm() < 1e-5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::identity(),
            view: Mat4::identity(),
            inverse_view: Mat4::identity(),
        }
    }
}

impl Camera {
    /// Camera at the origin with identity projection
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an orthographic projection for the given view volume
    ///
    /// # Arguments
    /// * `left`, `right` - X extent of the volume
    /// * `top`, `bottom` - Y extent of the volume (top maps to NDC -1)
    /// * `near`, `far` - Z extent, mapped to depth 0 and 1
    pub fn set_orthographic_projection(&mut self, left: f32, right: f32, top: f32, bottom: f32, near: f32, far: f32) {
        let mut projection = Mat4::identity();
        projection[(0, 0)] = 2.0 / (right - left);
        projection[(1, 1)] = 2.0 / (bottom - top);
        projection[(2, 2)] = 1.0 / (far - near);
        projection[(0, 3)] = -(right + left) / (right - left);
        projection[(1, 3)] = -(bottom + top) / (bottom - top);
        projection[(2, 3)] = -near / (far - near);
        self.projection = projection;
    }

    /// Set a perspective projection
    ///
    /// # Arguments
    /// * `fov_y` - Vertical field of view in radians
    /// * `aspect` - Viewport width / height, must be non-zero
    /// * `near` - Near plane distance, mapped to depth 0
    /// * `far` - Far plane distance, mapped to depth 1
    ///
    /// A zero aspect would produce an infinite matrix; the previous
    /// projection is kept in that case.
    pub fn set_perspective_projection(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        if aspect.abs() <= f32::EPSILON {
            log::warn!("[CAMERA] Ignoring perspective projection with zero aspect ratio");
            return;
        }
        let tan_half_fov_y = (fov_y / 2.0).tan();
        let mut projection = Mat4::zeros();
        projection[(0, 0)] = 1.0 / (aspect * tan_half_fov_y);
        projection[(1, 1)] = 1.0 / tan_half_fov_y;
        projection[(2, 2)] = far / (far - near);
        projection[(2, 3)] = -(far * near) / (far - near);
        projection[(3, 2)] = 1.0;
        self.projection = projection;
    }

    /// Look from `position` along `direction`
    ///
    /// `up` only needs to be non-parallel to `direction`; the camera basis is
    /// re-orthogonalized from it.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(&up).normalize();
        let v = w.cross(&u);
        self.set_basis(position, u, v, w);
    }

    /// Look from `position` towards `target`
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// Place the camera with Tait-Bryan angles applied Y, X, Z
    ///
    /// Uses the same rotation as `TransformComponent`, so a camera and an
    /// object with equal rotation face the same way.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let (s1, c1) = rotation.y.sin_cos();
        let (s2, c2) = rotation.x.sin_cos();
        let (s3, c3) = rotation.z.sin_cos();
        let u = Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1);
        let v = Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3);
        let w = Vec3::new(c2 * s1, -s2, c1 * c2);
        self.set_basis(position, u, v, w);
    }

    // View rows are the camera axes; the inverse view has them as columns
    #[rustfmt::skip]
    fn set_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::new(
            u.x, u.y, u.z, -u.dot(&position),
            v.x, v.y, v.z, -v.dot(&position),
            w.x, w.y, w.z, -w.dot(&position),
            0.0, 0.0, 0.0, 1.0,
        );
        self.inverse_view = Mat4::new(
            u.x, v.x, w.x, position.x,
            u.y, v.y, w.y, position.y,
            u.z, v.z, w.z, position.z,
            0.0, 0.0, 0.0, 1.0,
        );
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    pub fn inverse_view(&self) -> &Mat4 {
        &self.inverse_view
    }

    /// Eye position in world space
    pub fn position(&self) -> Vec3 {
        self.inverse_view.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// `projection * view`
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn project(m: &Mat4, point: Vec3) -> Vec3 {
        let clip = m * Vec4::new(point.x, point.y, point.z, 1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(50f32.to_radians(), 1.5, 0.1, 10.0);

        assert_relative_eq!(project(camera.projection(), Vec3::new(0.0, 0.0, 0.1)).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(project(camera.projection(), Vec3::new(0.0, 0.0, 10.0)).z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_fov_edge_maps_to_ndc_edge() {
        let mut camera = Camera::new();
        let fov = 90f32.to_radians();
        camera.set_perspective_projection(fov, 2.0, 0.1, 10.0);

        // At 90 degrees the top edge at z = 1 is y = 1
        let ndc = project(camera.projection(), Vec3::new(2.0, 1.0, 1.0));
        assert_relative_eq!(ndc.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_zero_aspect_keeps_previous_projection() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(1.0, 0.0, 0.1, 10.0);
        assert_relative_eq!(*camera.projection(), Mat4::identity());
    }

    #[test]
    fn test_orthographic_maps_volume_to_ndc() {
        let mut camera = Camera::new();
        camera.set_orthographic_projection(-1.0, 1.0, -1.0, 1.0, -1.0, 1.0);
        let corner = project(camera.projection(), Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(corner, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-6);
        let near = project(camera.projection(), Vec3::new(-1.0, -1.0, -1.0));
        assert_relative_eq!(near, Vec3::new(-1.0, -1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_view_yxz_inverse_round_trip() {
        let mut camera = Camera::new();
        let position = Vec3::new(1.0, -2.0, 3.0);
        camera.set_view_yxz(position, Vec3::new(0.3, -1.1, 0.25));

        assert_relative_eq!(camera.view() * camera.inverse_view(), Mat4::identity(), epsilon = 1e-5);
        assert_relative_eq!(camera.position(), position, epsilon = 1e-6);
    }

    #[test]
    fn test_view_yxz_without_rotation_is_translation() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(0.0, 0.0, -2.5), Vec3::zeros());
        assert_relative_eq!(
            *camera.view(),
            Mat4::new_translation(&Vec3::new(0.0, 0.0, 2.5)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_view_target_places_target_on_forward_axis() {
        let mut camera = Camera::new();
        let position = Vec3::new(-1.0, -1.0, -1.0);
        camera.set_view_target(position, Vec3::zeros(), Vec3::new(0.0, -1.0, 0.0));

        let target_in_view = (camera.view() * Vec4::new(0.0, 0.0, 0.0, 1.0)).xyz();
        assert_relative_eq!(target_in_view.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.z, position.norm(), epsilon = 1e-5);
        assert_relative_eq!(camera.view() * camera.inverse_view(), Mat4::identity(), epsilon = 1e-5);
    }
}
