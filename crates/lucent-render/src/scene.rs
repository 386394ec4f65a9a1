//! Plain-old-data scene records uploaded verbatim into storage buffers.
//!
//! Layouts are std430/std140-compatible: every vec3 is followed by a scalar
//! or explicit padding so Rust, GLSL, and the wire format agree.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// An analytic sphere.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub albedo: Vec3,
    pub specular: f32,
    pub id: u32,
    pub _pad: [u32; 3],
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, albedo: Vec3, specular: f32, id: u32) -> Self {
        Self {
            center,
            radius,
            albedo,
            specular,
            id,
            _pad: [0; 3],
        }
    }
}

/// An infinite plane given by its normal and distance from the origin.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
    pub albedo: Vec3,
    pub specular: f32,
    pub id: u32,
    pub _pad: [u32; 3],
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32, albedo: Vec3, specular: f32, id: u32) -> Self {
        Self {
            normal,
            distance,
            albedo,
            specular,
            id,
            _pad: [0; 3],
        }
    }
}

/// A single triangle with a precomputed face normal.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Triangle {
    pub p1: Vec3,
    pub id: u32,
    pub p2: Vec3,
    pub specular: f32,
    pub p3: Vec3,
    pub _pad1: u32,
    pub normal: Vec3,
    pub _pad2: u32,
    pub albedo: Vec3,
    pub _pad3: u32,
}

impl Triangle {
    pub fn new(p1: Vec3, p2: Vec3, p3: Vec3, albedo: Vec3, specular: f32, id: u32) -> Self {
        let normal = (p2 - p1).cross(p3 - p1).normalize();
        Self {
            p1,
            id,
            p2,
            specular,
            p3,
            _pad1: 0,
            normal,
            _pad2: 0,
            albedo,
            _pad3: 0,
        }
    }
}

/// Per-frame uniform block consumed by the trace stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniforms {
    pub light_pos: Vec3,
    pub aspect_ratio: f32,
    pub ray_offset: Vec2,
    pub _pad: Vec2,
    pub camera_pos: Vec3,
    pub current_layer: i32,
    pub look_at: Vec3,
    pub fov: f32,
}

impl Default for SceneUniforms {
    fn default() -> Self {
        Self {
            light_pos: Vec3::ZERO,
            aspect_ratio: 1.0,
            ray_offset: Vec2::ZERO,
            _pad: Vec2::ZERO,
            camera_pos: Vec3::new(0.0, 0.0, 4.0),
            current_layer: 0,
            look_at: Vec3::new(0.0, 0.5, 0.0),
            fov: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn sphere_layout() {
        assert_eq!(size_of::<Sphere>(), 48);
        assert_eq!(offset_of!(Sphere, center), 0);
        assert_eq!(offset_of!(Sphere, radius), 12);
        assert_eq!(offset_of!(Sphere, albedo), 16);
        assert_eq!(offset_of!(Sphere, specular), 28);
        assert_eq!(offset_of!(Sphere, id), 32);
    }

    #[test]
    fn plane_layout() {
        assert_eq!(size_of::<Plane>(), 48);
        assert_eq!(offset_of!(Plane, normal), 0);
        assert_eq!(offset_of!(Plane, distance), 12);
        assert_eq!(offset_of!(Plane, albedo), 16);
        assert_eq!(offset_of!(Plane, id), 32);
    }

    #[test]
    fn triangle_layout() {
        assert_eq!(size_of::<Triangle>(), 80);
        assert_eq!(offset_of!(Triangle, p1), 0);
        assert_eq!(offset_of!(Triangle, id), 12);
        assert_eq!(offset_of!(Triangle, p2), 16);
        assert_eq!(offset_of!(Triangle, specular), 28);
        assert_eq!(offset_of!(Triangle, p3), 32);
        assert_eq!(offset_of!(Triangle, normal), 48);
        assert_eq!(offset_of!(Triangle, albedo), 64);
    }

    #[test]
    fn uniforms_layout() {
        // Must match the shader's std140 block exactly
        assert_eq!(size_of::<SceneUniforms>(), 64);
        assert_eq!(offset_of!(SceneUniforms, light_pos), 0);
        assert_eq!(offset_of!(SceneUniforms, aspect_ratio), 12);
        assert_eq!(offset_of!(SceneUniforms, ray_offset), 16);
        assert_eq!(offset_of!(SceneUniforms, camera_pos), 32);
        assert_eq!(offset_of!(SceneUniforms, current_layer), 44);
        assert_eq!(offset_of!(SceneUniforms, look_at), 48);
        assert_eq!(offset_of!(SceneUniforms, fov), 60);
    }

    #[test]
    fn triangle_normal_is_unit_length() {
        let triangle = Triangle::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::ONE,
            32.0,
            0,
        );
        assert!((triangle.normal.length() - 1.0).abs() < 1e-6);
    }
}
