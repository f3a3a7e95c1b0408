//! Grid-mesh rasterization of one camera's reconstruction into screen space.

use super::resources::try_raster;
use crate::error::BlendError;
use crate::params::BlendParams;
use crate::reconstruction::CameraReconstruction;
use crate::view::ViewCamera;
use glam::{Mat4, Vec2, Vec3, Vec4};
use pcfusion_data::{Raster, Rgba8};

/// Nearest-surface fragments of one camera in one view.
///
/// Empty pixels hold an infinite depth.
#[derive(Debug, Clone)]
pub struct FragmentBuffer {
    pub depth: Raster<f32>,
    pub color: Raster<Rgba8>,
    pub quality: Raster<f32>,
}

impl FragmentBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, BlendError> {
        Ok(Self {
            depth: try_raster("fragment depth", width, height, f32::INFINITY)?,
            color: try_raster("fragment color", width, height, Rgba8::TRANSPARENT)?,
            quality: try_raster("fragment quality", width, height, 0.0f32)?,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.depth.dimensions()
    }

    pub fn clear(&mut self) {
        self.depth.fill(f32::INFINITY);
        self.color.fill(Rgba8::TRANSPARENT);
        self.quality.fill(0.0);
    }

    #[inline]
    pub fn is_covered(&self, i: usize) -> bool {
        self.depth.as_slice()[i].is_finite()
    }

    /// Depth-tested write.
    #[inline]
    fn write(&mut self, i: usize, depth: f32, color: Vec4, quality: f32) {
        if depth < self.depth.as_slice()[i] {
            self.depth.as_mut_slice()[i] = depth;
            self.color.as_mut_slice()[i] = Rgba8::from_vec4(color);
            self.quality.as_mut_slice()[i] = quality;
        }
    }
}

/// A projected mesh vertex.
#[derive(Debug, Clone, Copy)]
pub struct ScreenVertex {
    /// Pixel coordinates, y down.
    pub pos: Vec2,
    /// Linear view depth.
    pub depth: f32,
    pub color: Vec4,
    pub quality: f32,
}

/// Rasterize a triangle with perspective-correct attributes and a depth test.
/// Pixel centers sit at half-integer coordinates.
pub fn rasterize_triangle(buffer: &mut FragmentBuffer, tri: &[ScreenVertex; 3]) {
    let [a, b, c] = tri;
    let area = edge_function(a.pos, b.pos, c.pos);
    if area.abs() < 1e-9 {
        return;
    }
    let (w, h) = buffer.dimensions();
    let min = a.pos.min(b.pos).min(c.pos);
    let max = a.pos.max(b.pos).max(c.pos);
    let x0 = (min.x - 0.5).ceil().max(0.0) as u32;
    let y0 = (min.y - 0.5).ceil().max(0.0) as u32;
    let x1 = ((max.x - 0.5).floor().min(w as f32 - 1.0)).max(-1.0);
    let y1 = ((max.y - 0.5).floor().min(h as f32 - 1.0)).max(-1.0);
    if x1 < 0.0 || y1 < 0.0 {
        return;
    }
    let (x1, y1) = (x1 as u32, y1 as u32);

    let inv_z = [1.0 / a.depth, 1.0 / b.depth, 1.0 / c.depth];
    for y in y0..=y1 {
        for x in x0..=x1 {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w0 = edge_function(b.pos, c.pos, p) / area;
            let w1 = edge_function(c.pos, a.pos, p) / area;
            let w2 = edge_function(a.pos, b.pos, p) / area;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let pw = [w0 * inv_z[0], w1 * inv_z[1], w2 * inv_z[2]];
            let sum = pw[0] + pw[1] + pw[2];
            if !(sum > 0.0) {
                continue;
            }
            let depth = 1.0 / sum;
            let (p0, p1, p2) = (pw[0] * depth, pw[1] * depth, pw[2] * depth);
            let color = a.color * p0 + b.color * p1 + c.color * p2;
            let quality = a.quality * p0 + b.quality * p1 + c.quality * p2;
            let i = buffer.depth.index(x, y);
            buffer.write(i, depth, color, quality);
        }
    }
}

#[inline]
fn edge_function(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Draw a square point of side `size` pixels centered at `center`, depth-tested.
///
/// Covers the pixels whose centers fall in `[center - size/2, center + size/2)`
/// on both axes, so a size of 1 always covers exactly one pixel.
pub fn splat_point(buffer: &mut FragmentBuffer, center: Vec2, size: f32, depth: f32, color: Vec4) {
    let (w, h) = buffer.dimensions();
    let half = size * 0.5;
    let x0 = (center.x - half - 0.5).ceil().max(0.0);
    let y0 = (center.y - half - 0.5).ceil().max(0.0);
    let x1 = ((center.x + half - 0.5).ceil()).min(w as f32);
    let y1 = ((center.y + half - 0.5).ceil()).min(h as f32);
    if !(x0 < x1 && y0 < y1) {
        return;
    }
    for y in y0 as u32..y1 as u32 {
        for x in x0 as u32..x1 as u32 {
            let i = buffer.depth.index(x, y);
            buffer.write(i, depth, color, 1.0);
        }
    }
}

/// Vertex color of pixel `i`, from the high-resolution stream when enabled.
pub(crate) fn vertex_color(camera: &CameraReconstruction, x: u32, y: u32, i: usize, params: &BlendParams) -> Vec4 {
    let frame = &camera.frame;
    match (&frame.high_res, params.use_high_res_colors) {
        (Some(hr), true) => {
            let u = (x as f32 + 0.5) / frame.width as f32;
            let v = (y as f32 + 0.5) / frame.height as f32;
            hr.sample(u, v).to_vec4()
        }
        _ => frame.colors[i].to_vec4(),
    }
}

/// How far a side may stretch past the span of its two pixel rays before it
/// counts as a depth discontinuity.
pub const FOOTPRINT_SLACK: f32 = 2.0;

/// True if every side of the triangle can belong to one surface.
///
/// A side may be `max_edge_length` times the mean camera depth of its
/// endpoints, or `FOOTPRINT_SLACK` times the distance its pixel rays span at
/// that depth, whichever is longer. The second term keeps coarse grids and
/// long diagonals intact on surfaces facing the camera.
fn edges_within_limit(points: [Vec3; 3], rays: [Vec2; 3], max_edge_length: f32) -> bool {
    (0..3).all(|k| {
        let j = (k + 1) % 3;
        let (p, q) = (points[k], points[j]);
        let footprint = rays[k].distance(rays[j]) * FOOTPRINT_SLACK;
        let limit = max_edge_length.max(footprint) * (p.z + q.z) * 0.5;
        p.distance_squared(q) <= limit * limit
    })
}

/// Rasterize one camera's grid mesh into `buffer`, depth-tested against its contents.
///
/// Each `stride` cell becomes two triangles when all corners are valid and no
/// side crosses a depth discontinuity (see [`edges_within_limit`]). `color_override` replaces the
/// texture color (per-camera palette) and `quality_override` the per-vertex quality.
pub fn rasterize_camera(
    buffer: &mut FragmentBuffer,
    camera: &CameraReconstruction,
    view_projection: &Mat4,
    params: &BlendParams,
    color_override: Option<Vec4>,
    quality_override: Option<f32>,
) {
    let (w, h) = camera.dimensions();
    let (out_w, out_h) = buffer.dimensions();
    let valid = camera.valid.as_slice();

    let mut projected: Vec<Option<ScreenVertex>> = Vec::with_capacity(valid.len());
    for y in 0..h {
        for x in 0..w {
            let i = camera.valid.index(x, y);
            if !valid[i] {
                projected.push(None);
                continue;
            }
            let vertex = ViewCamera::project(view_projection, camera.world_position(i), out_w, out_h).map(
                |(pos, depth)| ScreenVertex {
                    pos,
                    depth,
                    color: color_override.unwrap_or_else(|| vertex_color(camera, x, y, i, params)),
                    quality: quality_override.unwrap_or(camera.quality.as_slice()[i]),
                },
            );
            projected.push(vertex);
        }
    }

    let s = params.stride.max(1);
    let smoothed = camera.smoothed.as_slice();
    let rays = camera.frame.lookup.image_to_3d();
    for y in (0..h.saturating_sub(s)).step_by(s as usize) {
        for x in (0..w.saturating_sub(s)).step_by(s as usize) {
            let i00 = camera.valid.index(x, y);
            let i10 = camera.valid.index(x + s, y);
            let i01 = camera.valid.index(x, y + s);
            let i11 = camera.valid.index(x + s, y + s);
            for [ia, ib, ic] in [[i00, i01, i11], [i11, i10, i00]] {
                let (Some(a), Some(b), Some(c)) = (projected[ia], projected[ib], projected[ic]) else {
                    continue;
                };
                let corners = [smoothed[ia], smoothed[ib], smoothed[ic]];
                if !edges_within_limit(corners, [rays[ia], rays[ib], rays[ic]], params.max_edge_length) {
                    continue;
                }
                rasterize_triangle(buffer, &[a, b, c]);
            }
        }
    }
}
