use glam::{Vec2, Vec3, Vec4};

use crate::texture::SceneImage;

/// Linear RGBA image with a depth plane. Row 0 is the top row.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    color: Vec<Vec4>,
    depth: Vec<f32>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width.max(1) * height.max(1)) as usize;
        Self {
            width: width.max(1),
            height: height.max(1),
            color: vec![Vec4::ZERO; len],
            depth: vec![1.0; len],
        }
    }

    pub fn from_image(image: &SceneImage) -> Self {
        let color = image
            .pixels()
            .chunks_exact(4)
            .map(|texel| {
                Vec4::new(
                    f32::from(texel[0]) / 255.0,
                    f32::from(texel[1]) / 255.0,
                    f32::from(texel[2]) / 255.0,
                    f32::from(texel[3]) / 255.0,
                )
            })
            .collect::<Vec<_>>();
        let depth = vec![1.0; color.len()];
        Self {
            width: image.width(),
            height: image.height(),
            color,
            depth,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.color.fill(Vec4::from_array(color));
        self.depth.fill(depth);
    }

    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.color[(y * self.width + x) as usize]
    }

    /// Bilinear lookup with clamp-to-edge addressing.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let max_x = self.width as i64 - 1;
        let max_y = self.height as i64 - 1;
        let clamp = |value: f32, max: i64| (value as i64).clamp(0, max) as u32;
        let (left, right) = (clamp(x0, max_x), clamp(x0 + 1.0, max_x));
        let (top, bottom) = (clamp(y0, max_y), clamp(y0 + 1.0, max_y));

        let upper = lerp(self.texel(left, top), self.texel(right, top), fx);
        let lower = lerp(self.texel(left, bottom), self.texel(right, bottom), fx);
        lerp(upper, lower, fy)
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.color
    }

    /// Quantised RGBA8, rows top to bottom.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.color
            .iter()
            .flat_map(|texel| {
                texel
                    .clamp(Vec4::ZERO, Vec4::ONE)
                    .to_array()
                    .map(|channel| (channel * 255.0).round() as u8)
            })
            .collect()
    }
}

/// Exact when both ends are equal.
fn lerp(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    a + (b - a) * t
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ClipVertex {
    pub position: Vec4,
    pub uv: Vec2,
}

/// Rasterises a triangle strip, with a `LessEqual` depth test and depth
/// write when `depth_test` is set. Fragments with depth outside `[0, 1]` are
/// discarded; the shaded colour is clamped to the unit range before it is
/// stored.
pub(crate) fn draw_triangle_strip(
    canvas: &mut Canvas,
    vertices: &[ClipVertex],
    depth_test: bool,
    shade: &mut dyn FnMut(Vec2) -> Vec4,
) {
    for window in vertices.windows(3) {
        draw_triangle(canvas, [&window[0], &window[1], &window[2]], depth_test, shade);
    }
}

fn draw_triangle(
    canvas: &mut Canvas,
    triangle: [&ClipVertex; 3],
    depth_test: bool,
    shade: &mut dyn FnMut(Vec2) -> Vec4,
) {
    let width = canvas.width as f32;
    let height = canvas.height as f32;

    let mut screen = [Vec3::ZERO; 3];
    let mut inv_w = [0.0f32; 3];
    for (index, vertex) in triangle.iter().enumerate() {
        let w = vertex.position.w;
        if w <= f32::EPSILON {
            return;
        }
        let ndc = vertex.position.truncate() / w;
        screen[index] = Vec3::new(
            (ndc.x + 1.0) * 0.5 * width,
            (1.0 - ndc.y) * 0.5 * height,
            ndc.z,
        );
        inv_w[index] = 1.0 / w;
    }

    let area = edge(screen[0], screen[1], screen[2].truncate());
    if area.abs() <= f32::EPSILON {
        return;
    }

    let min_x = screen.iter().map(|v| v.x).fold(f32::INFINITY, f32::min);
    let max_x = screen.iter().map(|v| v.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = screen.iter().map(|v| v.y).fold(f32::INFINITY, f32::min);
    let max_y = screen.iter().map(|v| v.y).fold(f32::NEG_INFINITY, f32::max);
    let x_start = min_x.floor().max(0.0) as u32;
    let x_end = (max_x.ceil().min(width)).max(0.0) as u32;
    let y_start = min_y.floor().max(0.0) as u32;
    let y_end = (max_y.ceil().min(height)).max(0.0) as u32;

    for py in y_start..y_end {
        for px in x_start..x_end {
            let point = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
            let b0 = edge(screen[1], screen[2], point) / area;
            let b1 = edge(screen[2], screen[0], point) / area;
            let b2 = edge(screen[0], screen[1], point) / area;
            if b0 < 0.0 || b1 < 0.0 || b2 < 0.0 {
                continue;
            }

            let depth = b0 * screen[0].z + b1 * screen[1].z + b2 * screen[2].z;
            let index = (py * canvas.width + px) as usize;
            if !(0.0..=1.0).contains(&depth) || (depth_test && depth > canvas.depth[index]) {
                continue;
            }

            let p0 = b0 * inv_w[0];
            let p1 = b1 * inv_w[1];
            let p2 = b2 * inv_w[2];
            let uv = (triangle[0].uv * p0 + triangle[1].uv * p1 + triangle[2].uv * p2)
                / (p0 + p1 + p2);

            canvas.color[index] = shade(uv).clamp(Vec4::ZERO, Vec4::ONE);
            if depth_test {
                canvas.depth[index] = depth;
            }
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(z: f32) -> [ClipVertex; 4] {
        [
            ClipVertex {
                position: Vec4::new(-1.0, 1.0, z, 1.0),
                uv: Vec2::new(0.0, 0.0),
            },
            ClipVertex {
                position: Vec4::new(1.0, 1.0, z, 1.0),
                uv: Vec2::new(1.0, 0.0),
            },
            ClipVertex {
                position: Vec4::new(-1.0, -1.0, z, 1.0),
                uv: Vec2::new(0.0, 1.0),
            },
            ClipVertex {
                position: Vec4::new(1.0, -1.0, z, 1.0),
                uv: Vec2::new(1.0, 1.0),
            },
        ]
    }

    #[test]
    fn full_screen_quad_covers_every_pixel_at_texel_centres() {
        let mut canvas = Canvas::new(5, 3);
        let mut seen = Vec::new();
        draw_triangle_strip(&mut canvas, &quad(0.0), true, &mut |uv| {
            seen.push(uv);
            Vec4::ONE
        });
        assert!(canvas.pixels().iter().all(|texel| *texel == Vec4::ONE));
        let first = seen[0];
        assert!((first.x * 5.0 - (first.x * 5.0).floor() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn depth_test_keeps_nearer_fragments() {
        let mut canvas = Canvas::new(2, 2);
        draw_triangle_strip(&mut canvas, &quad(0.25), true, &mut |_| Vec4::new(1.0, 0.0, 0.0, 1.0));
        draw_triangle_strip(&mut canvas, &quad(0.75), true, &mut |_| Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(canvas.texel(0, 0), Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn without_depth_test_later_draws_win_and_depth_is_kept() {
        let mut canvas = Canvas::new(2, 2);
        draw_triangle_strip(&mut canvas, &quad(0.25), true, &mut |_| Vec4::new(1.0, 0.0, 0.0, 1.0));
        draw_triangle_strip(&mut canvas, &quad(0.75), false, &mut |_| Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(canvas.texel(0, 0), Vec4::new(0.0, 1.0, 0.0, 1.0));
        assert!(canvas.depth.iter().all(|depth| (*depth - 0.25).abs() < 1e-6));
    }

    #[test]
    fn bilinear_sampling_clamps_to_edges() {
        let canvas = Canvas::from_image(&SceneImage::solid(2, 1, [0, 0, 0, 255]));
        assert_eq!(canvas.sample(Vec2::new(-3.0, 0.5)), Vec4::new(0.0, 0.0, 0.0, 1.0));

        let mut gradient = Canvas::new(2, 1);
        gradient.color[1] = Vec4::ONE;
        let middle = gradient.sample(Vec2::new(0.5, 0.5));
        assert!((middle.x - 0.5).abs() < 1e-6);
        assert_eq!(gradient.sample(Vec2::new(0.99, 0.5)), Vec4::ONE);
        assert_eq!(gradient.sample(Vec2::new(0.0, 0.5)), Vec4::ZERO);
    }

    #[test]
    fn quantises_to_rgba8() {
        let mut canvas = Canvas::new(1, 1);
        canvas.clear([1.5, 0.5, -1.0, 1.0], 1.0);
        assert_eq!(canvas.to_rgba8(), vec![255, 128, 0, 255]);
    }
}
