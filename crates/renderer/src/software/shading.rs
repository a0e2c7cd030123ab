//! CPU renditions of the GLSL programs under `shaders/`.

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::raster::Canvas;
use crate::program::ProgramKind;

const LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

/// Uniform state gathered for one draw. Unset values read as zero, unbound
/// samplers as opaque black.
#[derive(Debug, Default)]
pub(crate) struct Inputs<'a> {
    pub mvp: Mat4,
    pub min_bright: f32,
    pub resolution: Vec2,
    pub is_vertical: bool,
    pub offsets_h: &'a [[f32; 2]],
    pub weights_h: &'a [f32],
    pub offsets_v: &'a [[f32; 2]],
    pub weights_v: &'a [f32],
    pub offset: f32,
    pub tone_scale: f32,
    pub scene: Option<&'a Canvas>,
    pub source: Option<&'a Canvas>,
    pub original: Option<&'a Canvas>,
    pub bloom: Option<&'a Canvas>,
}

fn sample(texture: Option<&Canvas>, uv: Vec2) -> Vec4 {
    texture.map_or(Vec4::W, |canvas| canvas.sample(uv))
}

pub(crate) fn vertex(kind: ProgramKind, inputs: &Inputs<'_>, position: Vec3) -> Vec4 {
    match kind {
        ProgramKind::Normal => inputs.mvp * position.extend(1.0),
        _ => position.extend(1.0),
    }
}

pub(crate) fn fragment(kind: ProgramKind, inputs: &Inputs<'_>, uv: Vec2) -> Vec4 {
    match kind {
        ProgramKind::Normal => sample(inputs.scene, uv),
        ProgramKind::BrightPass => bright(inputs, uv),
        ProgramKind::KawaseBlur => kawase(inputs, uv),
        ProgramKind::DualDownsample => downsample(inputs, uv),
        ProgramKind::DualUpsample => upsample(inputs, uv),
        ProgramKind::Composite => composite(inputs, uv),
    }
}

fn bright(inputs: &Inputs<'_>, uv: Vec2) -> Vec4 {
    let color = sample(inputs.source, uv);
    if color.truncate().dot(LUMA) < inputs.min_bright {
        Vec4::ZERO
    } else {
        color
    }
}

fn kawase(inputs: &Inputs<'_>, uv: Vec2) -> Vec4 {
    let (offsets, weights) = if inputs.is_vertical {
        (inputs.offsets_v, inputs.weights_v)
    } else {
        (inputs.offsets_h, inputs.weights_h)
    };
    offsets
        .iter()
        .zip(weights)
        .fold(Vec4::ZERO, |sum, (offset, weight)| {
            sum + sample(inputs.source, uv + Vec2::from_array(*offset)) * *weight
        })
}

fn kawase_step(inputs: &Inputs<'_>) -> Vec2 {
    0.5 / inputs.resolution * inputs.offset
}

fn downsample(inputs: &Inputs<'_>, uv: Vec2) -> Vec4 {
    let o = kawase_step(inputs);
    let source = inputs.source;
    let mut sum = sample(source, uv) * 4.0;
    sum += sample(source, uv - o);
    sum += sample(source, uv + o);
    sum += sample(source, uv + Vec2::new(o.x, -o.y));
    sum += sample(source, uv - Vec2::new(o.x, -o.y));
    sum / 8.0
}

fn upsample(inputs: &Inputs<'_>, uv: Vec2) -> Vec4 {
    let o = kawase_step(inputs);
    let source = inputs.source;
    let mut sum = sample(source, uv + Vec2::new(-o.x * 2.0, 0.0));
    sum += sample(source, uv + Vec2::new(-o.x, o.y)) * 2.0;
    sum += sample(source, uv + Vec2::new(0.0, o.y * 2.0));
    sum += sample(source, uv + Vec2::new(o.x, o.y)) * 2.0;
    sum += sample(source, uv + Vec2::new(o.x * 2.0, 0.0));
    sum += sample(source, uv + Vec2::new(o.x, -o.y)) * 2.0;
    sum += sample(source, uv + Vec2::new(0.0, -o.y * 2.0));
    sum += sample(source, uv + Vec2::new(-o.x, -o.y)) * 2.0;
    sum / 12.0
}

fn composite(inputs: &Inputs<'_>, uv: Vec2) -> Vec4 {
    let original = sample(inputs.original, uv);
    let bloom = sample(inputs.bloom, uv);
    (original.truncate() + bloom.truncate() * inputs.tone_scale).extend(original.w)
}
