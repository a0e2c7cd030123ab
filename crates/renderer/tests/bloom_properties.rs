use glam::{Mat4, Vec3, Vec4};
use renderer::{
    Backend, BloomPipeline, BlurMode, DrawTarget, FrameContext, PipelineError,
    PipelineParameters, PipelineSetup, ProgramKind, SceneImage, SoftwareBackend, TargetSlot,
    DEFAULT_SIGMA_STEP,
};

const WIDTH: u32 = 24;
const HEIGHT: u32 = 18;

fn build(scene: SceneImage) -> (SoftwareBackend, BloomPipeline) {
    let mut backend = SoftwareBackend::new(WIDTH, HEIGHT);
    let pipeline = BloomPipeline::new(
        &mut backend,
        &PipelineSetup {
            scene,
            clear_color: [0.02, 0.0, 0.05, 1.0],
            sigma_step: DEFAULT_SIGMA_STEP,
            fovy_degrees: 45.0,
        },
    )
    .expect("pipeline");
    (backend, pipeline)
}

/// One unit from the plane: the 2×2 quad overfills a 45° frustum.
fn filling_view() -> Mat4 {
    Mat4::look_at_rh(Vec3::Z, Vec3::ZERO, Vec3::Y)
}

fn params(blur: BlurMode, tone_scale: f32, min_bright: f32) -> PipelineParameters {
    PipelineParameters {
        blur,
        tone_scale,
        min_bright,
        offset: 3.0,
    }
}

fn surface_pixels(backend: &SoftwareBackend, pipeline: &BloomPipeline, slot: TargetSlot) -> Vec<Vec4> {
    let surface = pipeline.targets().surface(slot).expect("surface");
    backend
        .texture(surface.color)
        .expect("texture")
        .pixels()
        .to_vec()
}

fn assert_all_near(pixels: &[Vec4], expected: Vec4, tolerance: f32) {
    for (index, pixel) in pixels.iter().enumerate() {
        assert!(
            (*pixel - expected).abs().max_element() <= tolerance,
            "pixel {index}: {pixel:?} != {expected:?}"
        );
    }
}

#[test]
fn uniform_field_is_a_fixed_point_of_both_blurs() {
    let rgba = [200, 180, 160, 255];
    let expected = Vec4::from_array(rgba.map(|channel| f32::from(channel) / 255.0));
    for blur in [BlurMode::Kawase, BlurMode::DualKawase] {
        let (mut backend, mut pipeline) = build(SceneImage::solid(4, 4, rgba));
        pipeline
            .execute(
                &mut backend,
                &FrameContext {
                    view: filling_view(),
                    params: params(blur, 0.5, 0.0),
                },
            )
            .expect("frame");

        let scene = surface_pixels(&backend, &pipeline, TargetSlot::Scene);
        assert_all_near(&scene, expected, 1e-6);
        let bloom = surface_pixels(&backend, &pipeline, TargetSlot::Ping);
        assert_all_near(&bloom, expected, 1e-5);
    }
}

#[test]
fn zero_tone_scale_composites_the_scene_unchanged() {
    for blur in [BlurMode::Kawase, BlurMode::DualKawase] {
        let (mut backend, mut pipeline) = build(SceneImage::placeholder());
        pipeline
            .execute(
                &mut backend,
                &FrameContext {
                    view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y),
                    params: params(blur, 0.0, 0.0),
                },
            )
            .expect("frame");

        let scene = surface_pixels(&backend, &pipeline, TargetSlot::Scene);
        let display = backend.display().pixels();
        assert_eq!(scene.len(), display.len());
        for (index, (shown, original)) in display.iter().zip(&scene).enumerate() {
            assert!(
                (*shown - *original).abs().max_element() < 1e-4,
                "pixel {index}: {shown:?} != {original:?}"
            );
        }
    }
}

const INTERMEDIATE_SLOTS: [TargetSlot; 4] = [
    TargetSlot::Ping,
    TargetSlot::Pong,
    TargetSlot::Half,
    TargetSlot::Quarter,
];

fn run_frame(backend: &mut SoftwareBackend, pipeline: &mut BloomPipeline, params: PipelineParameters) {
    pipeline
        .execute(
            backend,
            &FrameContext {
                view: filling_view(),
                params,
            },
        )
        .expect("frame");
}

#[test]
fn red_pixel_below_threshold_produces_no_bloom() {
    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    let (mut backend, mut pipeline) = build(SceneImage::solid(1, 1, [255, 0, 0, 255]));

    // With no threshold both chains fill every intermediate surface.
    for blur in [BlurMode::Kawase, BlurMode::DualKawase] {
        run_frame(&mut backend, &mut pipeline, params(blur, 1.0, 0.0));
    }
    for slot in INTERMEDIATE_SLOTS {
        let pixels = surface_pixels(&backend, &pipeline, slot);
        assert!(
            pixels.iter().all(|pixel| pixel.x > 0.5),
            "{slot:?} was not written by the unthresholded frames"
        );
    }

    // Red luma is 0.2126, under a 0.9 threshold: every surface the bright
    // pass and blurs write must come out black.
    for blur in [BlurMode::Kawase, BlurMode::DualKawase] {
        run_frame(&mut backend, &mut pipeline, params(blur, 1.0, 0.9));
        assert_all_near(backend.display().pixels(), red, 1e-6);
    }
    for slot in INTERMEDIATE_SLOTS {
        let pixels = surface_pixels(&backend, &pipeline, slot);
        assert_all_near(&pixels, Vec4::ZERO, 0.0);
    }
    assert_all_near(&surface_pixels(&backend, &pipeline, TargetSlot::Scene), red, 1e-6);
}

#[test]
fn pass_order_follows_blur_mode() {
    let (mut backend, mut pipeline) = build(SceneImage::placeholder());
    let fb = |slot| {
        DrawTarget::Framebuffer(pipeline.targets().surface(slot).expect("surface").framebuffer)
    };
    let kawase = vec![
        (ProgramKind::Normal, fb(TargetSlot::Scene)),
        (ProgramKind::BrightPass, fb(TargetSlot::Ping)),
        (ProgramKind::KawaseBlur, fb(TargetSlot::Pong)),
        (ProgramKind::KawaseBlur, fb(TargetSlot::Ping)),
        (ProgramKind::Composite, DrawTarget::Display),
    ];
    let dual = vec![
        (ProgramKind::Normal, fb(TargetSlot::Scene)),
        (ProgramKind::BrightPass, fb(TargetSlot::Ping)),
        (ProgramKind::DualDownsample, fb(TargetSlot::Half)),
        (ProgramKind::DualDownsample, fb(TargetSlot::Quarter)),
        (ProgramKind::DualUpsample, fb(TargetSlot::Half)),
        (ProgramKind::DualUpsample, fb(TargetSlot::Ping)),
        (ProgramKind::Composite, DrawTarget::Display),
    ];

    for (blur, expected) in [(BlurMode::Kawase, kawase), (BlurMode::DualKawase, dual)] {
        backend.clear_pass_log();
        pipeline
            .execute(
                &mut backend,
                &FrameContext {
                    view: filling_view(),
                    params: params(blur, 0.5, 0.2),
                },
            )
            .expect("frame");
        let seen: Vec<_> = backend
            .pass_log()
            .iter()
            .map(|record| (record.program, record.target))
            .collect();
        assert_eq!(seen, expected, "{blur}");
    }
}

#[test]
fn resize_rebuilds_every_tier() {
    let mut backend = SoftwareBackend::new(800, 600);
    let mut pipeline = BloomPipeline::new(
        &mut backend,
        &PipelineSetup {
            scene: SceneImage::solid(1, 1, [0, 0, 0, 255]),
            clear_color: [0.0; 4],
            sigma_step: DEFAULT_SIGMA_STEP,
            fovy_degrees: 45.0,
        },
    )
    .expect("pipeline");
    let old_ping = *pipeline.targets().surface(TargetSlot::Ping).expect("ping");

    backend.resize_display(801, 601).expect("display");
    pipeline.resize(&mut backend, 801, 601).expect("resize");

    assert_eq!(backend.live_framebuffers(), 5);
    let dims = |slot| {
        let surface = pipeline.targets().surface(slot).expect("surface");
        (surface.width, surface.height)
    };
    assert_eq!(dims(TargetSlot::Scene), (801, 601));
    assert_eq!(dims(TargetSlot::Ping), (801, 601));
    assert_eq!(dims(TargetSlot::Pong), (801, 601));
    assert_eq!(dims(TargetSlot::Half), (400, 300));
    assert_eq!(dims(TargetSlot::Quarter), (200, 150));
    assert!(matches!(
        backend.texture(old_ping.color),
        Err(PipelineError::UnknownHandle { .. })
    ));
}

#[test]
fn hostile_parameters_never_fail_a_frame() {
    let (mut backend, mut pipeline) = build(SceneImage::placeholder());
    let ctx = FrameContext {
        view: filling_view(),
        params: PipelineParameters {
            blur: BlurMode::DualKawase,
            tone_scale: f32::NAN,
            min_bright: -3.0,
            offset: f32::INFINITY,
        },
    };
    pipeline.execute(&mut backend, &ctx).expect("frame");
    assert!(backend
        .display()
        .pixels()
        .iter()
        .all(|pixel| pixel.is_finite()));
}
