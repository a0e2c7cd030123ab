//! Interactive viewer window.
//!
//! The winit loop owns a [`ViewerState`] and feeds it events one at a time,
//! so a resize always finishes reallocating targets before the next frame is
//! drawn. Redraws are self-scheduling through [`FrameDriver::tick`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::Mat4;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::backend::Backend;
use crate::camera::{Camera, OrbitCamera};
use crate::error::PipelineError;
use crate::frame::FrameDriver;
use crate::gpu::GpuBackend;
use crate::pipeline::{BloomPipeline, FrameContext, PipelineSetup};
use crate::texture::SceneImage;
use crate::types::{ParameterKnob, PipelineParameters, RendererConfig};

/// What a key press asks the viewer to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum KeyAction {
    ToggleBlur,
    /// Step a knob by this many increments.
    Nudge(ParameterKnob, f32),
    TogglePause,
    Quit,
}

impl KeyAction {
    pub(crate) fn from_key(key: &Key) -> Option<Self> {
        let action = match key {
            Key::Named(NamedKey::Escape) => KeyAction::Quit,
            Key::Named(NamedKey::Space) => KeyAction::TogglePause,
            Key::Named(NamedKey::ArrowUp) => KeyAction::Nudge(ParameterKnob::ToneScale, 1.0),
            Key::Named(NamedKey::ArrowDown) => KeyAction::Nudge(ParameterKnob::ToneScale, -1.0),
            Key::Named(NamedKey::ArrowRight) => KeyAction::Nudge(ParameterKnob::MinBright, 1.0),
            Key::Named(NamedKey::ArrowLeft) => KeyAction::Nudge(ParameterKnob::MinBright, -1.0),
            Key::Character(value) => match value.as_str() {
                "b" | "B" => KeyAction::ToggleBlur,
                "]" => KeyAction::Nudge(ParameterKnob::Offset, 1.0),
                "[" => KeyAction::Nudge(ParameterKnob::Offset, -1.0),
                " " => KeyAction::TogglePause,
                _ => return None,
            },
            _ => return None,
        };
        Some(action)
    }

    /// Only knob nudges act on key repeat.
    fn repeats(self) -> bool {
        matches!(self, KeyAction::Nudge(..))
    }
}

/// Applies a parameter-changing action. Returns false for actions that are
/// not about parameters.
pub(crate) fn apply_to_params(action: KeyAction, params: &mut PipelineParameters) -> bool {
    match action {
        KeyAction::ToggleBlur => {
            params.blur = params.blur.toggled();
            true
        }
        KeyAction::Nudge(knob, steps) => {
            params.nudge(knob, knob.step() * steps);
            true
        }
        KeyAction::TogglePause | KeyAction::Quit => false,
    }
}

struct ViewerState {
    backend: GpuBackend,
    pipeline: BloomPipeline,
    camera: OrbitCamera,
    driver: FrameDriver,
    params: PipelineParameters,
    view: Mat4,
    // Declared last: the surface inside `backend` must be dropped first.
    window: Arc<Window>,
}

impl ViewerState {
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let size = window.inner_size();
        let mut backend = GpuBackend::new(
            window.as_ref(),
            (size.width.max(1), size.height.max(1)),
            config.gpu_power,
        )?;
        let scene = SceneImage::load_or_placeholder(config.scene_image.as_deref());
        let pipeline = BloomPipeline::new(
            &mut backend,
            &PipelineSetup {
                scene,
                clear_color: config.clear_color,
                sigma_step: config.sigma_step,
                fovy_degrees: config.camera.fovy_degrees,
            },
        )
        .context("failed to build bloom pipeline")?;
        let camera = OrbitCamera::from_settings(&config.camera);
        let view = camera.view();

        Ok(Self {
            backend,
            pipeline,
            camera,
            driver: FrameDriver::new(),
            params: config.params,
            view,
            window,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            tracing::debug!("ignoring zero-sized resize");
            return Ok(());
        }
        self.backend.resize_display(size.width, size.height)?;
        self.pipeline
            .resize(&mut self.backend, size.width, size.height)
            .context("failed to reallocate render targets")?;
        Ok(())
    }

    /// Renders a frame if the driver is running, otherwise redraws the last
    /// view so exposes and resizes still show the scene.
    fn redraw(&mut self) -> Result<(), PipelineError> {
        let window = Arc::clone(&self.window);
        let camera = &mut self.camera;
        let pipeline = &mut self.pipeline;
        let backend = &mut self.backend;
        let params = self.params;
        let view = &mut self.view;

        let ran = self.driver.tick(
            Instant::now(),
            || window.request_redraw(),
            |timing| {
                *view = camera.update(&timing);
                pipeline
                    .execute(backend, &FrameContext { view: *view, params })
                    .map(|_| ())
            },
        )?;
        if !ran {
            pipeline.execute(backend, &FrameContext { view: *view, params })?;
        }
        Ok(())
    }

    /// Returns false when the viewer should exit.
    fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if event.state != ElementState::Pressed {
            return true;
        }
        let Some(action) = KeyAction::from_key(&event.logical_key) else {
            return true;
        };
        if event.repeat && !action.repeats() {
            return true;
        }

        match action {
            KeyAction::Quit => return false,
            KeyAction::TogglePause => {
                if self.driver.is_active() {
                    self.driver.pause();
                    tracing::info!("paused");
                } else {
                    self.driver.resume();
                    tracing::info!("resumed");
                    self.window.request_redraw();
                }
            }
            action => {
                apply_to_params(action, &mut self.params);
                tracing::info!(
                    blur = %self.params.blur,
                    tone_scale = self.params.tone_scale,
                    min_bright = self.params.min_bright,
                    offset = self.params.offset,
                    "parameters changed"
                );
                if !self.driver.is_active() {
                    self.window.request_redraw();
                }
            }
        }
        true
    }
}

/// Opens the viewer window and runs until it is closed.
pub(crate) fn run(config: &RendererConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to initialize event loop")?;
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(window_size)
        .build(&event_loop)
        .context("failed to create viewer window")?;
    let window = Arc::new(window);

    let mut state = ViewerState::new(Arc::clone(&window), config)?;
    tracing::info!(
        adapter = state.backend.adapter_name(),
        blur = %state.params.blur,
        "viewer started"
    );
    window.request_redraw();

    let mut failure = None;
    let run_result = event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Wait);
        let Event::WindowEvent { window_id, event } = event else {
            return;
        };
        if window_id != state.window.id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if !state.handle_key(&event) {
                    elwt.exit();
                }
            }
            WindowEvent::Resized(size) => {
                if let Err(err) = state.resize(size) {
                    tracing::error!(error = %err, "resize failed");
                    failure = Some(err);
                    elwt.exit();
                }
            }
            WindowEvent::RedrawRequested => match state.redraw() {
                Ok(()) => {}
                Err(PipelineError::Surface(message)) => {
                    tracing::warn!(%message, "surface unavailable; retrying next frame");
                    state.window.request_redraw();
                }
                Err(err) => {
                    tracing::error!(error = %err, "frame failed");
                    failure = Some(anyhow!(err));
                    elwt.exit();
                }
            },
            _ => {}
        }
    });

    state
        .pipeline
        .release(&mut state.backend)
        .context("failed to release render targets")?;
    run_result.map_err(|err| anyhow!("event loop error: {err}"))?;
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlurMode;

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(
            KeyAction::from_key(&Key::Character("b".into())),
            Some(KeyAction::ToggleBlur)
        );
        assert_eq!(
            KeyAction::from_key(&Key::Named(NamedKey::ArrowDown)),
            Some(KeyAction::Nudge(ParameterKnob::ToneScale, -1.0))
        );
        assert_eq!(
            KeyAction::from_key(&Key::Character("]".into())),
            Some(KeyAction::Nudge(ParameterKnob::Offset, 1.0))
        );
        assert_eq!(
            KeyAction::from_key(&Key::Named(NamedKey::Escape)),
            Some(KeyAction::Quit)
        );
        assert_eq!(KeyAction::from_key(&Key::Character("q".into())), None);
    }

    #[test]
    fn actions_step_parameters_within_range() {
        let mut params = PipelineParameters::default();
        assert!(apply_to_params(KeyAction::ToggleBlur, &mut params));
        assert_eq!(params.blur, BlurMode::DualKawase);

        assert!(apply_to_params(
            KeyAction::Nudge(ParameterKnob::Offset, 1.0),
            &mut params
        ));
        assert!((params.offset - 3.1).abs() < 1e-6);

        for _ in 0..200 {
            apply_to_params(KeyAction::Nudge(ParameterKnob::MinBright, 1.0), &mut params);
        }
        assert_eq!(params.min_bright, 1.0);
        assert!(!apply_to_params(KeyAction::Quit, &mut params));
    }
}
