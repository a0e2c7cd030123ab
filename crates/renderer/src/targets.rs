//! Offscreen render targets for the bloom chain.
//!
//! The pool owns five surfaces: the scene at full resolution, two full-size
//! ping/pong buffers, and one each at half and quarter size for the dual
//! Kawase pyramid. Resizing releases every live surface before allocating the
//! replacements.

use crate::backend::{Backend, FramebufferId, TextureId};
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSurface {
    pub width: u32,
    pub height: u32,
    pub color: TextureId,
    pub framebuffer: FramebufferId,
}

impl RenderSurface {
    pub fn dimensions(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Full,
    Half,
    Quarter,
}

impl ResolutionTier {
    pub fn divisor(self) -> u32 {
        match self {
            ResolutionTier::Full => 1,
            ResolutionTier::Half => 2,
            ResolutionTier::Quarter => 4,
        }
    }

    /// Floor-divided base size, never below 1×1.
    pub fn dimensions(self, base_width: u32, base_height: u32) -> (u32, u32) {
        let divisor = self.divisor();
        ((base_width / divisor).max(1), (base_height / divisor).max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSlot {
    Scene,
    Ping,
    Pong,
    Half,
    Quarter,
}

impl TargetSlot {
    pub const ALL: [TargetSlot; 5] = [
        TargetSlot::Scene,
        TargetSlot::Ping,
        TargetSlot::Pong,
        TargetSlot::Half,
        TargetSlot::Quarter,
    ];

    pub fn tier(self) -> ResolutionTier {
        match self {
            TargetSlot::Scene | TargetSlot::Ping | TargetSlot::Pong => ResolutionTier::Full,
            TargetSlot::Half => ResolutionTier::Half,
            TargetSlot::Quarter => ResolutionTier::Quarter,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetSlot::Scene => "scene",
            TargetSlot::Ping => "ping",
            TargetSlot::Pong => "pong",
            TargetSlot::Half => "half",
            TargetSlot::Quarter => "quarter",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
pub struct RenderTargetPool {
    slots: [Option<RenderSurface>; 5],
    base: (u32, u32),
}

/// Every surface of a fully allocated pool, copied out for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSet {
    surfaces: [RenderSurface; 5],
}

impl TargetSet {
    pub fn get(&self, slot: TargetSlot) -> RenderSurface {
        self.surfaces[slot.index()]
    }
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one colour + depth surface of `width`×`height`.
    pub fn allocate<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> PipelineResult<RenderSurface> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidSurfaceSize { width, height });
        }
        let (framebuffer, color) = backend.create_framebuffer(width, height)?;
        Ok(RenderSurface {
            width,
            height,
            color,
            framebuffer,
        })
    }

    /// Frees the framebuffer and colour texture behind `surface`.
    pub fn release<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        surface: RenderSurface,
    ) -> PipelineResult<()> {
        backend.delete_framebuffer(surface.framebuffer)
    }

    /// Replaces every surface with one sized for `base_width`×`base_height`.
    /// Handles from before the call are invalid afterwards.
    ///
    /// The pool is all-or-nothing: if any release or allocation fails it is
    /// left empty and every surface created by this call is freed again.
    pub fn resize_all<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        base_width: u32,
        base_height: u32,
    ) -> PipelineResult<()> {
        if base_width == 0 || base_height == 0 {
            return Err(PipelineError::InvalidSurfaceSize {
                width: base_width,
                height: base_height,
            });
        }
        self.release_all(backend)?;

        let mut fresh: [Option<RenderSurface>; 5] = [None; 5];
        for slot in TargetSlot::ALL {
            let (width, height) = slot.tier().dimensions(base_width, base_height);
            match self.allocate(backend, width, height) {
                Ok(surface) => {
                    tracing::debug!(
                        slot = slot.label(),
                        width,
                        height,
                        framebuffer = %surface.framebuffer,
                        "allocated render target"
                    );
                    fresh[slot.index()] = Some(surface);
                }
                Err(err) => {
                    tracing::warn!(
                        slot = slot.label(),
                        width,
                        height,
                        error = %err,
                        "render target allocation failed; rolling back"
                    );
                    for surface in fresh.iter_mut().filter_map(Option::take) {
                        if let Err(cleanup) = self.release(backend, surface) {
                            tracing::warn!(error = %cleanup, "failed to free partial render target");
                        }
                    }
                    return Err(err);
                }
            }
        }

        self.slots = fresh;
        self.base = (base_width, base_height);
        Ok(())
    }

    pub fn surface(&self, slot: TargetSlot) -> PipelineResult<&RenderSurface> {
        self.slots[slot.index()]
            .as_ref()
            .ok_or(PipelineError::TargetsNotAllocated)
    }

    /// All five surfaces, or `TargetsNotAllocated` unless every slot is live.
    pub fn snapshot(&self) -> PipelineResult<TargetSet> {
        let [Some(scene), Some(ping), Some(pong), Some(half), Some(quarter)] = self.slots else {
            return Err(PipelineError::TargetsNotAllocated);
        };
        Ok(TargetSet {
            surfaces: [scene, ping, pong, half, quarter],
        })
    }

    /// Frees every live surface. Slots are emptied even when a delete fails;
    /// the first failure is returned after the rest have been attempted.
    pub fn release_all<B: Backend + ?Sized>(&mut self, backend: &mut B) -> PipelineResult<()> {
        self.base = (0, 0);
        let mut first_error = None;
        for surface in self.slots.iter_mut().filter_map(Option::take) {
            if let Err(err) = backend.delete_framebuffer(surface.framebuffer) {
                tracing::warn!(framebuffer = %surface.framebuffer, error = %err, "failed to free render target");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Size the pool was last resized to, `(0, 0)` when empty.
    pub fn base_size(&self) -> (u32, u32) {
        self.base
    }

    pub fn is_allocated(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}
