use prism_dispersion::{CaptureHandle, OutputResolution};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct CaptureTarget {
    // Kept alive for the view.
    _texture: wgpu::Texture,
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
}

/// Off-screen color target the background is rendered into before the
/// refractive mesh samples it.
///
/// The texture is readable only after a capture pass has been recorded into
/// it; a reallocation invalidates it until the next capture.
pub struct OffscreenCapture {
    format: wgpu::TextureFormat,
    resolution: Option<OutputResolution>,
    generation: u64,
    completed: bool,
    target: Option<CaptureTarget>,
}

impl OffscreenCapture {
    pub fn new(format: wgpu::TextureFormat) -> Self {
        Self {
            format,
            resolution: None,
            generation: 0,
            completed: false,
            target: None,
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn resolution(&self) -> Option<OutputResolution> {
        self.resolution
    }

    /// Current allocation's generation, if anything is allocated.
    pub fn generation(&self) -> Option<u64> {
        self.target.as_ref().map(|_| self.generation)
    }

    pub fn needs_allocation(&self, resolution: OutputResolution) -> bool {
        self.target.is_none() || self.resolution != Some(resolution)
    }

    /// Allocate the target, or reallocate it at a new size. Same-size calls
    /// keep the existing texture.
    pub fn acquire(&mut self, device: &wgpu::Device, width: u32, height: u32) -> CaptureHandle {
        let resolution = OutputResolution::new(width, height);
        if self.needs_allocation(resolution) {
            self.target = Some(Self::create_target(device, self.format, resolution));
            self.resolution = Some(resolution);
            self.generation += 1;
            self.completed = false;
            tracing::debug!(
                width = resolution.width(),
                height = resolution.height(),
                generation = self.generation,
                "allocated capture target"
            );
        }
        CaptureHandle {
            generation: self.generation,
            resolution,
        }
    }

    /// Follow a presentation size change. Call between frames only.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.acquire(device, width, height);
    }

    /// Color buffer of the last completed capture.
    pub fn texture(&self) -> Option<&wgpu::TextureView> {
        if !self.completed {
            return None;
        }
        self.target.as_ref().map(|t| &t.color)
    }

    /// Handle for the last completed capture.
    pub fn handle(&self) -> Option<CaptureHandle> {
        match (self.completed, self.resolution) {
            (true, Some(resolution)) => Some(CaptureHandle {
                generation: self.generation,
                resolution,
            }),
            _ => None,
        }
    }

    /// Begin a render pass that draws into the capture target. The pass
    /// ending is what restores the default output.
    pub fn begin_pass<'e>(
        &mut self,
        encoder: &'e mut wgpu::CommandEncoder,
        clear: wgpu::Color,
    ) -> Option<wgpu::RenderPass<'e>> {
        if self.target.is_none() {
            return None;
        }
        // Invalid until this pass is recorded and `finish` is called.
        self.completed = false;
        let target = self.target.as_ref()?;
        Some(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("capture_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &target.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        }))
    }

    /// Mark the recorded pass as complete and hand out its handle.
    pub fn finish(&mut self) -> Option<CaptureHandle> {
        if self.target.is_some() {
            self.completed = true;
        }
        self.handle()
    }

    fn create_target(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        resolution: OutputResolution,
    ) -> CaptureTarget {
        let size = wgpu::Extent3d {
            width: resolution.width(),
            height: resolution.height(),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("capture_color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = create_depth_view(device, resolution, "capture_depth");
        CaptureTarget {
            _texture: texture,
            color,
            depth,
        }
    }
}

/// Depth buffer matching `resolution`.
pub fn create_depth_view(
    device: &wgpu::Device,
    resolution: OutputResolution,
    label: &str,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: resolution.width(),
            height: resolution.height(),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}
