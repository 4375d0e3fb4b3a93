use crate::camera::OrbitCamera;
use crate::capture::{DEPTH_FORMAT, OffscreenCapture, create_depth_view};
use crate::mesh::{MeshData, Vertex, icosphere};
use crate::scene::PrismScene;
use crate::shaders;
use crate::uniforms::{CameraUniforms, DispersionUniforms, InstanceData};
use prism_dispersion::{
    CaptureHandle, DispersionMaterial, FrameError, OutputResolution, RenderBackend, SceneGraph,
};
use wgpu::util::DeviceExt;

/// Radius of the stand-in refractive mesh.
const REFRACTIVE_RADIUS: f32 = 2.84;
const REFRACTIVE_SUBDIVISIONS: u32 = 4;
const BACKDROP_SUBDIVISIONS: u32 = 3;
const MAX_INSTANCES: u32 = 1024;

/// Scene clear color; also the neutral texel sampled before the first capture.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color::BLACK;

/// Errors building the GPU pipeline. These are fatal: a renderer with an
/// invalid program is never handed out.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("shader program invalid: {0}")]
    ShaderInvalid(String),
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertex_buffer")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}_index_buffer")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// wgpu half of the prism pipeline: background pipeline, dispersion
/// pipeline, off-screen capture and the resources they share.
pub struct DispersionRenderer {
    scene_pipeline: wgpu::RenderPipeline,
    dispersion_pipeline: wgpu::RenderPipeline,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    material_buffer: wgpu::Buffer,
    material_layout: wgpu::BindGroupLayout,
    material_bind_group: wgpu::BindGroup,
    /// Capture generation the material bind group samples; `None` means the
    /// fallback texel.
    bound_generation: Option<u64>,
    uploaded_revision: Option<u64>,
    sampler: wgpu::Sampler,
    fallback_view: wgpu::TextureView,
    backdrop_mesh: GpuMesh,
    refractive_mesh: GpuMesh,
    instance_buffer: wgpu::Buffer,
    capture: OffscreenCapture,
    depth_view: wgpu::TextureView,
    resolution: OutputResolution,
}

impl DispersionRenderer {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        resolution: OutputResolution,
    ) -> Result<Self, PipelineError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let renderer = Self::build(device, queue, surface_format, resolution);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            tracing::error!("dispersion pipeline failed validation: {err}");
            return Err(PipelineError::ShaderInvalid(err.to_string()));
        }
        tracing::info!(
            format = ?surface_format,
            width = resolution.width(),
            height = resolution.height(),
            "dispersion renderer ready"
        );
        Ok(renderer)
    }

    fn build(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        resolution: OutputResolution,
    ) -> Self {
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera_buffer"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_bind_group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let material_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dispersion_buffer"),
            size: std::mem::size_of::<DispersionUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dispersion_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<DispersionUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("capture_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallback_view = Self::create_fallback_texture(device, queue);
        let material_bind_group = Self::create_material_bind_group(
            device,
            &material_layout,
            &material_buffer,
            &fallback_view,
            &sampler,
        );

        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene_pipeline_layout"),
            bind_group_layouts: &[&camera_layout],
            push_constant_ranges: &[],
        });
        let dispersion_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("dispersion_pipeline_layout"),
            bind_group_layouts: &[&camera_layout, &material_layout],
            push_constant_ranges: &[],
        });

        // Backdrop pipeline, shared by the capture and composite passes. The
        // capture texture uses the surface format so one pipeline fits both.
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SCENE_SHADER.into()),
        });

        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("scene_pipeline"),
            layout: Some(&scene_layout),
            vertex: wgpu::VertexState {
                module: &scene_shader,
                entry_point: Some("vs_scene"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x3,
                            1 => Float32x3,
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<InstanceData>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &wgpu::vertex_attr_array![
                            2 => Float32x4,
                            3 => Float32x4,
                            4 => Float32x4,
                            5 => Float32x4,
                        ],
                    },
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &scene_shader,
                entry_point: Some("fs_scene"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let dispersion_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("dispersion_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::DISPERSION_SHADER.into()),
        });

        let dispersion_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("dispersion_pipeline"),
            layout: Some(&dispersion_layout),
            vertex: wgpu::VertexState {
                module: &dispersion_shader,
                entry_point: Some("vs_dispersion"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32x3,
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &dispersion_shader,
                entry_point: Some("fs_dispersion"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let backdrop_mesh = GpuMesh::upload(device, &icosphere(1.0, BACKDROP_SUBDIVISIONS), "backdrop");
        let refractive_mesh = GpuMesh::upload(
            device,
            &icosphere(REFRACTIVE_RADIUS, REFRACTIVE_SUBDIVISIONS),
            "refractive",
        );

        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instance_buffer"),
            size: MAX_INSTANCES as u64 * std::mem::size_of::<InstanceData>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut capture = OffscreenCapture::new(surface_format);
        capture.acquire(device, resolution.width(), resolution.height());
        let depth_view = create_depth_view(device, resolution, "surface_depth");

        Self {
            scene_pipeline,
            dispersion_pipeline,
            camera_buffer,
            camera_bind_group,
            material_buffer,
            material_layout,
            material_bind_group,
            bound_generation: None,
            uploaded_revision: None,
            sampler,
            fallback_view,
            backdrop_mesh,
            refractive_mesh,
            instance_buffer,
            capture,
            depth_view,
            resolution,
        }
    }

    /// Reallocate the capture and depth targets. Call between frames.
    pub fn resize(&mut self, device: &wgpu::Device, resolution: OutputResolution) {
        if resolution == self.resolution && !self.capture.needs_allocation(resolution) {
            return;
        }
        self.capture
            .resize(device, resolution.width(), resolution.height());
        self.depth_view = create_depth_view(device, resolution, "surface_depth");
        self.resolution = resolution;
    }

    fn write_camera(&self, queue: &wgpu::Queue, camera: &OrbitCamera, scene: &PrismScene) {
        queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniforms::new(
                camera.view_projection(),
                scene.refractive.transform,
                camera.position(),
            )),
        );
    }

    fn write_instances(&self, queue: &wgpu::Queue, scene: &PrismScene) -> u32 {
        let transforms = scene.background_transforms();
        if transforms.len() > MAX_INSTANCES as usize {
            tracing::warn!(
                requested = transforms.len(),
                max = MAX_INSTANCES,
                "backdrop truncated"
            );
        }
        let instances: Vec<InstanceData> = transforms
            .into_iter()
            .take(MAX_INSTANCES as usize)
            .map(InstanceData::from)
            .collect();
        if !instances.is_empty() {
            queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&instances));
        }
        instances.len() as u32
    }

    /// Point the material bind group at the current capture, or at the
    /// neutral texel while no capture is valid.
    fn bind_material(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, material: &DispersionMaterial) {
        let generation = material
            .captured()
            .map(|h| h.generation)
            .filter(|g| Some(*g) == self.capture.generation() && self.capture.texture().is_some());

        if generation != self.bound_generation {
            let view = match generation.and_then(|_| self.capture.texture()) {
                Some(view) => view,
                None => &self.fallback_view,
            };
            let bind_group = Self::create_material_bind_group(
                device,
                &self.material_layout,
                &self.material_buffer,
                view,
                &self.sampler,
            );
            self.material_bind_group = bind_group;
            self.bound_generation = generation;
            tracing::debug!(?generation, "rebound capture texture");
        }

        if self.uploaded_revision != Some(material.revision()) {
            queue.write_buffer(
                &self.material_buffer,
                0,
                bytemuck::bytes_of(&DispersionUniforms::from_material(material)),
            );
            self.uploaded_revision = Some(material.revision());
        }
    }

    /// Draw the backdrop and, when visible, the refractive mesh.
    fn draw_scene(&self, pass: &mut wgpu::RenderPass<'_>, scene: &PrismScene, instance_count: u32) {
        if instance_count > 0 {
            pass.set_pipeline(&self.scene_pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            pass.set_vertex_buffer(0, self.backdrop_mesh.vertex_buffer.slice(..));
            pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            pass.set_index_buffer(
                self.backdrop_mesh.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            pass.draw_indexed(0..self.backdrop_mesh.index_count, 0, 0..instance_count);
        }

        if scene.refractive_visible() {
            pass.set_pipeline(&self.dispersion_pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            pass.set_bind_group(1, &self.material_bind_group, &[]);
            pass.set_vertex_buffer(0, self.refractive_mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(
                self.refractive_mesh.index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            pass.draw_indexed(0..self.refractive_mesh.index_count, 0, 0..1);
        }
    }

    fn create_fallback_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
        let texel = [
            (CLEAR_COLOR.r * 255.0) as u8,
            (CLEAR_COLOR.g * 255.0) as u8,
            (CLEAR_COLOR.b * 255.0) as u8,
            255u8,
        ];
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("capture_fallback"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &texel,
        );
        texture.create_view(&Default::default())
    }

    fn create_material_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dispersion_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }
}

/// Graphics context for one frame: acquires the surface texture, records the
/// capture pass and the composite pass into one encoder, and submits once.
pub struct WgpuFrame<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    surface: &'a wgpu::Surface<'static>,
    config: &'a wgpu::SurfaceConfiguration,
    renderer: &'a mut DispersionRenderer,
    output: Option<wgpu::SurfaceTexture>,
    encoder: Option<wgpu::CommandEncoder>,
    instance_count: u32,
    submitted: bool,
}

impl<'a> WgpuFrame<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        surface: &'a wgpu::Surface<'static>,
        config: &'a wgpu::SurfaceConfiguration,
        renderer: &'a mut DispersionRenderer,
    ) -> Self {
        Self {
            device,
            queue,
            surface,
            config,
            renderer,
            output: None,
            encoder: None,
            instance_count: 0,
            submitted: false,
        }
    }

    /// The presented surface texture, once the composite pass was submitted.
    /// The host draws any overlay into it and presents it.
    pub fn into_output(self) -> Option<wgpu::SurfaceTexture> {
        if !self.submitted {
            return None;
        }
        self.output
    }

    fn acquire_surface(&mut self) -> Result<(), FrameError> {
        match self.surface.get_current_texture() {
            Ok(texture) => {
                self.output = Some(texture);
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.device, self.config);
                Err(FrameError::SurfaceOutdated)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(FrameError::ContextLost),
            Err(e) => Err(FrameError::Surface(e.to_string())),
        }
    }
}

impl RenderBackend for WgpuFrame<'_> {
    type Scene = PrismScene;
    type Camera = OrbitCamera;

    fn resize(&mut self, resolution: OutputResolution) {
        self.renderer.resize(self.device, resolution);
    }

    fn capture(&mut self, scene: &PrismScene, camera: &OrbitCamera) -> Result<CaptureHandle, FrameError> {
        if scene.refractive_visible() {
            return Err(FrameError::CaptureFeedback);
        }
        self.acquire_surface()?;

        // One write per frame: both passes read it from the same submission.
        self.renderer.write_camera(self.queue, camera, scene);
        self.instance_count = self.renderer.write_instances(self.queue, scene);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("prism_frame_encoder"),
            });
        {
            let renderer = &mut *self.renderer;
            let Some(mut pass) = renderer.capture.begin_pass(&mut encoder, CLEAR_COLOR) else {
                return Err(FrameError::ContextLost);
            };
            let renderer = &*renderer;
            renderer.draw_scene(&mut pass, scene, self.instance_count);
        }
        self.encoder = Some(encoder);

        self.renderer.capture.finish().ok_or(FrameError::ContextLost)
    }

    fn composite(
        &mut self,
        scene: &PrismScene,
        _camera: &OrbitCamera,
        material: &DispersionMaterial,
    ) -> Result<(), FrameError> {
        let (Some(mut encoder), Some(output)) = (self.encoder.take(), self.output.as_ref()) else {
            return Err(FrameError::ContextLost);
        };

        self.renderer.bind_material(self.device, self.queue, material);

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.renderer.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            self.renderer
                .draw_scene(&mut pass, scene, self.instance_count);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.submitted = true;
        Ok(())
    }
}
