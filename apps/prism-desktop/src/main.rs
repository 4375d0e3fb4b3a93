use anyhow::{Context as _, Result};
use clap::Parser;
use egui::Context as EguiContext;
use prism_dispersion::{
    Band, DispersionParams, FrameContext, FrameError, FrameOrchestrator, FrameOutcome,
    ParamUpdate, Viewport,
};
use prism_render_wgpu::{DispersionRenderer, OrbitCamera, PrismScene, WgpuFrame};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "prism-desktop", about = "Prism dispersion viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML parameter file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Logical window width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Logical window height
    #[arg(long, default_value = "720")]
    height: u32,
}

/// Saturation slider span: 0 is grayscale, 1 unchanged, above 1 boosted.
const SATURATION_RANGE: std::ops::RangeInclusive<f32> = 0.0..=1.5;

/// Host-side state: scene, camera and the parameters being edited.
struct AppState {
    orchestrator: FrameOrchestrator,
    scene: PrismScene,
    camera: OrbitCamera,
    /// Working copy behind the sliders; queued as an update when it changes.
    draft: DispersionParams,
    defaults: DispersionParams,
    param_error: Option<String>,
    last_skip: Option<FrameError>,
    show_panel: bool,
    orbiting: bool,
    last_frame: Instant,
}

impl AppState {
    fn new(params: DispersionParams, viewport: Viewport) -> Result<Self> {
        let orchestrator = FrameOrchestrator::new(params, viewport)
            .context("invalid dispersion parameters")?;
        Ok(Self {
            orchestrator,
            scene: PrismScene::default(),
            camera: OrbitCamera::default(),
            draft: params,
            defaults: params,
            param_error: None,
            last_skip: None,
            show_panel: true,
            orbiting: false,
            last_frame: Instant::now(),
        })
    }

    fn update(&mut self, dt: f32) {
        self.scene.advance(dt);
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if !pressed {
            return;
        }
        match key {
            KeyCode::F1 => self.show_panel = !self.show_panel,
            KeyCode::KeyR => self.reset_params(),
            _ => {}
        }
    }

    fn reset_params(&mut self) {
        self.draft = self.defaults;
        self.queue_draft();
    }

    fn queue_draft(&mut self) {
        match self
            .orchestrator
            .queue_update(ParamUpdate::replace_all(&self.draft))
        {
            Ok(()) => self.param_error = None,
            Err(e) => {
                tracing::warn!("rejected parameter update: {e}");
                self.param_error = Some(e.to_string());
            }
        }
    }

    fn draw_ui(&mut self, ctx: &EguiContext) {
        if !self.show_panel {
            return;
        }

        let before = self.draft;
        let stats = self.orchestrator.stats();
        let resolution = self.orchestrator.material().output_resolution();

        egui::SidePanel::left("dispersion")
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading("Prism");
                ui.separator();
                ui.label(format!(
                    "Output: {} x {}",
                    resolution.width(),
                    resolution.height()
                ));
                ui.label(format!(
                    "Frames: {} presented, {} skipped",
                    stats.presented, stats.skipped
                ));
                if let Some(err) = &self.last_skip {
                    ui.small(format!("Last skip: {err}"));
                }
                ui.separator();

                ui.heading("Refraction");
                for band in Band::ALL {
                    let mut ior = self.draft.ior(band);
                    ui.add(egui::Slider::new(&mut ior, 1.0..=2.333).text(format!("IOR {band}")));
                    self.draft.set_ior(band, ior);
                }
                ui.add(egui::Slider::new(&mut self.draft.refract_power, 0.0..=1.0).text("Refract power"));
                ui.add(
                    egui::Slider::new(&mut self.draft.chromatic_aberration, 0.0..=1.5)
                        .text("Chromatic aberration"),
                );
                ui.add(egui::Slider::new(&mut self.draft.saturation, SATURATION_RANGE).text("Saturation"));
                ui.add(egui::Slider::new(&mut self.draft.band_samples, 1..=64).text("Band samples"));
                ui.separator();

                ui.heading("Lighting");
                ui.add(egui::Slider::new(&mut self.draft.shininess, 1.0..=100.0).text("Shininess"));
                ui.add(egui::Slider::new(&mut self.draft.diffuseness, 0.0..=1.0).text("Diffuseness"));
                ui.add(egui::Slider::new(&mut self.draft.fresnel_power, 1.0..=15.0).text("Fresnel power"));
                ui.label("Light direction:");
                ui.horizontal(|ui| {
                    let light = &mut self.draft.light_direction;
                    ui.add(egui::DragValue::new(&mut light.x).prefix("X: ").speed(0.05));
                    ui.add(egui::DragValue::new(&mut light.y).prefix("Y: ").speed(0.05));
                    ui.add(egui::DragValue::new(&mut light.z).prefix("Z: ").speed(0.05));
                });
                ui.separator();

                ui.heading("Scene");
                ui.add(egui::Slider::new(&mut self.scene.spin, 0.0..=2.0).text("Spin (rad/s)"));
                if ui.button("Reset parameters (R)").clicked() {
                    self.draft = self.defaults;
                }

                if let Some(err) = &self.param_error {
                    ui.colored_label(egui::Color32::LIGHT_RED, err);
                }

                ui.separator();
                ui.small("F1: Toggle panel | RMB: Orbit | Wheel: Zoom");
            });

        if self.draft != before {
            self.queue_draft();
        }
    }

    fn record_outcome(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Presented => {}
            FrameOutcome::Skipped(err) => {
                tracing::debug!("frame skipped: {err}");
                self.last_skip = Some(err);
            }
        }
    }
}

/// GPU resources that exist once the window does.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    renderer: DispersionRenderer,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Gpu {
    fn new(event_loop: &ActiveEventLoop, egui_ctx: &EguiContext, size: LogicalSize<u32>) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title("Prism")
            .with_inner_size(size);
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no compatible graphics adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("prism_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let viewport = viewport_of(&window);
        let resolution = viewport.output_resolution();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: resolution.width(),
            height: resolution.height(),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let renderer = DispersionRenderer::new(&device, &queue, surface_format, resolution)?;

        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            renderer,
            egui_winit,
            egui_renderer,
        })
    }

    /// Follow a window size or scale change: reconfigure the surface at the
    /// output resolution and hand the new viewport to the orchestrator.
    fn resize(&mut self, state: &mut AppState) {
        let viewport = viewport_of(&self.window);
        let resolution = viewport.output_resolution();
        self.config.width = resolution.width();
        self.config.height = resolution.height();
        self.surface.configure(&self.device, &self.config);
        state.camera.aspect = resolution.aspect();
        state.orchestrator.notify_resize(viewport);
    }

    fn draw_overlay(
        &mut self,
        egui_ctx: &EguiContext,
        state: &mut AppState,
        view: &wgpu::TextureView,
    ) {
        let raw_input = self.egui_winit.take_egui_input(&self.window);
        let full_output = egui_ctx.run(raw_input, |ctx| {
            state.draw_ui(ctx);
        });

        self.egui_winit
            .handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);

        // The surface can be smaller than the window when the pixel ratio is
        // clamped; scale egui's points to match.
        let physical_width = self.window.inner_size().width.max(1) as f32;
        let surface_scale = self.config.width as f32 / physical_width;
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: full_output.pixels_per_point * surface_scale,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            self.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

fn viewport_of(window: &Window) -> Viewport {
    let size = window.inner_size();
    Viewport::from_physical(size.width, size.height, window.scale_factor())
}

struct GpuApp {
    state: AppState,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    window_size: LogicalSize<u32>,
}

impl GpuApp {
    fn redraw(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        let now = Instant::now();
        let dt = (now - self.state.last_frame).as_secs_f32().min(0.1);
        self.state.last_frame = now;
        self.state.update(dt);

        let mut frame = WgpuFrame::new(
            &gpu.device,
            &gpu.queue,
            &gpu.surface,
            &gpu.config,
            &mut gpu.renderer,
        );
        let outcome = self.state.orchestrator.run_frame(FrameContext {
            backend: &mut frame,
            scene: &mut self.state.scene,
            camera: &self.state.camera,
        });
        let output = frame.into_output();
        self.state.record_outcome(outcome);

        if let Some(output) = output {
            let view = output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            gpu.draw_overlay(&self.egui_ctx, &mut self.state, &view);
            output.present();
        }
        gpu.window.request_redraw();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match Gpu::new(event_loop, &self.egui_ctx, self.window_size) {
            Ok(mut gpu) => {
                gpu.resize(&mut self.state);
                self.gpu = Some(gpu);
            }
            Err(e) => {
                tracing::error!("failed to initialize graphics: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(&mut self.state);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.state
                    .handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state: btn_state,
                ..
            } => {
                self.state.orbiting = btn_state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                self.state.camera.zoom(lines);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.orbiting {
                self.state.camera.rotate(delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    tracing::info!("prism-desktop starting");

    let params = match &cli.config {
        Some(path) => DispersionParams::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DispersionParams::default(),
    };

    let window_size = LogicalSize::new(cli.width.max(1), cli.height.max(1));
    // Replaced by the window's real viewport once it exists.
    let viewport = Viewport::new(window_size.width as f64, window_size.height as f64, 1.0);
    let state = AppState::new(params, viewport)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp {
        state,
        gpu: None,
        egui_ctx: EguiContext::default(),
        window_size,
    };
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_slider_reaches_grayscale_and_default() {
        assert!(SATURATION_RANGE.contains(&0.0));
        assert!(SATURATION_RANGE.contains(&1.0));
        assert!(SATURATION_RANGE.contains(&DispersionParams::default().saturation));

        for saturation in [*SATURATION_RANGE.start(), *SATURATION_RANGE.end()] {
            let params = DispersionParams {
                saturation,
                ..DispersionParams::default()
            };
            assert!(params.validate().is_ok());
        }
    }
}
