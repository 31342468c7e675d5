//! wgpu renderer that draws a single RGBA texture across the whole window.

use std::rc::Rc;

use anyhow::anyhow;
use wgpu::*;
use winit::{
    dpi::PhysicalSize,
    event_loop::EventLoopWindowTarget,
    window::{WindowBuilder, WindowId},
};

use crate::image::Resolution;

/// Handles to the graphics adapter shared by all windows.
pub struct Gpu {
    instance: Instance,
    adapter: Adapter,
    device: Device,
    queue: Queue,
}

impl Gpu {
    pub async fn open() -> anyhow::Result<Self> {
        // GL is left out, it has been seen to panic when windows are created.
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&RequestAdapterOptions::default())
            .await
            .ok_or_else(|| anyhow!("no graphics adapter found"))?;
        let info = adapter.get_info();
        log::info!("rendering on {} ({:?})", info.name, info.backend);

        // Camera frames can exceed the downlevel texture size limit, so take the adapter's.
        let limits = Limits::downlevel_defaults().using_resolution(adapter.limits());
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("handrec"),
                    features: Features::empty(),
                    limits,
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    fn allocate_texture(&self, size: Extent3d) -> wgpu::Texture {
        self.device.create_texture(&TextureDescriptor {
            label: Some("frame"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }
}

/// A fixed-size window showing camera frames.
pub struct Window {
    win: winit::window::Window,
    resolution: Resolution,
}

impl Window {
    pub fn open<T>(
        event_loop: &EventLoopWindowTarget<T>,
        title: &str,
        resolution: Resolution,
    ) -> anyhow::Result<Self> {
        let win = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(resolution.width(), resolution.height()))
            .with_resizable(false)
            .build(event_loop)?;
        Ok(Self { win, resolution })
    }

    pub fn id(&self) -> WindowId {
        self.win.id()
    }
}

/// The texture holding the last frame passed to [`Renderer::update_texture`].
struct FrameTexture {
    texture: wgpu::Texture,
    size: Extent3d,
}

impl FrameTexture {
    /// Copies RGBA8 `data` into the texture. Returns `true` if a new texture was allocated.
    fn upload(&mut self, gpu: &Gpu, size: Extent3d, data: &[u8]) -> bool {
        assert_eq!(
            data.len(),
            size.width as usize * size.height as usize * 4,
            "frame data does not match its size"
        );

        let resized = self.size != size;
        if resized {
            log::trace!("frame texture resized to {}x{}", size.width, size.height);
            self.texture = gpu.allocate_texture(size);
            self.size = size;
        }

        gpu.queue.write_texture(
            self.texture.as_image_copy(),
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: None,
            },
            size,
        );
        resized
    }
}

fn texture_bind_group_layout(device: &Device) -> BindGroupLayout {
    let fragment_entry = |binding, ty| BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty,
        count: None,
    };
    device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("frame"),
        entries: &[
            fragment_entry(
                0,
                BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: false },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
            ),
            fragment_entry(1, BindingType::Sampler(SamplerBindingType::NonFiltering)),
        ],
    })
}

fn texture_bind_group(device: &Device, layout: &BindGroupLayout, frame: &FrameTexture) -> BindGroup {
    let view = frame.texture.create_view(&TextureViewDescriptor::default());
    let sampler = device.create_sampler(&SamplerDescriptor::default());
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("frame"),
        layout,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&view),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(&sampler),
            },
        ],
    })
}

/// Renders a fullscreen triangle sampling the frame texture (see `shader.wgsl`).
fn fullscreen_pipeline(device: &Device, format: TextureFormat, layout: &BindGroupLayout) -> RenderPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("fullscreen"),
        source: ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("fullscreen"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("fullscreen"),
        layout: Some(&pipeline_layout),
        vertex: VertexState {
            module: &shader,
            entry_point: "vert",
            buffers: &[],
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: "frag",
            targets: &[Some(ColorTargetState::from(format))],
        }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview: None,
    })
}

pub struct Renderer {
    gpu: Rc<Gpu>,
    surface: Surface,
    surface_format: TextureFormat,
    pipeline: RenderPipeline,
    layout: BindGroupLayout,
    frame: FrameTexture,
    bind_group: BindGroup,

    // Dropped last: `surface` borrows from it.
    window: Window,
}

impl Renderer {
    pub fn new(window: Window, gpu: Rc<Gpu>) -> anyhow::Result<Self> {
        // Safety: `window` is declared after `surface` in `Renderer`, so it outlives it.
        let surface = unsafe { gpu.instance.create_surface(&window.win)? };
        let surface_format = surface
            .get_capabilities(&gpu.adapter)
            .formats
            .first()
            .copied()
            .ok_or_else(|| anyhow!("window surface is not supported by the adapter"))?;

        let layout = texture_bind_group_layout(&gpu.device);
        let pipeline = fullscreen_pipeline(&gpu.device, surface_format, &layout);
        let size = Extent3d::default();
        let frame = FrameTexture {
            texture: gpu.allocate_texture(size),
            size,
        };
        let bind_group = texture_bind_group(&gpu.device, &layout, &frame);

        let renderer = Self {
            gpu,
            surface,
            surface_format,
            pipeline,
            layout,
            frame,
            bind_group,
            window,
        };
        renderer.configure_surface();
        Ok(renderer)
    }

    pub fn window(&self) -> &winit::window::Window {
        &self.window.win
    }

    pub fn update_texture(&mut self, res: Resolution, data: &[u8]) {
        let size = Extent3d {
            width: res.width(),
            height: res.height(),
            depth_or_array_layers: 1,
        };
        if self.frame.upload(&self.gpu, size, data) {
            self.bind_group = texture_bind_group(&self.gpu.device, &self.layout, &self.frame);
        }
    }

    pub fn redraw(&mut self) {
        let Some(output) = self.acquire() else {
            return;
        };
        let target = output.texture.create_view(&TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&CommandEncoderDescriptor::default());
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("fullscreen"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue.submit([encoder.finish()]);
        output.present();
    }

    /// Gets the next surface texture, reconfiguring the surface once if it went stale.
    fn acquire(&self) -> Option<SurfaceTexture> {
        let err = match self.surface.get_current_texture() {
            Ok(output) => return Some(output),
            Err(err) => err,
        };
        if matches!(err, SurfaceError::Outdated | SurfaceError::Lost) {
            log::debug!("reconfiguring surface: {err}");
            self.configure_surface();
            match self.surface.get_current_texture() {
                Ok(output) => return Some(output),
                Err(err) => log::error!("cannot draw frame after reconfiguring: {err}"),
            }
        } else {
            log::error!("cannot draw frame: {err}");
        }
        None
    }

    fn configure_surface(&self) {
        let res = self.window.resolution;
        let actual = self.window.win.inner_size();
        if (actual.width, actual.height) != (res.width(), res.height()) {
            // Some window managers resize windows regardless of `with_resizable(false)`.
            log::warn!(
                "window is {}x{}, frames are drawn at {res}",
                actual.width,
                actual.height,
            );
        }
        log::debug!("configuring {res} surface ({:?})", self.surface_format);
        self.surface.configure(
            &self.gpu.device,
            &SurfaceConfiguration {
                usage: TextureUsages::RENDER_ATTACHMENT,
                format: self.surface_format,
                width: res.width(),
                height: res.height(),
                present_mode: PresentMode::Fifo,
                alpha_mode: CompositeAlphaMode::Auto,
                view_formats: Vec::new(),
            },
        );
    }
}
