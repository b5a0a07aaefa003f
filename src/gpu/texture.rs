//! Offscreen render targets.

/// Depth format used by every render target.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A color texture, an optional depth texture, and their default views.
///
/// The color texture is created with `RENDER_ATTACHMENT | TEXTURE_BINDING |
/// COPY_SRC` usage, making it suitable for read-back or compositing.
pub struct RenderTarget {
    /// Color texture.
    pub texture: wgpu::Texture,
    /// Full view of the color texture.
    pub view: wgpu::TextureView,
    /// Depth view, when the target was created with depth.
    pub depth_view: Option<wgpu::TextureView>,
    /// Color format.
    pub format: wgpu::TextureFormat,
}

impl RenderTarget {
    /// Create a render target with the given dimensions and color format.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        with_depth: bool,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("RenderTarget"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = with_depth.then(|| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("RenderTarget Depth"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });
        Self {
            texture,
            view,
            depth_view,
            format,
        }
    }
}
