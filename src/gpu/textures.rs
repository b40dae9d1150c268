use crate::errors::{Result, VrsError};
use crate::resources::Extent;

/// A 2D texture and its default view.
#[derive(Debug)]
pub struct GpuImage {
    pub label: &'static str,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub extent: Extent,
}

impl GpuImage {
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        extent: Extent,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent_3d(extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            label,
            texture,
            view,
            extent,
        }
    }

    fn copy_info(&self) -> wgpu::TexelCopyTextureInfo<'_> {
        wgpu::TexelCopyTextureInfo {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        }
    }
}

#[inline]
#[must_use]
pub fn extent_3d(extent: Extent) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: 1,
    }
}

/// Records a full-image copy from `src` into `dst`.
pub fn copy_image(encoder: &mut wgpu::CommandEncoder, src: &GpuImage, dst: &GpuImage) -> Result<()> {
    if src.extent != dst.extent {
        return Err(VrsError::ExtentMismatch {
            image: dst.label,
            detail: format!(
                "source {}x{}, destination {}x{}",
                src.extent.width, src.extent.height, dst.extent.width, dst.extent.height
            ),
        });
    }
    encoder.copy_texture_to_texture(src.copy_info(), dst.copy_info(), extent_3d(src.extent));
    Ok(())
}

/// Fills an `R32Uint` image with `value`.
pub fn fill_u32(queue: &wgpu::Queue, image: &GpuImage, value: u32) {
    let texels = vec![value; image.extent.area()];
    queue.write_texture(
        image.copy_info(),
        bytemuck::cast_slice(&texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(image.extent.width * 4),
            rows_per_image: Some(image.extent.height),
        },
        extent_3d(image.extent),
    );
}
