//! Decoded images and their GPU counterparts.
//!
//! [`DecodedImage`] is the backend-agnostic result of the asset loader.
//! [`Texture`] wraps the wgpu objects created from it by the wgpu backend.

use anyhow::Context as _;
use image::GenericImageView;

/// An RGBA8 image in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    /// Path the image was requested under.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    /// Decode raw file contents (PNG, JPEG, ...). The format is sniffed.
    pub fn from_bytes(bytes: &[u8], source: &str) -> anyhow::Result<Self> {
        let img = image::load_from_memory(bytes)
            .with_context(|| format!("could not decode image `{source}`"))?;
        let (width, height) = img.dimensions();
        Ok(Self {
            source: source.to_string(),
            width,
            height,
            rgba: img.to_rgba8().into_raw(),
        })
    }

    /// A single-colour image, used as a stand-in by tests and the backend.
    pub fn solid(source: &str, width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            source: source.to_string(),
            width,
            height,
            rgba: rgba
                .iter()
                .copied()
                .cycle()
                .take(width as usize * height as usize * 4)
                .collect(),
        }
    }
}

/// A GPU texture with a view and sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Depth buffer matching a surface of `size` physical pixels.
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_default_sampler(device);
        Self {
            texture,
            view,
            sampler,
        }
    }

    pub fn from_decoded(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &DecodedImage,
    ) -> anyhow::Result<Self> {
        let expected = image.width as usize * image.height as usize * 4;
        if image.width == 0 || image.height == 0 || image.rgba.len() != expected {
            anyhow::bail!(
                "image `{}` has {} bytes for {}x{} pixels",
                image.source,
                image.rgba.len(),
                image.width,
                image.height
            );
        }
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&image.source),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &image.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_default_sampler(device);
        Ok(Self {
            texture,
            view,
            sampler,
        })
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_image_has_one_pixel_per_texel() {
        let img = DecodedImage::solid("bg", 3, 2, [1, 2, 3, 4]);
        assert_eq!(img.rgba.len(), 3 * 2 * 4);
        assert_eq!(&img.rgba[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn garbage_bytes_do_not_decode() {
        let err = DecodedImage::from_bytes(b"not an image", "broken.jpg").unwrap_err();
        assert!(err.to_string().contains("broken.jpg"));
    }

    #[test]
    fn png_round_trips_dimensions() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(4, 3, image::Rgba([9, 8, 7, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let img = DecodedImage::from_bytes(&png, "tiny.png").unwrap();
        assert_eq!((img.width, img.height), (4, 3));
        assert_eq!(&img.rgba[..4], &[9, 8, 7, 255]);
    }
}
