//! Texture data and GPU textures

use image::{DynamicImage, GenericImageView};

use crate::backend::*;
use crate::error::{RenderError, RenderResult};
use crate::graphics::Graphics;

/// Decoded RGBA8 pixels ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> RenderResult<Self> {
        let expected = (width * height * 4) as usize;
        if data.len() != expected {
            return Err(RenderError::ImageSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Convert an already decoded image
    pub fn from_image(img: &DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255])
    }

    pub fn black() -> Self {
        Self::solid_color([0, 0, 0, 255])
    }

    /// Create a checkerboard texture with 8x8 pixel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            data,
        }
    }
}

/// A 2D texture owned by one holder.
///
/// Not `Clone`: duplicating a texture goes through [`Texture2D::copy`],
/// which allocates a new GPU texture.
#[derive(Debug, PartialEq, Eq)]
pub struct Texture2D {
    handle: TextureHandle,
    width: u32,
    height: u32,
}

impl Texture2D {
    /// Upload an image
    pub fn new(
        graphics: &mut Graphics,
        image: &ImageData,
        sampler: SamplerDescriptor,
    ) -> RenderResult<Self> {
        let desc = TextureDescriptor {
            label: Some("texture2d".to_string()),
            width: image.width,
            height: image.height,
            kind: TextureKind::D2,
            sampler,
            ..Default::default()
        };
        let handle = graphics
            .device_mut()
            .create_texture(&desc, Some(&image.data))?;
        Ok(Self {
            handle,
            width: image.width,
            height: image.height,
        })
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Duplicate into an independent GPU texture
    pub fn copy(&self, graphics: &mut Graphics) -> RenderResult<Self> {
        let handle = graphics.device_mut().copy_texture(self.handle)?;
        Ok(Self {
            handle,
            width: self.width,
            height: self.height,
        })
    }

    pub fn dispose(self, graphics: &mut Graphics) {
        graphics.device_mut().destroy_texture(self.handle);
    }
}

/// A cube texture with six square faces
#[derive(Debug, PartialEq, Eq)]
pub struct Cubemap {
    handle: TextureHandle,
    size: u32,
}

impl Cubemap {
    /// Upload six faces in +X, -X, +Y, -Y, +Z, -Z order
    pub fn new(graphics: &mut Graphics, faces: &[ImageData; 6]) -> RenderResult<Self> {
        let size = faces[0].width;
        if faces.iter().any(|f| f.width != size || f.height != size) {
            return Err(RenderError::CubeFaceMismatch);
        }

        let data: Vec<u8> = faces.iter().flat_map(|f| f.data.iter().copied()).collect();
        let desc = TextureDescriptor {
            label: Some("cubemap".to_string()),
            width: size,
            height: size,
            kind: TextureKind::Cube,
            sampler: SamplerDescriptor::clamped(),
            ..Default::default()
        };
        let handle = graphics.device_mut().create_texture(&desc, Some(&data))?;
        Ok(Self { handle, size })
    }

    /// Cube with every face a single color
    pub fn solid_color(graphics: &mut Graphics, color: [u8; 4]) -> RenderResult<Self> {
        let face = ImageData::solid_color(color);
        let faces = [
            face.clone(),
            face.clone(),
            face.clone(),
            face.clone(),
            face.clone(),
            face,
        ];
        Self::new(graphics, &faces)
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Duplicate into an independent GPU texture
    pub fn copy(&self, graphics: &mut Graphics) -> RenderResult<Self> {
        let handle = graphics.device_mut().copy_texture(self.handle)?;
        Ok(Self {
            handle,
            size: self.size,
        })
    }

    pub fn dispose(self, graphics: &mut Graphics) {
        graphics.device_mut().destroy_texture(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphics() -> Graphics {
        Graphics::new(Box::new(DummyBackend::default()))
    }

    #[test]
    fn test_image_size_validated() {
        assert!(ImageData::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            ImageData::new(2, 2, vec![0; 15]),
            Err(RenderError::ImageSize {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn test_from_decoded_image() {
        let img = DynamicImage::new_rgb8(3, 2);
        let data = ImageData::from_image(&img);
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.data.len(), 3 * 2 * 4);
    }

    #[test]
    fn test_checkerboard_cells() {
        let board = ImageData::checkerboard(16, [255; 4], [0; 4]);
        assert_eq!(&board.data[0..4], &[255; 4]);
        let second_cell = (8 * 4) as usize;
        assert_eq!(&board.data[second_cell..second_cell + 4], &[0; 4]);
    }

    #[test]
    fn test_texture_copy_is_independent() {
        let mut graphics = graphics();
        let original = Texture2D::new(
            &mut graphics,
            &ImageData::white(),
            SamplerDescriptor::default(),
        )
        .unwrap();
        let copy = original.copy(&mut graphics).unwrap();
        assert_ne!(copy.handle(), original.handle());

        let original_handle = original.handle();
        original.dispose(&mut graphics);

        let backend = graphics.backend::<DummyBackend>().unwrap();
        assert!(!backend.texture_alive(original_handle));
        assert!(backend.texture_alive(copy.handle()));
    }

    #[test]
    fn test_cube_faces_must_match() {
        let mut graphics = graphics();
        let small = ImageData::solid_color([0; 4]);
        let big = ImageData::checkerboard(2, [0; 4], [0; 4]);
        let faces = [
            small.clone(),
            small.clone(),
            small.clone(),
            small.clone(),
            small,
            big,
        ];
        assert!(matches!(
            Cubemap::new(&mut graphics, &faces),
            Err(RenderError::CubeFaceMismatch)
        ));
        assert!(Cubemap::solid_color(&mut graphics, [10, 20, 30, 255]).is_ok());
    }
}
