use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use retouch_contracts::images::ImageData;
use sha2::{Digest, Sha256};

use crate::adapter::{EditAdapter, EditFailure, EditRequest};

const DEFAULT_SIDE: u32 = 256;
const MAX_SIDE: u32 = 2048;

/// Offline adapter: answers every request with a solid-colour PNG derived from
/// the prompt and inputs, sized like the source image when it can be decoded.
pub struct DryrunAdapter;

impl EditAdapter for DryrunAdapter {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn edit(&self, request: &EditRequest) -> Result<ImageData, EditFailure> {
        let (width, height) = request
            .images
            .first()
            .and_then(|source| image::load_from_memory(&source.bytes).ok())
            .map(|decoded| {
                (
                    decoded.width().clamp(1, MAX_SIDE),
                    decoded.height().clamp(1, MAX_SIDE),
                )
            })
            .unwrap_or((DEFAULT_SIDE, DEFAULT_SIDE));
        let (r, g, b) = color_for_request(request);
        let mut canvas = RgbImage::new(width, height);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| EditFailure::TransportError(format!("dryrun encode failed: {err}")))?;
        Ok(ImageData::new(bytes, "image/png"))
    }
}

fn color_for_request(request: &EditRequest) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(request.prompt.as_bytes());
    for image in &request.images {
        hasher.update((image.bytes.len() as u64).to_be_bytes());
    }
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage};
    use retouch_contracts::images::ImageData;

    use super::DryrunAdapter;
    use crate::adapter::{EditAdapter, EditRequest};

    fn request(prompt: &str, images: Vec<ImageData>) -> EditRequest {
        EditRequest {
            model: "dryrun-image-1".to_string(),
            images,
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn generation_returns_default_sized_png() -> anyhow::Result<()> {
        let result = DryrunAdapter.edit(&request("a boat", Vec::new()))?;
        assert_eq!(result.mime_type, "image/png");
        let decoded = image::load_from_memory(&result.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (256, 256));
        Ok(())
    }

    #[test]
    fn edit_matches_source_dimensions() -> anyhow::Result<()> {
        let mut source = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(40, 24))
            .write_to(&mut Cursor::new(&mut source), ImageFormat::Png)?;
        let result = DryrunAdapter.edit(&request(
            "make it blue",
            vec![ImageData::new(source, "image/png")],
        ))?;
        let decoded = image::load_from_memory(&result.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (40, 24));
        Ok(())
    }

    #[test]
    fn output_is_deterministic_per_prompt() -> anyhow::Result<()> {
        let first = DryrunAdapter.edit(&request("a boat", Vec::new()))?;
        let again = DryrunAdapter.edit(&request("a boat", Vec::new()))?;
        let other = DryrunAdapter.edit(&request("a car", Vec::new()))?;
        assert_eq!(first, again);
        assert_ne!(first, other);
        Ok(())
    }
}
