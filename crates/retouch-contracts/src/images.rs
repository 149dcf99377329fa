use std::path::{Path, PathBuf};
use std::thread;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid file type. Please upload a JPG, PNG, or WEBP image. ({0})")]
    UnsupportedType(String),

    #[error("failed reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid data url: {0}")]
    InvalidDataUrl(String),

    #[error("image conversion failed: {0}")]
    Conversion(String),
}

/// Raw image payload plus its mime type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Reads a local image, rejecting anything that is not PNG, JPEG or WEBP.
    pub fn from_path(path: &Path) -> Result<Self, ImageError> {
        let declared = mime_for_path(path)
            .ok_or_else(|| ImageError::UnsupportedType(path.display().to_string()))?;
        let bytes = std::fs::read(path).map_err(|source| ImageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mime_type = verify_mime(&bytes, declared, &path.display().to_string())?;
        Ok(Self { bytes, mime_type })
    }

    pub fn from_data_url(url: &str) -> Result<Self, ImageError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| ImageError::InvalidDataUrl("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ImageError::InvalidDataUrl("missing payload separator".to_string()))?;
        let declared = header.strip_suffix(";base64").ok_or_else(|| {
            ImageError::InvalidDataUrl("only base64 data urls are supported".to_string())
        })?;
        let declared = normalize_mime(declared)
            .ok_or_else(|| ImageError::UnsupportedType(declared.to_string()))?;
        let bytes = BASE64
            .decode(payload.trim().as_bytes())
            .map_err(|err| ImageError::InvalidDataUrl(err.to_string()))?;
        let mime_type = verify_mime(&bytes, declared, declared)?;
        Ok(Self { bytes, mime_type })
    }

    /// Accepts either a `data:` URL or a local path.
    pub fn from_url(url: &str) -> Result<Self, ImageError> {
        if url.starts_with("data:") {
            Self::from_data_url(url)
        } else {
            Self::from_path(Path::new(url))
        }
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// Loads several images concurrently; any single failure fails the batch.
pub fn load_all<P: AsRef<Path> + Sync>(paths: &[P]) -> Result<Vec<ImageData>, ImageError> {
    thread::scope(|scope| {
        let handles = paths
            .iter()
            .map(|path| scope.spawn(move || ImageData::from_path(path.as_ref())))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(ImageError::Conversion("image reader panicked".to_string()))
                })
            })
            .collect()
    })
}

/// Pins a local path to the current directory so it still resolves when the
/// history is reopened from elsewhere. `data:` URLs pass through unchanged.
pub fn absolute_url(url: &str) -> Result<String, ImageError> {
    if url.starts_with("data:") {
        return Ok(url.to_string());
    }
    let absolute = std::path::absolute(url).map_err(|source| ImageError::Read {
        path: PathBuf::from(url),
        source,
    })?;
    Ok(absolute.to_string_lossy().to_string())
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

fn normalize_mime(raw: &str) -> Option<&'static str> {
    let lowered = raw.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/png" => Some("image/png"),
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/webp" => Some("image/webp"),
        _ => None,
    }
}

/// Prefers the sniffed format over the declared one; unknown magic keeps the
/// declared type.
fn verify_mime(bytes: &[u8], declared: &'static str, label: &str) -> Result<String, ImageError> {
    let Ok(format) = image::guess_format(bytes) else {
        return Ok(declared.to_string());
    };
    let sniffed = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        other => {
            return Err(ImageError::UnsupportedType(format!(
                "{label} is {}",
                other.to_mime_type()
            )))
        }
    };
    Ok(sniffed.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{absolute_url, load_all, mime_for_path, ImageData, ImageError};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
    const GIF_MAGIC: &[u8] = b"GIF89a\x01\x00\x01\x00";

    #[test]
    fn absolute_url_pins_relative_paths_only() -> anyhow::Result<()> {
        let relative = absolute_url("s/x.png")?;
        assert!(Path::new(&relative).is_absolute());
        assert_eq!(Path::new(&relative), std::env::current_dir()?.join("s/x.png"));

        let temp = tempfile::tempdir()?;
        let already = temp.path().join("x.png").to_string_lossy().to_string();
        assert_eq!(absolute_url(&already)?, already);
        assert_eq!(absolute_url("data:image/png;base64,AAAA")?, "data:image/png;base64,AAAA");
        Ok(())
    }

    #[test]
    fn mime_detection_covers_supported_extensions() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.jpg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("a.webp")), Some("image/webp"));
        assert_eq!(mime_for_path(Path::new("a.gif")), None);
        assert_eq!(mime_for_path(Path::new("noext")), None);
    }

    #[test]
    fn unsupported_extension_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("anim.gif");
        std::fs::write(&path, GIF_MAGIC)?;
        let err = ImageData::from_path(&path).err();
        assert!(matches!(err, Some(ImageError::UnsupportedType(_))));
        Ok(())
    }

    #[test]
    fn mislabelled_gif_is_rejected_by_magic() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("anim.png");
        std::fs::write(&path, GIF_MAGIC)?;
        let err = ImageData::from_path(&path).err();
        assert!(matches!(err, Some(ImageError::UnsupportedType(_))));
        Ok(())
    }

    #[test]
    fn sniffed_format_wins_over_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.jpg");
        std::fs::write(&path, PNG_MAGIC)?;
        let image = ImageData::from_path(&path)?;
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.extension(), "png");
        Ok(())
    }

    #[test]
    fn data_url_decodes_and_reencodes() -> anyhow::Result<()> {
        let image = ImageData::new(PNG_MAGIC.to_vec(), "image/png");
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(ImageData::from_url(&url)?, image);
        Ok(())
    }

    #[test]
    fn malformed_data_urls_are_rejected() {
        assert!(matches!(
            ImageData::from_data_url("data:image/png,plain"),
            Err(ImageError::InvalidDataUrl(_))
        ));
        assert!(matches!(
            ImageData::from_data_url("data:image/gif;base64,R0lG"),
            Err(ImageError::UnsupportedType(_))
        ));
        assert!(matches!(
            ImageData::from_data_url("data:image/png;base64,***"),
            Err(ImageError::InvalidDataUrl(_))
        ));
    }

    #[test]
    fn load_all_preserves_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = temp.path().join("first.png");
        let second = temp.path().join("second.webp");
        std::fs::write(&first, PNG_MAGIC)?;
        std::fs::write(&second, b"not-sniffable")?;
        let images = load_all(&[first, second])?;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].mime_type, "image/png");
        assert_eq!(images[1].mime_type, "image/webp");
        Ok(())
    }

    #[test]
    fn load_all_fails_when_any_image_fails() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let good = temp.path().join("good.png");
        std::fs::write(&good, PNG_MAGIC)?;
        let missing = temp.path().join("missing.png");
        let result = load_all(&[good, missing]);
        assert!(matches!(result, Err(ImageError::Read { .. })));
        Ok(())
    }
}
