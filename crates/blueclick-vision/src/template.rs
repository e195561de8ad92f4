use std::path::{Path, PathBuf};

use image::imageops;
use image::{DynamicImage, GrayImage, RgbImage};
use tracing::{debug, warn};

use crate::error::TemplateError;

/// Reference image searched for on screen
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    path: Option<PathBuf>,
    color: RgbImage,
    gray: GrayImage,
}

impl Template {
    pub fn from_image(name: impl Into<String>, image: DynamicImage) -> Result<Self, TemplateError> {
        let name = name.into();
        if image.width() == 0 || image.height() == 0 {
            return Err(TemplateError::Empty(name));
        }

        // Alpha is dropped; transparent pixels match whatever color they carry
        let color = image.to_rgb8();
        let gray = imageops::grayscale(&color);
        Ok(Self {
            name,
            path: None,
            color,
            gray,
        })
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let image = image::open(path).map_err(|source| TemplateError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut template = Self::from_image(name, image)?;
        template.path = Some(path.to_path_buf());
        debug!(
            "Loaded template {} ({}x{})",
            path.display(),
            template.width(),
            template.height()
        );
        Ok(template)
    }

    /// Decode an encoded image (PNG, BMP, ...) held in memory
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, TemplateError> {
        let name = name.into();
        let image = image::load_from_memory(bytes).map_err(|source| TemplateError::Decode {
            name: name.clone(),
            source,
        })?;
        Self::from_image(name, image)
    }

    /// Load every readable template; failures are logged and skipped
    pub fn load_all(paths: &[PathBuf]) -> Vec<Template> {
        paths
            .iter()
            .filter_map(|path| match Self::load(path) {
                Ok(template) => Some(template),
                Err(e) => {
                    warn!("Skipping template: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.color.width()
    }

    pub fn height(&self) -> u32 {
        self.color.height()
    }

    pub fn color(&self) -> &RgbImage {
        &self.color
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn checker() -> RgbImage {
        RgbImage::from_fn(8, 6, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([0, 0, 255])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn test_from_bytes_png() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(checker())
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let template = Template::from_bytes("embedded", &png).unwrap();
        assert_eq!((template.width(), template.height()), (8, 6));
        assert_eq!(template.color().get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(template.gray().dimensions(), (8, 6));
        assert!(template.path().is_none());
    }

    #[test]
    fn test_load_all_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("button.png");
        checker().save(&good).unwrap();
        let bad = dir.path().join("broken.png");
        std::fs::write(&bad, b"not an image").unwrap();
        let missing = dir.path().join("missing.png");

        let templates = Template::load_all(&[bad, good.clone(), missing]);
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name(), "button.png");
        assert_eq!(templates[0].path(), Some(good.as_path()));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            Template::from_bytes("x", b"\x00\x01"),
            Err(TemplateError::Decode { .. })
        ));
    }
}
