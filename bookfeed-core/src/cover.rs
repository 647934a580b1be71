//! Cover and thumbnail derivation
//!
//! The representative book's embedded cover is decoded, normalized to RGB and
//! published as `{content_id}.{ext}`. Covers wider than
//! [`THUMBNAIL_THRESHOLD`] also get a `{content_id}.thumbnail.jpeg` scaled to
//! [`THUMBNAIL_WIDTH`]; narrower covers serve as their own thumbnail.

use crate::book::BookFile;
use crate::error::CoverError;
use crate::mime;
use crate::sniff::Sniffer;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

pub const THUMBNAIL_THRESHOLD: u32 = 160;
pub const THUMBNAIL_WIDTH: u32 = 128;

/// Extension used when the cover's MIME type is not a usable `image/*` type
pub const FALLBACK_EXTENSION: &str = "jpeg";

/// A file published next to the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name relative to the output directory
    pub href: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArtifacts {
    pub cover: Artifact,
    pub thumbnail: Artifact,
}

/// Publishes covers into the output directory
pub struct CoverPublisher<'a> {
    sniffer: &'a Sniffer,
    output_dir: &'a Path,
}

impl<'a> CoverPublisher<'a> {
    pub fn new(sniffer: &'a Sniffer, output_dir: &'a Path) -> Self {
        Self { sniffer, output_dir }
    }

    /// Derive the cover and thumbnail of `file`
    ///
    /// `Ok(None)` when the book has no extractable cover. On error nothing is
    /// left behind in the output directory.
    pub fn publish(
        &self,
        file: &mut dyn BookFile,
        content_id: &str,
        working_dir: &Path,
    ) -> Result<Option<CoverArtifacts>, CoverError> {
        let name = match file.extract_cover(working_dir) {
            Some(name) => name,
            None => return Ok(None),
        };

        let mut written = Vec::new();
        let result = self.derive(&working_dir.join(name), content_id, working_dir, &mut written);
        if result.is_err() {
            for path in written {
                let _ = std::fs::remove_file(path);
            }
        }
        result.map(Some)
    }

    fn derive(
        &self,
        source: &Path,
        content_id: &str,
        working_dir: &Path,
        written: &mut Vec<std::path::PathBuf>,
    ) -> Result<CoverArtifacts, CoverError> {
        let image = image::load_from_memory(&std::fs::read(source)?)?;
        let image = DynamicImage::ImageRgb8(image.to_rgb8());

        let detected = self.sniffer.classify(source);
        let (extension, mime_type) = match image_extension(&detected) {
            Some(extension) => (extension.to_string(), detected.clone()),
            None => (FALLBACK_EXTENSION.to_string(), mime::JPEG.to_string()),
        };

        let cover_name = format!("{}.{}", content_id, extension);
        let cover_path = self.output_dir.join(&cover_name);
        written.push(cover_path.clone());
        match ImageFormat::from_mime_type(&mime_type) {
            Some(format) => {
                if let Err(e) = image.save_with_format(&cover_path, format) {
                    tracing::debug!("Cannot re-encode cover as {}: {}; copying it as is", mime_type, e);
                    std::fs::copy(source, &cover_path)?;
                }
            }
            None => {
                std::fs::copy(source, &cover_path)?;
            }
        }
        let cover = Artifact {
            href: cover_name,
            mime_type,
        };

        let (width, height) = image.dimensions();
        if width <= THUMBNAIL_THRESHOLD {
            return Ok(CoverArtifacts {
                thumbnail: cover.clone(),
                cover,
            });
        }

        let thumbnail_height = thumbnail_height(width, height);
        let scratch = working_dir.join(format!("{}.thumbnail.jpeg", content_id));
        image
            .resize_exact(THUMBNAIL_WIDTH, thumbnail_height, FilterType::Lanczos3)
            .save_with_format(&scratch, ImageFormat::Jpeg)?;

        let thumbnail_name = format!("{}.thumbnail.jpeg", content_id);
        let thumbnail_path = self.output_dir.join(&thumbnail_name);
        written.push(thumbnail_path.clone());
        std::fs::copy(&scratch, &thumbnail_path)?;

        Ok(CoverArtifacts {
            cover,
            thumbnail: Artifact {
                href: thumbnail_name,
                mime_type: mime::JPEG.to_string(),
            },
        })
    }
}

/// Extension for an `image/*` MIME type, `None` if it is anything else
fn image_extension(mime_type: &str) -> Option<&str> {
    mime_type
        .strip_prefix("image/")
        .filter(|subtype| subtype.len() > 1)
}

/// Height that keeps the aspect ratio at [`THUMBNAIL_WIDTH`], rounded half up
fn thumbnail_height(width: u32, height: u32) -> u32 {
    let scaled = f64::from(THUMBNAIL_WIDTH) * f64::from(height) / f64::from(width);
    (scaled.round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::ResolvedBook;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    struct CoverOnly {
        book: ResolvedBook,
        cover: Option<Vec<u8>>,
    }

    impl BookFile for CoverOnly {
        fn book(&self) -> &ResolvedBook {
            &self.book
        }

        fn extract_cover(&mut self, working_dir: &Path) -> Option<String> {
            let data = self.cover.as_ref()?;
            std::fs::write(working_dir.join("0.cover"), data).ok()?;
            Some("0.cover".to_string())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40])))
            .write_to(&mut data, ImageFormat::Png)
            .unwrap();
        data.into_inner()
    }

    fn book_with_cover(cover: Option<Vec<u8>>) -> CoverOnly {
        CoverOnly {
            book: ResolvedBook::new("/tmp/0", "http://x/0", mime::FB2),
            cover,
        }
    }

    struct Dirs {
        work: TempDir,
        out: TempDir,
    }

    fn dirs() -> Dirs {
        Dirs {
            work: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
        }
    }

    #[test]
    fn test_wide_cover_gets_thumbnail() {
        let dirs = dirs();
        let sniffer = Sniffer::default();
        let publisher = CoverPublisher::new(&sniffer, dirs.out.path());
        let mut file = book_with_cover(Some(png(300, 200)));

        let artifacts = publisher
            .publish(&mut file, "abc", dirs.work.path())
            .unwrap()
            .unwrap();

        assert_eq!(artifacts.cover.href, "abc.png");
        assert_eq!(artifacts.cover.mime_type, "image/png");
        assert_eq!(artifacts.thumbnail.href, "abc.thumbnail.jpeg");
        assert_eq!(artifacts.thumbnail.mime_type, mime::JPEG);

        let thumbnail = image::open(dirs.out.path().join("abc.thumbnail.jpeg")).unwrap();
        assert_eq!(thumbnail.dimensions(), (128, 85));
        assert!(dirs.out.path().join("abc.png").exists());
    }

    #[test]
    fn test_narrow_cover_is_its_own_thumbnail() {
        let dirs = dirs();
        let sniffer = Sniffer::default();
        let publisher = CoverPublisher::new(&sniffer, dirs.out.path());
        let mut file = book_with_cover(Some(png(160, 240)));

        let artifacts = publisher
            .publish(&mut file, "abc", dirs.work.path())
            .unwrap()
            .unwrap();

        assert_eq!(artifacts.thumbnail, artifacts.cover);
        assert!(!dirs.out.path().join("abc.thumbnail.jpeg").exists());
    }

    #[test]
    fn test_missing_cover() {
        let dirs = dirs();
        let sniffer = Sniffer::default();
        let publisher = CoverPublisher::new(&sniffer, dirs.out.path());
        let mut file = book_with_cover(None);

        assert_eq!(publisher.publish(&mut file, "abc", dirs.work.path()).unwrap(), None);
    }

    #[test]
    fn test_undecodable_cover_leaves_nothing() {
        let dirs = dirs();
        let sniffer = Sniffer::default();
        let publisher = CoverPublisher::new(&sniffer, dirs.out.path());
        let mut file = book_with_cover(Some(b"not an image".to_vec()));

        assert!(publisher.publish(&mut file, "abc", dirs.work.path()).is_err());
        assert_eq!(std::fs::read_dir(dirs.out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("image/"), None);
        assert_eq!(image_extension("image/x"), None);
        assert_eq!(image_extension("application/octet-stream"), None);
    }

    #[test]
    fn test_thumbnail_height_rounds() {
        assert_eq!(thumbnail_height(300, 200), 85);
        assert_eq!(thumbnail_height(256, 1), 1);
        assert_eq!(thumbnail_height(200, 300), 192);
        assert_eq!(thumbnail_height(1000, 3), 1);
    }
}
