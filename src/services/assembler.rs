// src/services/assembler.rs

//! PDF assembly from lesson images.
//!
//! Descriptors are sorted by the ordering token in their file name before
//! anything is fetched, so page order never depends on which download
//! finishes first. Images are downloaded in small ordered batches,
//! recompressed on the blocking pool and embedded one per page, with each
//! page sized to its image. A failing image costs its page, not the document.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use crate::error::{AppError, Result};
use crate::models::{AssemblerConfig, ImageDescriptor, QualityTier};
use crate::utils::http::{Transport, with_timeout};
use crate::utils::transcode::{EncodedImage, recompress};
use crate::utils::url::sanitize_file_name;

/// A finished document and the images it had to leave out.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub pages: usize,
    /// Names (or URLs) of images that could not be embedded
    pub skipped: Vec<String>,
}

/// File name for a lesson document: `"{group}-{lesson}.pdf"`, stripped of
/// path-hazardous characters.
pub fn document_filename(group: &str, lesson: &str) -> String {
    sanitize_file_name(&format!("{group}-{lesson}.pdf"))
}

/// Builds one PDF per lesson from its image descriptors.
pub struct DocumentAssembler {
    transport: Arc<dyn Transport>,
    config: AssemblerConfig,
}

impl DocumentAssembler {
    pub fn new(transport: Arc<dyn Transport>, config: AssemblerConfig) -> Self {
        Self { transport, config }
    }

    pub async fn assemble(
        &self,
        group: &str,
        lesson: &str,
        descriptors: &[ImageDescriptor],
        tier: QualityTier,
    ) -> Result<AssembledDocument> {
        if descriptors.is_empty() {
            return Err(AppError::EmptyInput);
        }

        let mut ordered = descriptors.to_vec();
        ordered.sort_by_key(ImageDescriptor::order);

        let mut loaded = stream::iter(ordered)
            .map(|descriptor| async move {
                let result = self.load(&descriptor, tier).await;
                (descriptor, result)
            })
            .buffered(self.config.batch_size.max(1));

        let mut pages = Vec::new();
        let mut skipped = Vec::new();
        while let Some((descriptor, result)) = loaded.next().await {
            match result {
                Ok(image) => pages.push(image),
                Err(error) => {
                    log::warn!("[{group} / {lesson}] Skipping page: {error}");
                    skipped.push(Self::label(&descriptor));
                }
            }
        }

        if pages.is_empty() {
            return Err(AppError::document(format!(
                "none of the {} images for {lesson:?} could be embedded",
                descriptors.len()
            )));
        }

        let page_count = pages.len();
        let bytes = tokio::task::spawn_blocking(move || build_pdf(&pages))
            .await
            .map_err(AppError::document)??;

        log::info!(
            "[{group}] Assembled {lesson:?}: {page_count} pages, {} skipped, {} bytes",
            skipped.len(),
            bytes.len()
        );

        Ok(AssembledDocument {
            bytes,
            filename: document_filename(group, lesson),
            pages: page_count,
            skipped,
        })
    }

    /// Fetch and recompress one image.
    async fn load(&self, descriptor: &ImageDescriptor, tier: QualityTier) -> Result<EncodedImage> {
        let label = Self::label(descriptor);
        let url = match (&descriptor.url, descriptor.success) {
            (Some(url), true) => url.clone(),
            _ => {
                let reason = descriptor.error.as_deref().unwrap_or("image was not resolved");
                return Err(AppError::image(label, reason));
            }
        };

        let bytes = with_timeout(
            &url,
            self.config.fetch_timeout_secs,
            self.transport.get_bytes(&url),
        )
        .await
        .map_err(|e| AppError::image(&label, e))?;

        let name = label.clone();
        tokio::task::spawn_blocking(move || recompress(&name, &bytes, tier))
            .await
            .map_err(|e| AppError::image(label, e))?
    }

    fn label(descriptor: &ImageDescriptor) -> String {
        descriptor
            .name
            .clone()
            .or_else(|| descriptor.url.clone())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

fn int(value: u32) -> Object {
    Object::Integer(i64::from(value))
}

/// Serialize pages into a compressed PDF, one image per page.
fn build_pdf(images: &[EncodedImage]) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for image in images {
        let (w, h) = (image.width, image.height);

        // JPEG data is already compressed; keep it out of Flate.
        let xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => int(w),
                "Height" => int(h),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => int(8),
                "Filter" => "DCTDecode",
            },
            image.jpeg.clone(),
        )
        .with_compression(false);
        let image_id = doc.add_object(xobject);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("cm", vec![int(w), int(0), int(0), int(h), int(0), int(0)]),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(AppError::document)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![int(0), int(0), int(w), int(h)],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(AppError::document)?;
    Ok(bytes)
}
