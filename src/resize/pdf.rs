//! PDF page downscaling
//!
//! Every page is rebuilt at a uniform scale so that its longer displayed
//! side fits within `max_side`. The original page content is wrapped in a
//! Form XObject and painted into the new page rectangle with a single
//! transform, so vector content stays vector.
//!
//! PDF support is a cargo feature. Builds without it get
//! [`UnavailableBackend`], which rejects every PDF with
//! [`ResizeError::PdfUnavailable`] naming the remedy.

use std::sync::Arc;

use super::{MaxSide, ResizeResult};
use crate::error::{ResizeError, Result};

/// MIME type of PDF output
pub const PDF_MIME: &str = "application/pdf";

/// Dependency named in the "not installed" message
pub const PDF_DEPENDENCY: &str = "lopdf";

/// Command named in the "not installed" message
pub const PDF_INSTALL_HINT: &str = "`cargo build --features pdf`";

/// Backend that rewrites a PDF document page by page
pub trait PdfBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Whether this backend can actually process documents
    fn is_available(&self) -> bool {
        true
    }

    /// Return a new PDF whose pages are each scaled down to fit `max_side`
    fn resize(&self, bytes: &[u8], max_side: MaxSide) -> Result<Vec<u8>>;
}

/// Stand-in used when PDF support is not compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl PdfBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn resize(&self, _bytes: &[u8], _max_side: MaxSide) -> Result<Vec<u8>> {
        Err(ResizeError::PdfUnavailable {
            dependency: PDF_DEPENDENCY,
            install: PDF_INSTALL_HINT,
        })
    }
}

/// Resolve the PDF capability for this build
pub fn default_backend() -> Arc<dyn PdfBackend> {
    #[cfg(feature = "pdf")]
    {
        Arc::new(LopdfBackend)
    }

    #[cfg(not(feature = "pdf"))]
    {
        Arc::new(UnavailableBackend)
    }
}

/// Resize a PDF upload with the given backend.
pub fn resize_pdf(
    bytes: &[u8],
    max_side: MaxSide,
    backend: &dyn PdfBackend,
) -> Result<ResizeResult> {
    let data = backend.resize(bytes, max_side)?;
    Ok(ResizeResult {
        data,
        mime_type: PDF_MIME,
        extension: "pdf",
    })
}

/// Uniform, shrink-only scale factor for a page of the given size
pub fn page_scale(width: f64, height: f64, max_side: MaxSide) -> f64 {
    let longest = width.max(height);
    if !longest.is_finite() || longest <= 0.0 {
        return 1.0;
    }
    (f64::from(max_side.get()) / longest).min(1.0)
}

#[cfg(feature = "pdf")]
pub use lopdf_backend::LopdfBackend;

#[cfg(feature = "pdf")]
mod lopdf_backend {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

    use super::{page_scale, PdfBackend};
    use crate::error::{ResizeError, Result};
    use crate::resize::MaxSide;

    /// US Letter, used when a page declares no MediaBox anywhere in its tree
    const DEFAULT_MEDIA_BOX: Rect = Rect {
        x0: 0.0,
        y0: 0.0,
        x1: 612.0,
        y1: 792.0,
    };

    /// Page tree depth limit when resolving inherited attributes
    const MAX_TREE_DEPTH: usize = 64;

    /// Name of the wrapped original page inside each new page's resources
    const FORM_NAME: &str = "SrcPage";

    /// PDF backend built on `lopdf`
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LopdfBackend;

    impl PdfBackend for LopdfBackend {
        fn name(&self) -> &'static str {
            "lopdf"
        }

        fn resize(&self, bytes: &[u8], max_side: MaxSide) -> Result<Vec<u8>> {
            // The document owns every buffer it touches and is dropped on
            // every return path below.
            let mut doc = Document::load_mem(bytes)
                .map_err(|e| ResizeError::InvalidPdf(format!("Failed to load PDF: {}", e)))?;

            if doc.is_encrypted() {
                return Err(ResizeError::InvalidPdf("Encrypted PDFs are not supported".into()));
            }

            // BTreeMap keyed by page number: original order
            let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
            if page_ids.is_empty() {
                return Err(ResizeError::InvalidPdf("Document has no pages".into()));
            }

            for (index, page_id) in page_ids.iter().enumerate() {
                let source = SourcePage::read(&doc, *page_id)?;
                let (width, height) = source.display_size();
                let scale = page_scale(width, height, max_side);

                tracing::debug!(
                    page = index + 1,
                    width,
                    height,
                    scale,
                    rotate = source.rotate,
                    "Rescaling PDF page"
                );

                rebuild_page(&mut doc, *page_id, source, scale)?;
            }

            doc.prune_objects();
            doc.compress();

            let mut out = Vec::new();
            doc.save_to(&mut out)
                .map_err(|e| ResizeError::Encode(format!("Failed to save PDF: {}", e)))?;

            tracing::debug!(pages = page_ids.len(), bytes = out.len(), "Rewrote PDF");
            Ok(out)
        }
    }

    /// Axis-aligned rectangle in PDF user space, normalized so x0 <= x1, y0 <= y1
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Rect {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
    }

    impl Rect {
        fn from_object(doc: &Document, obj: &Object) -> Option<Self> {
            let values = resolve(doc, obj)?.as_array().ok()?;
            if values.len() != 4 {
                return None;
            }
            let mut nums = [0.0f64; 4];
            for (slot, value) in nums.iter_mut().zip(values) {
                *slot = number(resolve(doc, value)?)?;
            }
            Some(Self {
                x0: nums[0].min(nums[2]),
                y0: nums[1].min(nums[3]),
                x1: nums[0].max(nums[2]),
                y1: nums[1].max(nums[3]),
            })
        }

        fn intersect(self, other: Rect) -> Option<Rect> {
            let rect = Rect {
                x0: self.x0.max(other.x0),
                y0: self.y0.max(other.y0),
                x1: self.x1.min(other.x1),
                y1: self.y1.min(other.y1),
            };
            (rect.x1 > rect.x0 && rect.y1 > rect.y0).then_some(rect)
        }

        fn width(&self) -> f64 {
            self.x1 - self.x0
        }

        fn height(&self) -> f64 {
            self.y1 - self.y0
        }

        fn to_object(self) -> Object {
            Object::Array(vec![
                real(self.x0),
                real(self.y0),
                real(self.x1),
                real(self.y1),
            ])
        }
    }

    /// Everything needed to repaint one original page
    struct SourcePage {
        parent: Option<Object>,
        /// Visible region: CropBox clipped to MediaBox
        bbox: Rect,
        /// Clockwise display rotation, one of 0, 90, 180, 270
        rotate: i64,
        resources: Option<Object>,
        content: Vec<u8>,
    }

    impl SourcePage {
        fn read(doc: &Document, page_id: ObjectId) -> Result<Self> {
            let page = doc
                .get_dictionary(page_id)
                .map_err(|e| ResizeError::InvalidPdf(format!("Page {:?}: {}", page_id, e)))?;

            let media_box = inherited(doc, page_id, b"MediaBox")
                .and_then(|obj| Rect::from_object(doc, obj))
                .unwrap_or(DEFAULT_MEDIA_BOX);

            let bbox = inherited(doc, page_id, b"CropBox")
                .and_then(|obj| Rect::from_object(doc, obj))
                .and_then(|crop| crop.intersect(media_box))
                .unwrap_or(media_box);

            let rotate = inherited(doc, page_id, b"Rotate")
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_i64().ok())
                .map(normalize_rotation)
                .unwrap_or(0);

            let resources = inherited(doc, page_id, b"Resources").cloned();

            Ok(Self {
                parent: page.get(b"Parent").ok().cloned(),
                bbox,
                rotate,
                resources,
                content: page_content(doc, page_id)?,
            })
        }

        /// Page size as displayed, after rotation
        fn display_size(&self) -> (f64, f64) {
            match self.rotate {
                90 | 270 => (self.bbox.height(), self.bbox.width()),
                _ => (self.bbox.width(), self.bbox.height()),
            }
        }

        /// Matrix mapping source user space onto the new page at `scale`
        fn placement(&self, scale: f64) -> [f64; 6] {
            let Rect { x0, y0, .. } = self.bbox;
            let (w, h) = (self.bbox.width(), self.bbox.height());

            // Rotation about the box origin, then moved back into the first quadrant
            let [a, b, c, d, e, f] = match self.rotate {
                90 => [0.0, -1.0, 1.0, 0.0, 0.0, w],
                180 => [-1.0, 0.0, 0.0, -1.0, w, h],
                270 => [0.0, 1.0, -1.0, 0.0, h, 0.0],
                _ => [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            };

            // Translate the box origin to (0, 0) first
            let e = e - a * x0 - c * y0;
            let f = f - b * x0 - d * y0;

            [a * scale, b * scale, c * scale, d * scale, e * scale, f * scale]
        }
    }

    /// Replace `page_id` with a page of the scaled size that paints the
    /// original content as a Form XObject.
    fn rebuild_page(
        doc: &mut Document,
        page_id: ObjectId,
        source: SourcePage,
        scale: f64,
    ) -> Result<()> {
        let (width, height) = source.display_size();
        let target = Rect {
            x0: 0.0,
            y0: 0.0,
            x1: width * scale,
            y1: height * scale,
        };
        let matrix = source.placement(scale);

        let mut form_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => source.bbox.to_object(),
        };
        if let Some(resources) = source.resources {
            form_dict.set("Resources", resources);
        }
        let form_id = doc.add_object(Stream::new(form_dict, source.content));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("cm", matrix.iter().map(|v| real(*v)).collect()),
                Operation::new("Do", vec![Object::Name(FORM_NAME.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let ops = content
            .encode()
            .map_err(|e| ResizeError::Encode(format!("Failed to encode page content: {}", e)))?;
        let contents_id = doc.add_object(Stream::new(Dictionary::new(), ops));

        let mut page = dictionary! {
            "Type" => "Page",
            "MediaBox" => target.to_object(),
            "CropBox" => target.to_object(),
            "Rotate" => 0,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    FORM_NAME => form_id,
                },
            },
            "Contents" => contents_id,
        };
        match source.parent {
            Some(parent) => page.set("Parent", parent),
            None => {
                return Err(ResizeError::InvalidPdf(format!(
                    "Page {:?} has no parent",
                    page_id
                )))
            }
        }

        doc.objects.insert(page_id, Object::Dictionary(page));
        Ok(())
    }

    /// Decoded content of all of a page's content streams, in order
    fn page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        for stream_id in doc.get_page_contents(page_id) {
            let stream = doc
                .get_object(stream_id)
                .and_then(Object::as_stream)
                .map_err(|e| {
                    ResizeError::InvalidPdf(format!("Content stream {:?}: {}", stream_id, e))
                })?;

            let bytes = if stream.dict.has(b"Filter") {
                stream.decompressed_content().map_err(|e| {
                    ResizeError::InvalidPdf(format!("Content stream {:?}: {}", stream_id, e))
                })?
            } else {
                stream.content.clone()
            };

            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(&bytes);
        }
        Ok(content)
    }

    /// Look up a page attribute, walking up the page tree for inheritable keys
    fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
        let mut node = doc.get_dictionary(page_id).ok();
        for _ in 0..MAX_TREE_DEPTH {
            let dict = node?;
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            node = dict
                .get(b"Parent")
                .and_then(Object::as_reference)
                .ok()
                .and_then(|id| doc.get_dictionary(id).ok());
        }
        None
    }

    fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn number(obj: &Object) -> Option<f64> {
        match obj {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(f64::from(*r)),
            _ => None,
        }
    }

    fn real(value: f64) -> Object {
        Object::Real(value as f32)
    }

    fn normalize_rotation(degrees: i64) -> i64 {
        match degrees.rem_euclid(360) {
            r @ (90 | 180 | 270) => r,
            _ => 0,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn side(value: u32) -> MaxSide {
            MaxSide::new(value).unwrap()
        }

        /// Build a PDF with one page per `(width, height, rotate)`
        fn build_pdf(pages: &[(i64, i64, i64)]) -> Vec<u8> {
            let mut doc = Document::with_version("1.5");
            let pages_id = doc.new_object_id();

            let mut kids = Vec::new();
            for (n, (width, height, rotate)) in pages.iter().enumerate() {
                let content = format!("0 0 1 rg 0 0 {} {} re f BT ET % page {}", width, height, n);
                let content_id =
                    doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), (*width).into(), (*height).into()],
                    "Rotate" => *rotate,
                    "Contents" => content_id,
                });
                kids.push(Object::Reference(page_id));
            }

            doc.objects.insert(
                pages_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Pages",
                    "Count" => kids.len() as i64,
                    "Kids" => kids,
                }),
            );
            let catalog_id = doc.add_object(dictionary! {
                "Type" => "Catalog",
                "Pages" => pages_id,
            });
            doc.trailer.set("Root", catalog_id);

            let mut out = Vec::new();
            doc.save_to(&mut out).unwrap();
            out
        }

        fn page_sizes(bytes: &[u8]) -> Vec<(f64, f64)> {
            let doc = Document::load_mem(bytes).unwrap();
            doc.get_pages()
                .values()
                .map(|id| {
                    let page = doc.get_dictionary(*id).unwrap();
                    let rect = Rect::from_object(&doc, page.get(b"MediaBox").unwrap()).unwrap();
                    (rect.width(), rect.height())
                })
                .collect()
        }

        fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
            assert!(
                (actual.0 - expected.0).abs() < 0.01 && (actual.1 - expected.1).abs() < 0.01,
                "expected {:?}, got {:?}",
                expected,
                actual
            );
        }

        #[test]
        fn test_three_pages_scaled_independently() {
            let input = build_pdf(&[(612, 792, 0), (1600, 400, 0), (300, 200, 0)]);
            let output = LopdfBackend.resize(&input, side(800)).unwrap();

            let sizes = page_sizes(&output);
            assert_eq!(sizes.len(), 3);
            // Letter fits already: untouched
            assert_close(sizes[0], (612.0, 792.0));
            // Wide page: scale 0.5 on both axes
            assert_close(sizes[1], (800.0, 200.0));
            assert_close(sizes[2], (300.0, 200.0));
        }

        #[test]
        fn test_scale_is_uniform() {
            let input = build_pdf(&[(1000, 3000, 0)]);
            let output = LopdfBackend.resize(&input, side(600)).unwrap();
            let (w, h) = page_sizes(&output)[0];
            assert_close((w, h), (200.0, 600.0));
            assert!((w / h - 1000.0 / 3000.0).abs() < 1e-6);
        }

        #[test]
        fn test_rotated_page_uses_displayed_size() {
            let input = build_pdf(&[(400, 1000, 90)]);
            let output = LopdfBackend.resize(&input, side(500)).unwrap();

            let doc = Document::load_mem(&output).unwrap();
            let page_id = *doc.get_pages().values().next().unwrap();
            let page = doc.get_dictionary(page_id).unwrap();
            assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 0);

            assert_close(page_sizes(&output)[0], (500.0, 200.0));
        }

        /// Operands of the page's `cm` operator
        fn page_matrix(bytes: &[u8]) -> Vec<f64> {
            let doc = Document::load_mem(bytes).unwrap();
            let page_id = *doc.get_pages().values().next().unwrap();
            let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();

            let ops: Vec<&str> = content.operations.iter().map(|op| op.operator.as_str()).collect();
            assert_eq!(ops, ["q", "cm", "Do", "Q"]);
            assert_eq!(content.operations[2].operands[0].as_name().unwrap(), b"SrcPage");

            content.operations[1]
                .operands
                .iter()
                .map(|v| number(v).unwrap())
                .collect()
        }

        #[test]
        fn test_page_paints_original_as_form() {
            let input = build_pdf(&[(2000, 1000, 0)]);
            let output = LopdfBackend.resize(&input, side(500)).unwrap();
            assert_eq!(page_matrix(&output), [0.25, 0.0, 0.0, 0.25, 0.0, 0.0]);
        }

        #[test]
        fn test_tiny_scale_keeps_matrix_invertible() {
            let input = build_pdf(&[(3_000_000, 1_000_000, 0)]);
            let output = LopdfBackend.resize(&input, side(1)).unwrap();

            let matrix = page_matrix(&output);
            let expected = 1.0 / 3_000_000.0;
            assert!((matrix[0] - expected).abs() / expected < 1e-5, "{:?}", matrix);
            assert!((matrix[3] - expected).abs() / expected < 1e-5, "{:?}", matrix);
            assert!(matrix[0] * matrix[3] - matrix[1] * matrix[2] != 0.0);
        }

        #[test]
        fn test_unreadable_content_stream_is_rejected() {
            let mut doc = Document::load_mem(&build_pdf(&[(100, 100, 0)])).unwrap();
            let page_id = *doc.get_pages().values().next().unwrap();
            let dangling = doc.new_object_id();
            doc.get_dictionary_mut(page_id)
                .unwrap()
                .set("Contents", Object::Reference(dangling));
            let mut input = Vec::new();
            doc.save_to(&mut input).unwrap();

            let err = LopdfBackend.resize(&input, side(50)).unwrap_err();
            assert!(matches!(err, ResizeError::InvalidPdf(_)), "{:?}", err);
        }

        #[test]
        fn test_resize_is_idempotent() {
            let input = build_pdf(&[(1200, 900, 0), (500, 2500, 0)]);
            let once = LopdfBackend.resize(&input, side(400)).unwrap();
            let twice = LopdfBackend.resize(&once, side(400)).unwrap();

            let first = page_sizes(&once);
            let second = page_sizes(&twice);
            assert_eq!(first.len(), second.len());
            for (a, b) in first.into_iter().zip(second) {
                assert_close(a, b);
            }
        }

        #[test]
        fn test_max_side_one() {
            let input = build_pdf(&[(612, 792, 0)]);
            let output = LopdfBackend.resize(&input, side(1)).unwrap();
            let (w, h) = page_sizes(&output)[0];
            assert!(w > 0.0 && w <= 1.0 + 1e-6 && h <= 1.0 + 1e-6);
        }

        #[test]
        fn test_corrupt_pdf_is_rejected() {
            let err = LopdfBackend.resize(b"%PDF-1.7\nnot really", side(100)).unwrap_err();
            assert!(matches!(err, ResizeError::InvalidPdf(_)));
        }

        #[test]
        fn test_crop_box_is_clipped_to_media_box() {
            let doc = Document::new();
            let media = Object::Array(vec![0.into(), 0.into(), 100.into(), 100.into()]);
            let crop = Object::Array(vec![50.into(), 50.into(), 200.into(), 200.into()]);
            let crop = Rect::from_object(&doc, &crop).unwrap();
            let media = Rect::from_object(&doc, &media).unwrap();
            assert_eq!(
                crop.intersect(media),
                Some(Rect { x0: 50.0, y0: 50.0, x1: 100.0, y1: 100.0 })
            );
        }

        #[test]
        fn test_placement_rotation_maps_box_into_page() {
            let source = SourcePage {
                parent: None,
                bbox: Rect { x0: 10.0, y0: 20.0, x1: 110.0, y1: 220.0 },
                rotate: 90,
                resources: None,
                content: Vec::new(),
            };
            let [a, b, c, d, e, f] = source.placement(1.0);
            let apply = |x: f64, y: f64| (a * x + c * y + e, b * x + d * y + f);

            // Source box corners land on the corners of the 200 x 100 displayed page
            assert_close(apply(10.0, 20.0), (0.0, 100.0));
            assert_close(apply(110.0, 20.0), (0.0, 0.0));
            assert_close(apply(10.0, 220.0), (200.0, 100.0));
            assert_close(apply(110.0, 220.0), (200.0, 0.0));
        }

        #[test]
        fn test_normalize_rotation() {
            assert_eq!(normalize_rotation(-90), 270);
            assert_eq!(normalize_rotation(450), 90);
            assert_eq!(normalize_rotation(45), 0);
        }
    }
}
