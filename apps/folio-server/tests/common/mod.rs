//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use folio_server::config::Config;
use folio_server::db::{self, CreateEdition, CreateJob, IngestionJob, JobQueue, JobRepository, LibraryRepository};
use folio_server::extraction::ExtractorRegistry;
use folio_server::formats::djvu::{CliDjvuToolkit, DjvuToolError, DjvuToolkit};
use folio_server::ocr::{OcrError, OcrProvider, OcrEngine, OcrResult, OcrService, OcrServiceConfig};
use folio_server::search::FtsIndexer;
use folio_server::storage::{content_key, BlobStore, LocalBlobStore};
use folio_server::worker::IngestionWorker;

/// 1x1 PNG
pub const PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00,
    0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00,
    0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8, 0xCF, 0xC0, 0xF0, 0x1F, 0x00, 0x05, 0x00, 0x01, 0xFF,
    0x89, 0x99, 0x3D, 0x1D, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Stand-in JPEG cover bytes
pub const COVER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

/// Everything a worker test needs, torn down with the temp dir
pub struct Harness {
    pub pool: SqlitePool,
    pub store: Arc<LocalBlobStore>,
    pub indexer: Arc<FtsIndexer>,
    pub worker: IngestionWorker,
    pub config: Config,
    _dir: TempDir,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.worker.worker_id = "test-worker".to_string();
    config
}

pub fn ocr_service(providers: Vec<Arc<dyn OcrEngine>>) -> Arc<OcrService> {
    Arc::new(OcrService::with_providers(OcrServiceConfig::default(), providers))
}

pub async fn harness() -> Harness {
    harness_with(test_config(), ocr_service(Vec::new()), Arc::new(CliDjvuToolkit::default())).await
}

pub async fn harness_with(config: Config, ocr: Arc<OcrService>, djvu: Arc<dyn DjvuToolkit>) -> Harness {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool("sqlite::memory:").await.unwrap();
    let store = Arc::new(LocalBlobStore::new(dir.path().join("blobs")).await.unwrap());
    let indexer = Arc::new(FtsIndexer::new(pool.clone()));
    indexer.initialize().await.unwrap();

    let registry = Arc::new(ExtractorRegistry::new(ocr, djvu));
    let worker = IngestionWorker::new(pool.clone(), store.clone(), registry, indexer.clone(), &config);

    Harness {
        pool,
        store,
        indexer,
        worker,
        config,
        _dir: dir,
    }
}

impl Harness {
    /// Store a file and queue its ingestion, as the upload route does
    pub async fn enqueue(&self, file_name: &str, data: &[u8], queue: JobQueue) -> IngestionJob {
        let key = content_key("uploads", data, "bin");
        self.store.put(&key, data, "application/octet-stream").await.unwrap();
        let edition = LibraryRepository::new(&self.pool)
            .create_edition(&CreateEdition {
                id: None,
                source_key: key.clone(),
                source_file_name: file_name.to_string(),
            })
            .await
            .unwrap();
        JobRepository::new(&self.pool)
            .create(&CreateJob {
                edition_id: edition.id,
                file_key: key,
                file_name: file_name.to_string(),
                queue,
            })
            .await
            .unwrap()
    }

    pub async fn job(&self, id: &str) -> IngestionJob {
        JobRepository::new(&self.pool).get(id).await.unwrap().unwrap()
    }
}

/// One spine document of a test EPUB
pub struct EpubChapter {
    pub title: &'static str,
    pub body: &'static str,
}

/// Build an EPUB3 in memory: chapters under `OEBPS/text/`, `images/pic.png`
/// and an optional `images/cover.jpg` declared as the cover image
pub fn build_epub(chapters: &[EpubChapter], with_cover: bool) -> Vec<u8> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default();

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();

    zip.start_file("META-INF/container.xml", deflated).unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#,
    )
    .unwrap();

    let mut manifest = String::new();
    let mut spine = String::new();
    let mut nav_points = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        let n = i + 1;
        manifest.push_str(&format!(
            "<item id=\"ch{n}\" href=\"text/ch{n}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
        ));
        spine.push_str(&format!("<itemref idref=\"ch{n}\"/>\n"));
        nav_points.push_str(&format!("<li><a href=\"text/ch{n}.xhtml\">{}</a></li>\n", chapter.title));

        zip.start_file(format!("OEBPS/text/ch{n}.xhtml"), deflated).unwrap();
        zip.write_all(
            format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{}</title></head><body>{}</body></html>",
                chapter.title, chapter.body
            )
            .as_bytes(),
        )
        .unwrap();
    }
    manifest.push_str("<item id=\"pic\" href=\"images/pic.png\" media-type=\"image/png\"/>\n");
    if with_cover {
        manifest.push_str(
            "<item id=\"cover-img\" href=\"images/cover.jpg\" media-type=\"image/jpeg\" properties=\"cover-image\"/>\n",
        );
    }
    manifest.push_str("<item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n");

    zip.start_file("OEBPS/content.opf", deflated).unwrap();
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:test</dc:identifier>
    <dc:title>The Test Voyage</dc:title>
    <dc:creator>Ann Writer</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>"#
        )
        .as_bytes(),
    )
    .unwrap();

    zip.start_file("OEBPS/nav.xhtml", deflated).unwrap();
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body>
<nav epub:type="toc"><ol>
{nav_points}</ol></nav></body></html>"#
        )
        .as_bytes(),
    )
    .unwrap();

    zip.start_file("OEBPS/images/pic.png", stored).unwrap();
    zip.write_all(PNG).unwrap();
    if with_cover {
        zip.start_file("OEBPS/images/cover.jpg", stored).unwrap();
        zip.write_all(COVER).unwrap();
    }

    zip.finish().unwrap().into_inner()
}

pub fn three_chapter_epub() -> Vec<u8> {
    build_epub(
        &[
            EpubChapter {
                title: "Departure",
                body: "<h1>Departure</h1><p>The ship left the harbour at dawn, and the crew sang.</p>",
            },
            EpubChapter {
                title: "The Storm",
                body: "<h1>The Storm</h1><p>Waves rose over the deck.</p><p><img src=\"../images/pic.png\" alt=\"map\"/></p>",
            },
            EpubChapter {
                title: "Landfall",
                body: "<h1>Landfall</h1><p>At last they saw the green hills of the island.</p>",
            },
        ],
        true,
    )
}

pub const FB2_BOOK: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info>
  <author><first-name>Anna</first-name><last-name>Petrova</last-name></author>
  <book-title>Winter Road</book-title>
  <lang>en</lang>
</title-info></description>
<body>
  <section><title><p>First Snow</p></title><p>Snow fell on the road all night.</p><image l:href="#pic.png"/></section>
  <section><title><p>Thaw</p></title><p>By March the rivers were running again.</p></section>
</body>
<binary id="pic.png" content-type="image/png">iVBORw0KGgo=</binary>
</FictionBook>"##;

/// Single-page PDF whose only content is a filled rectangle
pub fn blank_pdf() -> Vec<u8> {
    let content = "0 0 1 rg 72 72 200 200 re f";
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    pdf.into_bytes()
}

/// DJVU toolkit that reports a scanned document without a text layer
pub struct ScannedDjvu {
    pub pages: usize,
}

#[async_trait]
impl DjvuToolkit for ScannedDjvu {
    async fn is_available(&self) -> bool {
        true
    }

    async fn page_count(&self, _path: &Path) -> Result<usize, DjvuToolError> {
        Ok(self.pages)
    }

    async fn extract_text(&self, _path: &Path) -> Result<String, DjvuToolError> {
        Ok(String::new())
    }

    async fn render_page(&self, _path: &Path, index: usize) -> Result<Vec<u8>, DjvuToolError> {
        Ok(vec![index as u8])
    }
}

/// OCR provider that "reads" the page index back
pub struct PageNumberOcr;

#[async_trait]
impl OcrEngine for PageNumberOcr {
    fn kind(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn recognize(&self, image_data: &[u8], _language: Option<&str>) -> Result<OcrResult, OcrError> {
        let page = image_data.first().copied().unwrap_or_default() as usize + 1;
        Ok(OcrResult {
            text: format!("Recognized text of scanned page number {}.", page),
            confidence: Some(90.0),
            provider: OcrProvider::Tesseract,
            words: None,
        })
    }
}
