//! Operation-level integration tests: stage real files, dispatch, and
//! inspect what lands in the output store.

mod common;

use docsmith::operation::{MIME_DOCX, MIME_JPEG, MIME_PDF, MIME_PNG};
use docsmith::pipeline::{docx, pdf};
use docsmith::store::{OutputStore, StagingArea};
use docsmith::{CompressionLevel, Dispatcher, DocsmithError, Operation, RotationAngle};
use lopdf::Document;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    staging: StagingArea,
    dispatcher: Dispatcher,
    _staging_dir: TempDir,
    output_dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        common::init_tracing();
        let staging_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        Self {
            staging: StagingArea::new(staging_dir.path()),
            dispatcher: Dispatcher::new(
                OutputStore::new(output_dir.path()),
                Duration::from_secs(60),
            ),
            _staging_dir: staging_dir,
            output_dir,
        }
    }

    /// Stage `files`, run `operation`, and return the bytes of every output.
    async fn run(
        &self,
        operation: Operation,
        files: &[(&str, &str, Vec<u8>)],
    ) -> Result<Vec<Vec<u8>>, DocsmithError> {
        let mut stage = self.staging.begin()?;
        for (name, mime, bytes) in files {
            stage.stage_bytes(name, mime, bytes).await?;
        }
        let result = self.dispatcher.dispatch(operation, stage.files()).await?;
        assert!(result.success);
        assert_eq!(
            result.download_url,
            format!("/api/download/{}", result.output_path)
        );
        Ok(result
            .all_outputs()
            .into_iter()
            .map(|name| std::fs::read(self.output_dir.path().join(name)).unwrap())
            .collect())
    }

    async fn run_one(&self, operation: Operation, files: &[(&str, &str, Vec<u8>)]) -> Vec<u8> {
        let mut outputs = self.run(operation, files).await.unwrap();
        assert_eq!(outputs.len(), 1);
        outputs.remove(0)
    }
}

#[tokio::test]
async fn merge_keeps_upload_order() {
    let h = Harness::new();
    let merged = h
        .run_one(
            Operation::PdfMerge,
            &[
                ("a.pdf", MIME_PDF, common::pdf_with_widths(&[100, 110])),
                ("b.pdf", MIME_PDF, common::pdf_with_widths(&[300])),
                ("c.pdf", MIME_PDF, common::pdf_with_widths(&[400, 410])),
            ],
        )
        .await;
    assert_eq!(
        common::page_widths(&merged),
        vec![100.0, 110.0, 300.0, 400.0, 410.0]
    );
}

#[tokio::test]
async fn merge_needs_two_files() {
    let h = Harness::new();
    let err = tokio_test::assert_err!(
        h.run(
            Operation::PdfMerge,
            &[("a.pdf", MIME_PDF, common::pdf_with_widths(&[100]))],
        )
        .await
    );
    assert!(matches!(err, DocsmithError::MissingInput(_)), "got: {err:?}");
}

#[tokio::test]
async fn split_produces_single_page_documents_in_order() {
    let h = Harness::new();
    let parts = h
        .run(
            Operation::PdfSplit,
            &[("three.pdf", MIME_PDF, common::pdf_with_widths(&[120, 220, 320]))],
        )
        .await
        .unwrap();
    assert_eq!(parts.len(), 3);
    for (part, width) in parts.iter().zip([120.0, 220.0, 320.0]) {
        assert_eq!(common::page_widths(part), vec![width]);
    }
}

#[tokio::test]
async fn rotate_adds_to_existing_rotation() {
    let h = Harness::new();
    let once = h
        .run_one(
            Operation::Rotate {
                angle: RotationAngle::Deg270,
            },
            &[("r.pdf", MIME_PDF, common::pdf_with_widths(&[100, 200]))],
        )
        .await;
    let twice = h
        .run_one(
            Operation::Rotate {
                angle: RotationAngle::Deg180,
            },
            &[("r.pdf", MIME_PDF, once)],
        )
        .await;

    let doc = Document::load_mem(&twice).unwrap();
    for page_id in doc.get_pages().values() {
        assert_eq!(pdf::rotation(&doc, *page_id), 90);
    }
}

fn rotations(bytes: &[u8]) -> Vec<i64> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| pdf::rotation(&doc, *id))
        .collect()
}

#[tokio::test]
async fn rotating_180_twice_restores_the_original() {
    let h = Harness::new();
    let plain = common::pdf_with_widths(&[100, 200, 300]);
    let turned = h
        .run_one(
            Operation::Rotate {
                angle: RotationAngle::Deg90,
            },
            &[("r.pdf", MIME_PDF, plain.clone())],
        )
        .await;

    for source in [plain, turned] {
        let mut current = source.clone();
        for _ in 0..2 {
            current = h
                .run_one(
                    Operation::Rotate {
                        angle: RotationAngle::Deg180,
                    },
                    &[("r.pdf", MIME_PDF, current)],
                )
                .await;
        }
        assert_eq!(rotations(&current), rotations(&source));
        assert_eq!(common::page_widths(&current), common::page_widths(&source));
    }
}

#[tokio::test]
async fn timed_out_rotate_leaves_output_store_empty() {
    let h = Harness::new();
    let dispatcher = Dispatcher::new(
        OutputStore::new(h.output_dir.path()),
        Duration::from_millis(1),
    );
    let mut stage = h.staging.begin().unwrap();
    stage
        .stage_bytes("long.pdf", MIME_PDF, &common::pdf_with_widths(&[300; 400]))
        .await
        .unwrap();

    let err = dispatcher
        .dispatch(
            Operation::Rotate {
                angle: RotationAngle::Deg90,
            },
            stage.files(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("timed out after 1ms"), "{err}");

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(common::files_under(h.output_dir.path()), 0);
}

#[tokio::test]
async fn watermark_stamps_every_page_and_keeps_text() {
    let h = Harness::new();
    let out = h
        .run_one(
            Operation::Watermark {
                text: "CONFIDENTIAL".into(),
            },
            &[("w.pdf", MIME_PDF, common::pdf_with_widths(&[300, 300]))],
        )
        .await;

    let doc = Document::load_mem(&out).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
    for page_id in doc.get_pages().values() {
        let content = String::from_utf8_lossy(&doc.get_page_content(*page_id).unwrap()).into_owned();
        assert!(content.contains("CONFIDENTIAL"), "{content}");
    }
    let text = pdf::extract_text(&doc);
    assert!(text[0].contains("Page 1"));
    assert!(text[1].contains("Page 2"));
}

#[tokio::test]
async fn compress_keeps_every_page_at_each_level() {
    let h = Harness::new();
    let source = common::pdf_with_widths(&[100, 200, 300, 400]);
    for level in [
        CompressionLevel::Low,
        CompressionLevel::Medium,
        CompressionLevel::High,
    ] {
        let out = h
            .run_one(
                Operation::PdfCompress { level },
                &[("big.pdf", MIME_PDF, source.clone())],
            )
            .await;
        assert_eq!(common::page_widths(&out), vec![100.0, 200.0, 300.0, 400.0]);
    }
}

#[tokio::test]
async fn word_to_pdf_flows_text_onto_letter_pages() {
    let h = Harness::new();
    let paragraphs: Vec<String> = (1..=120).map(|i| format!("Line number {i}")).collect();
    let refs: Vec<&str> = paragraphs.iter().map(String::as_str).collect();
    let out = h
        .run_one(
            Operation::WordToPdf,
            &[("long.docx", MIME_DOCX, common::docx(&refs))],
        )
        .await;

    let doc = Document::load_mem(&out).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
    let first = doc.get_pages()[&1];
    assert_eq!(pdf::media_box(&doc, first), (0.0, 0.0, 612.0, 792.0));
    let content = String::from_utf8_lossy(&doc.get_page_content(first).unwrap()).into_owned();
    assert!(content.contains("Line number 1"));
}

#[tokio::test]
async fn word_to_pdf_rejects_corrupt_archive() {
    let h = Harness::new();
    let err = h
        .run(
            Operation::WordToPdf,
            &[("broken.docx", MIME_DOCX, b"PK\x03\x04 truncated".to_vec())],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocsmithError::Processing(_)), "got: {err:?}");
    assert_eq!(common::files_under(h.output_dir.path()), 0);
}

#[tokio::test]
async fn pdf_to_word_writes_a_readable_docx() {
    let h = Harness::new();
    let out = h
        .run_one(
            Operation::PdfToWord,
            &[("p.pdf", MIME_PDF, common::pdf_with_widths(&[300, 300]))],
        )
        .await;
    let text = docx::read_text(&out).unwrap();
    assert!(text.contains("Page 1"), "{text}");
    assert!(text.contains("Page 2"), "{text}");
}

#[tokio::test]
async fn pdf_to_text_writes_page_headers() {
    let h = Harness::new();
    let out = h
        .run_one(
            Operation::PdfToText,
            &[("p.pdf", MIME_PDF, common::pdf_with_widths(&[300, 300]))],
        )
        .await;
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("Page 1:\n\n"), "{text}");
    let second = text.find("Page 2:").unwrap();
    assert!(text[..second].contains("Page 1"));
}

#[tokio::test]
async fn image_resize_hits_exact_dimensions() {
    let h = Harness::new();
    let out = h
        .run_one(
            Operation::ImageResize {
                width: 40,
                height: 25,
            },
            &[("photo.png", MIME_PNG, common::png(200, 100))],
        )
        .await;
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!((img.width(), img.height()), (40, 25));
    assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
}

#[tokio::test]
async fn image_resize_to_800_by_600() {
    let h = Harness::new();
    for (name, mime, bytes) in [
        ("wide.png", MIME_PNG, common::png(1200, 300)),
        ("small.jpg", MIME_JPEG, common::jpeg(64, 64)),
    ] {
        let out = h
            .run_one(
                Operation::ImageResize {
                    width: 800,
                    height: 600,
                },
                &[(name, mime, bytes)],
            )
            .await;
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (800, 600), "{name}");
    }
}

#[tokio::test]
async fn image_to_pdf_makes_one_page_per_image() {
    let h = Harness::new();
    let out = h
        .run_one(
            Operation::ImageToPdf,
            &[
                ("a.png", MIME_PNG, common::png(64, 32)),
                ("b.jpg", MIME_JPEG, common::jpeg(50, 80)),
            ],
        )
        .await;
    assert_eq!(common::page_widths(&out), vec![64.0, 50.0]);
}

#[tokio::test]
async fn rotate_rejects_an_image_input() {
    let h = Harness::new();
    let err = h
        .run(
            Operation::Rotate {
                angle: RotationAngle::Deg90,
            },
            &[("a.png", MIME_PNG, common::png(4, 4))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocsmithError::InvalidFileType { .. }));
}
