//! The operation dispatcher: run one decoded [`Operation`] over staged
//! inputs and publish its result to the output store.
//!
//! Every operation follows the same shape:
//!
//! 1. check the inputs (count, and that each is the right kind of file)
//! 2. move onto the blocking pool and run the library stages
//! 3. write each produced file to the output store
//! 4. answer with an [`OperationResult`] naming those files
//!
//! A failure at any point after the first write removes what was already
//! written, so a failed request never leaves results behind. The same holds
//! for an operation that outlives its processing timeout: the worker thread
//! cannot be stopped, but it can no longer publish.

use crate::error::{DocsmithError, Result};
use crate::operation::{CompressionLevel, Operation, OperationKind};
use crate::output::OperationResult;
use crate::pipeline::input::{self, Input};
use crate::pipeline::{compose, docx, pdf};
use crate::store::{OutputStore, StagedFile};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs operations with a time limit. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    output: OutputStore,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(output: OutputStore, timeout: Duration) -> Self {
        Self { output, timeout }
    }

    pub fn output(&self) -> &OutputStore {
        &self.output
    }

    /// Run `operation` over `inputs` (in upload order).
    pub async fn dispatch(
        &self,
        operation: Operation,
        inputs: &[StagedFile],
    ) -> Result<OperationResult> {
        let start = Instant::now();
        let kind = operation.kind();
        check_inputs(kind, inputs)?;

        let inputs: Vec<Input> = inputs.iter().map(StagedFile::as_input).collect();
        info!("Starting {}: {}", kind, input::describe(&inputs));

        let store = self.output.clone();
        let claim = Claim::default();
        let worker = claim.clone();
        let mut task =
            tokio::task::spawn_blocking(move || execute(&operation, &inputs, &store, &worker));
        let joined = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) if claim.abandon() => {
                warn!("{} abandoned after {}ms", kind, start.elapsed().as_millis());
                return Err(timed_out(self.timeout));
            }
            // Committed just as the deadline passed: the outputs are published.
            Err(_) => task.await,
        };
        let result =
            joined.map_err(|e| DocsmithError::Internal(format!("{kind} task panicked: {e}")))??;

        info!(
            "{} complete: {} output(s) in {}ms",
            kind,
            result.all_outputs().len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }
}

/// Arity and file-kind checks, before any work is done.
pub fn check_inputs(kind: OperationKind, inputs: &[StagedFile]) -> Result<()> {
    kind.arity().check(kind, inputs.len())?;
    let expected = kind.input_kind();
    if let Some(wrong) = inputs.iter().find(|f| f.kind != expected) {
        return Err(DocsmithError::InvalidFileType {
            file_name: wrong.original_name.clone(),
            content_type: wrong.content_type.clone(),
        });
    }
    Ok(())
}

fn timed_out(limit: Duration) -> DocsmithError {
    DocsmithError::Processing(format!(
        "timed out after {}",
        humantime::format_duration(limit)
    ))
}

const RUNNING: u8 = 0;
const COMMITTED: u8 = 1;
const ABANDONED: u8 = 2;

/// Outcome race between a worker and its deadline. Whichever side claims
/// first wins; the loser sees the claim already taken.
#[derive(Debug, Clone, Default)]
struct Claim(Arc<AtomicU8>);

impl Claim {
    fn settle(&self, to: u8) -> bool {
        self.0
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn commit(&self) -> bool {
        self.settle(COMMITTED)
    }

    fn abandon(&self) -> bool {
        self.settle(ABANDONED)
    }

    fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire) == ABANDONED
    }
}

/// Files written so far by one operation. Dropped without a successful
/// [`Self::commit`], it removes them again.
struct Outputs<'a> {
    store: &'a OutputStore,
    claim: &'a Claim,
    names: Vec<String>,
    committed: bool,
}

impl<'a> Outputs<'a> {
    fn new(store: &'a OutputStore, claim: &'a Claim) -> Self {
        Self {
            store,
            claim,
            names: Vec::new(),
            committed: false,
        }
    }

    fn write(&mut self, label: &str, ext: &str, bytes: &[u8]) -> Result<()> {
        if self.claim.is_abandoned() {
            return Err(DocsmithError::Processing(
                "operation abandoned after timeout".into(),
            ));
        }
        let name = self.store.write(label, ext, bytes)?;
        self.names.push(name);
        Ok(())
    }

    /// Publish the written files, unless the deadline already claimed the
    /// operation; then everything written is rolled back on drop.
    fn commit(mut self) -> Result<Vec<String>> {
        if !self.claim.commit() {
            return Err(DocsmithError::Processing(
                "operation abandoned after timeout".into(),
            ));
        }
        self.committed = true;
        Ok(std::mem::take(&mut self.names))
    }
}

impl Drop for Outputs<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for name in &self.names {
            warn!("Rolling back output {}", name);
            self.store.discard(name);
        }
    }
}

fn first(inputs: &[Input]) -> Result<&Input> {
    inputs
        .first()
        .ok_or_else(|| DocsmithError::MissingInput("no input file".into()))
}

/// Blocking body of an operation.
fn execute(
    operation: &Operation,
    inputs: &[Input],
    store: &OutputStore,
    claim: &Claim,
) -> Result<OperationResult> {
    let mut out = Outputs::new(store, claim);

    let message = match operation {
        Operation::PdfToWord => {
            let doc = input::load_pdf(first(inputs)?)?;
            let text = pdf::extract_text(&doc).join("\n");
            let mut paragraphs: Vec<&str> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if paragraphs.is_empty() {
                paragraphs.push(pdf::NO_TEXT_PLACEHOLDER);
            }
            out.write("converted", "docx", &docx::write_paragraphs(&paragraphs)?)?;
            format!("Converted {} pages into {} paragraphs", pdf::page_count(&doc), paragraphs.len())
        }
        Operation::PdfToText => {
            let doc = input::load_pdf(first(inputs)?)?;
            let pages = pdf::extract_text(&doc);
            out.write("extracted", "txt", pdf::text_report(&pages).as_bytes())?;
            format!("Extracted text from {} pages", pages.len())
        }
        Operation::WordToPdf => {
            let text = docx::read_text(&input::load_docx(first(inputs)?)?)?;
            let mut doc = compose::text_document(&text)?;
            out.write("converted", "pdf", &pdf::save(&mut doc)?)?;
            format!("Converted document into {} pages", pdf::page_count(&doc))
        }
        Operation::PdfMerge => {
            let docs = inputs
                .iter()
                .map(input::load_pdf)
                .collect::<Result<Vec<_>>>()?;
            let mut merged = pdf::merge(docs)?;
            out.write("merged", "pdf", &pdf::save(&mut merged)?)?;
            format!(
                "Merged {} files into {} pages",
                inputs.len(),
                pdf::page_count(&merged)
            )
        }
        Operation::PdfSplit => {
            let doc = input::load_pdf(first(inputs)?)?;
            let parts = pdf::split(&doc)?;
            for (i, mut part) in parts.into_iter().enumerate() {
                out.write(&format!("page_{}", i + 1), "pdf", &pdf::save(&mut part)?)?;
            }
            format!("Split into {} pages", out.names.len())
        }
        Operation::ImageResize { width, height } => {
            let bytes = input::load_image(first(inputs)?)?;
            let jpeg = crate::pipeline::image::resize_to_jpeg(&bytes, *width, *height)?;
            out.write("resized", "jpg", &jpeg)?;
            format!("Resized to {width}x{height}")
        }
        Operation::ImageToPdf => {
            let images = inputs
                .iter()
                .map(|i| Ok((i.name.clone(), input::load_image(i)?)))
                .collect::<Result<Vec<_>>>()?;
            let mut doc = compose::image_document(&images)?;
            out.write("images", "pdf", &pdf::save(&mut doc)?)?;
            format!("Placed {} images on {} pages", images.len(), pdf::page_count(&doc))
        }
        Operation::Watermark { text } => {
            let mut doc = input::load_pdf(first(inputs)?)?;
            pdf::watermark(&mut doc, text)?;
            out.write("watermarked", "pdf", &pdf::save(&mut doc)?)?;
            format!("Watermarked {} pages", pdf::page_count(&doc))
        }
        Operation::Rotate { angle } => {
            let mut doc = input::load_pdf(first(inputs)?)?;
            pdf::rotate(&mut doc, angle.degrees())?;
            out.write("rotated", "pdf", &pdf::save(&mut doc)?)?;
            format!(
                "Rotated {} pages by {} degrees",
                pdf::page_count(&doc),
                angle.degrees()
            )
        }
        Operation::PdfCompress { level } => {
            let source = first(inputs)?;
            let before = source.read()?.len();
            let mut doc = input::load_pdf(source)?;
            pdf::compact(&mut doc, *level);
            let bytes = pdf::save(&mut doc)?;
            out.write("compressed", "pdf", &bytes)?;
            compression_message(*level, before, bytes.len())
        }
        Operation::PdfToJpg => rasterise(first(inputs)?, &mut out)?,
    };

    debug!("{}", message);
    let names = out.commit()?;
    OperationResult::from_outputs(names, Some(message))
        .ok_or_else(|| DocsmithError::Internal(format!("{} produced no output", operation.kind())))
}

fn compression_message(level: CompressionLevel, before: usize, after: usize) -> String {
    let level = match level {
        CompressionLevel::Low => "low",
        CompressionLevel::Medium => "medium",
        CompressionLevel::High => "high",
    };
    format!("Compressed ({level}) from {before} to {after} bytes")
}

#[cfg(feature = "pdfium")]
fn rasterise(source: &Input, out: &mut Outputs<'_>) -> Result<String> {
    let bytes = source.read()?;
    input::parse_pdf(&source.name, &bytes)?;
    let pages = crate::pipeline::render::render_pages(&source.name, &bytes)?;
    for (i, page) in pages.iter().enumerate() {
        let jpeg = crate::pipeline::image::encode_jpeg(page)?;
        out.write(&format!("page_{}", i + 1), "jpg", &jpeg)?;
    }
    Ok(format!("Rendered {} pages", pages.len()))
}

#[cfg(not(feature = "pdfium"))]
fn rasterise(_source: &Input, _out: &mut Outputs<'_>) -> Result<String> {
    Err(DocsmithError::UnsupportedOperation {
        operation: OperationKind::PdfToJpg.to_string(),
        reason: "page rasterisation requires a build with the 'pdfium' feature".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{FileKind, RotationAngle};
    use crate::pipeline::test_support::sample_pdf;
    use crate::store::StagingArea;

    struct Fixture {
        _dirs: (tempfile::TempDir, tempfile::TempDir),
        staging: StagingArea,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let staging_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        Fixture {
            staging: StagingArea::new(staging_dir.path()),
            dispatcher: Dispatcher::new(
                OutputStore::new(output_dir.path()),
                Duration::from_secs(30),
            ),
            _dirs: (staging_dir, output_dir),
        }
    }

    async fn output_count(f: &Fixture) -> usize {
        f.dispatcher.output().list().await.unwrap().len()
    }

    #[tokio::test]
    async fn split_writes_one_file_per_page() {
        let f = fixture();
        let mut stage = f.staging.begin().unwrap();
        stage
            .stage_bytes("three.pdf", "application/pdf", &sample_pdf(&[100, 200, 300]))
            .await
            .unwrap();
        let result = f
            .dispatcher
            .dispatch(Operation::PdfSplit, stage.files())
            .await
            .unwrap();
        assert_eq!(result.output_paths.len(), 3);
        assert!(result.output_paths[0].ends_with("_page_1.pdf"));
        assert!(result.output_paths[2].ends_with("_page_3.pdf"));
        assert_eq!(output_count(&f).await, 3);
    }

    #[tokio::test]
    async fn wrong_kind_is_rejected_before_work() {
        let f = fixture();
        let mut stage = f.staging.begin().unwrap();
        stage
            .stage_bytes("a.png", "image/png", b"\x89PNG")
            .await
            .unwrap();
        let err = f
            .dispatcher
            .dispatch(
                Operation::Rotate {
                    angle: RotationAngle::Deg90,
                },
                stage.files(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocsmithError::InvalidFileType { .. }));
    }

    #[tokio::test]
    async fn failed_merge_leaves_no_output() {
        let f = fixture();
        let mut stage = f.staging.begin().unwrap();
        stage
            .stage_bytes("good.pdf", "application/pdf", &sample_pdf(&[100]))
            .await
            .unwrap();
        stage
            .stage_bytes("bad.pdf", "application/pdf", b"not a pdf at all")
            .await
            .unwrap();
        let err = f
            .dispatcher
            .dispatch(Operation::PdfMerge, stage.files())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad.pdf"), "got: {err}");
        assert_eq!(output_count(&f).await, 0);
    }

    #[tokio::test]
    async fn timed_out_operation_publishes_nothing() {
        let f = fixture();
        let dispatcher = Dispatcher::new(f.dispatcher.output().clone(), Duration::from_millis(1));
        let mut stage = f.staging.begin().unwrap();
        stage
            .stage_bytes("long.pdf", "application/pdf", &sample_pdf(&[300; 400]))
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
        assert!(
            matches!(&err, DocsmithError::Processing(m) if m == "timed out after 1ms"),
            "got: {err:?}"
        );

        // The worker keeps going in the background; give it time to finish.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(output_count(&f).await, 0);
    }

    #[test]
    fn rollback_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let claim = Claim::default();
        {
            let mut out = Outputs::new(&store, &claim);
            out.write("page_1", "pdf", b"one").unwrap();
            out.write("page_2", "pdf", b"two").unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let mut out = Outputs::new(&store, &claim);
        out.write("kept", "txt", b"kept").unwrap();
        assert_eq!(out.commit().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn abandoned_claim_rolls_back_and_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let claim = Claim::default();

        let mut out = Outputs::new(&store, &claim);
        out.write("page_1", "pdf", b"one").unwrap();
        assert!(claim.abandon());
        assert!(out.write("page_2", "pdf", b"two").is_err());
        assert!(out.commit().is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn claim_is_settled_once() {
        let claim = Claim::default();
        assert!(claim.commit());
        assert!(!claim.abandon());
        assert!(!claim.is_abandoned());
    }

    #[test]
    fn timeout_message_names_the_limit() {
        assert!(matches!(
            timed_out(Duration::from_secs(120)),
            DocsmithError::Processing(m) if m == "timed out after 2m"
        ));
    }

    #[test]
    fn check_inputs_enforces_arity() {
        let pdf = StagedFile {
            original_name: "a.pdf".into(),
            content_type: "application/pdf".into(),
            kind: FileKind::Pdf,
            size: 1,
            path: "a.pdf".into(),
        };
        assert!(check_inputs(OperationKind::PdfMerge, std::slice::from_ref(&pdf)).is_err());
        assert!(check_inputs(OperationKind::PdfMerge, &[pdf.clone(), pdf.clone()]).is_ok());
        assert!(matches!(
            check_inputs(OperationKind::PdfToText, &[]),
            Err(DocsmithError::MissingInput(_))
        ));
    }

    #[cfg(not(feature = "pdfium"))]
    #[test]
    fn rasterise_without_pdfium_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path());
        let err = execute(
            &Operation::PdfToJpg,
            &[Input::new("a.pdf", "a.pdf")],
            &store,
            &Claim::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DocsmithError::UnsupportedOperation { .. }));
    }
}
