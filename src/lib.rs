mod config;
mod debug;
mod error;
mod font;
mod form;
mod layout;
mod metrics;
mod overlay;
mod raster;
mod session;
mod source;
mod synth;
#[cfg(test)]
mod test_support;
mod transform;
mod types;

pub use config::{
    CheckboxSpec, CheckboxTarget, ContractLayout, FieldCoordinate, FieldSpec, MarkStyle,
    OverflowPolicy, RENTAL_ANCHORS, RENTAL_CHECKBOXES, RENTAL_FIELDS, SignatureAnchors, TextStyle,
};
pub use contract_audit::{AuditRecord, SignatureMethod, SynthesisCounts};
pub use error::ContractError;
pub use font::SignatureFace;
pub use form::{FieldError, FieldKind, FieldValue, OnboardingData};
pub use layout::{FieldTextLayout, display_text, format_us_date, layout_field, shifted_x, wrap};
pub use metrics::{PageMetrics, SynthesisMetrics};
pub use overlay::{OverlayElement, OverlayLine, OverlayRenderer, PageOverlay, handle_page_click};
pub use raster::{MarkRasterizer, RasterMark};
pub use session::{
    Agreement, CommitSnapshot, CommitTicket, ContractSession, OptionFlag, PaymentOption,
    SelectionState, SignatureMode, SignatureState, SourceState, TextAnnotation,
};
#[cfg(feature = "http")]
pub use source::HttpSource;
pub use source::{
    BytesSource, DocumentSource, FileSource, PageReport, SourceDocument, SourceReport,
};
pub use synth::{DocumentSynthesizer, PDF_MIME_TYPE, SynthesizedDocument};
pub use transform::{CoordinateTransform, PageDimensions, centered_box, left_anchored_box};
pub use types::{DocPoint, DocRect, PageSize, ScreenPoint, ScreenRect, ZoomScale};

use debug::DebugLogger;
use font::FontRegistry;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Submission {
    pub document: SynthesizedDocument,
    pub signature_mode: SignatureMode,
    pub audit: AuditRecord,
}

pub trait ContractSubmitter {
    fn submit(&self, submission: &Submission) -> Result<(), String>;

    fn decline(&self) {}
}

pub struct ContractEngine {
    layout: Arc<ContractLayout>,
    rasterizer: MarkRasterizer,
    debug: Option<DebugLogger>,
}

pub struct ContractEngineBuilder {
    layout: ContractLayout,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    font_bytes: Vec<(String, Vec<u8>)>,
    signature_font: Option<String>,
    system_fonts: bool,
    mark_style: MarkStyle,
    debug_path: Option<PathBuf>,
}

impl ContractEngine {
    pub fn builder() -> ContractEngineBuilder {
        ContractEngineBuilder::new()
    }

    pub fn layout(&self) -> &Arc<ContractLayout> {
        &self.layout
    }

    pub fn mark_style(&self) -> &MarkStyle {
        self.rasterizer.style()
    }

    pub fn rasterizer(&self) -> &MarkRasterizer {
        &self.rasterizer
    }

    pub fn new_session(&self, onboarding: &OnboardingData) -> ContractSession {
        ContractSession::new(Arc::clone(&self.layout), onboarding)
    }

    pub fn render_overlay(
        &self,
        session: &ContractSession,
        pages: impl IntoIterator<Item = u32>,
    ) -> Vec<PageOverlay> {
        OverlayRenderer::new(session, *self.rasterizer.style())
            .with_rasterizer(&self.rasterizer)
            .with_debug(self.debug.as_ref())
            .render_pages(pages)
    }

    pub fn checkmark_data_uri(&self) -> Result<String, ContractError> {
        Ok(self.rasterizer.rasterize_checkmark()?.data_uri())
    }

    pub fn synthesize(&self, snapshot: &CommitSnapshot) -> Result<SynthesizedDocument, ContractError> {
        DocumentSynthesizer::new(&self.rasterizer)
            .with_debug(self.debug.as_ref())
            .synthesize(snapshot)
    }

    // Ok(None): the session was reset or torn down mid-commit and the result is dropped.
    pub fn commit(
        &self,
        session: &mut ContractSession,
        submitter: &dyn ContractSubmitter,
    ) -> Result<Option<Submission>, ContractError> {
        let snapshot = session.begin_commit()?;
        let result = self.synthesize(&snapshot).and_then(|document| {
            let submission = self.prepare_submission(&snapshot, document);
            submitter
                .submit(&submission)
                .map_err(ContractError::SubmissionFailed)?;
            Ok(submission)
        });
        if let Some(debug) = &self.debug {
            debug.emit_summary("commit");
            debug.flush();
        }
        match session.finish_commit(snapshot.ticket, result) {
            Some(Ok(submission)) => {
                tracing::info!(
                    contract = %submission.audit.contract_id,
                    fingerprint = %submission.audit.fingerprint_sha256(),
                    "contract submitted"
                );
                Ok(Some(submission))
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "commit failed; session state kept");
                Err(err)
            }
            None => Ok(None),
        }
    }

    fn prepare_submission(&self, snapshot: &CommitSnapshot, document: SynthesizedDocument) -> Submission {
        let method = match document.signature_mode {
            SignatureMode::Typed => SignatureMethod::Typed,
            SignatureMode::Drawn => SignatureMethod::Drawn,
        };
        let audit = AuditRecord::new(
            self.layout.contract_id.clone(),
            method,
            snapshot.source.bytes(),
            &document.bytes,
            document.metrics.counts(),
        );
        Submission {
            signature_mode: document.signature_mode,
            document,
            audit,
        }
    }
}

impl ContractEngineBuilder {
    pub fn new() -> Self {
        Self {
            layout: ContractLayout::rental_agreement(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            font_bytes: Vec::new(),
            signature_font: None,
            system_fonts: true,
            mark_style: MarkStyle::default(),
            debug_path: None,
        }
    }

    pub fn layout(mut self, layout: ContractLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    pub fn register_font_bytes(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.font_bytes.push((name.into(), data));
        self
    }

    pub fn signature_font(mut self, name: impl Into<String>) -> Self {
        self.signature_font = Some(name.into());
        self
    }

    pub fn system_fonts(mut self, enabled: bool) -> Self {
        self.system_fonts = enabled;
        self
    }

    pub fn mark_style(mut self, style: MarkStyle) -> Self {
        self.mark_style = style;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ContractEngine, ContractError> {
        self.layout.validate()?;
        let style = self.mark_style;
        if style.checkmark_px == 0 || style.signature_width_px == 0 || style.signature_height_px == 0 {
            return Err(ContractError::InvalidConfiguration(
                "mark raster sizes must be > 0".to_string(),
            ));
        }
        if !(style.checkmark_pt > 0.0 && style.signature_scale > 0.0 && style.signature_font_px > 0.0) {
            return Err(ContractError::InvalidConfiguration(
                "mark sizes and signature scale must be > 0".to_string(),
            ));
        }

        let mut registry = FontRegistry::new();
        for dir in &self.font_dirs {
            registry.register_dir(dir);
        }
        for file in &self.font_files {
            registry.register_file(file);
        }
        for (name, data) in self.font_bytes {
            registry.register_bytes(data, Some(&name))?;
        }
        let face = registry.signature_face(self.signature_font.as_deref(), self.system_fonts);
        match &face {
            Some(face) => tracing::debug!(
                font = %face.name,
                oblique = face.synthetic_oblique,
                registered = registry.len(),
                "signature face selected"
            ),
            None => tracing::warn!("no signature font found; typed signatures cannot be rasterized"),
        }

        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(ContractEngine {
            layout: Arc::new(self.layout),
            rasterizer: MarkRasterizer::new(style, face),
            debug,
        })
    }
}

impl Default for ContractEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
