use crate::config::ContractLayout;
use crate::error::ContractError;
use crate::form::{FieldError, FieldValue, OnboardingData};
use crate::raster::RasterMark;
use crate::source::{DocumentSource, SourceDocument};
use crate::transform::{CoordinateTransform, PageDimensions};
use crate::types::{DocPoint, PageSize, ZoomScale};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    RevenueShare,
    InsuranceCoverage,
    MaintenanceResponsibility,
    VehicleInspection,
    TerminationTerms,
    ElectronicSignature,
}

impl Agreement {
    pub const ALL: [Agreement; 6] = [
        Agreement::RevenueShare,
        Agreement::InsuranceCoverage,
        Agreement::MaintenanceResponsibility,
        Agreement::VehicleInspection,
        Agreement::TerminationTerms,
        Agreement::ElectronicSignature,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Agreement::RevenueShare => "revenue_share",
            Agreement::InsuranceCoverage => "insurance_coverage",
            Agreement::MaintenanceResponsibility => "maintenance_responsibility",
            Agreement::VehicleInspection => "vehicle_inspection",
            Agreement::TerminationTerms => "termination_terms",
            Agreement::ElectronicSignature => "electronic_signature",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionFlag {
    GpsTracking,
    RoadsideAssistance,
}

impl OptionFlag {
    pub const ALL: [OptionFlag; 2] = [OptionFlag::GpsTracking, OptionFlag::RoadsideAssistance];

    pub fn key(self) -> &'static str {
        match self {
            OptionFlag::GpsTracking => "gps_tracking",
            OptionFlag::RoadsideAssistance => "roadside_assistance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOption {
    DirectDeposit,
    PaperCheck,
    DigitalWallet,
}

impl PaymentOption {
    pub const ALL: [PaymentOption; 3] = [
        PaymentOption::DirectDeposit,
        PaymentOption::PaperCheck,
        PaymentOption::DigitalWallet,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PaymentOption::DirectDeposit => "direct_deposit",
            PaymentOption::PaperCheck => "paper_check",
            PaymentOption::DigitalWallet => "digital_wallet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    #[default]
    Typed,
    Drawn,
}

impl SignatureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureMode::Typed => "typed",
            SignatureMode::Drawn => "drawn",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    pub agreements: BTreeSet<Agreement>,
    pub options: BTreeSet<OptionFlag>,
    pub payment: Option<PaymentOption>,
    pub agreements_flagged: bool,
    pub payment_flagged: bool,
}

impl SelectionState {
    pub fn missing_agreements(&self) -> Vec<Agreement> {
        Agreement::ALL
            .into_iter()
            .filter(|a| !self.agreements.contains(a))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureState {
    pub mode: SignatureMode,
    pub typed_name: String,
    pub drawn: Option<RasterMark>,
}

impl SignatureState {
    pub fn has_data(&self) -> bool {
        match self.mode {
            SignatureMode::Typed => !self.typed_name.trim().is_empty(),
            SignatureMode::Drawn => self.drawn.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextAnnotation {
    pub id: u64,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum SourceState {
    NotLoaded,
    Loaded(Arc<SourceDocument>),
    Failed(String),
}

// Identifies one commit attempt. Results carrying a stale ticket are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTicket {
    id: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct CommitSnapshot {
    pub ticket: CommitTicket,
    pub layout: Arc<ContractLayout>,
    pub source: Arc<SourceDocument>,
    pub fields: Vec<FieldValue>,
    pub selection: SelectionState,
    pub signature: SignatureState,
    pub annotations: Vec<TextAnnotation>,
}

#[derive(Debug, Clone)]
pub struct ContractSession {
    layout: Arc<ContractLayout>,
    fields: Vec<FieldValue>,
    selection: SelectionState,
    signature: SignatureState,
    annotations: Vec<TextAnnotation>,
    next_annotation_id: u64,
    dimensions: PageDimensions,
    scale: ZoomScale,
    add_text_mode: bool,
    source: SourceState,
    generation: u64,
    next_ticket: u64,
    in_flight: Option<u64>,
    torn_down: bool,
}

impl ContractSession {
    pub fn new(layout: Arc<ContractLayout>, onboarding: &OnboardingData) -> Self {
        let fields = seed_fields(&layout, onboarding);
        Self {
            layout,
            fields,
            selection: SelectionState::default(),
            signature: SignatureState::default(),
            annotations: Vec::new(),
            next_annotation_id: 1,
            dimensions: PageDimensions::new(),
            scale: ZoomScale::default(),
            add_text_mode: false,
            source: SourceState::NotLoaded,
            generation: 0,
            next_ticket: 1,
            in_flight: None,
            torn_down: false,
        }
    }

    pub fn layout(&self) -> &ContractLayout {
        &self.layout
    }

    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn signature(&self) -> &SignatureState {
        &self.signature
    }

    pub fn annotations(&self) -> &[TextAnnotation] {
        &self.annotations
    }

    pub fn dimensions(&self) -> &PageDimensions {
        &self.dimensions
    }

    pub fn scale(&self) -> ZoomScale {
        self.scale
    }

    pub fn transform(&self) -> CoordinateTransform<'_> {
        CoordinateTransform::new(&self.dimensions, self.scale)
    }

    pub fn source(&self) -> &SourceState {
        &self.source
    }

    pub fn page_count(&self) -> Option<u32> {
        match &self.source {
            SourceState::Loaded(doc) => Some(doc.page_count()),
            _ => None,
        }
    }

    pub fn is_committing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    // ---- fields ----

    pub fn set_field_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.edit(value);
                true
            }
            None => false,
        }
    }

    pub fn blur_field(&mut self, name: &str) -> Option<FieldError> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .and_then(FieldValue::validate)
    }

    // ---- selections ----

    pub fn toggle_agreement(&mut self, agreement: Agreement) -> bool {
        let checked = !self.selection.agreements.contains(&agreement);
        self.set_agreement(agreement, checked);
        checked
    }

    pub fn set_agreement(&mut self, agreement: Agreement, checked: bool) {
        if checked {
            self.selection.agreements.insert(agreement);
        } else {
            self.selection.agreements.remove(&agreement);
        }
        self.selection.agreements_flagged = false;
    }

    pub fn set_option(&mut self, flag: OptionFlag, enabled: bool) {
        if enabled {
            self.selection.options.insert(flag);
        } else {
            self.selection.options.remove(&flag);
        }
    }

    pub fn toggle_option(&mut self, flag: OptionFlag) -> bool {
        let enabled = !self.selection.options.contains(&flag);
        self.set_option(flag, enabled);
        enabled
    }

    pub fn select_payment(&mut self, option: PaymentOption) {
        self.selection.payment = Some(option);
        self.selection.payment_flagged = false;
    }

    // ---- signature ----

    pub fn set_signature_mode(&mut self, mode: SignatureMode) {
        self.signature.mode = mode;
    }

    pub fn set_typed_name(&mut self, name: impl Into<String>) {
        self.signature.typed_name = name.into();
    }

    pub fn capture_signature_stroke(&mut self, png: Vec<u8>) -> Result<(), ContractError> {
        let mark = RasterMark::from_png(png)?;
        self.signature.drawn = Some(mark);
        Ok(())
    }

    pub fn clear_drawn_signature(&mut self) {
        self.signature.drawn = None;
    }

    // ---- viewport ----

    pub fn set_page_dimensions(&mut self, page: u32, size: PageSize) -> bool {
        self.dimensions.record(page, size)
    }

    pub fn measure_from_source(&mut self) -> usize {
        let SourceState::Loaded(doc) = &self.source else {
            return 0;
        };
        let doc = Arc::clone(doc);
        let mut recorded = 0;
        for (idx, size) in doc.page_sizes().iter().enumerate() {
            if self.dimensions.record(idx as u32 + 1, *size) {
                recorded += 1;
            }
        }
        recorded
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = ZoomScale::new(scale);
    }

    pub fn zoom_in(&mut self) -> ZoomScale {
        self.scale = self.scale.zoomed_in();
        self.scale
    }

    pub fn zoom_out(&mut self) -> ZoomScale {
        self.scale = self.scale.zoomed_out();
        self.scale
    }

    // ---- annotations ----

    pub fn begin_add_text(&mut self) {
        self.add_text_mode = true;
    }

    pub fn cancel_add_text(&mut self) {
        self.add_text_mode = false;
    }

    pub fn is_adding_text(&self) -> bool {
        self.add_text_mode
    }

    pub fn place_annotation(&mut self, page: u32, at: DocPoint, text: &str) -> Option<&TextAnnotation> {
        self.add_text_mode = false;
        let text = text.trim();
        if text.is_empty() || page == 0 {
            return None;
        }
        let id = self.next_annotation_id;
        self.next_annotation_id += 1;
        self.annotations.push(TextAnnotation {
            id,
            page,
            x: at.x,
            y: at.y,
            text: text.to_string(),
        });
        self.annotations.last()
    }

    // ---- source ----

    pub fn load_source(&mut self, source: &dyn DocumentSource) -> Result<(), ContractError> {
        if matches!(self.source, SourceState::Loaded(_)) {
            return Ok(());
        }
        match source.fetch().and_then(SourceDocument::from_bytes) {
            Ok(doc) => {
                tracing::info!(
                    source = %source.describe(),
                    pages = doc.page_count(),
                    "source document loaded"
                );
                self.source = SourceState::Loaded(Arc::new(doc));
                Ok(())
            }
            Err(err) => {
                let message = match err {
                    ContractError::SourceLoadFailure(message) => message,
                    other => other.to_string(),
                };
                tracing::warn!(source = %source.describe(), error = %message, "source document failed to load");
                self.source = SourceState::Failed(message.clone());
                Err(ContractError::SourceLoadFailure(message))
            }
        }
    }

    pub fn attach_source(&mut self, doc: SourceDocument) {
        self.source = SourceState::Loaded(Arc::new(doc));
    }

    // ---- commit ----

    pub fn validate_for_commit(&mut self) -> Result<(), ContractError> {
        let missing_agreements = self.selection.missing_agreements();
        let payment_missing = self.selection.payment.is_none();
        self.selection.agreements_flagged = !missing_agreements.is_empty();
        self.selection.payment_flagged = payment_missing;
        if !missing_agreements.is_empty() || payment_missing {
            return Err(ContractError::ConsentIncomplete {
                missing_agreements,
                payment_missing,
            });
        }
        if !self.signature.has_data() {
            return Err(ContractError::SignatureMissing(self.signature.mode));
        }
        let errors: Vec<FieldError> = self
            .fields
            .iter_mut()
            .filter_map(FieldValue::validate)
            .collect();
        if !errors.is_empty() {
            return Err(ContractError::Validation(errors));
        }
        Ok(())
    }

    pub fn begin_commit(&mut self) -> Result<CommitSnapshot, ContractError> {
        if self.in_flight.is_some() {
            return Err(ContractError::CommitInProgress);
        }
        self.validate_for_commit()?;
        let SourceState::Loaded(source) = &self.source else {
            return Err(ContractError::SourceNotLoaded);
        };
        let ticket = CommitTicket {
            id: self.next_ticket,
            generation: self.generation,
        };
        self.next_ticket += 1;
        self.in_flight = Some(ticket.id);
        Ok(CommitSnapshot {
            ticket,
            layout: Arc::clone(&self.layout),
            source: Arc::clone(source),
            fields: self.fields.clone(),
            selection: self.selection.clone(),
            signature: self.signature.clone(),
            annotations: self.annotations.clone(),
        })
    }

    pub fn finish_commit<T>(&mut self, ticket: CommitTicket, result: T) -> Option<T> {
        if self.torn_down || ticket.generation != self.generation {
            tracing::debug!(ticket = ticket.id, "discarding result for a stale commit");
            return None;
        }
        if self.in_flight == Some(ticket.id) {
            self.in_flight = None;
        }
        Some(result)
    }

    // ---- lifetime ----

    pub fn reset(&mut self, onboarding: &OnboardingData) {
        self.fields = seed_fields(&self.layout, onboarding);
        self.selection = SelectionState::default();
        self.signature = SignatureState::default();
        self.annotations.clear();
        self.add_text_mode = false;
        self.in_flight = None;
        self.generation += 1;
    }

    pub fn teardown(&mut self) {
        self.fields.clear();
        self.selection = SelectionState::default();
        self.signature = SignatureState::default();
        self.annotations.clear();
        self.dimensions.clear();
        self.source = SourceState::NotLoaded;
        self.add_text_mode = false;
        self.in_flight = None;
        self.generation += 1;
        self.torn_down = true;
    }
}

fn seed_fields(layout: &ContractLayout, onboarding: &OnboardingData) -> Vec<FieldValue> {
    layout
        .fields
        .iter()
        .map(|spec| FieldValue::from_spec(spec, onboarding.text(spec.source_key)))
        .collect()
}
