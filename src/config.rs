use crate::error::ContractError;
use crate::form::FieldKind;
use crate::session::{Agreement, OptionFlag, PaymentOption};
use crate::types::DocPoint;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldCoordinate {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

impl FieldCoordinate {
    pub const fn new(page: u32, x: f64, y: f64) -> Self {
        Self { page, x, y }
    }

    pub fn point(&self) -> DocPoint {
        DocPoint::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverflowPolicy {
    pub wrap: bool,
    pub dynamic_shift: bool,
    pub max_chars_per_line: usize,
    pub char_width_pt: f64,
    pub threshold_chars: usize,
}

impl OverflowPolicy {
    pub const NONE: OverflowPolicy = OverflowPolicy {
        wrap: false,
        dynamic_shift: false,
        max_chars_per_line: 20,
        char_width_pt: 8.0,
        threshold_chars: 15,
    };

    pub const WRAP_AND_SHIFT: OverflowPolicy = OverflowPolicy {
        wrap: true,
        dynamic_shift: true,
        ..OverflowPolicy::NONE
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub source_key: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub max_length: Option<usize>,
    pub coordinate: FieldCoordinate,
    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckboxTarget {
    Agreement(Agreement),
    Option(OptionFlag),
    Payment(PaymentOption),
}

impl CheckboxTarget {
    pub fn key(self) -> &'static str {
        match self {
            CheckboxTarget::Agreement(a) => a.key(),
            CheckboxTarget::Option(o) => o.key(),
            CheckboxTarget::Payment(p) => p.key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckboxSpec {
    pub target: CheckboxTarget,
    pub coordinate: FieldCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureAnchors {
    pub owner_signature: FieldCoordinate,
    // Counter-party signature slot. Filled out of band; never drawn here.
    pub counterparty_signature: FieldCoordinate,
    // Signing date slot. Left blank for manual entry.
    pub signing_date: FieldCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size_pt: f64,
    pub line_height_pt: f64,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size_pt: 12.0,
            line_height_pt: 14.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkStyle {
    pub checkmark_px: u32,
    pub checkmark_pt: f64,
    pub signature_width_px: u32,
    pub signature_height_px: u32,
    pub signature_font_px: f32,
    pub signature_scale: f64,
}

impl Default for MarkStyle {
    fn default() -> Self {
        Self {
            checkmark_px: 24,
            checkmark_pt: 12.0,
            signature_width_px: 400,
            signature_height_px: 100,
            signature_font_px: 40.0,
            signature_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractLayout {
    pub contract_id: String,
    pub fields: Vec<FieldSpec>,
    pub checkboxes: Vec<CheckboxSpec>,
    pub anchors: SignatureAnchors,
    pub text: TextStyle,
}

impl ContractLayout {
    pub fn rental_agreement() -> Self {
        Self {
            contract_id: "vehicle-rental-onboarding".to_string(),
            fields: RENTAL_FIELDS.to_vec(),
            checkboxes: RENTAL_CHECKBOXES.to_vec(),
            anchors: RENTAL_ANCHORS,
            text: TextStyle::default(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn checkbox(&self, target: CheckboxTarget) -> Option<&CheckboxSpec> {
        self.checkboxes.iter().find(|spec| spec.target == target)
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        let mut names = BTreeSet::new();
        for spec in &self.fields {
            if spec.name.trim().is_empty() {
                return Err(ContractError::InvalidConfiguration(
                    "field name cannot be empty".to_string(),
                ));
            }
            if !names.insert(spec.name) {
                return Err(ContractError::InvalidConfiguration(format!(
                    "duplicate field name: {}",
                    spec.name
                )));
            }
            validate_coordinate(spec.name, &spec.coordinate)?;
            if spec.overflow.wrap && spec.overflow.max_chars_per_line == 0 {
                return Err(ContractError::InvalidConfiguration(format!(
                    "field {} wraps with max_chars_per_line=0",
                    spec.name
                )));
            }
        }
        let mut targets = BTreeSet::new();
        for spec in &self.checkboxes {
            if !targets.insert(spec.target) {
                return Err(ContractError::InvalidConfiguration(format!(
                    "duplicate checkbox target: {:?}",
                    spec.target
                )));
            }
            validate_coordinate("checkbox", &spec.coordinate)?;
        }
        validate_coordinate("owner_signature", &self.anchors.owner_signature)?;
        if !(self.text.font_size_pt > 0.0 && self.text.line_height_pt > 0.0) {
            return Err(ContractError::InvalidConfiguration(
                "text font size and line height must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_coordinate(name: &str, coordinate: &FieldCoordinate) -> Result<(), ContractError> {
    // Pages past the end of the bound document are tolerated and skipped at render time.
    if coordinate.page == 0 {
        return Err(ContractError::InvalidConfiguration(format!(
            "{name}: page numbers are 1-based"
        )));
    }
    if !coordinate.x.is_finite() || !coordinate.y.is_finite() {
        return Err(ContractError::InvalidConfiguration(format!(
            "{name}: coordinate must be finite"
        )));
    }
    Ok(())
}

const fn text_field(
    name: &'static str,
    label: &'static str,
    source_key: &'static str,
    kind: FieldKind,
    coordinate: FieldCoordinate,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        source_key,
        kind,
        required: true,
        max_length: None,
        coordinate,
        overflow: OverflowPolicy::NONE,
    }
}

pub const RENTAL_FIELDS: [FieldSpec; 12] = [
    FieldSpec {
        overflow: OverflowPolicy::WRAP_AND_SHIFT,
        max_length: Some(60),
        ..text_field("owner", "Owner Name", "ownerName", FieldKind::Text, FieldCoordinate::new(1, 340.0, 688.0))
    },
    text_field("owner_email", "Email", "email", FieldKind::Email, FieldCoordinate::new(1, 340.0, 664.0)),
    text_field("owner_phone", "Phone", "phone", FieldKind::Tel, FieldCoordinate::new(1, 340.0, 640.0)),
    text_field("owner_address", "Mailing Address", "address", FieldKind::Text, FieldCoordinate::new(1, 340.0, 616.0)),
    text_field("vehicle_year", "Year", "year", FieldKind::Text, FieldCoordinate::new(1, 120.0, 560.0)),
    text_field("vehicle_make", "Make", "make", FieldKind::Text, FieldCoordinate::new(1, 220.0, 560.0)),
    text_field("vehicle_model", "Model", "model", FieldKind::Text, FieldCoordinate::new(1, 340.0, 560.0)),
    FieldSpec {
        max_length: Some(17),
        ..text_field("vin", "VIN", "vin", FieldKind::Text, FieldCoordinate::new(1, 120.0, 536.0))
    },
    text_field("license_plate", "License Plate", "licensePlate", FieldKind::Text, FieldCoordinate::new(1, 340.0, 536.0)),
    FieldSpec {
        required: false,
        ..text_field("vehicle_color", "Color", "color", FieldKind::Text, FieldCoordinate::new(1, 460.0, 536.0))
    },
    FieldSpec {
        required: false,
        ..text_field("mileage", "Current Mileage", "mileage", FieldKind::Text, FieldCoordinate::new(1, 120.0, 512.0))
    },
    text_field("effective_date", "Effective Date", "effectiveDate", FieldKind::Date, FieldCoordinate::new(1, 340.0, 512.0)),
];

pub const RENTAL_CHECKBOXES: [CheckboxSpec; 11] = [
    CheckboxSpec { target: CheckboxTarget::Agreement(Agreement::RevenueShare), coordinate: FieldCoordinate::new(11, 80.0, 348.0) },
    CheckboxSpec { target: CheckboxTarget::Agreement(Agreement::InsuranceCoverage), coordinate: FieldCoordinate::new(11, 80.0, 324.0) },
    CheckboxSpec { target: CheckboxTarget::Agreement(Agreement::MaintenanceResponsibility), coordinate: FieldCoordinate::new(11, 80.0, 300.0) },
    CheckboxSpec { target: CheckboxTarget::Agreement(Agreement::VehicleInspection), coordinate: FieldCoordinate::new(11, 80.0, 276.0) },
    CheckboxSpec { target: CheckboxTarget::Agreement(Agreement::TerminationTerms), coordinate: FieldCoordinate::new(11, 80.0, 252.0) },
    CheckboxSpec { target: CheckboxTarget::Agreement(Agreement::ElectronicSignature), coordinate: FieldCoordinate::new(11, 80.0, 228.0) },
    CheckboxSpec { target: CheckboxTarget::Option(OptionFlag::GpsTracking), coordinate: FieldCoordinate::new(11, 80.0, 180.0) },
    CheckboxSpec { target: CheckboxTarget::Option(OptionFlag::RoadsideAssistance), coordinate: FieldCoordinate::new(11, 80.0, 156.0) },
    CheckboxSpec { target: CheckboxTarget::Payment(PaymentOption::DirectDeposit), coordinate: FieldCoordinate::new(12, 80.0, 420.0) },
    CheckboxSpec { target: CheckboxTarget::Payment(PaymentOption::PaperCheck), coordinate: FieldCoordinate::new(12, 220.0, 420.0) },
    CheckboxSpec { target: CheckboxTarget::Payment(PaymentOption::DigitalWallet), coordinate: FieldCoordinate::new(12, 360.0, 420.0) },
];

pub const RENTAL_ANCHORS: SignatureAnchors = SignatureAnchors {
    owner_signature: FieldCoordinate::new(12, 120.0, 200.0),
    counterparty_signature: FieldCoordinate::new(12, 380.0, 200.0),
    signing_date: FieldCoordinate::new(12, 120.0, 170.0),
};
