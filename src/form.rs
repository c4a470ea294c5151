use crate::config::FieldSpec;
use crate::layout::parse_date;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    pub name: String,
    pub label: String,
    pub value: String,
    pub required: bool,
    pub kind: FieldKind,
    pub error: Option<String>,
    pub max_length: Option<usize>,
}

impl FieldValue {
    pub fn from_spec(spec: &FieldSpec, value: impl Into<String>) -> Self {
        Self {
            name: spec.name.to_string(),
            label: spec.label.to_string(),
            value: value.into(),
            required: spec.required,
            kind: spec.kind,
            error: None,
            max_length: spec.max_length,
        }
    }

    pub fn edit(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.error = None;
    }

    pub fn validate(&mut self) -> Option<FieldError> {
        self.error = check_value(&self.label, self.kind, self.required, self.max_length, &self.value);
        self.error.as_ref().map(|message| FieldError {
            name: self.name.clone(),
            message: message.clone(),
        })
    }
}

fn check_value(
    label: &str,
    kind: FieldKind,
    required: bool,
    max_length: Option<usize>,
    value: &str,
) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return required.then(|| format!("{label} is required"));
    }
    if let Some(max) = max_length {
        if trimmed.chars().count() > max {
            return Some(format!("{label} must be at most {max} characters"));
        }
    }
    match kind {
        FieldKind::Text => None,
        FieldKind::Email => (!looks_like_email(trimmed)).then(|| "Invalid email address".to_string()),
        FieldKind::Tel => {
            let digits = trimmed.chars().filter(|ch| ch.is_ascii_digit()).count();
            let allowed = trimmed
                .chars()
                .all(|ch| ch.is_ascii_digit() || matches!(ch, ' ' | '-' | '(' | ')' | '+' | '.'));
            (!allowed || digits < 10).then(|| "Invalid phone number".to_string())
        }
        FieldKind::Date => parse_date(trimmed)
            .is_none()
            .then(|| format!("{label} must be a valid date")),
    }
}

fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnboardingData {
    values: Map<String, Value>,
}

impl OnboardingData {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let values: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self { values })
    }

    pub fn text(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

impl From<Map<String, Value>> for OnboardingData {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values)
    }
}
