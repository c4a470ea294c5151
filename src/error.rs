use crate::form::FieldError;
use crate::session::{Agreement, SignatureMode};
use std::fmt;

#[derive(Debug)]
pub enum ContractError {
    Validation(Vec<FieldError>),
    ConsentIncomplete {
        missing_agreements: Vec<Agreement>,
        payment_missing: bool,
    },
    SignatureMissing(SignatureMode),
    SourceNotLoaded,
    SourceLoadFailure(String),
    RasterizationUnavailable(String),
    SynthesisFailure(String),
    CommitInProgress,
    SubmissionFailed(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl ContractError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ContractError::InvalidConfiguration(_))
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractError::Validation(errors) => {
                write!(f, "{} field(s) failed validation", errors.len())?;
                for (idx, err) in errors.iter().enumerate() {
                    let sep = if idx == 0 { ": " } else { "; " };
                    write!(f, "{}{}: {}", sep, err.name, err.message)?;
                }
                Ok(())
            }
            ContractError::ConsentIncomplete {
                missing_agreements,
                payment_missing,
            } => {
                write!(f, "consent incomplete")?;
                if !missing_agreements.is_empty() {
                    let names: Vec<&str> = missing_agreements.iter().map(|a| a.key()).collect();
                    write!(f, ": missing agreements [{}]", names.join(", "))?;
                }
                if *payment_missing {
                    write!(f, ": no payment option selected")?;
                }
                Ok(())
            }
            ContractError::SignatureMissing(mode) => {
                write!(f, "signature missing for {} mode", mode.as_str())
            }
            ContractError::SourceNotLoaded => write!(f, "source document is not loaded"),
            ContractError::SourceLoadFailure(message) => {
                write!(f, "source document failed to load: {}", message)
            }
            ContractError::RasterizationUnavailable(message) => {
                write!(f, "rasterization unavailable: {}", message)
            }
            ContractError::SynthesisFailure(message) => {
                write!(f, "document synthesis failed: {}", message)
            }
            ContractError::CommitInProgress => write!(f, "a commit is already in flight"),
            ContractError::SubmissionFailed(message) => {
                write!(f, "submission failed: {}", message)
            }
            ContractError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ContractError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ContractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ContractError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ContractError {
    fn from(value: std::io::Error) -> Self {
        ContractError::Io(value)
    }
}

pub(crate) fn lopdf_err(err: lopdf::Error) -> ContractError {
    ContractError::SynthesisFailure(format!("pdf error: {err}"))
}
