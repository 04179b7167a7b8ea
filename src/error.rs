use std::fmt;

use thiserror::Error;

/// Domain errors raised while validating or reconciling configuration
/// objects. Storage failures are not represented here; they travel as
/// plain `anyhow::Error` and are reported as a generic failure.
#[derive(Debug, Error)]
pub enum CmdbError {
    #[error("input is not valid, you must have at least one term in your {collection}")]
    EmptyCollection { collection: &'static str },

    #[error("duplicate {collection} keys in submission: {keys}")]
    DuplicateKey { collection: &'static str, keys: String },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("A BGP session already exists between these 2 devices and IP addresses.")]
    DuplicateSession,

    #[error("No ASN available within this range ({min}-{max}).")]
    NoIdentifierAvailable { min: u32, max: u32 },

    #[error("{anchor} cannot be changed because it is linked to: {entity}.")]
    Protected {
        anchor: &'static str,
        entity: &'static str,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),
}

impl CmdbError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Individual messages, one per reported problem.
    pub fn details(&self) -> Vec<String> {
        match self {
            Self::Validation(errors) => errors.iter().map(ToString::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

/// What is wrong with a single field of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    DeviceMismatch,
    UnknownReference { id: i64 },
    Invalid(String),
}

/// One field-level failure. `term` is filled in when the field belongs to
/// a term of a collection, e.g. `seq 10` or `ipv4-unicast`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub term: Option<String>,
    pub field: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn device_mismatch(field: impl Into<String>) -> Self {
        Self {
            term: None,
            field: field.into(),
            kind: FieldErrorKind::DeviceMismatch,
        }
    }

    pub fn unknown_reference(field: impl Into<String>, id: i64) -> Self {
        Self {
            term: None,
            field: field.into(),
            kind: FieldErrorKind::UnknownReference { id },
        }
    }

    pub fn invalid(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            term: None,
            field: field.into(),
            kind: FieldErrorKind::Invalid(msg.into()),
        }
    }

    pub fn in_term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    /// Prefix the term label, for errors coming from a nested object
    pub fn within(mut self, outer: &str) -> Self {
        self.term = Some(match self.term.take() {
            Some(term) => format!("{} {}", outer, term),
            None => outer.to_string(),
        });
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(term) = &self.term {
            write!(f, "[{}] ", term)?;
        }
        match &self.kind {
            FieldErrorKind::DeviceMismatch => write!(f, "{} is not on the same device", self.field),
            FieldErrorKind::UnknownReference { id } => {
                write!(f, "{} references unknown object {}", self.field, id)
            }
            FieldErrorKind::Invalid(msg) => write!(f, "{}: {}", self.field, msg),
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
