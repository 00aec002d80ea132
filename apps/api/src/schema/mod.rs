//! Schema validation: two independent validators with different strictness.
//!
//! - `structural`: the output-shape contract handed to the generator. Strict about
//!   required fields and their types, permissive about unknown optional fields.
//! - `json_resume`: the authoritative JSON Resume schema. Unknown top-level
//!   properties are rejected and `email` / `uri` formats are checked. It gates both
//!   base resumes going into a generation and generator output coming back.
//!
//! The two are compiled separately so loosening the generator hint never weakens
//! the authoritative check.

use jsonschema::{Draft, ValidationError, Validator};
use serde_json::Value;
use thiserror::Error;

const JSON_RESUME_SCHEMA: &str = include_str!("../../schemas/json-resume.schema.json");
const RESUME_SHAPE_SCHEMA: &str = include_str!("../../schemas/resume-shape.schema.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("embedded schema '{name}' is not valid JSON: {source}")]
    Parse {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedded schema '{name}' failed to compile: {message}")]
    Compile { name: &'static str, message: String },
}

/// A compiled JSON Schema plus the raw document (the generator needs the raw form).
pub struct SchemaValidator {
    name: &'static str,
    schema: Value,
    validator: Validator,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// The request-shape contract for tailored resumes.
    pub fn structural() -> Result<Self, SchemaError> {
        Self::compile("tailored_resume", RESUME_SHAPE_SCHEMA)
    }

    /// The authoritative JSON Resume schema.
    pub fn json_resume() -> Result<Self, SchemaError> {
        Self::compile("json_resume", JSON_RESUME_SCHEMA)
    }

    fn compile(name: &'static str, source: &str) -> Result<Self, SchemaError> {
        let schema: Value =
            serde_json::from_str(source).map_err(|source| SchemaError::Parse { name, source })?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| SchemaError::Compile {
                name,
                message: e.to_string(),
            })?;

        Ok(Self {
            name,
            schema,
            validator,
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn validate(&self, document: &Value) -> bool {
        self.validator.is_valid(document)
    }

    /// Validates and, on failure, returns every violation formatted by `format_errors`.
    pub fn check(&self, document: &Value) -> Result<(), Vec<String>> {
        if self.validate(document) {
            return Ok(());
        }
        Err(format_errors(self.validator.iter_errors(document)))
    }
}

/// Formats raw validation errors as `"<instance path>: <message>"`, in the order
/// the validator reported them. The root path is rendered as `/`.
pub fn format_errors<'a, I>(errors: I) -> Vec<String>
where
    I: IntoIterator<Item = ValidationError<'a>>,
{
    errors
        .into_iter()
        .map(|e| {
            let path = e.instance_path().to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("{path}: {e}")
        })
        .collect()
}

/// Both validators, compiled once at startup and shared.
#[derive(Debug)]
pub struct SchemaValidators {
    pub structural: SchemaValidator,
    pub json_resume: SchemaValidator,
}

impl SchemaValidators {
    pub fn load() -> Result<Self, SchemaError> {
        Ok(Self {
            structural: SchemaValidator::structural()?,
            json_resume: SchemaValidator::json_resume()?,
        })
    }
}
