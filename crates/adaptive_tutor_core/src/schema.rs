//! crates/adaptive_tutor_core/src/schema.rs
//!
//! The structured-output contract between the pipeline and the AI backend.
//!
//! The backend returns loosely-typed JSON. Every response is checked against an
//! explicit [`ResponseSchema`] right after the call returns, and only then
//! deserialized into a typed struct. A mismatch is an error, never a pass-through.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("response does not match schema '{schema}' at {path}: {reason}")]
pub struct SchemaViolation {
    pub schema: &'static str,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaType {
    /// Must be non-blank when the field is required.
    String,
    Array(Box<SchemaType>),
    Object(Vec<Field>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: SchemaType,
    /// Optional fields may be absent or `null`.
    pub required: bool,
}

impl Field {
    pub fn required(name: &'static str, ty: SchemaType) -> Self {
        Self { name, ty, required: true }
    }

    pub fn optional(name: &'static str, ty: SchemaType) -> Self {
        Self { name, ty, required: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub root: SchemaType,
}

impl ResponseSchema {
    /// Renders the schema as JSON Schema, for inclusion in a backend request.
    pub fn to_json_schema(&self) -> Value {
        render(&self.root)
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.check(&self.root, value, "$", true)
    }

    /// Validates `value` and converts it into `T`.
    pub fn parse<T: DeserializeOwned>(&self, value: Value) -> Result<T, SchemaViolation> {
        self.validate(&value)?;
        serde_json::from_value(value).map_err(|e| self.violation("$", e.to_string()))
    }

    fn check(&self, ty: &SchemaType, value: &Value, path: &str, required: bool) -> Result<(), SchemaViolation> {
        match ty {
            SchemaType::String => match value.as_str() {
                Some(s) if required && s.trim().is_empty() => {
                    Err(self.violation(path, "must not be blank".to_string()))
                }
                Some(_) => Ok(()),
                None => Err(self.violation(path, format!("expected string, found {}", kind(value)))),
            },
            SchemaType::Array(inner) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| self.violation(path, format!("expected array, found {}", kind(value))))?;
                for (i, item) in items.iter().enumerate() {
                    self.check(inner, item, &format!("{}[{}]", path, i), true)?;
                }
                Ok(())
            }
            SchemaType::Object(fields) => {
                let object = value
                    .as_object()
                    .ok_or_else(|| self.violation(path, format!("expected object, found {}", kind(value))))?;
                for field in fields {
                    let field_path = format!("{}.{}", path, field.name);
                    match object.get(field.name) {
                        None | Some(Value::Null) if field.required => {
                            return Err(self.violation(&field_path, "missing required field".to_string()));
                        }
                        None | Some(Value::Null) => {}
                        Some(v) => self.check(&field.ty, v, &field_path, field.required)?,
                    }
                }
                Ok(())
            }
        }
    }

    fn violation(&self, path: &str, reason: String) -> SchemaViolation {
        SchemaViolation {
            schema: self.name,
            path: path.to_string(),
            reason,
        }
    }
}

fn render(ty: &SchemaType) -> Value {
    match ty {
        SchemaType::String => json!({ "type": "string" }),
        SchemaType::Array(inner) => json!({ "type": "array", "items": render(inner) }),
        SchemaType::Object(fields) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for field in fields {
                properties.insert(field.name.to_string(), render(&field.ty));
                if field.required {
                    required.push(Value::String(field.name.to_string()));
                }
            }
            json!({ "type": "object", "properties": properties, "required": required })
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//=========================================================================================
// Pipeline Schemas and their Typed Forms
//=========================================================================================

fn string_array() -> SchemaType {
    SchemaType::Array(Box::new(SchemaType::String))
}

/// Module → submodule → slide titles.
pub fn plan_schema() -> ResponseSchema {
    let slide = SchemaType::Object(vec![Field::required("title", SchemaType::String)]);
    let submodule = SchemaType::Object(vec![
        Field::required("title", SchemaType::String),
        Field::required("slides", SchemaType::Array(Box::new(slide))),
    ]);
    let module = SchemaType::Object(vec![
        Field::required("title", SchemaType::String),
        Field::required("submodules", SchemaType::Array(Box::new(submodule))),
    ]);
    ResponseSchema {
        name: "lesson_plan",
        root: SchemaType::Object(vec![Field::required("modules", SchemaType::Array(Box::new(module)))]),
    }
}

pub fn slide_schema() -> ResponseSchema {
    ResponseSchema {
        name: "slide_content",
        root: SchemaType::Object(vec![Field::required("content", SchemaType::String)]),
    }
}

pub fn insight_schema() -> ResponseSchema {
    ResponseSchema {
        name: "profile_insight",
        root: SchemaType::Object(vec![
            Field::optional("learning_style_observed", SchemaType::String),
            Field::optional("comprehension_level", SchemaType::String),
            Field::required("interests", string_array()),
            Field::required("blockers", string_array()),
            Field::optional("objectives", SchemaType::String),
            Field::optional("engagement_patterns", SchemaType::String),
        ]),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanOutline {
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleOutline {
    pub title: String,
    pub submodules: Vec<SubmoduleOutline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmoduleOutline {
    pub title: String,
    pub slides: Vec<SlideOutline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlideOutline {
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlideBody {
    pub content: String,
}

/// A candidate profile insight extracted from one chat exchange.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInsight {
    pub learning_style_observed: Option<String>,
    pub comprehension_level: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    pub objectives: Option<String>,
    pub engagement_patterns: Option<String>,
}
