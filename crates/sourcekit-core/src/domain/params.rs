use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{FieldIssue, ValidationError};

/// Declared type of one task parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Long,
    Double,
    Boolean,
    StringArray,
    Json,
}

impl ParamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::StringArray => "string_array",
            Self::Json => "json",
        }
    }

    /// Returns the accepted value, or the JSON type name that was found instead.
    fn coerce(self, value: &Value) -> Result<Value, &'static str> {
        let found = json_type_name(value);
        match (self, value) {
            (Self::Json, _) => Ok(value.clone()),
            (Self::String, Value::String(_)) => Ok(value.clone()),
            (Self::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (Self::Boolean, Value::String(text)) => match text.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(found),
            },
            (Self::Long, Value::Number(number)) => number
                .as_i64()
                .map(Value::from)
                .ok_or("fractional number"),
            (Self::Long, Value::String(text)) => {
                text.trim().parse::<i64>().map(Value::from).map_err(|_| found)
            }
            (Self::Double, Value::Number(_)) => Ok(value.clone()),
            (Self::Double, Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|parsed| serde_json::Number::from_f64(parsed).map(Value::Number))
                .ok_or(found),
            (Self::StringArray, Value::Array(items)) if items.iter().all(Value::is_string) => {
                Ok(value.clone())
            }
            (Self::StringArray, Value::Array(_)) => Err("array with non-string items"),
            _ => Err(found),
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter: name, type, whether it is required, and its default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered parameter schema attached to a task definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Checks `raw` against the schema, reporting every issue at once.
    ///
    /// Defaults fill absent optional fields; `null` counts as absent; keys the
    /// schema does not declare are dropped.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<TaskParams, ValidationError> {
        let mut values = Map::new();
        let mut issues = Vec::new();

        for spec in &self.specs {
            match raw.get(&spec.name).filter(|value| !value.is_null()) {
                Some(value) => match spec.kind.coerce(value) {
                    Ok(accepted) => {
                        values.insert(spec.name.clone(), accepted);
                    }
                    Err(found) => issues.push(FieldIssue::WrongType {
                        name: spec.name.clone(),
                        expected: spec.kind,
                        found,
                    }),
                },
                None => {
                    if let Some(default) = &spec.default {
                        values.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        issues.push(FieldIssue::Missing {
                            name: spec.name.clone(),
                        });
                    }
                }
            }
        }

        for key in raw.keys() {
            if !self.specs.iter().any(|spec| &spec.name == key) {
                debug!(param = %key, "ignoring undeclared task parameter");
            }
        }

        if issues.is_empty() {
            Ok(TaskParams { values })
        } else {
            Err(ValidationError::InvalidParameters { issues })
        }
    }

    /// Replaces every variable name found inside declared string parameters.
    ///
    /// Returns the variables that actually occurred. A variable without a value
    /// is only an error when it occurs somewhere.
    pub fn substitute_variables(
        &self,
        raw: &mut Map<String, Value>,
        variables: &BTreeMap<String, Option<String>>,
    ) -> Result<BTreeMap<String, String>, ValidationError> {
        let mut used = BTreeMap::new();

        for spec in &self.specs {
            let Some(value) = raw.get_mut(&spec.name) else {
                continue;
            };
            match (spec.kind, value) {
                (ParamType::String, Value::String(text)) => {
                    replace_in(text, variables, &mut used)?;
                }
                (ParamType::StringArray, Value::Array(items)) => {
                    for item in items.iter_mut() {
                        if let Value::String(text) = item {
                            replace_in(text, variables, &mut used)?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(used)
    }
}

fn replace_in(
    text: &mut String,
    variables: &BTreeMap<String, Option<String>>,
    used: &mut BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    for (name, value) in variables {
        if name.is_empty() || !text.contains(name.as_str()) {
            continue;
        }
        let Some(value) = value else {
            return Err(ValidationError::UnsetVariable { name: name.clone() });
        };
        *text = text.replace(name.as_str(), value);
        used.insert(name.clone(), value.clone());
    }
    Ok(())
}

/// Parameters that passed schema validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TaskParams {
    values: Map<String, Value>,
}

impl TaskParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Decodes the validated values into an executor's typed parameter struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        serde_json::from_value(Value::Object(self.values.clone())).map_err(|e| {
            ValidationError::ParameterShape {
                message: e.to_string(),
            }
        })
    }
}
