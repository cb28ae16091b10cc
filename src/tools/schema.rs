//! Tool schemas and their wire-dialect emitters.
//!
//! A [`ToolSchema`] describes a tool to the model. Two dialects are
//! emitted: the function-calling shape used by chat-completions endpoints
//! and the Model Context Protocol shape with a JSON-Schema `inputSchema`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::registry::RegistryError;

/// JSON kind of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterKind {
    /// JSON-Schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Number => "number",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Array => "array",
            ParameterKind::Object => "object",
        }
    }

    /// Parse a JSON-Schema type name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "string" => Some(ParameterKind::String),
            "number" | "integer" => Some(ParameterKind::Number),
            "boolean" => Some(ParameterKind::Boolean),
            "array" => Some(ParameterKind::Array),
            "object" => Some(ParameterKind::Object),
            _ => None,
        }
    }

    /// Whether a JSON value is compatible with this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParameterKind::String => value.is_string(),
            ParameterKind::Number => value.is_number(),
            ParameterKind::Boolean => value.is_boolean(),
            ParameterKind::Array => value.is_array(),
            ParameterKind::Object => value.is_object(),
        }
    }
}

/// Category tag for registry filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Computation,
    Data,
    File,
    Web,
    Code,
    Visualization,
    Domain,
}

impl ToolCategory {
    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Computation => "computation",
            ToolCategory::Data => "data",
            ToolCategory::File => "file",
            ToolCategory::Web => "web",
            ToolCategory::Code => "code",
            ToolCategory::Visualization => "visualization",
            ToolCategory::Domain => "domain",
        }
    }
}

/// A single declared tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Item schema for array parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

impl ToolParameter {
    /// Create a required parameter.
    pub fn new(
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
            items: None,
        }
    }

    /// Mark the parameter optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Restrict the parameter to an enum of values.
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Set a default value (implies optional).
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.required = false;
        self
    }

    /// Set the array item schema.
    pub fn with_items(mut self, items: Value) -> Self {
        self.items = Some(items);
        self
    }

    fn property_schema(&self) -> Value {
        let mut prop = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let Some(values) = &self.enum_values {
            prop["enum"] = json!(values);
        }
        if let Some(items) = &self.items {
            prop["items"] = items.clone();
        }
        if let Some(default) = &self.default {
            prop["default"] = default.clone();
        }
        prop
    }
}

/// Full description of a tool for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub parameters: Vec<ToolParameter>,
    /// Human-readable description of the return value.
    pub returns: String,
}

impl ToolSchema {
    /// Create a schema with no parameters.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            parameters: Vec::new(),
            returns: String::new(),
        }
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the return description.
    pub fn with_returns(mut self, returns: impl Into<String>) -> Self {
        self.returns = returns.into();
        self
    }

    /// Emit the function-calling dialect.
    pub fn to_function_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            properties.insert(param.name.clone(), param.property_schema());
            if param.required {
                required.push(param.name.clone());
            }
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }

    /// Emit the Model Context Protocol dialect.
    pub fn to_mcp_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.property_schema());
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "name": self.name,
            "description": self.description,
            "category": self.category.as_str(),
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
            "returns": self.returns,
        })
    }

    /// Parse a function-calling schema back into a [`ToolSchema`].
    ///
    /// Round-trips the shape produced by [`to_function_schema`]; the
    /// category and return description are not carried by that dialect and
    /// default to [`ToolCategory::Domain`] and empty.
    ///
    /// [`to_function_schema`]: Self::to_function_schema
    pub fn parse_function_schema(value: &Value) -> Result<Self, RegistryError> {
        let function = value
            .get("function")
            .ok_or_else(|| RegistryError::invalid_schema("missing 'function' object"))?;

        let name = function
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistryError::invalid_schema("missing function name"))?
            .to_string();
        let description = function
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let empty = Map::new();
        let params = function.get("parameters");
        let properties = params
            .and_then(|p| p.get("properties"))
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let required: Vec<&str> = params
            .and_then(|p| p.get("required"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut parameters = Vec::new();
        for (param_name, prop) in properties {
            let kind = prop
                .get("type")
                .and_then(Value::as_str)
                .and_then(ParameterKind::parse)
                .ok_or_else(|| {
                    RegistryError::invalid_schema(format!(
                        "parameter '{}' has no recognized type",
                        param_name
                    ))
                })?;

            let mut parameter = ToolParameter::new(
                param_name.clone(),
                kind,
                prop.get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            );
            parameter.required = required.contains(&param_name.as_str());
            parameter.enum_values = prop
                .get("enum")
                .and_then(Value::as_array)
                .map(|a| a.to_vec());
            parameter.default = prop.get("default").cloned();
            parameter.items = prop.get("items").cloned();
            parameters.push(parameter);
        }

        Ok(Self {
            name,
            description,
            category: ToolCategory::Domain,
            parameters,
            returns: String::new(),
        })
    }

    /// Validate an argument map against this schema.
    ///
    /// Returns an error message, or `None` when the arguments are valid.
    pub fn validate_args(&self, args: &Map<String, Value>) -> Option<String> {
        for param in &self.parameters {
            let value = match args.get(&param.name) {
                Some(v) => v,
                None => {
                    if param.required {
                        return Some(format!("missing required parameter: {}", param.name));
                    }
                    continue;
                }
            };

            if value.is_null() && !param.required {
                continue;
            }

            if !param.kind.accepts(value) {
                return Some(format!(
                    "invalid type for {}: expected {}",
                    param.name,
                    param.kind.as_str()
                ));
            }

            if let Some(allowed) = &param.enum_values {
                if !allowed.contains(value) {
                    return Some(format!(
                        "invalid value for {}: must be one of {:?}",
                        param.name, allowed
                    ));
                }
            }
        }

        None
    }
}
