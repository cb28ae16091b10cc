//! Tool registry scenarios: validation gating and schema dialects.

use async_trait::async_trait;
use hivekit::tools::{
    ParameterKind, Tool, ToolCategory, ToolParameter, ToolRegistry, ToolResult, ToolSchema,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Emission-factor calculator with a required `waste_type` parameter.
struct EmissionCalculator {
    schema: ToolSchema,
    invocations: AtomicU32,
}

impl EmissionCalculator {
    fn new() -> Self {
        Self {
            schema: ToolSchema::new(
                "emission_calculator",
                "Estimate greenhouse-gas emissions for a waste stream",
                ToolCategory::Domain,
            )
            .with_parameter(
                ToolParameter::new("waste_type", ParameterKind::String, "Waste category")
                    .with_enum(vec![
                        json!("organic"),
                        json!("plastic"),
                        json!("paper"),
                        json!("metal"),
                    ]),
            )
            .with_parameter(ToolParameter::new(
                "mass_kg",
                ParameterKind::Number,
                "Mass in kilograms",
            ))
            .with_parameter(
                ToolParameter::new("method", ParameterKind::String, "Treatment method")
                    .with_default(json!("landfill")),
            )
            .with_returns("Estimated CO2-equivalent emissions in kilograms"),
            invocations: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Tool for EmissionCalculator {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> anyhow::Result<ToolResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mass = args["mass_kg"].as_f64().unwrap_or_default();
        let factor = match args["waste_type"].as_str().unwrap_or_default() {
            "organic" => 0.5,
            "plastic" => 6.0,
            "paper" => 1.1,
            _ => 2.0,
        };
        Ok(ToolResult::ok(json!({"co2e_kg": mass * factor})))
    }
}

#[tokio::test]
async fn missing_required_parameter_never_invokes_executor() {
    let registry = ToolRegistry::new();
    let tool = Arc::new(EmissionCalculator::new());
    registry.register(tool.clone()).unwrap();

    let mut args = Map::new();
    args.insert("mass_kg".to_string(), json!(120.0));

    let result = registry.execute("emission_calculator", args).await;

    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("missing required parameter: waste_type")
    );
    assert_eq!(tool.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn valid_arguments_reach_the_executor() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EmissionCalculator::new())).unwrap();

    let mut args = Map::new();
    args.insert("waste_type".to_string(), json!("plastic"));
    args.insert("mass_kg".to_string(), json!(10.0));

    let result = registry.execute("emission_calculator", args).await;
    assert!(result.success);
    assert_eq!(result.data["co2e_kg"], 60.0);
}

#[tokio::test]
async fn enum_violation_is_rejected_before_execution() {
    let registry = ToolRegistry::new();
    let tool = Arc::new(EmissionCalculator::new());
    registry.register(tool.clone()).unwrap();

    let mut args = Map::new();
    args.insert("waste_type".to_string(), json!("antimatter"));
    args.insert("mass_kg".to_string(), json!(1.0));

    let result = registry.execute("emission_calculator", args).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("invalid value for waste_type"));
    assert_eq!(tool.invocations.load(Ordering::SeqCst), 0);
}

#[test]
fn function_schema_dialect_round_trips() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EmissionCalculator::new())).unwrap();

    let emitted = registry.to_function_schemas(None);
    assert_eq!(emitted.len(), 1);

    let parsed = ToolSchema::parse_function_schema(&emitted[0]).unwrap();
    assert_eq!(parsed.name, "emission_calculator");
    assert_eq!(parsed.parameters.len(), 3);

    // Re-emitting the parsed schema reproduces the wire shape.
    let reemitted = parsed.to_function_schema();
    assert_eq!(
        reemitted["function"]["parameters"],
        emitted[0]["function"]["parameters"]
    );
}

#[test]
fn mcp_dialect_carries_input_schema() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EmissionCalculator::new())).unwrap();

    let emitted = registry.to_mcp_schemas(None);
    assert_eq!(emitted.len(), 1);

    let schema = &emitted[0];
    assert_eq!(schema["name"], "emission_calculator");
    assert_eq!(schema["category"], "domain");
    assert_eq!(schema["inputSchema"]["type"], "object");
    assert_eq!(
        schema["inputSchema"]["properties"]["waste_type"]["enum"][1],
        "plastic"
    );
    let required = schema["inputSchema"]["required"].as_array().unwrap();
    assert!(required.contains(&json!("waste_type")));
    assert!(required.contains(&json!("mass_kg")));
    // Defaulted parameters are optional.
    assert!(!required.contains(&json!("method")));
}

#[tokio::test]
async fn both_dialects_agree_on_selection_filters() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EmissionCalculator::new())).unwrap();

    let selection = vec!["emission_calculator".to_string()];
    assert_eq!(registry.to_function_schemas(Some(&selection)).len(), 1);
    assert_eq!(registry.to_mcp_schemas(Some(&selection)).len(), 1);

    let ghost = vec!["ghost".to_string()];
    assert!(registry.to_function_schemas(Some(&ghost)).is_empty());
    assert!(registry.to_mcp_schemas(Some(&ghost)).is_empty());
}
