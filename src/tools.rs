//! Tool registry: the capabilities offered to the language model.
//!
//! Declarations are descriptive metadata only. Executing a tool is the agent
//! orchestrator's job; the registry answers "what exists" and "what shape do
//! its arguments have".

use serde_json::{json, Map, Value};

use crate::models::{CATEGORICAL_FEATURES, NUMERIC_FEATURES};

// ---

pub const PREDICT_LEAK_RISK: &str = "predict_leak_risk";
pub const SUMMARIZE_RECENT_LEAKAGE: &str = "summarize_recent_leakage";

/// Which executor handles a declared tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    PredictLeakRisk,
    SummarizeRecentLeakage,
}

/// Primitive parameter types understood by the provider's schema dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Number,
    Integer,
    String,
}

impl ParamType {
    fn as_str(&self) -> &'static str {
        match self {
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::String => "string",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: &'static str,
    pub kind: ParamType,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ToolKind,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDeclaration {
    /// JSON-schema-like object describing the parameters.
    pub fn parameters_schema(&self) -> Value {
        // ---
        let mut properties = Map::new();
        for p in &self.parameters {
            properties.insert(
                p.name.to_string(),
                json!({ "type": p.kind.as_str(), "description": p.description }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn numeric_description(feature: &str) -> &'static str {
    match feature {
        "Pressure" => "Line pressure in PSI",
        "Flow_Rate" => "Flow rate in litres per minute",
        "Temperature" => "Water temperature in degrees Fahrenheit",
        "Vibration" => "Pipe vibration in Hz",
        "RPM" => "Pump rotational speed in RPM",
        "Operational_Hours" => "Cumulative operational hours of the segment",
        "Latitude" => "Sensor latitude in decimal degrees",
        "Longitude" => "Sensor longitude in decimal degrees",
        _ => "Sensor measurement",
    }
}

fn categorical_description(feature: &str) -> &'static str {
    match feature {
        "Zone" => "Zone identifier, e.g. Zone_1",
        "Block" => "Block identifier, e.g. Block_2",
        "Pipe" => "Pipe identifier, e.g. Pipe_1",
        "Location_Code" => "Location code, e.g. LG-77X",
        _ => "Location identifier",
    }
}

/// Fixed set of tools, built once at startup.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    /// The leak-monitoring tools: risk prediction and recent-leakage summary.
    pub fn leak_tools() -> Self {
        // ---
        let mut reading_params: Vec<ToolParameter> = NUMERIC_FEATURES
            .iter()
            .map(|&name| ToolParameter {
                name,
                kind: ParamType::Number,
                description: numeric_description(name),
                required: true,
            })
            .collect();
        reading_params.extend(CATEGORICAL_FEATURES.iter().map(|&name| ToolParameter {
            name,
            kind: ParamType::String,
            description: categorical_description(name),
            required: true,
        }));

        let predict = ToolDeclaration {
            name: PREDICT_LEAK_RISK,
            description: "Predict the leak probability and risk level for one sensor reading. \
                          Use when the user supplies pressure, flow, temperature, vibration, \
                          RPM, operational hours, coordinates and location identifiers.",
            kind: ToolKind::PredictLeakRisk,
            parameters: reading_params,
        };

        let summarize = ToolDeclaration {
            name: SUMMARIZE_RECENT_LEAKAGE,
            description: "Summarize logged leak predictions over the last N hours, grouped by \
                          zone and ordered by number of leak events. Use for questions about \
                          recent activity, trends or which zones are at highest risk.",
            kind: ToolKind::SummarizeRecentLeakage,
            parameters: vec![ToolParameter {
                name: "hours",
                kind: ParamType::Integer,
                description: "Trailing window in hours (default 24)",
                required: false,
            }],
        };

        ToolRegistry {
            tools: vec![predict, summarize],
        }
    }

    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDeclaration> {
        self.tools.iter().find(|t| t.name == name)
    }
}
