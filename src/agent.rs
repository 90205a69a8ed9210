//! Agent orchestrator: one query, at most one tool, one answer.
//!
//! A turn moves strictly forward through
//! `AwaitingDecision -> {Direct | ToolExecuting} -> ToolNarrating -> Done`.
//! The language model first decides whether a tool is needed. When it proposes
//! one, the orchestrator runs it locally and asks the model a second time to
//! explain the structured result. Every failure is folded into the turn as a
//! structured error so the HTTP layer always has a well-formed answer.

use std::{fmt, sync::Arc};

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    llm::{LanguageModel, ModelReply, Prompt, ToolArguments},
    prediction::RiskPredictor,
    telemetry::{self, TelemetryLog, DEFAULT_SUMMARY_HOURS},
    tools::{ToolKind, ToolRegistry},
    LlmError, SensorReading,
};

// ---

/// Largest trailing window accepted by the summary tool (one year).
pub const MAX_SUMMARY_HOURS: u32 = 24 * 365;

pub const GUIDANCE_ANSWER: &str = "Ask me about leak risk, for example: \"Which zones are at \
                                   highest risk this week?\" or share a sensor reading to score.";

/// Answer used when narration proposes another tool instead of explaining.
const NARRATION_FALLBACK_ANSWER: &str = "Here is the result of the requested analysis.";

const PROVIDER_UNAVAILABLE_ANSWER: &str =
    "The assistant could not reach the language model. Please try again shortly.";

const SYSTEM_INSTRUCTION: &str = "You are LeakGuard, an assistant for a residential water-leak \
monitoring system. Call predict_leak_risk when the user provides a full sensor reading. Call \
summarize_recent_leakage for questions about recent leak activity, trends, reports or which zones \
are most at risk. Otherwise answer directly and concisely.";

/// Stages of a turn, used to label failures and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    AwaitingDecision,
    ToolExecuting,
    ToolNarrating,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TurnStage::AwaitingDecision => "decision",
            TurnStage::ToolExecuting => "tool execution",
            TurnStage::ToolNarrating => "narration",
        })
    }
}

/// A tool call proposed by the model, with normalized arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: ToolArguments,
}

/// Everything that happened during one query. Lives for one request.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub query: String,
    pub invocation: Option<ToolInvocation>,
    pub tool_result: Option<Value>,
    pub answer: String,
    pub error: Option<String>,
}

impl AgentTurn {
    fn new(query: &str) -> Self {
        AgentTurn {
            query: query.to_string(),
            invocation: None,
            tool_result: None,
            answer: String::new(),
            error: None,
        }
    }

    fn done(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }

    fn failed(mut self, stage: TurnStage, err: &LlmError, answer: impl Into<String>) -> Self {
        tracing::error!("Agent turn failed during {}: {}", stage, err);
        self.error = Some(format!("Language model error during {}: {}", stage, err));
        self.answer = answer.into();
        self
    }
}

/// Wire shape of `POST /agent`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub answer: String,
    pub used_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AgentTurn> for AgentResponse {
    fn from(turn: AgentTurn) -> Self {
        AgentResponse {
            answer: turn.answer,
            used_tool: turn.invocation.map(|i| i.name),
            tool_result: turn.tool_result,
            error: turn.error,
        }
    }
}

/// Result of running a tool locally.
enum ToolOutcome {
    /// Structured result (possibly an `{error}` payload) to narrate.
    Narrate(Value),
    /// Local validation failure; answered without contacting the model.
    Rejected(Value),
    /// Nothing to narrate; answered with a canned message.
    Canned { result: Value, answer: String },
}

fn error_payload(message: impl fmt::Display) -> Value {
    json!({ "error": message.to_string() })
}

/// Parse the `hours` argument: integers, integral floats and numeric strings.
fn parse_hours(arguments: &ToolArguments) -> Result<u32, String> {
    // ---
    let whole = |f: f64| (f.fract() == 0.0).then_some(f as i64);
    let hours = match arguments.get("hours") {
        None | Some(Value::Null) => return Ok(DEFAULT_SUMMARY_HOURS),
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().and_then(whole),
        Some(_) => None,
    }
    .ok_or_else(|| "hours must be a whole number".to_string())?;

    if !(1..=i64::from(MAX_SUMMARY_HOURS)).contains(&hours) {
        return Err(format!("hours must be between 1 and {}", MAX_SUMMARY_HOURS));
    }
    Ok(hours as u32)
}

fn narration_prompt(query: &str, tool: &str, result: &Value) -> Prompt {
    // ---
    let rendered = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    Prompt {
        system: None,
        user: format!(
            "A homeowner asked: \"{query}\"\n\n\
             The {tool} tool returned this JSON:\n{rendered}\n\n\
             Explain the result in plain language. If the result is an error, say what went \
             wrong and what information is needed. Finish with a short, concrete action plan."
        ),
        tools: Vec::new(),
    }
}

/// Drives agent turns. Collaborators are injected at startup.
pub struct AgentOrchestrator {
    llm: Arc<dyn LanguageModel>,
    registry: ToolRegistry,
    predictor: Arc<dyn RiskPredictor>,
    log: Arc<dyn TelemetryLog>,
}

impl AgentOrchestrator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        registry: ToolRegistry,
        predictor: Arc<dyn RiskPredictor>,
        log: Arc<dyn TelemetryLog>,
    ) -> Self {
        AgentOrchestrator {
            llm,
            registry,
            predictor,
            log,
        }
    }

    /// Run one complete turn. Never fails; errors are recorded on the turn.
    pub async fn run_turn(&self, query: &str) -> AgentTurn {
        // ---
        let query = query.trim();
        let turn = AgentTurn::new(query);
        if query.is_empty() {
            return turn.done(GUIDANCE_ANSWER);
        }

        // AwaitingDecision
        let decision = Prompt {
            system: Some(SYSTEM_INSTRUCTION.to_string()),
            user: query.to_string(),
            tools: self.registry.declarations().to_vec(),
        };
        let reply = match self.llm.generate(&decision).await {
            Ok(reply) => reply,
            Err(e) => {
                return turn.failed(TurnStage::AwaitingDecision, &e, PROVIDER_UNAVAILABLE_ANSWER)
            }
        };

        let (name, raw_arguments, partial_text) = match reply {
            ModelReply::Direct(text) => {
                tracing::info!("Agent answered directly");
                return turn.done(text);
            }
            ModelReply::ToolProposed {
                name,
                arguments,
                partial_text,
            } => (name, arguments, partial_text),
        };

        // ToolExecuting
        tracing::info!("Agent selected tool {}", name);
        if let Some(text) = &partial_text {
            tracing::debug!("Partial text alongside tool call: {}", text);
        }
        let (mut turn, outcome) = self.execute(turn, name, raw_arguments).await;

        let result = match outcome {
            ToolOutcome::Rejected(result) => {
                let answer = format!(
                    "I couldn't run that request: {}",
                    result["error"].as_str().unwrap_or("invalid tool call")
                );
                turn.tool_result = Some(result);
                return turn.done(answer);
            }
            ToolOutcome::Canned { result, answer } => {
                turn.tool_result = Some(result);
                return turn.done(answer);
            }
            ToolOutcome::Narrate(result) => result,
        };

        // ToolNarrating
        let tool_name = turn
            .invocation
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_default();
        let prompt = narration_prompt(&turn.query, &tool_name, &result);
        turn.tool_result = Some(result);

        match self.llm.generate(&prompt).await {
            Ok(ModelReply::Direct(text)) => turn.done(text),
            Ok(ModelReply::ToolProposed { partial_text, name, .. }) => {
                tracing::warn!("Ignoring second tool call {} during narration", name);
                let answer =
                    partial_text.unwrap_or_else(|| NARRATION_FALLBACK_ANSWER.to_string());
                turn.done(answer)
            }
            Err(e) => {
                let fallback = format!(
                    "The {} tool ran, but the explanation could not be generated.",
                    tool_name
                );
                turn.failed(TurnStage::ToolNarrating, &e, fallback)
            }
        }
    }

    /// Normalize arguments and dispatch the proposed tool.
    async fn execute(
        &self,
        mut turn: AgentTurn,
        name: String,
        raw_arguments: Value,
    ) -> (AgentTurn, ToolOutcome) {
        // ---
        let arguments = ToolArguments::normalize(raw_arguments);
        turn.invocation = Some(ToolInvocation {
            name: name.clone(),
            arguments: arguments.clone().unwrap_or_default(),
        });

        let Some(declaration) = self.registry.get(&name) else {
            tracing::warn!("Model proposed undeclared tool {}", name);
            return (
                turn,
                ToolOutcome::Rejected(error_payload(format!("Unknown tool: {}", name))),
            );
        };

        let arguments = match arguments {
            Ok(arguments) => arguments,
            Err(e) => {
                tracing::warn!("Unusable arguments for {}: {}", name, e);
                return (
                    turn,
                    ToolOutcome::Rejected(error_payload(format!(
                        "Invalid arguments for {}: {}",
                        name, e
                    ))),
                );
            }
        };

        let outcome = match declaration.kind {
            ToolKind::PredictLeakRisk => ToolOutcome::Narrate(self.run_prediction(arguments).await),
            ToolKind::SummarizeRecentLeakage => self.run_summary(&arguments).await,
        };
        (turn, outcome)
    }

    async fn run_prediction(&self, arguments: ToolArguments) -> Value {
        // ---
        let reading: SensorReading = match serde_json::from_value(arguments.into_value()) {
            Ok(reading) => reading,
            Err(e) => return error_payload(format!("invalid reading: {}", e)),
        };

        match self.predictor.predict(reading).await {
            Ok(prediction) => json!(prediction),
            Err(e) => {
                tracing::warn!("Prediction failed during {}: {}", TurnStage::ToolExecuting, e);
                error_payload(e)
            }
        }
    }

    async fn run_summary(&self, arguments: &ToolArguments) -> ToolOutcome {
        // ---
        let hours = match parse_hours(arguments) {
            Ok(hours) => hours,
            Err(e) => return ToolOutcome::Narrate(error_payload(e)),
        };

        match telemetry::summarize_recent_leakage(self.log.as_ref(), hours).await {
            Ok(summary) if summary.top_zones.is_empty() => ToolOutcome::Canned {
                answer: format!(
                    "No predictions have been logged in the last {} hours, so there is no \
                     leakage activity to report. The system looks healthy.",
                    hours
                ),
                result: json!(summary),
            },
            Ok(summary) => ToolOutcome::Narrate(json!(summary)),
            Err(e) => {
                tracing::warn!("Leakage summary failed: {}", e);
                ToolOutcome::Narrate(error_payload(e))
            }
        }
    }
}
