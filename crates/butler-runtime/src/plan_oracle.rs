//! [`PlanOracle`] – the external, vision-capable planner.
//!
//! The oracle looks at a desk photo and proposes tidying commands.  Its only
//! contract with the relay is "returns something JSON-shaped, or fails": the
//! strict output schema sent with every request is a hint to the model, not a
//! guarantee, and the [`CommandValidator`][butler_kernel::CommandValidator]
//! re-checks everything it produces.
//!
//! [`OpenAiPlanOracle`] talks to any OpenAI-compatible
//! `/v1/chat/completions` endpoint that accepts image input.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use butler_runtime::plan_oracle::OpenAiPlanOracle;
//! use butler_types::LimitTable;
//!
//! let oracle = OpenAiPlanOracle::new(
//!     "https://api.openai.com",
//!     "gpt-4o-mini",
//!     "sk-...",
//!     &LimitTable::default(),
//!     Duration::from_secs(30),
//! )
//! .expect("http client");
//! // oracle.plan(&snapshot).await requires network access.
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use butler_types::{CommandTag, LimitTable, RawPlan, SnapshotEntry};
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Prompt & schema
// ─────────────────────────────────────────────────────────────────────────────

/// User-turn instruction sent alongside every photo.
pub const PLAN_INSTRUCTION: &str =
    "Analyze the desk photo and produce tidy commands if needed.";

/// Upper bound on completion tokens; a plan is a short list of tuples.
pub const MAX_OUTPUT_TOKENS: u32 = 400;

/// Name of the structured-output schema.
pub const SCHEMA_NAME: &str = "RobotPlan";

/// Build the fixed system prompt with the joint limits embedded.
pub fn system_prompt(limits: &LimitTable) -> String {
    format!(
        "You control a 5-DOF desk robot arm via simple commands. \
         Joints: base, shoulder, elbow, wrist, gripper.\n\
         Joint limits (deg): {limits}. Keep moves slow and safe.\n\n\
         From the latest desk photo, decide if tidying is needed.\n\
         Return ONLY a JSON object: {{\"cmds\":[...]}} where each item is one of:\n\
         \x20 [\"HOME\"]\n\
         \x20 [\"MOVE\", base, shoulder, elbow, wrist, gripper(0/1), duration_ms]\n\
         \x20 [\"GRIP\", 0|1]\n\
         \x20 [\"WAIT\", ms]\n\
         \x20 [\"STOP\"]\n\
         \x20 [\"STATUS\"]\n"
    )
}

// Shape the model is asked to emit; never constructed.
#[derive(JsonSchema)]
#[schemars(rename = "RobotPlan")]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct RobotPlanSchema {
    cmds: Vec<Vec<PlanToken>>,
}

#[derive(JsonSchema)]
#[serde(untagged)]
#[allow(dead_code)]
enum PlanToken {
    Tag(CommandTag),
    Number(f64),
}

/// JSON Schema for the `response_format` field, with sub-schemas inlined so
/// the document has no `$ref`s.
///
/// Rust doc text (`description`) and numeric `format` hints are stripped: the
/// model sees only the structural constraints.
pub fn plan_schema() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings
        .into_generator()
        .into_root_schema_for::<RobotPlanSchema>();
    let mut value = serde_json::to_value(schema).unwrap_or(Value::Null);
    strip_annotations(&mut value);
    value
}

fn strip_annotations(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("description");
            map.remove("format");
            map.values_mut().for_each(strip_annotations);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_annotations),
        _ => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Ways a planning call can fail.  All of them degrade to "no commands".
#[derive(Error, Debug)]
pub enum OracleError {
    /// The HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response envelope was not what an OpenAI-compatible server sends.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    /// The model's output was not a `{"cmds": [...]}` object.
    #[error("Plan schema violation: {0}")]
    SchemaViolation(String),
    /// No answer within the configured deadline.
    #[error("Oracle timed out after {0:?}")]
    Timeout(Duration),
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Narrow seam to the external planner so tests can substitute a stub.
#[async_trait]
pub trait PlanOracle: Send + Sync {
    /// Ask for a plan given the latest snapshot.
    async fn plan(&self, snapshot: &SnapshotEntry) -> Result<RawPlan, OracleError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    User,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: Role,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAiPlanOracle
// ─────────────────────────────────────────────────────────────────────────────

/// [`PlanOracle`] backed by an OpenAI-compatible chat-completions endpoint.
///
/// Construct once at startup and share behind an `Arc`.
pub struct OpenAiPlanOracle {
    base_url: String,
    model: String,
    api_key: String,
    system_prompt: String,
    schema: Value,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiPlanOracle {
    /// `timeout` bounds the whole HTTP exchange.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        limits: &LimitTable,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            system_prompt: system_prompt(limits),
            schema: plan_schema(),
            timeout,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, snapshot: &SnapshotEntry) -> ChatRequest<'_> {
        let data_url = format!(
            "data:{};base64,{}",
            snapshot.encoding.mime(),
            BASE64.encode(&snapshot.payload)
        );
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: MessageContent::Text(self.system_prompt.clone()),
                },
                ChatMessage {
                    role: Role::User,
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: PLAN_INSTRUCTION.to_string(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_url },
                        },
                    ]),
                },
            ],
            stream: false,
            max_tokens: MAX_OUTPUT_TOKENS,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: SCHEMA_NAME,
                    schema: self.schema.clone(),
                    strict: true,
                },
            },
        }
    }
}

#[async_trait]
impl PlanOracle for OpenAiPlanOracle {
    async fn plan(&self, snapshot: &SnapshotEntry) -> Result<RawPlan, OracleError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.request_body(snapshot);
        debug!(model = %self.model, image_bytes = snapshot.payload.len(), "requesting plan");

        let response: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| self.classify(e))?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| OracleError::BadResponse("empty choices array".into()))?;

        match (message.content, message.refusal) {
            (Some(text), _) => parse_plan_text(&text),
            (None, Some(refusal)) => Err(OracleError::BadResponse(format!(
                "model refused: {refusal}"
            ))),
            (None, None) => Err(OracleError::BadResponse("message has no content".into())),
        }
    }
}

impl OpenAiPlanOracle {
    fn classify(&self, err: reqwest::Error) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(self.timeout)
        } else {
            OracleError::Http(err)
        }
    }
}

/// Parse the model's text output into a [`RawPlan`].
///
/// Only the envelope is checked here (`{"cmds": [...]}`); the elements are
/// left for the validator.
///
/// # Errors
///
/// [`OracleError::SchemaViolation`] when the text is not JSON, not an object,
/// or has no `cmds` array.
pub fn parse_plan_text(text: &str) -> Result<RawPlan, OracleError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| OracleError::SchemaViolation(format!("output is not JSON: {e}")))?;
    match value.get("cmds") {
        Some(Value::Array(_)) => Ok(RawPlan(value)),
        Some(_) => Err(OracleError::SchemaViolation("cmds is not an array".into())),
        None if value.is_object() => {
            Err(OracleError::SchemaViolation("missing cmds field".into()))
        }
        None => Err(OracleError::SchemaViolation("output is not an object".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butler_types::ImageEncoding;
    use bytes::Bytes;
    use chrono::Utc;

    fn oracle() -> OpenAiPlanOracle {
        OpenAiPlanOracle::new(
            "http://localhost:9/",
            "gpt-4o-mini",
            "sk-test",
            &LimitTable::default(),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    fn snapshot() -> SnapshotEntry {
        SnapshotEntry {
            payload: Bytes::from_static(&[0x89, b'P', b'N', b'G']),
            encoding: ImageEncoding::Png,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn system_prompt_lists_limits_and_tags() {
        let prompt = system_prompt(&LimitTable::default());
        assert!(prompt.contains("base: [-150, 150]"));
        assert!(prompt.contains("elbow: [0, 130]"));
        for tag in CommandTag::ALL {
            assert!(prompt.contains(tag.as_str()), "prompt must mention {tag}");
        }
    }

    #[test]
    fn schema_requires_cmds_and_inlines_tags() {
        let schema = plan_schema();
        assert_eq!(schema["required"], serde_json::json!(["cmds"]));
        assert_eq!(schema["additionalProperties"], serde_json::json!(false));
        let text = schema.to_string();
        assert!(!text.contains("$ref"), "schema must not contain references");
        for tag in CommandTag::ALL {
            assert!(text.contains(tag.as_str()));
        }
    }

    #[test]
    fn schema_carries_no_doc_text_or_number_format() {
        let text = plan_schema().to_string();
        assert!(!text.contains("description"), "doc comments must not reach the model: {text}");
        assert!(!text.contains("format"), "numbers must be plain: {text}");
        assert!(text.contains(r#""type":"number""#));
    }

    #[test]
    fn request_body_embeds_image_and_schema() {
        let o = oracle();
        let body = serde_json::to_value(o.request_body(&snapshot())).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], MAX_OUTPUT_TOKENS);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"][0]["type"], "text");
        assert_eq!(body["messages"][1]["content"][0]["text"], PLAN_INSTRUCTION);
        assert_eq!(body["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,iVBORw=="
        );
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], SCHEMA_NAME);
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(oracle().base_url, "http://localhost:9");
        assert_eq!(oracle().model(), "gpt-4o-mini");
    }

    #[test]
    fn parse_plan_text_accepts_cmds_object() {
        let plan = parse_plan_text(r#"{"cmds":[["HOME"],["FOO"]]}"#).unwrap();
        assert_eq!(plan.0["cmds"][1][0], "FOO");
    }

    #[test]
    fn parse_plan_text_rejects_bad_envelopes() {
        for text in ["not json", "[]", r#"{"plan":[]}"#, r#"{"cmds":{}}"#, "42"] {
            assert!(
                matches!(parse_plan_text(text), Err(OracleError::SchemaViolation(_))),
                "expected schema violation for {text}"
            );
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let result = oracle().plan(&snapshot()).await;
        assert!(result.is_err());
    }

    #[test]
    fn timeout_error_display() {
        let err = OracleError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("timed out"));
    }
}
