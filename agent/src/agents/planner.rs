//! Plan producers and the fallback chain that runs them.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::core::plan::parse_plan;
use crate::core::types::{FileEdit, Plan, PlanKind};
use crate::io::llm::{ChatClient, ChatMessage, ResponseSchema};
use crate::io::prompt::{OutputMode, plan_system_prompt};

const PLAN_OUTPUT_SCHEMA: &str = include_str!("../../schemas/plan_output.schema.json");

/// Input shared by every producer in a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub kind: PlanKind,
    pub user_prompt: String,
}

/// Something that turns a request into a plan.
///
/// An empty plan means "nothing produced"; an error means the producer could
/// not run at all.
pub trait PlanProducer {
    fn name(&self) -> &'static str;
    fn produce(&self, request: &PlanRequest) -> Result<Plan>;
}

/// Asks for schema-constrained JSON with plain file content.
pub struct StructuredPlanProducer<'a> {
    chat: &'a dyn ChatClient,
}

/// Asks for base64-encoded JSON in free text and recovers it with the
/// extraction and repair pipeline.
pub struct TextPlanProducer<'a> {
    chat: &'a dyn ChatClient,
}

#[derive(Deserialize)]
struct StructuredPlan {
    #[serde(default)]
    files: Vec<StructuredFile>,
}

#[derive(Deserialize)]
struct StructuredFile {
    #[serde(default)]
    path: String,
    #[serde(default)]
    content: Option<String>,
}

pub fn plan_schema() -> Result<ResponseSchema> {
    Ok(ResponseSchema {
        name: "plan",
        schema: serde_json::from_str(PLAN_OUTPUT_SCHEMA).context("parse plan output schema")?,
    })
}

fn messages(kind: PlanKind, mode: OutputMode, user_prompt: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(plan_system_prompt(kind, mode)),
        ChatMessage::user(user_prompt),
    ]
}

impl<'a> StructuredPlanProducer<'a> {
    pub fn new(chat: &'a dyn ChatClient) -> Self {
        Self { chat }
    }
}

impl PlanProducer for StructuredPlanProducer<'_> {
    fn name(&self) -> &'static str {
        "structured"
    }

    #[instrument(skip_all, fields(kind = request.kind.as_str()))]
    fn produce(&self, request: &PlanRequest) -> Result<Plan> {
        let schema = plan_schema()?;
        let reply = self.chat.chat_structured(
            &messages(request.kind, OutputMode::Structured, &request.user_prompt),
            &schema,
        )?;
        let Some(reply) = reply else {
            debug!("structured output unsupported");
            return Ok(Plan::empty());
        };
        let parsed: StructuredPlan = match serde_json::from_str(reply.trim()) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(err = %err, "structured reply did not match the plan schema");
                return Ok(Plan::empty());
            }
        };
        let files = parsed
            .files
            .into_iter()
            .filter(|file| !file.path.is_empty())
            .filter_map(|file| Some(FileEdit::new(file.path, file.content?)))
            .collect();
        Ok(Plan::new(files))
    }
}

impl<'a> TextPlanProducer<'a> {
    pub fn new(chat: &'a dyn ChatClient) -> Self {
        Self { chat }
    }
}

impl PlanProducer for TextPlanProducer<'_> {
    fn name(&self) -> &'static str {
        "text"
    }

    #[instrument(skip_all, fields(kind = request.kind.as_str()))]
    fn produce(&self, request: &PlanRequest) -> Result<Plan> {
        let reply = self
            .chat
            .chat(&messages(request.kind, OutputMode::Text, &request.user_prompt))?;
        let outcome = parse_plan(&reply);
        if let Some(step) = outcome.repaired_by {
            debug!(repair = step, "reply needed repair");
        }
        Ok(outcome.plan)
    }
}

/// Run producers in order until one yields a non-empty plan.
///
/// Errors from every producer but the last are logged and skipped; the last
/// producer's error is returned. All-empty yields an empty plan.
pub fn produce_plan(producers: &[&dyn PlanProducer], request: &PlanRequest) -> Result<Plan> {
    let last = producers.len().saturating_sub(1);
    for (index, producer) in producers.iter().enumerate() {
        match producer.produce(request) {
            Ok(plan) if !plan.is_empty() => {
                info!(producer = producer.name(), files = plan.len(), "plan produced");
                return Ok(plan);
            }
            Ok(_) => debug!(producer = producer.name(), "producer returned an empty plan"),
            Err(err) if index < last => {
                warn!(producer = producer.name(), err = %err, "producer failed, falling back");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("{} planner failed", producer.name()));
            }
        }
    }
    Ok(Plan::empty())
}

/// Build and run the producer chain for `kind`.
///
/// The structured producer leads the chain only when `structured` is set.
pub fn plan_with(
    chat: &dyn ChatClient,
    structured: bool,
    kind: PlanKind,
    user_prompt: String,
) -> Result<Plan> {
    let request = PlanRequest { kind, user_prompt };
    let structured_producer = StructuredPlanProducer::new(chat);
    let text_producer = TextPlanProducer::new(chat);
    let mut producers: Vec<&dyn PlanProducer> = Vec::with_capacity(2);
    if structured {
        producers.push(&structured_producer);
    }
    producers.push(&text_producer);
    produce_plan(&producers, &request)
}
