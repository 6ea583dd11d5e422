//! Context injection — renders shared state into the text an agent receives.
//!
//! The header is part of the agent's visible history, so its format is
//! fixed: same inputs, same bytes.

use crate::agents::AgentKind;
use crate::session::context::{AgentContext, Message, SessionMemory, SharedContext};
use crate::session::stage::stage_label;

pub const HEADER_OPEN: &str = "[session]";
pub const HEADER_CLOSE: &str = "[/session]";

const NONE: &str = "none";

/// Render the context header for a turn dispatched to `agent`.
///
/// Line order: stage, business, brief, candidates, drafts, metadata, then
/// the dispatched agent's own known fields.
pub fn render_header(shared: &SharedContext, own: Option<&AgentContext>) -> String {
    let mut lines = Vec::with_capacity(9);
    lines.push(HEADER_OPEN.to_string());
    lines.push(format!("stage: {}", stage_label(shared.workflow_stage())));
    lines.push(format!(
        "business: {}",
        shared
            .business_record()
            .map(|r| r.summary())
            .unwrap_or_else(|| NONE.to_string())
    ));
    lines.push(format!(
        "brief: {}",
        shared
            .campaign_brief()
            .map(|b| format!("{} | audience: {}", b.goal, b.target_audience))
            .unwrap_or_else(|| NONE.to_string())
    ));
    lines.push(format!("candidates: {}", shared.candidates().len()));
    lines.push(format!("drafts: {}", shared.outreach_drafts().len()));
    lines.push(format!("metadata: {}", render_metadata(shared)));
    lines.push(format!("known: {}", render_known(own)));
    lines.push(HEADER_CLOSE.to_string());
    lines.join("\n")
}

fn render_metadata(shared: &SharedContext) -> String {
    if shared.metadata().is_empty() {
        return NONE.to_string();
    }
    shared
        .metadata()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_known(own: Option<&AgentContext>) -> String {
    match own {
        Some(ctx) if !ctx.extracted_fields().is_empty() => ctx
            .extracted_fields()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; "),
        _ => NONE.to_string(),
    }
}

/// Build the enriched input for `agent` and append it to the history as a
/// user message. Returns the appended message.
pub fn build_turn_input(memory: &mut SessionMemory, agent: AgentKind, raw_text: &str) -> Message {
    let header = render_header(memory.shared(), memory.agent_context(agent));
    let message = Message::user(format!("{header}\n\n{raw_text}"));
    memory.shared_mut().push_message(message.clone());
    message
}
