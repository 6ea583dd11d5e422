//! Completion-signal detection.
//!
//! An agent reply is free text, optionally followed by exactly one fenced
//! block tagged `flow-signal`:
//!
//! ````text
//! Great, here's the card I'll save for you.
//!
//! ```flow-signal
//! {"name": "Alma Cafe", "location": "Rehovot, Israel", "category": "Coffee shop"}
//! ```
//! ````
//!
//! The block body is JSON validated against the replying agent's payload
//! type. A marker with a bad payload is an error, never a silent skip.

use serde::de::DeserializeOwned;

use crate::agents::AgentKind;
use crate::error::SignalError;
use crate::session::records::{
    AssemblyComplete, BusinessRecord, CampaignBrief, CandidatesIdentified, MessagesDrafted,
};

/// Info string that tags a completion block.
pub const SIGNAL_MARKER: &str = "flow-signal";

const FENCE: &str = "```";

/// A validated completion payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionSignal {
    BusinessConfirmed(BusinessRecord),
    BriefConfirmed(CampaignBrief),
    CandidatesIdentified(CandidatesIdentified),
    MessagesDrafted(MessagesDrafted),
    AssemblyComplete(AssemblyComplete),
}

impl CompletionSignal {
    /// The agent whose schema produced this signal.
    pub fn agent(&self) -> AgentKind {
        match self {
            Self::BusinessConfirmed(_) => AgentKind::Onboarding,
            Self::BriefConfirmed(_) => AgentKind::Brief,
            Self::CandidatesIdentified(_) => AgentKind::Discovery,
            Self::MessagesDrafted(_) => AgentKind::Outreach,
            Self::AssemblyComplete(_) => AgentKind::Assembly,
        }
    }
}

/// A reply split into its display text and optional signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedReply {
    /// Reply text with the completion block removed.
    pub text: String,
    pub signal: Option<CompletionSignal>,
}

/// Scan an agent reply for a completion block.
///
/// Returns `Ok` with `signal: None` when no marker is present. Returns
/// `SignalError::Malformed` when a marker is present but the block is
/// unclosed, repeated, followed by more text, or carries an invalid payload.
pub fn scan(agent: AgentKind, reply: &str) -> Result<ScannedReply, SignalError> {
    let lines: Vec<&str> = reply.lines().collect();
    let malformed = |reason: String| SignalError::Malformed {
        agent: agent.to_string(),
        reason,
    };

    let Some(open) = find_marker(&lines, 0) else {
        return Ok(ScannedReply {
            text: reply.trim().to_string(),
            signal: None,
        });
    };

    let close = lines[open + 1..]
        .iter()
        .position(|line| line.trim() == FENCE)
        .map(|offset| open + 1 + offset)
        .ok_or_else(|| malformed("completion block is not closed".to_string()))?;

    if find_marker(&lines, close + 1).is_some() {
        return Err(malformed("more than one completion block".to_string()));
    }
    if lines[close + 1..].iter().any(|line| !line.trim().is_empty()) {
        return Err(malformed("text after completion block".to_string()));
    }

    let payload = lines[open + 1..close].join("\n");
    let signal = parse_payload(agent, &payload).map_err(malformed)?;

    Ok(ScannedReply {
        text: lines[..open].join("\n").trim().to_string(),
        signal: Some(signal),
    })
}

/// Index of the first marker line at or after `from`, skipping any other
/// fenced blocks (which may quote a marker as an example).
fn find_marker(lines: &[&str], from: usize) -> Option<usize> {
    let mut in_other_fence = false;
    for (i, line) in lines.iter().enumerate().skip(from) {
        let trimmed = line.trim();
        let Some(info) = trimmed.strip_prefix(FENCE) else {
            continue;
        };
        if in_other_fence {
            if info.trim().is_empty() {
                in_other_fence = false;
            }
        } else if info.trim() == SIGNAL_MARKER {
            return Some(i);
        } else {
            in_other_fence = true;
        }
    }
    None
}

fn parse_payload(agent: AgentKind, payload: &str) -> Result<CompletionSignal, String> {
    if payload.trim().is_empty() {
        return Err("empty payload".to_string());
    }
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {e}"))?;
    if !value.is_object() {
        return Err("payload must be a JSON object".to_string());
    }

    match agent {
        AgentKind::Onboarding => {
            let record: BusinessRecord = typed(value)?;
            record.validate()?;
            Ok(CompletionSignal::BusinessConfirmed(record))
        }
        AgentKind::Brief => {
            let brief: CampaignBrief = typed(value)?;
            brief.validate()?;
            Ok(CompletionSignal::BriefConfirmed(brief))
        }
        AgentKind::Discovery => {
            let found: CandidatesIdentified = typed(value)?;
            found.validate()?;
            Ok(CompletionSignal::CandidatesIdentified(found))
        }
        AgentKind::Outreach => {
            let drafted: MessagesDrafted = typed(value)?;
            drafted.validate()?;
            Ok(CompletionSignal::MessagesDrafted(drafted))
        }
        AgentKind::Assembly => {
            let done: AssemblyComplete = typed(value)?;
            done.validate()?;
            Ok(CompletionSignal::AssemblyComplete(done))
        }
    }
}

fn typed<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("schema mismatch: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(body: &str) -> String {
        format!("Here is the card I'll save.\n\n```flow-signal\n{body}\n```\n")
    }

    #[test]
    fn no_marker_returns_none() {
        let result = scan(AgentKind::Onboarding, "Nice! What's the name of the bakery?").unwrap();
        assert_eq!(result.text, "Nice! What's the name of the bakery?");
        assert!(result.signal.is_none());
    }

    #[test]
    fn well_formed_onboarding_signal() {
        let reply = block(
            r#"{"name": "Alma Cafe", "location": "Rehovot, Israel", "category": "Coffee shop"}"#,
        );
        let result = scan(AgentKind::Onboarding, &reply).unwrap();
        assert_eq!(result.text, "Here is the card I'll save.");
        match result.signal {
            Some(CompletionSignal::BusinessConfirmed(record)) => {
                assert_eq!(record.name, "Alma Cafe");
                assert_eq!(record.location, "Rehovot, Israel");
                assert_eq!(record.category, "Coffee shop");
                assert!(record.website.is_none());
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        let reply = block(r#"{"name": "Alma Cafe", "location": "#);
        let err = scan(AgentKind::Onboarding, &reply).unwrap_err();
        let SignalError::Malformed { agent, reason } = err;
        assert_eq!(agent, "onboarding");
        assert!(reason.contains("invalid JSON"));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let reply = block(r#"{"name": "Alma Cafe", "location": "Rehovot, Israel"}"#);
        assert!(scan(AgentKind::Onboarding, &reply).is_err());
    }

    #[test]
    fn blank_required_field_is_malformed() {
        let reply = block(r#"{"name": "Alma Cafe", "location": "", "category": "Coffee shop"}"#);
        let SignalError::Malformed { reason, .. } =
            scan(AgentKind::Onboarding, &reply).unwrap_err();
        assert!(reason.contains("location"));
    }

    #[test]
    fn non_object_payload_is_malformed() {
        let reply = block(r#"["Alma Cafe"]"#);
        assert!(scan(AgentKind::Onboarding, &reply).is_err());
    }

    #[test]
    fn empty_payload_is_malformed() {
        let reply = "Done!\n```flow-signal\n```";
        assert!(scan(AgentKind::Assembly, reply).is_err());
    }

    #[test]
    fn unclosed_block_is_malformed() {
        let reply = "Done!\n```flow-signal\n{\"summary\": \"ok\"}";
        let SignalError::Malformed { reason, .. } = scan(AgentKind::Assembly, reply).unwrap_err();
        assert!(reason.contains("not closed"));
    }

    #[test]
    fn two_blocks_are_malformed() {
        let one = r#"{"summary": "ok"}"#;
        let reply = format!("{}```flow-signal\n{one}\n```", block(one));
        let SignalError::Malformed { reason, .. } = scan(AgentKind::Assembly, &reply).unwrap_err();
        assert!(reason.contains("more than one"));
    }

    #[test]
    fn trailing_text_is_malformed() {
        let reply = format!("{}Anything else?", block(r#"{"summary": "ok"}"#));
        assert!(scan(AgentKind::Assembly, &reply).is_err());
    }

    #[test]
    fn other_fenced_blocks_are_plain_text() {
        let reply = "Here's an example:\n```json\n{\"a\": 1}\n```\nShall I continue?";
        let result = scan(AgentKind::Brief, reply).unwrap();
        assert!(result.signal.is_none());
        assert_eq!(result.text, reply);
    }

    #[test]
    fn marker_quoted_inside_other_fence_is_ignored() {
        let reply = "Format:\n```text\n```flow-signal\n```\nGot it?";
        let result = scan(AgentKind::Brief, reply).unwrap();
        assert!(result.signal.is_none());
    }

    #[test]
    fn schema_follows_replying_agent() {
        // A business card is not a valid brief.
        let reply = block(
            r#"{"name": "Alma Cafe", "location": "Rehovot, Israel", "category": "Coffee shop"}"#,
        );
        assert!(scan(AgentKind::Brief, &reply).is_err());
    }

    #[test]
    fn discovery_and_outreach_payloads() {
        let discovery = block(r#"{"candidates": [{"name": "Dana Bakes", "platform": "instagram"}]}"#);
        let result = scan(AgentKind::Discovery, &discovery).unwrap();
        assert!(matches!(
            result.signal,
            Some(CompletionSignal::CandidatesIdentified(ref c)) if c.candidates.len() == 1
        ));

        let outreach = block(r#"{"drafts": [{"candidate": "Dana Bakes", "body": "Hi Dana!"}]}"#);
        let result = scan(AgentKind::Outreach, &outreach).unwrap();
        assert_eq!(result.signal.unwrap().agent(), AgentKind::Outreach);

        let empty = block(r#"{"candidates": []}"#);
        assert!(scan(AgentKind::Discovery, &empty).is_err());
    }

    #[test]
    fn brief_payload_with_optionals() {
        let reply = block(
            r#"{"goal": "Grow weekday traffic", "target_audience": "Local students", "budget": "2000 ILS", "platforms": ["instagram"]}"#,
        );
        match scan(AgentKind::Brief, &reply).unwrap().signal {
            Some(CompletionSignal::BriefConfirmed(brief)) => {
                assert_eq!(brief.budget.as_deref(), Some("2000 ILS"));
                assert_eq!(brief.platforms, vec!["instagram"]);
                assert!(brief.timeline.is_none());
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}
