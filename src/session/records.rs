//! Structured records committed by completion signals.
//!
//! These are the typed payloads agents emit when their sub-task is done.
//! Each one validates its required fields before it may be committed.

use serde::{Deserialize, Serialize};

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{field}` must not be empty"))
    } else {
        Ok(())
    }
}

/// The confirmed business card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub name: String,
    pub location: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub social_links: Vec<String>,
}

impl BusinessRecord {
    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("location", &self.location)?;
        require("category", &self.category)
    }

    /// One-line summary used in prompt headers.
    pub fn summary(&self) -> String {
        let mut s = format!("{} | {} | {}", self.name, self.category, self.location);
        if let Some(ref website) = self.website {
            s.push_str(" | ");
            s.push_str(website);
        }
        s
    }

    /// Field/value pairs for recording in the extraction ledger.
    pub fn fields(&self) -> Vec<(&'static str, serde_json::Value)> {
        let mut fields = vec![
            ("name", serde_json::json!(self.name)),
            ("location", serde_json::json!(self.location)),
            ("category", serde_json::json!(self.category)),
        ];
        if let Some(ref website) = self.website {
            fields.push(("website", serde_json::json!(website)));
        }
        if !self.social_links.is_empty() {
            fields.push(("social_links", serde_json::json!(self.social_links)));
        }
        fields
    }
}

/// The confirmed campaign brief.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignBrief {
    pub goal: String,
    pub target_audience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
}

impl CampaignBrief {
    pub fn validate(&self) -> Result<(), String> {
        require("goal", &self.goal)?;
        require("target_audience", &self.target_audience)
    }
}

/// A partner candidate identified during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// A drafted outreach message for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachDraft {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

/// Discovery completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatesIdentified {
    pub candidates: Vec<Candidate>,
}

impl CandidatesIdentified {
    pub fn validate(&self) -> Result<(), String> {
        if self.candidates.is_empty() {
            return Err("`candidates` must not be empty".to_string());
        }
        for candidate in &self.candidates {
            require("candidates[].name", &candidate.name)?;
        }
        Ok(())
    }
}

/// Outreach completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesDrafted {
    pub drafts: Vec<OutreachDraft>,
}

impl MessagesDrafted {
    pub fn validate(&self) -> Result<(), String> {
        if self.drafts.is_empty() {
            return Err("`drafts` must not be empty".to_string());
        }
        for draft in &self.drafts {
            require("drafts[].candidate", &draft.candidate)?;
            require("drafts[].body", &draft.body)?;
        }
        Ok(())
    }
}

/// Assembly completion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyComplete {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

impl AssemblyComplete {
    pub fn validate(&self) -> Result<(), String> {
        require("summary", &self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alma() -> BusinessRecord {
        BusinessRecord {
            name: "Alma Cafe".to_string(),
            location: "Rehovot, Israel".to_string(),
            category: "Coffee shop".to_string(),
            website: None,
            social_links: Vec::new(),
        }
    }

    #[test]
    fn record_requires_core_fields() {
        assert!(alma().validate().is_ok());

        let blank_location = BusinessRecord {
            location: "  ".to_string(),
            ..alma()
        };
        let err = blank_location.validate().unwrap_err();
        assert!(err.contains("location"));
    }

    #[test]
    fn record_summary_and_fields() {
        let record = BusinessRecord {
            website: Some("alma.example".to_string()),
            ..alma()
        };
        assert_eq!(
            record.summary(),
            "Alma Cafe | Coffee shop | Rehovot, Israel | alma.example"
        );
        let names: Vec<_> = record.fields().iter().map(|(f, _)| *f).collect();
        assert_eq!(names, vec!["name", "location", "category", "website"]);
    }

    #[test]
    fn record_omits_empty_optionals_in_json() {
        let json = serde_json::to_value(alma()).unwrap();
        assert!(json.get("website").is_none());
        assert!(json.get("social_links").is_none());
    }

    #[test]
    fn empty_candidate_list_is_invalid() {
        let payload = CandidatesIdentified { candidates: vec![] };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn draft_without_body_is_invalid() {
        let payload = MessagesDrafted {
            drafts: vec![OutreachDraft {
                candidate: "Dana".to_string(),
                channel: None,
                subject: None,
                body: String::new(),
            }],
        };
        assert!(payload.validate().unwrap_err().contains("body"));
    }
}
