//! Intent classification for stage-less requests.
//!
//! Only consulted when no stage is active and a business record already
//! exists. The default classifier is an ordered decision table: rules are
//! tried top to bottom and the first match wins. Text matching no rule
//! starts a new campaign brief.
//!
//! | order | intent     | matches                                               |
//! |-------|------------|-------------------------------------------------------|
//! | 1     | onboarding | editing the business itself (name, address, moved)    |
//! | 2     | assembly   | assemble / finalize / wrap up / export / launch       |
//! | 3     | outreach   | draft / write / send / pitch / reach out / DM / email |
//! | 4     | discovery  | find / search / discover / influencers / creators     |
//! | 5     | brief      | campaign / brief / goal / budget / audience / promote |
//! | -     | brief      | fallback                                              |

use regex::Regex;
use tracing::debug;

use crate::session::stage::Stage;

/// External intent-classifier seam.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, raw_text: &str) -> Stage;
}

/// A single row of the decision table.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Stage,
    pub regex: Regex,
    /// Human-readable description for logs.
    pub description: String,
}

/// Keyword decision-table classifier.
pub struct KeywordIntentClassifier {
    rules: Vec<IntentRule>,
    fallback: Stage,
}

impl KeywordIntentClassifier {
    /// The default decision table.
    pub fn default_rules() -> Self {
        let table: [(Stage, &str, &str); 5] = [
            (
                Stage::Onboarding,
                r"(?i)\b((update|change|edit|fix|correct)\b.{0,30}\b(business|address|location|name|category|website)|we('ve| have)? moved|my business (card|details|info))",
                "edit business details",
            ),
            (
                Stage::Assembly,
                r"(?i)\b(assemble|finali[sz]e|wrap (it )?up|put (it|everything) together|export|launch)\b",
                "assemble campaign",
            ),
            (
                Stage::Outreach,
                r"(?i)\b(draft|write|send|pitch|reach out|dm|email|message them|outreach)\b",
                "draft outreach",
            ),
            (
                Stage::Discovery,
                r"(?i)\b(find|search|discover|look for|influencers?|creators?|partners?|candidates?)\b",
                "discover candidates",
            ),
            (
                Stage::Brief,
                r"(?i)\b(campaign|brief|goal|budget|audience|promot\w*|advertis\w*)\b",
                "plan campaign",
            ),
        ];

        let rules = table
            .into_iter()
            .filter_map(|(intent, pattern, description)| match Regex::new(pattern) {
                Ok(regex) => Some(IntentRule {
                    intent,
                    regex,
                    description: description.to_string(),
                }),
                Err(e) => {
                    tracing::error!(%intent, error = %e, "Invalid intent rule pattern");
                    None
                }
            })
            .collect();

        Self {
            rules,
            fallback: Stage::Brief,
        }
    }

    /// An empty table that always returns `fallback` (for testing).
    pub fn empty(fallback: Stage) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    /// Append a rule at the lowest precedence.
    pub fn add_rule(
        &mut self,
        intent: Stage,
        pattern: &str,
        description: &str,
    ) -> Result<(), regex::Error> {
        self.rules.push(IntentRule {
            intent,
            regex: Regex::new(pattern)?,
            description: description.into(),
        });
        Ok(())
    }
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, raw_text: &str) -> Stage {
        for rule in &self.rules {
            if rule.regex.is_match(raw_text) {
                debug!(intent = %rule.intent, rule = %rule.description, "Intent rule matched");
                return rule.intent;
            }
        }
        debug!(intent = %self.fallback, "No intent rule matched, using fallback");
        self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_table_rows() {
        let classifier = KeywordIntentClassifier::default_rules();
        let cases = [
            ("We moved to Tel Aviv last month", Stage::Onboarding),
            ("Please update the business website", Stage::Onboarding),
            ("Let's finalize everything", Stage::Assembly),
            ("Can you draft a pitch for them?", Stage::Outreach),
            ("Find me some food influencers", Stage::Discovery),
            ("I want to plan a new campaign for Passover", Stage::Brief),
        ];
        for (text, expected) in cases {
            assert_eq!(classifier.classify(text), expected, "text: {text}");
        }
    }

    #[test]
    fn earlier_rows_take_precedence() {
        let classifier = KeywordIntentClassifier::default_rules();
        // Mentions both drafting and influencers: outreach is above discovery.
        assert_eq!(
            classifier.classify("Draft messages for the influencers we found"),
            Stage::Outreach
        );
        // Mentions a campaign but asks to wrap it up.
        assert_eq!(classifier.classify("Wrap up the campaign"), Stage::Assembly);
    }

    #[test]
    fn unmatched_text_falls_back_to_brief() {
        let classifier = KeywordIntentClassifier::default_rules();
        assert_eq!(classifier.classify("hello again"), Stage::Brief);
    }

    #[test]
    fn matching_is_word_bounded() {
        let classifier = KeywordIntentClassifier::default_rules();
        // "finder" is not "find", "launched" is not "launch".
        assert_eq!(classifier.classify("our pathfinder pastry launched"), Stage::Brief);
    }

    #[test]
    fn custom_rules_append_at_lowest_precedence() {
        let mut classifier = KeywordIntentClassifier::empty(Stage::Brief);
        classifier
            .add_rule(Stage::Discovery, r"(?i)\bscout\b", "scout")
            .unwrap();
        assert_eq!(classifier.classify("scout some bakers"), Stage::Discovery);
        assert_eq!(classifier.classify("anything"), Stage::Brief);
        assert!(classifier.add_rule(Stage::Brief, "(", "broken").is_err());
    }
}
