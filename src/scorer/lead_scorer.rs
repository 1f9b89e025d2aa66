use std::collections::HashSet;

use serde::Serialize;

pub mod weights {
    pub const BASE: u32 = 10;
    pub const EMAIL_OPENED: u32 = 5;
    pub const EMAIL_CLICKED: u32 = 10;
    pub const TOOL_USED: u32 = 15;
    pub const CONSULTATION_SCHEDULED: u32 = 30;
    pub const MULTIPLE_TOOLS_USED: u32 = 25;
    pub const URGENT_TIMELINE: u32 = 15;
    pub const HIGH_BUDGET: u32 = 20;
}

/// Budget above which a lead counts as high-value, USD.
pub const HIGH_BUDGET_THRESHOLD: f64 = 1_000_000.0;

/// A lead qualifies once its score is strictly above this.
pub const QUALIFY_THRESHOLD: u8 = 50;

/// Everything the scorer needs to know about a lead.
#[derive(Debug, Clone, Default)]
pub struct LeadProfile {
    pub interaction_kinds: HashSet<String>,
    pub calculator_results: usize,
    pub timeline: Option<String>,
    pub budget_max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadScoreBreakdown {
    pub base_score: u32,
    pub interaction_score: u32,
    pub engagement_score: u32,
    pub intent_score: u32,
    pub budget_score: u32,
}

impl LeadScoreBreakdown {
    /// Sum of all factors, capped at 100.
    pub fn total(&self) -> u8 {
        let sum = self.base_score
            + self.interaction_score
            + self.engagement_score
            + self.intent_score
            + self.budget_score;
        sum.min(100) as u8
    }
}

pub fn score_lead(profile: &LeadProfile) -> LeadScoreBreakdown {
    let has = |kind: &str| profile.interaction_kinds.contains(kind);

    let mut interaction_score = 0;
    if has("email_opened") {
        interaction_score += weights::EMAIL_OPENED;
    }
    if has("email_clicked") {
        interaction_score += weights::EMAIL_CLICKED;
    }
    if has("tool_used") {
        interaction_score += weights::TOOL_USED;
    }
    if has("consultation_scheduled") {
        interaction_score += weights::CONSULTATION_SCHEDULED;
    }

    let engagement_score = if profile.calculator_results > 1 {
        weights::MULTIPLE_TOOLS_USED
    } else {
        0
    };

    let intent_score = match profile.timeline.as_deref() {
        Some("immediate") | Some("0-3 months") => weights::URGENT_TIMELINE,
        _ => 0,
    };

    let budget_score = match profile.budget_max {
        Some(max) if max > HIGH_BUDGET_THRESHOLD => weights::HIGH_BUDGET,
        _ => 0,
    };

    LeadScoreBreakdown {
        base_score: weights::BASE,
        interaction_score,
        engagement_score,
        intent_score,
        budget_score,
    }
}

pub fn qualifies(score: u8) -> bool {
    score > QUALIFY_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(kinds: &[&str], calculators: usize, timeline: Option<&str>, budget: Option<f64>) -> LeadProfile {
        LeadProfile {
            interaction_kinds: kinds.iter().map(|k| k.to_string()).collect(),
            calculator_results: calculators,
            timeline: timeline.map(str::to_string),
            budget_max: budget,
        }
    }

    #[test]
    fn new_lead_gets_base_score() {
        let breakdown = score_lead(&LeadProfile::default());
        assert_eq!(breakdown.total(), 10);
        assert!(!qualifies(breakdown.total()));
    }

    #[test]
    fn interactions_count_once_per_kind() {
        let breakdown = score_lead(&profile(&["email_opened", "tool_used", "lead_created"], 1, None, None));
        assert_eq!(breakdown.interaction_score, 20);
        assert_eq!(breakdown.engagement_score, 0);
        assert_eq!(breakdown.total(), 30);
    }

    #[test]
    fn engaged_urgent_high_budget_lead_qualifies() {
        let breakdown = score_lead(&profile(
            &["tool_used"],
            2,
            Some("0-3 months"),
            Some(2_500_000.0),
        ));
        // 10 + 15 + 25 + 15 + 20
        assert_eq!(breakdown.total(), 85);
        assert!(qualifies(breakdown.total()));
    }

    #[test]
    fn budget_threshold_is_strict() {
        let at = score_lead(&profile(&[], 0, None, Some(1_000_000.0)));
        assert_eq!(at.budget_score, 0);
    }

    #[test]
    fn total_is_capped() {
        let breakdown = score_lead(&profile(
            &["email_opened", "email_clicked", "tool_used", "consultation_scheduled"],
            3,
            Some("immediate"),
            Some(5_000_000.0),
        ));
        assert_eq!(breakdown.total(), 100);
    }

    #[test]
    fn qualification_threshold() {
        assert!(!qualifies(50));
        assert!(qualifies(51));
    }
}
