pub mod lead_scorer;
pub mod market_timing;

pub use lead_scorer::{qualifies, score_lead, LeadProfile, LeadScoreBreakdown};
pub use market_timing::score as score_market_timing;
