use serde::{Deserialize, Serialize};

use crate::config::indicator_defaults;
use crate::error::Result;
use crate::validation::{FieldErrors, Validate};

// ---------------------------------------------------------------------------
// Market indicators
// ---------------------------------------------------------------------------

/// Accepts the same spellings from callers as from the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ConstructionTrend {
    Rising,
    Stable,
    Falling,
}

impl ConstructionTrend {
    /// Lenient parse for upstream feeds ("Rising", "stable", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rising" => Some(ConstructionTrend::Rising),
            "stable" => Some(ConstructionTrend::Stable),
            "falling" => Some(ConstructionTrend::Falling),
            _ => None,
        }
    }
}

impl TryFrom<String> for ConstructionTrend {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("unknown construction cost trend `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PermitActivity {
    High,
    Moderate,
    Low,
}

impl PermitActivity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(PermitActivity::High),
            "moderate" | "medium" => Some(PermitActivity::Moderate),
            "low" => Some(PermitActivity::Low),
            _ => None,
        }
    }
}

impl TryFrom<String> for PermitActivity {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("unknown permit activity `{s}`"))
    }
}

/// Indicators as supplied by a caller or the upstream feed. Any field may be
/// absent; `resolve` substitutes the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIndicators {
    /// Year-over-year price growth, percent.
    pub price_growth: Option<f64>,
    pub inventory_months: Option<f64>,
    /// Prevailing mortgage rate, percent.
    #[serde(rename = "interestRates")]
    pub interest_rate: Option<f64>,
    pub construction_costs: Option<ConstructionTrend>,
    pub permit_activity: Option<PermitActivity>,
    /// Annual population growth, percent.
    pub population_growth: Option<f64>,
}

impl MarketIndicators {
    pub fn resolve(&self) -> ResolvedIndicators {
        let d = ResolvedIndicators::default();
        ResolvedIndicators {
            price_growth: self.price_growth.unwrap_or(d.price_growth),
            inventory_months: self.inventory_months.unwrap_or(d.inventory_months),
            interest_rate: self.interest_rate.unwrap_or(d.interest_rate),
            construction_costs: self.construction_costs.unwrap_or(d.construction_costs),
            permit_activity: self.permit_activity.unwrap_or(d.permit_activity),
            population_growth: self.population_growth.unwrap_or(d.population_growth),
        }
    }
}

/// Fully-populated indicators, the only form the scorer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIndicators {
    pub price_growth: f64,
    pub inventory_months: f64,
    #[serde(rename = "interestRates")]
    pub interest_rate: f64,
    pub construction_costs: ConstructionTrend,
    pub permit_activity: PermitActivity,
    pub population_growth: f64,
}

impl Default for ResolvedIndicators {
    fn default() -> Self {
        Self {
            price_growth: indicator_defaults::PRICE_GROWTH,
            inventory_months: indicator_defaults::INVENTORY_MONTHS,
            interest_rate: indicator_defaults::INTEREST_RATE,
            construction_costs: ConstructionTrend::Stable,
            permit_activity: PermitActivity::High,
            population_growth: indicator_defaults::POPULATION_GROWTH,
        }
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::Buy => "Strong buy signal for development land in suburban markets",
            Recommendation::Sell => "Consider selling undeveloped land or accelerating projects",
            Recommendation::Hold => "Hold existing properties and wait for better opportunities",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Recommendation::Buy => "buy",
            Recommendation::Sell => "sell",
            Recommendation::Hold => "hold",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub buy: u8,
    pub sell: u8,
    pub hold: u8,
    /// Rounded mean of buy, sell and hold.
    pub overall: u8,
    pub recommendation: Recommendation,
}

/// Whether a payload came from the live upstream or the degraded-mode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Fallback,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Live => write!(f, "live"),
            DataSource::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketTimingReport {
    pub overall_score: u8,
    pub buy_score: u8,
    pub sell_score: u8,
    pub hold_score: u8,
    pub indicators: ResolvedIndicators,
    pub recommendation: Recommendation,
    pub recommendation_message: String,
    pub source: DataSource,
    pub last_updated: String,
}

impl MarketTimingReport {
    pub fn new(
        indicators: ResolvedIndicators,
        scores: ScoreResult,
        source: DataSource,
        last_updated: String,
    ) -> Self {
        Self {
            overall_score: scores.overall,
            buy_score: scores.buy,
            sell_score: scores.sell,
            hold_score: scores.hold,
            indicators,
            recommendation: scores.recommendation,
            recommendation_message: scores.recommendation.message().to_string(),
            source,
            last_updated,
        }
    }
}

// ---------------------------------------------------------------------------
// Market intelligence widget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMetrics {
    pub avg_price_per_sq_ft: f64,
    pub price_change: f64,
    pub days_on_market: f64,
    pub dom_change: f64,
    pub active_listings: f64,
    pub listings_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub name: String,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketIntelligenceReport {
    pub neighborhood: String,
    pub current_metrics: CurrentMetrics,
    pub price_history: Vec<PricePoint>,
    pub property_type_distribution: Vec<ShareEntry>,
    pub insights: Vec<String>,
    pub source: DataSource,
    pub last_updated: String,
}

// ---------------------------------------------------------------------------
// Neighborhood comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodSnapshot {
    pub name: String,
    pub avg_price_per_sq_ft: f64,
    /// Percent.
    pub year_over_year_growth: f64,
    pub inventory_level: f64,
    pub demand_score: f64,
    pub median_price: f64,
    pub days_on_market: f64,
    pub source: DataSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodComparison {
    pub neighborhoods: Vec<NeighborhoodSnapshot>,
    pub comparison: ComparisonLeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonLeaders {
    pub highest_price: NeighborhoodSnapshot,
    pub fastest_growth: NeighborhoodSnapshot,
    pub highest_demand: NeighborhoodSnapshot,
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

/// Contact-form submission. Resubmitting a known email updates that lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default = "default_lead_source")]
    pub source: String,
    /// e.g. "immediate", "0-3 months", "3-6 months"
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_lead_source() -> String {
    "website".to_string()
}

impl LeadSubmission {
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_ascii_lowercase()
    }
}

impl Validate for LeadSubmission {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        errors.non_empty("name", &self.name);
        errors.email("email", &self.email);
        errors.non_empty("source", &self.source);
        if let Some(min) = self.budget_min {
            errors.non_negative("budgetMin", min);
        }
        if let Some(max) = self.budget_max {
            errors.non_negative("budgetMax", max);
        }
        if let (Some(min), Some(max)) = (self.budget_min, self.budget_max) {
            if max < min {
                errors.push("budgetMax", "must not be less than budgetMin");
            }
        }
        errors.finish()
    }
}

/// Pipeline stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Qualified,
    Contacted,
    Converted,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Qualified => "QUALIFIED",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::Converted => "CONVERTED",
        }
    }
}

/// Partial edit of a lead. Absent fields are left as they are; the email is
/// the lead's identity and cannot be changed here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub source: Option<String>,
    pub timeline: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub message: Option<String>,
    pub status: Option<LeadStatus>,
}

impl Validate for LeadUpdate {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            errors.non_empty("name", name);
        }
        if let Some(source) = &self.source {
            errors.non_empty("source", source);
        }
        if let Some(min) = self.budget_min {
            errors.non_negative("budgetMin", min);
        }
        if let Some(max) = self.budget_max {
            errors.non_negative("budgetMax", max);
        }
        if let (Some(min), Some(max)) = (self.budget_min, self.budget_max) {
            if max < min {
                errors.push("budgetMax", "must not be less than budgetMin");
            }
        }
        errors.finish()
    }
}
