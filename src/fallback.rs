//! Static payloads served when the Core Agents API cannot answer.
//!
//! Built once at startup and shared read-only. Everything here is
//! deterministic so a degraded response is reproducible.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};

use crate::types::{
    CurrentMetrics, DataSource, MarketTimingReport, NeighborhoodSnapshot, PricePoint, Recommendation,
    ResolvedIndicators, ScoreResult, ShareEntry,
};

/// Days covered by a generated price history, inclusive of both ends.
pub const PRICE_HISTORY_DAYS: i64 = 90;
const PRICE_HISTORY_BASE: f64 = 150.0;

struct NeighborhoodRecord {
    slug: &'static str,
    name: &'static str,
    price_per_sq_ft: f64,
    growth_rate: f64,
    median_price: f64,
    inventory_level: f64,
    demand_score: f64,
    days_on_market: f64,
}

const fn record(
    slug: &'static str,
    name: &'static str,
    price_per_sq_ft: f64,
    growth_rate: f64,
    median_price: f64,
    inventory_level: f64,
    demand_score: f64,
    days_on_market: f64,
) -> NeighborhoodRecord {
    NeighborhoodRecord {
        slug,
        name,
        price_per_sq_ft,
        growth_rate,
        median_price,
        inventory_level,
        demand_score,
        days_on_market,
    }
}

#[rustfmt::skip]
const NEIGHBORHOODS: &[NeighborhoodRecord] = &[
    record("cypress",         "Cypress",         165.0, 3.2,   385_000.0, 72.0, 84.0, 34.0),
    record("pearland",        "Pearland",        175.0, 2.8,   425_000.0, 68.0, 82.0, 31.0),
    record("memorial",        "Memorial",        285.0, 1.5,   875_000.0, 55.0, 78.0, 45.0),
    record("spring",          "Spring",          155.0, 2.9,   325_000.0, 81.0, 76.0, 38.0),
    record("conroe",          "Conroe",          145.0, 4.1,   295_000.0, 88.0, 80.0, 36.0),
    record("richmond",        "Richmond",        158.0, 3.5,   345_000.0, 74.0, 83.0, 33.0),
    record("friendswood",     "Friendswood",     195.0, 1.8,   485_000.0, 58.0, 79.0, 40.0),
    record("league-city",     "League City",     172.0, 2.7,   395_000.0, 66.0, 81.0, 35.0),
    record("clear-lake",      "Clear Lake",      180.0, 2.2,   415_000.0, 63.0, 75.0, 42.0),
    record("bellaire",        "Bellaire",        325.0, 1.2,   985_000.0, 52.0, 86.0, 29.0),
    record("river-oaks",      "River Oaks",      485.0, 0.8, 2_850_000.0, 50.0, 88.0, 58.0),
    record("heights",         "The Heights",     265.0, 2.1,   685_000.0, 57.0, 92.0, 24.0),
    record("montrose",        "Montrose",        245.0, 1.9,   595_000.0, 60.0, 87.0, 27.0),
    record("energy-corridor", "Energy Corridor", 215.0, 2.5,   525_000.0, 70.0, 73.0, 44.0),
    record("champions",       "Champions",       168.0, 2.3,   385_000.0, 76.0, 71.0, 39.0),
];

/// Used for any neighborhood not in the table, under the caller's name.
const GENERIC: NeighborhoodRecord = record("", "", 185.0, 2.5, 400_000.0, 70.0, 75.0, 40.0);

/// Lowercased, trimmed, whitespace runs become `-`, and a leading "the" is
/// dropped: "League City" -> "league-city", "The Heights" -> "heights".
pub fn slugify(name: &str) -> String {
    let slug = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_ascii_lowercase();
    match slug.strip_prefix("the-") {
        Some(rest) => rest.to_string(),
        None => slug,
    }
}

#[derive(Debug, Clone)]
pub struct DegradedMode {
    timing_scores: ScoreResult,
    current_metrics: CurrentMetrics,
    property_types: Vec<ShareEntry>,
    insights: Vec<String>,
}

impl DegradedMode {
    pub fn houston() -> Self {
        Self {
            timing_scores: ScoreResult {
                buy: 82,
                sell: 68,
                hold: 75,
                overall: 75,
                recommendation: Recommendation::Buy,
            },
            current_metrics: CurrentMetrics {
                avg_price_per_sq_ft: 185.0,
                price_change: 5.2,
                days_on_market: 42.0,
                dom_change: -3.0,
                active_listings: 3421.0,
                listings_change: 12.5,
            },
            property_types: [
                ("Single Family", 45),
                ("Townhome", 25),
                ("Condo", 15),
                ("Multi-Family", 10),
                ("Commercial", 5),
            ]
            .into_iter()
            .map(|(name, value)| ShareEntry {
                name: name.to_string(),
                value,
            })
            .collect(),
            insights: [
                "Houston market shows strong demand with 5.2% YoY price growth",
                "Inventory levels remain tight, creating opportunities for new development",
                "Suburban markets outperforming urban core in price appreciation",
                "Construction costs stabilizing after 2023 surge",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }

    /// Fixed market-timing verdict over the default indicators. The scores
    /// are not recomputed from the indicators.
    pub fn market_timing(&self, last_updated: String) -> MarketTimingReport {
        MarketTimingReport::new(
            ResolvedIndicators::default(),
            self.timing_scores,
            DataSource::Fallback,
            last_updated,
        )
    }

    pub fn current_metrics(&self) -> CurrentMetrics {
        self.current_metrics.clone()
    }

    pub fn property_types(&self) -> Vec<ShareEntry> {
        self.property_types.clone()
    }

    pub fn insights(&self) -> Vec<String> {
        self.insights.clone()
    }

    pub fn neighborhood(&self, name: &str) -> NeighborhoodSnapshot {
        let slug = slugify(name);
        let rec = NEIGHBORHOODS.iter().find(|r| r.slug == slug).unwrap_or(&GENERIC);
        NeighborhoodSnapshot {
            name: if rec.name.is_empty() { name.trim().to_string() } else { rec.name.to_string() },
            avg_price_per_sq_ft: rec.price_per_sq_ft,
            year_over_year_growth: rec.growth_rate,
            inventory_level: rec.inventory_level,
            demand_score: rec.demand_score,
            median_price: rec.median_price,
            days_on_market: rec.days_on_market,
            source: DataSource::Fallback,
        }
    }

    pub fn is_known_neighborhood(&self, name: &str) -> bool {
        let slug = slugify(name);
        NEIGHBORHOODS.iter().any(|r| r.slug == slug)
    }
}

/// Daily average price per square foot for the `PRICE_HISTORY_DAYS` days up
/// to and including `today`, oldest first: a slow upward trend with a
/// monthly seasonal swing of ±5%.
pub fn price_history(today: NaiveDate) -> Vec<PricePoint> {
    (0..=PRICE_HISTORY_DAYS)
        .rev()
        .map(|days_ago| {
            let date = today - ChronoDuration::days(days_ago);
            let month = f64::from(date.month());
            let seasonal = 1.0 + (month * std::f64::consts::PI / 6.0).sin() * 0.05;
            let trend = 1.0 + (PRICE_HISTORY_DAYS - days_ago) as f64 * 0.0005;
            PricePoint {
                date: date.format("%Y-%m-%d").to_string(),
                avg_price: (PRICE_HISTORY_BASE * seasonal * trend).round(),
            }
        })
        .collect()
}
