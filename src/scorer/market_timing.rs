use crate::types::{
    ConstructionTrend, PermitActivity, Recommendation, ResolvedIndicators, ScoreResult,
};

const BASE_SCORE: i32 = 50;

/// Scores all three stances and picks the recommendation.
pub fn score(ind: &ResolvedIndicators) -> ScoreResult {
    let buy = buy_score(ind);
    let sell = sell_score(ind);
    let hold = hold_score(ind);
    ScoreResult {
        buy,
        sell,
        hold,
        overall: overall_score(buy, sell, hold),
        recommendation: recommend(buy, sell, hold),
    }
}

pub fn buy_score(ind: &ResolvedIndicators) -> u8 {
    let mut score = BASE_SCORE;

    if ind.price_growth > 3.0 {
        score += 15;
    }
    if ind.inventory_months < 3.0 {
        score += 10;
    }
    if ind.population_growth > 1.5 {
        score += 10;
    }
    if ind.permit_activity == PermitActivity::High {
        score += 10;
    }

    if ind.interest_rate > 7.0 {
        score -= 5;
    }
    if ind.construction_costs == ConstructionTrend::Rising {
        score -= 10;
    }

    clamp_score(score)
}

pub fn sell_score(ind: &ResolvedIndicators) -> u8 {
    let mut score = BASE_SCORE;

    if ind.price_growth > 7.0 {
        score += 20;
    }
    if ind.inventory_months < 2.0 {
        score += 15;
    }

    if ind.interest_rate > 7.0 {
        score -= 10;
    }
    if ind.population_growth < 1.0 {
        score -= 15;
    }

    clamp_score(score)
}

pub fn hold_score(ind: &ResolvedIndicators) -> u8 {
    let mut score = BASE_SCORE;

    if ind.price_growth > 2.0 && ind.price_growth < 6.0 {
        score += 15;
    }
    if ind.construction_costs == ConstructionTrend::Stable {
        score += 10;
    }
    if ind.population_growth > 1.0 {
        score += 10;
    }

    clamp_score(score)
}

pub fn overall_score(buy: u8, sell: u8, hold: u8) -> u8 {
    let sum = f64::from(buy) + f64::from(sell) + f64::from(hold);
    (sum / 3.0).round() as u8
}

/// Arg-max over the three scores. Ties resolve in the order buy, sell, hold.
pub fn recommend(buy: u8, sell: u8, hold: u8) -> Recommendation {
    let max = buy.max(sell).max(hold);
    if buy == max {
        Recommendation::Buy
    } else if sell == max {
        Recommendation::Sell
    } else {
        Recommendation::Hold
    }
}

fn clamp_score(score: i32) -> u8 {
    score.clamp(0, 100) as u8
}
