//! Market segment classification.
//!
//! A product's (quality, design, price) triple maps onto one of three fixed
//! tiers through a weighted linear score. The function is total: out-of-domain
//! inputs are repaired with defaults before scoring, so there is no error
//! path.

use crate::config::MarketProfile;
use crate::num::clamp;
use crate::team::Team;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three fixed market tiers.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Economico,
    #[default]
    Medio,
    Lujo,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::Economico, Segment::Medio, Segment::Lujo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::Economico => "economico",
            Segment::Medio => "medio",
            Segment::Lujo => "lujo",
        }
    }

    /// Display label used in narrative reports.
    pub fn label(&self) -> &'static str {
        match self {
            Segment::Economico => "Mercado Economico",
            Segment::Medio => "Mercado Medio",
            Segment::Lujo => "Mercado Lujo",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Weights of the classification score. Quality dominates, price contributes
// least; the thirds of the unit interval split the three tiers.
const WEIGHT_QUALITY: f64 = 0.42;
const WEIGHT_DESIGN: f64 = 0.33;
const WEIGHT_PRICE: f64 = 0.25;

fn repair(value: f64, default: f64) -> f64 {
    // Zero doubles as "absent" for these attributes: a quality of 0 is not a
    // legal decision, it is a missing one.
    if value.is_finite() && value != 0.0 {
        value
    } else {
        default
    }
}

/// Weighted classification score in [0, 1] for a (quality, design, price)
/// triple against a market profile. Monotone non-decreasing in quality and
/// design.
pub fn segment_score(quality: f64, design: f64, retail_price: f64, profile: &MarketProfile) -> f64 {
    let q = clamp(repair(quality, 5.0), 1.0, 10.0);
    let d = clamp(repair(design, 3.0), 1.0, 5.0);
    let price = clamp(
        repair(retail_price, profile.default_price_a),
        profile.price_min,
        profile.price_max,
    );

    let quality_norm = (q - 1.0) / 9.0;
    let design_norm = (d - 1.0) / 4.0;
    let price_norm = (price - profile.price_min) / (profile.price_max - profile.price_min).max(1.0);

    quality_norm * WEIGHT_QUALITY + design_norm * WEIGHT_DESIGN + price_norm * WEIGHT_PRICE
}

/// Classify a (quality, design, price) triple into a segment.
pub fn classify_attributes(
    quality: f64,
    design: f64,
    retail_price: f64,
    profile: &MarketProfile,
) -> Segment {
    let score = segment_score(quality, design, retail_price, profile);
    if score < 0.33 {
        Segment::Economico
    } else if score < 0.66 {
        Segment::Medio
    } else {
        Segment::Lujo
    }
}

/// Team-level segment: classify the average of both products' attributes.
/// This is the only source of truth for a team's segment; the stored field is
/// derived and recomputed on every read.
pub fn classify_team(team: &Team, profile: &MarketProfile) -> Segment {
    let a = &team.products.a;
    let b = &team.products.b;
    let avg_quality = (repair(a.quality as f64, 5.0) + repair(b.quality as f64, 5.0)) / 2.0;
    let avg_design = (repair(a.design as f64, 3.0) + repair(b.design as f64, 3.0)) / 2.0;
    let avg_price = (a.retail_price + b.retail_price) / 2.0;
    classify_attributes(avg_quality, avg_design, avg_price, profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketId;
    use proptest::prelude::*;

    fn moda() -> MarketProfile {
        MarketProfile::default_for(MarketId::Moda)
    }

    #[test]
    fn extremes_hit_the_outer_tiers() {
        let p = moda();
        assert_eq!(classify_attributes(1.0, 1.0, p.price_min, &p), Segment::Economico);
        assert_eq!(classify_attributes(10.0, 5.0, p.price_max, &p), Segment::Lujo);
    }

    #[test]
    fn mid_range_product_is_medio() {
        let p = moda();
        assert_eq!(classify_attributes(5.0, 3.0, 400.0, &p), Segment::Medio);
    }

    #[test]
    fn invalid_attributes_fall_back_to_defaults() {
        let p = moda();
        let with_defaults = segment_score(5.0, 3.0, p.default_price_a, &p);
        assert_eq!(segment_score(f64::NAN, 0.0, f64::INFINITY, &p), with_defaults);
    }

    proptest! {
        #[test]
        fn score_monotone_in_quality(q1 in 1.0f64..=10.0, dq in 0.0f64..5.0,
                                     d in 1.0f64..=5.0, price in 10.0f64..=1000.0) {
            let p = moda();
            let q2 = (q1 + dq).min(10.0);
            prop_assert!(segment_score(q1, d, price, &p) <= segment_score(q2, d, price, &p));
        }

        #[test]
        fn score_monotone_in_design(q in 1.0f64..=10.0, d1 in 1.0f64..=5.0,
                                    dd in 0.0f64..4.0, price in 10.0f64..=1000.0) {
            let p = moda();
            let d2 = (d1 + dd).min(5.0);
            prop_assert!(segment_score(q, d1, price, &p) <= segment_score(q, d2, price, &p));
        }

        #[test]
        fn score_stays_in_unit_interval(q in -50.0f64..50.0, d in -50.0f64..50.0,
                                        price in -1e7f64..1e7) {
            let p = moda();
            let s = segment_score(q, d, price, &p);
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
