//! Team state: the persisted record per competing team, its two products,
//! turn history and arbiter reports, plus the decision normalizer.
//!
//! Every numeric field that enters from outside passes through
//! [`normalize_product`] or [`Team::normalize`] before the engine sees it.
//! Normalization is idempotent: feeding its output back in changes nothing.

use crate::config::{DecisionProfile, MarketId, MarketProfile};
use crate::num::{clamp, round_to_step_bounded};
use crate::segment::{classify_team, Segment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque team identifier, `"T-01"` style.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        TeamId(s.to_string())
    }
}

/// Allocate the next sequential id after the highest `T-NN` already taken.
pub fn next_team_id(existing: &[Team]) -> TeamId {
    let max = existing
        .iter()
        .filter_map(|t| t.id.0.strip_prefix("T-"))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    TeamId(format!("T-{:02}", max + 1))
}

/// One of a team's two products, fully normalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub name: String,
    pub description: String,
    pub quality: u8,
    pub design: u8,
    pub retail_price: f64,
    pub discount_pct: f64,
    pub ad_spend: f64,
    pub channels: u8,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            quality: 5,
            design: 3,
            retail_price: 0.0,
            discount_pct: 0.0,
            ad_spend: 0.0,
            channels: 2,
        }
    }
}

impl Product {
    /// Starting configuration of a team's flagship product.
    pub fn template_a(profile: &MarketProfile) -> Product {
        Product {
            name: "Producto A".to_string(),
            description: String::new(),
            quality: 5,
            design: 3,
            retail_price: profile.default_price_a,
            discount_pct: 5.0,
            ad_spend: profile.default_ad_spend_a,
            channels: 2,
        }
    }

    /// Starting configuration of a team's second product.
    pub fn template_b(profile: &MarketProfile) -> Product {
        Product {
            name: "Producto B".to_string(),
            description: String::new(),
            quality: 4,
            design: 2,
            retail_price: profile.default_price_b,
            discount_pct: 5.0,
            ad_spend: profile.default_ad_spend_b,
            channels: 2,
        }
    }
}

/// A raw, untrusted decision form for one product. Every field is optional;
/// absent fields keep the stored value.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDecision {
    pub quality: Option<f64>,
    pub design: Option<f64>,
    pub retail_price: Option<f64>,
    pub discount_pct: Option<f64>,
    pub ad_spend: Option<f64>,
    pub channels: Option<f64>,
}

impl From<&Product> for RawDecision {
    fn from(p: &Product) -> Self {
        RawDecision {
            quality: Some(p.quality as f64),
            design: Some(p.design as f64),
            retail_price: Some(p.retail_price),
            discount_pct: Some(p.discount_pct),
            ad_spend: Some(p.ad_spend),
            channels: Some(p.channels as f64),
        }
    }
}

fn int_field(value: Option<f64>, default: f64, min: f64, max: f64) -> u8 {
    let v = match value {
        Some(v) if v.is_finite() && v != 0.0 => v,
        _ => default,
    };
    clamp(v, min, max).round() as u8
}

/// Merge a raw decision over a fallback product and repair every field into
/// its legal range. Total and idempotent.
pub fn normalize_product(
    raw: &RawDecision,
    profile: &MarketProfile,
    fallback: &Product,
) -> Product {
    let quality = int_field(
        raw.quality.or(Some(fallback.quality as f64)),
        5.0,
        1.0,
        10.0,
    );
    let design = int_field(raw.design.or(Some(fallback.design as f64)), 3.0, 1.0, 5.0);

    let price_raw = raw.retail_price.unwrap_or(fallback.retail_price);
    let retail_price = if price_raw.is_finite()
        && price_raw >= profile.price_min
        && price_raw <= profile.price_max
    {
        round_to_step_bounded(
            price_raw,
            profile.price_step,
            profile.price_min,
            profile.price_max,
        )
    } else {
        let fb = if fallback.retail_price.is_finite() && fallback.retail_price != 0.0 {
            fallback.retail_price
        } else {
            profile.default_price_a
        };
        round_to_step_bounded(
            clamp(fb, profile.price_min, profile.price_max),
            profile.price_step,
            profile.price_min,
            profile.price_max,
        )
    };

    let discount_pct = clamp(raw.discount_pct.unwrap_or(fallback.discount_pct), 0.0, 50.0);

    let channels_raw = raw.channels.unwrap_or(fallback.channels as f64);
    let channels = if channels_raw.is_finite() && channels_raw.trunc() != 0.0 {
        clamp(channels_raw.trunc(), 1.0, 4.0) as u8
    } else {
        2
    };

    let ad_raw = raw.ad_spend.unwrap_or(fallback.ad_spend);
    let ad_spend = if ad_raw.is_finite() && ad_raw > 0.0 {
        round_to_step_bounded(
            clamp(ad_raw, 0.0, profile.ad_spend_max),
            profile.ad_spend_step,
            0.0,
            profile.ad_spend_max,
        )
    } else {
        let fb = if fallback.ad_spend.is_finite() && fallback.ad_spend != 0.0 {
            fallback.ad_spend
        } else {
            0.0
        };
        round_to_step_bounded(
            clamp(fb, 0.0, profile.ad_spend_max),
            profile.ad_spend_step,
            0.0,
            profile.ad_spend_max,
        )
    };

    Product {
        name: fallback.name.clone(),
        description: fallback.description.clone(),
        quality,
        design,
        retail_price,
        discount_pct,
        ad_spend,
        channels,
    }
}

/// Resolved per-product results for one turn. Monetary fields are rounded to
/// whole units before storage.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductMetrics {
    pub id: String,
    pub name: String,
    pub segmento: Segment,
    pub retail_price: f64,
    pub unit_cost: i64,
    pub disc_price: i64,
    pub margin: i64,
    pub arr: i64,
    pub units: i64,
    pub channel_cost: i64,
    pub price_target: i64,
    pub price_distance_pct: f64,
}

/// Both products' metrics for one turn.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductMetricsPair {
    pub a: ProductMetrics,
    pub b: ProductMetrics,
}

/// Price-fit summary for a team's turn.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSensitivity {
    pub avg_price_distance_pct: f64,
    pub penalty: f64,
}

/// One resolved turn, appended to a team's history.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryEntry {
    pub turn: u32,
    pub turn_label: String,
    pub market: MarketId,
    pub classification: Segment,
    pub arr: i64,
    pub market_share: f64,
    pub cac: i64,
    pub avg_margin: i64,
    pub avg_disc_price: i64,
    pub products: ProductMetricsPair,
    pub active_events: Vec<String>,
    pub market_sensitivity: MarketSensitivity,
    pub submitted: bool,
}

/// Headline numbers shown on a team's dashboard.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentMetrics {
    pub arr: i64,
    pub market_share: f64,
    pub cac: i64,
    pub avg_margin: i64,
}

/// Direction of a turn-over-turn metric delta as judged for the team
/// (a falling CAC counts as "up").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeltaDir {
    #[default]
    Up,
    Down,
}

/// One metric in an arbiter report, with its formatted delta.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricDelta {
    pub value: f64,
    pub delta_dir: DeltaDir,
    pub delta_pct: String,
}

/// Headline metric block of an arbiter report.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMetrics {
    pub arr: MetricDelta,
    pub market_share: MetricDelta,
    pub avg_margin: MetricDelta,
    pub cac: MetricDelta,
}

/// Forward-looking note attached to an arbiter report.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomingEvent {
    pub title: String,
    pub description: String,
}

/// Narrative turn summary written by the resolution engine for one team.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterReport {
    pub turn: u32,
    pub metrics: ReportMetrics,
    pub verdict: String,
    pub incoming_event: IncomingEvent,
}

/// Both products of a team.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPair {
    pub a: Product,
    pub b: Product,
}

/// The full persisted record of one competing team.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub password_hash: String,
    pub market: MarketId,
    pub segmento: Segment,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub products: ProductPair,
    pub history: Vec<HistoryEntry>,
    pub current_metrics: CurrentMetrics,
    /// Turn key ("Q1") to whether the team submitted decisions that turn.
    pub submitted: BTreeMap<String, bool>,
    /// Turn key to the narrative report produced when that turn resolved.
    pub arbiter_reports: BTreeMap<String, ArbiterReport>,
}

impl Default for Team {
    fn default() -> Self {
        Self {
            id: TeamId::default(),
            name: String::new(),
            password_hash: String::new(),
            market: MarketId::default(),
            segmento: Segment::default(),
            members: Vec::new(),
            created_at: Utc::now(),
            products: ProductPair::default(),
            history: Vec::new(),
            current_metrics: CurrentMetrics::default(),
            submitted: BTreeMap::new(),
            arbiter_reports: BTreeMap::new(),
        }
    }
}

impl Team {
    /// Construct a freshly registered team with template products for its
    /// market.
    pub fn new(id: TeamId, name: &str, password: &str, market: MarketId, profile: &MarketProfile) -> Team {
        let mut team = Team {
            id,
            name: name.trim().to_string(),
            password_hash: simple_hash(password),
            market,
            products: ProductPair {
                a: Product::template_a(profile),
                b: Product::template_b(profile),
            },
            ..Team::default()
        };
        team.segmento = classify_team(&team, profile);
        team
    }

    /// Repair a stored team record in place against its market profile:
    /// re-normalize both products, clean the member list and re-derive the
    /// segment. Idempotent.
    pub fn normalize(&mut self, profile: &MarketProfile) {
        let fallback_a = {
            let mut t = Product::template_a(profile);
            if !self.products.a.name.trim().is_empty() {
                t.name = self.products.a.name.clone();
            }
            t.description = self.products.a.description.clone();
            t
        };
        let fallback_b = {
            let mut t = Product::template_b(profile);
            if !self.products.b.name.trim().is_empty() {
                t.name = self.products.b.name.clone();
            }
            t.description = self.products.b.description.clone();
            t
        };
        self.products.a =
            normalize_product(&RawDecision::from(&self.products.a), profile, &fallback_a);
        self.products.b =
            normalize_product(&RawDecision::from(&self.products.b), profile, &fallback_b);
        self.members = normalize_members(&self.members);
        self.segmento = classify_team(self, profile);
    }
}

/// Trim, drop empties and dedupe (case-insensitive) a member list, keeping
/// first-seen order.
pub fn normalize_members(members: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for m in members {
        let trimmed = m.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(trimmed.to_string());
    }
    out
}

/// Non-cryptographic password digest kept for parity with existing stored
/// datasets: a 32-bit rolling hash over UTF-16 code units rendered as
/// `ag_{base36}_{len}`. Classroom-grade only.
pub fn simple_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    let mut len: usize = 0;
    for unit in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
        len += 1;
    }
    format!("ag_{}_{}", to_base36(hash.unsigned_abs()), len)
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}

/// Total ad and channel spend implied by a pair of decisions, as validated
/// against the market budget cap.
pub fn planned_budget(a: &RawDecision, b: &RawDecision, profile: &DecisionProfile) -> (f64, f64) {
    let ad = a.ad_spend.unwrap_or(0.0).max(0.0) + b.ad_spend.unwrap_or(0.0).max(0.0);
    let channels = a.channels.unwrap_or(1.0).max(0.0) + b.channels.unwrap_or(1.0).max(0.0);
    (ad, channels * profile.channel_cost_per_unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn moda() -> MarketProfile {
        MarketProfile::default_for(MarketId::Moda)
    }

    #[test]
    fn team_ids_are_sequential() {
        assert_eq!(next_team_id(&[]).as_str(), "T-01");
        let mut t1 = Team::default();
        t1.id = TeamId::from("T-03");
        let mut t2 = Team::default();
        t2.id = TeamId::from("T-07");
        assert_eq!(next_team_id(&[t1, t2]).as_str(), "T-08");
    }

    #[test]
    fn malformed_ids_are_skipped_when_sequencing() {
        let mut t = Team::default();
        t.id = TeamId::from("equipo-azul");
        assert_eq!(next_team_id(&[t]).as_str(), "T-01");
    }

    #[test]
    fn simple_hash_is_stable_and_prefixed() {
        let h = simple_hash("secreto1");
        assert!(h.starts_with("ag_"));
        assert!(h.ends_with("_8"));
        assert_eq!(h, simple_hash("secreto1"));
        assert_ne!(h, simple_hash("secreto2"));
    }

    #[test]
    fn simple_hash_counts_utf16_units() {
        // "ñ" is one UTF-16 unit, "𝄞" is two.
        assert!(simple_hash("ñ").ends_with("_1"));
        assert!(simple_hash("𝄞").ends_with("_2"));
    }

    #[test]
    fn member_lists_are_deduped_case_insensitively() {
        let members = vec![
            "  Ana ".to_string(),
            "".to_string(),
            "ana".to_string(),
            "Luis".to_string(),
            "ANA".to_string(),
        ];
        assert_eq!(normalize_members(&members), vec!["Ana", "Luis"]);
    }

    #[test]
    fn out_of_range_price_falls_back_to_stored_value() {
        let p = moda();
        let fallback = Product {
            retail_price: 180.0,
            ..Product::template_a(&p)
        };
        let raw = RawDecision {
            retail_price: Some(5_000.0),
            ..RawDecision::default()
        };
        assert_eq!(normalize_product(&raw, &p, &fallback).retail_price, 180.0);
    }

    #[test]
    fn price_is_rounded_onto_the_market_grid() {
        let p = moda();
        let fallback = Product::template_a(&p);
        let raw = RawDecision {
            retail_price: Some(187.0),
            ..RawDecision::default()
        };
        assert_eq!(normalize_product(&raw, &p, &fallback).retail_price, 190.0);
    }

    #[test]
    fn zero_quality_means_missing() {
        let p = moda();
        let fallback = Product::template_a(&p);
        let raw = RawDecision {
            quality: Some(0.0),
            ..RawDecision::default()
        };
        assert_eq!(normalize_product(&raw, &p, &fallback).quality, 5);
    }

    #[test]
    fn ad_spend_rounds_to_step_and_respects_its_cap() {
        let p = moda();
        let fallback = Product::template_a(&p);
        let raw = RawDecision {
            ad_spend: Some(1_230_000.0),
            ..RawDecision::default()
        };
        assert_eq!(normalize_product(&raw, &p, &fallback).ad_spend, 1_250_000.0);

        let raw = RawDecision {
            ad_spend: Some(9e9),
            ..RawDecision::default()
        };
        assert_eq!(
            normalize_product(&raw, &p, &fallback).ad_spend,
            p.ad_spend_max
        );
    }

    #[test]
    fn new_team_starts_from_templates_and_is_classified() {
        let p = moda();
        let team = Team::new(TeamId::from("T-01"), " Azul ", "clave", MarketId::Moda, &p);
        assert_eq!(team.name, "Azul");
        assert_eq!(team.products.a.retail_price, 180.0);
        assert_eq!(team.products.b.quality, 4);
        assert_eq!(team.segmento, Segment::Economico);
    }

    proptest! {
        #[test]
        fn normalize_product_is_idempotent(
            quality in prop::option::of(-5.0f64..20.0),
            design in prop::option::of(-5.0f64..12.0),
            price in prop::option::of(-100.0f64..5_000.0),
            discount in prop::option::of(-10.0f64..80.0),
            ad in prop::option::of(-1e6f64..1e7),
            channels in prop::option::of(-2.0f64..9.0),
        ) {
            let p = moda();
            let fallback = Product::template_a(&p);
            let raw = RawDecision { quality, design, retail_price: price,
                                    discount_pct: discount, ad_spend: ad, channels };
            let once = normalize_product(&raw, &p, &fallback);
            let twice = normalize_product(&RawDecision::from(&once), &p, &once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalized_fields_stay_in_range(
            quality in prop::option::of(-5.0f64..20.0),
            price in prop::option::of(-100.0f64..5_000.0),
            discount in prop::option::of(-10.0f64..80.0),
            ad in prop::option::of(-1e6f64..1e10),
            channels in prop::option::of(-2.0f64..9.0),
        ) {
            let p = moda();
            let fallback = Product::template_a(&p);
            let raw = RawDecision { quality, design: None, retail_price: price,
                                    discount_pct: discount, ad_spend: ad, channels };
            let out = normalize_product(&raw, &p, &fallback);
            prop_assert!((1..=10).contains(&out.quality));
            prop_assert!((1..=4).contains(&out.channels));
            prop_assert!(out.retail_price >= p.price_min && out.retail_price <= p.price_max);
            prop_assert!((0.0..=50.0).contains(&out.discount_pct));
            prop_assert!(out.ad_spend >= 0.0 && out.ad_spend <= p.ad_spend_max);
        }
    }
}
