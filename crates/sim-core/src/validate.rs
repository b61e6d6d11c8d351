//! Submission validation.
//!
//! Unlike the repair-on-read normalizer, the validation gate rejects instead
//! of fixing: an out-of-range or non-numeric field is reported back to the
//! submitting team, and nothing is persisted. All issues are collected in one
//! pass so the team sees the full list at once.

use crate::config::DecisionProfile;
use crate::team::{planned_budget, RawDecision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which of the two products a validation issue refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSlot {
    A,
    B,
}

impl std::fmt::Display for ProductSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductSlot::A => f.write_str("A"),
            ProductSlot::B => f.write_str("B"),
        }
    }
}

/// A single reason a submission was rejected.
#[derive(Clone, Debug, PartialEq, Error, Serialize)]
pub enum ValidationIssue {
    #[error("product {product}: {field} is not a number")]
    NotNumeric { product: ProductSlot, field: &'static str },
    #[error("product {product}: {field} must be a whole number")]
    NotInteger { product: ProductSlot, field: &'static str },
    #[error("product {product}: {field} {value} is outside [{min}, {max}]")]
    OutOfRange {
        product: ProductSlot,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("planned spend {total} exceeds the market budget cap {cap}")]
    BudgetExceeded { total: f64, cap: f64 },
}

/// Ad and channel spend of an accepted submission.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub total_ad_spend: f64,
    pub total_channel_cost: f64,
    pub total_budget: f64,
}

/// A decision form covering both products, as submitted by a team.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmittedDecisions {
    pub team_id: String,
    pub a: RawDecision,
    pub b: RawDecision,
}

fn check_field(
    issues: &mut Vec<ValidationIssue>,
    product: ProductSlot,
    field: &'static str,
    value: Option<f64>,
    min: f64,
    max: f64,
    integer: bool,
) {
    let Some(v) = value else { return };
    if !v.is_finite() {
        issues.push(ValidationIssue::NotNumeric { product, field });
        return;
    }
    if integer && v.fract() != 0.0 {
        issues.push(ValidationIssue::NotInteger { product, field });
        return;
    }
    if v < min || v > max {
        issues.push(ValidationIssue::OutOfRange {
            product,
            field,
            value: v,
            min,
            max,
        });
    }
}

fn check_product(
    issues: &mut Vec<ValidationIssue>,
    product: ProductSlot,
    d: &RawDecision,
    profile: &DecisionProfile,
) {
    check_field(
        issues,
        product,
        "quality",
        d.quality,
        profile.quality.min,
        profile.quality.max,
        true,
    );
    check_field(
        issues,
        product,
        "design",
        d.design,
        profile.design.min,
        profile.design.max,
        true,
    );
    check_field(
        issues,
        product,
        "retail_price",
        d.retail_price,
        profile.price.min,
        profile.price.max,
        false,
    );
    check_field(
        issues,
        product,
        "discount_pct",
        d.discount_pct,
        profile.discount_pct.min,
        profile.discount_pct.max,
        false,
    );
    check_field(
        issues,
        product,
        "ad_spend",
        d.ad_spend,
        profile.ad_spend.min,
        profile.ad_spend.max,
        false,
    );
    check_field(
        issues,
        product,
        "channels",
        d.channels,
        profile.channels.min,
        profile.channels.max,
        true,
    );
}

impl SubmittedDecisions {
    /// Validate both products against a market's decision profile. Collects
    /// every issue; an empty issue list means the submission is accepted and
    /// its budget summary is returned. Side-effect-free.
    pub fn validate(&self, profile: &DecisionProfile) -> Result<BudgetSummary, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        check_product(&mut issues, ProductSlot::A, &self.a, profile);
        check_product(&mut issues, ProductSlot::B, &self.b, profile);

        let (total_ad_spend, total_channel_cost) = planned_budget(&self.a, &self.b, profile);
        let total_budget = total_ad_spend + total_channel_cost;
        if total_budget > profile.max_budget {
            issues.push(ValidationIssue::BudgetExceeded {
                total: total_budget,
                cap: profile.max_budget,
            });
        }

        if issues.is_empty() {
            Ok(BudgetSummary {
                total_ad_spend,
                total_channel_cost,
                total_budget,
            })
        } else {
            Err(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MarketId, SimConfig};

    fn moda_profile() -> DecisionProfile {
        SimConfig::default().decision_profile(MarketId::Moda)
    }

    fn valid_submission() -> SubmittedDecisions {
        SubmittedDecisions {
            team_id: "T-01".to_string(),
            a: RawDecision {
                quality: Some(6.0),
                design: Some(3.0),
                retail_price: Some(200.0),
                discount_pct: Some(5.0),
                ad_spend: Some(1_000_000.0),
                channels: Some(2.0),
            },
            b: RawDecision {
                quality: Some(4.0),
                design: Some(2.0),
                retail_price: Some(90.0),
                discount_pct: Some(10.0),
                ad_spend: Some(500_000.0),
                channels: Some(2.0),
            },
        }
    }

    #[test]
    fn a_clean_submission_is_accepted_with_its_budget() {
        let s = valid_submission();
        let budget = s.validate(&moda_profile()).unwrap();
        assert_eq!(budget.total_ad_spend, 1_500_000.0);
        assert_eq!(budget.total_channel_cost, 4.0 * 95_000.0);
        assert_eq!(budget.total_budget, 1_880_000.0);
    }

    #[test]
    fn all_issues_are_collected_in_one_pass() {
        let mut s = valid_submission();
        s.a.quality = Some(12.0);
        s.a.design = Some(2.5);
        s.b.retail_price = Some(f64::NAN);
        let issues = s.validate(&moda_profile()).unwrap_err();
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&ValidationIssue::OutOfRange {
            product: ProductSlot::A,
            field: "quality",
            value: 12.0,
            min: 1.0,
            max: 10.0,
        }));
        assert!(issues.contains(&ValidationIssue::NotInteger {
            product: ProductSlot::A,
            field: "design",
        }));
        assert!(issues.contains(&ValidationIssue::NotNumeric {
            product: ProductSlot::B,
            field: "retail_price",
        }));
    }

    #[test]
    fn budget_exactly_at_the_cap_is_accepted() {
        // Moda cap is 8_000_000; channels cost 4 * 95_000 = 380_000.
        let mut s = valid_submission();
        s.a.ad_spend = Some(4_000_000.0);
        s.b.ad_spend = Some(3_620_000.0);
        let budget = s.validate(&moda_profile()).unwrap();
        assert_eq!(budget.total_budget, 8_000_000.0);
    }

    #[test]
    fn budget_one_over_the_cap_is_rejected() {
        let mut s = valid_submission();
        s.a.ad_spend = Some(4_000_000.0);
        s.b.ad_spend = Some(3_620_001.0);
        let issues = s.validate(&moda_profile()).unwrap_err();
        assert_eq!(
            issues,
            vec![ValidationIssue::BudgetExceeded {
                total: 8_000_001.0,
                cap: 8_000_000.0,
            }]
        );
    }

    #[test]
    fn missing_fields_do_not_raise_issues_but_count_default_channels() {
        let s = SubmittedDecisions::default();
        // Two products with no channels declared cost two default channels.
        let budget = s.validate(&moda_profile()).unwrap();
        assert_eq!(budget.total_ad_spend, 0.0);
        assert_eq!(budget.total_channel_cost, 2.0 * 95_000.0);
    }

    #[test]
    fn ad_spend_above_the_market_cap_is_rejected() {
        let mut s = valid_submission();
        s.a.ad_spend = Some(4_050_000.0);
        let issues = s.validate(&moda_profile()).unwrap_err();
        assert!(matches!(
            issues[0],
            ValidationIssue::OutOfRange { field: "ad_spend", .. }
        ));
    }
}
