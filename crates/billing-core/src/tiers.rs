use serde::{Deserialize, Serialize};

// ── DiscountTier ──────────────────────────────────────────────────────────────

/// One bracket of the cumulative-consumption discount schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountTier {
    pub level: u8,
    /// Lower bound in kWh.
    pub lower: f64,
    /// Whether `lower` itself belongs to this tier.
    pub lower_inclusive: bool,
    /// Upper bound in kWh, always inclusive.
    pub upper: f64,
    pub discount_percent: f64,
}

impl DiscountTier {
    pub fn contains(&self, energy: f64) -> bool {
        let above_lower = if self.lower_inclusive {
            energy >= self.lower
        } else {
            energy > self.lower
        };
        above_lower && energy <= self.upper
    }
}

/// The standard schedule, ascending. Consumption above the last upper bound
/// earns no discount (level 0).
pub const DISCOUNT_TIERS: [DiscountTier; 3] = [
    DiscountTier {
        level: 1,
        lower: 0.0,
        lower_inclusive: true,
        upper: 951_700.0,
        discount_percent: 13.0,
    },
    DiscountTier {
        level: 2,
        lower: 951_700.0,
        lower_inclusive: false,
        upper: 1_163_100.0,
        discount_percent: 100.0,
    },
    DiscountTier {
        level: 3,
        lower: 1_163_100.0,
        lower_inclusive: false,
        upper: 1_353_000.0,
        discount_percent: 50.0,
    },
];

// ── TierClassification ────────────────────────────────────────────────────────

/// Energy still needed to reach a higher tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTarget {
    pub level: u8,
    pub discount_percent: f64,
    /// The tier's lower bound in kWh.
    pub threshold: f64,
    pub energy_needed: f64,
}

/// Where a cumulative consumption figure sits in the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierClassification {
    pub cumulative_energy: f64,
    pub level: u8,
    pub discount_percent: f64,
    /// Upper bound of the current tier; `None` outside the schedule.
    pub next_threshold: Option<f64>,
    pub energy_to_next: Option<f64>,
    /// Distance to every higher tier. Only filled in for levels 1 and 2.
    pub higher_tiers: Vec<TierTarget>,
}

// ── DiscountTierEngine ────────────────────────────────────────────────────────

/// Maps cumulative energy consumption onto a discount schedule.
#[derive(Debug, Clone)]
pub struct DiscountTierEngine {
    tiers: Vec<DiscountTier>,
}

impl Default for DiscountTierEngine {
    fn default() -> Self {
        Self::new(DISCOUNT_TIERS.to_vec())
    }
}

impl DiscountTierEngine {
    /// `tiers` must be ascending and non-overlapping.
    pub fn new(tiers: Vec<DiscountTier>) -> Self {
        Self { tiers }
    }

    /// Classify `cumulative_energy` (kWh) into exactly one tier.
    pub fn classify(&self, cumulative_energy: f64) -> TierClassification {
        let Some(idx) = self.tiers.iter().position(|t| t.contains(cumulative_energy)) else {
            return TierClassification {
                cumulative_energy,
                level: 0,
                discount_percent: 0.0,
                next_threshold: None,
                energy_to_next: None,
                higher_tiers: Vec::new(),
            };
        };

        let tier = self.tiers[idx];
        let higher_tiers = if matches!(tier.level, 1 | 2) {
            self.tiers[idx + 1..]
                .iter()
                .map(|t| TierTarget {
                    level: t.level,
                    discount_percent: t.discount_percent,
                    threshold: t.lower,
                    energy_needed: t.lower - cumulative_energy,
                })
                .collect()
        } else {
            Vec::new()
        };

        TierClassification {
            cumulative_energy,
            level: tier.level,
            discount_percent: tier.discount_percent,
            next_threshold: Some(tier.upper),
            energy_to_next: Some(tier.upper - cumulative_energy),
            higher_tiers,
        }
    }
}

/// Classify against the standard schedule.
pub fn classify(cumulative_energy: f64) -> TierClassification {
    DiscountTierEngine::default().classify(cumulative_energy)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
