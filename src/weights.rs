use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Risk tolerance tag that scales the equal-weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RiskProfile {
    #[default]
    Neutral,
    Aggressive,
    Conservative,
}

impl RiskProfile {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Neutral => 1.0,
            Self::Aggressive => 1.2,
            Self::Conservative => 0.8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Aggressive => "aggressive",
            Self::Conservative => "conservative",
        }
    }
}

impl FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" | "moderate" | "" => Ok(Self::Neutral),
            "aggressive" => Ok(Self::Aggressive),
            "conservative" => Ok(Self::Conservative),
            other => Err(format!(
                "unknown risk profile `{}` (expected neutral | aggressive | conservative)",
                other
            )),
        }
    }
}

impl TryFrom<String> for RiskProfile {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What happens to the weight sum after the risk multiplier is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum WeightScaling {
    /// Rescale so the weights sum to 1 (fully invested).
    #[default]
    Normalized,
    /// Keep the scaled sum: 1.2x gross exposure for aggressive, 0.8x for
    /// conservative.
    Leveraged,
}

impl FromStr for WeightScaling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normalized" | "normalised" => Ok(Self::Normalized),
            "leveraged" => Ok(Self::Leveraged),
            other => Err(format!(
                "unknown weight scaling `{}` (expected normalized | leveraged)",
                other
            )),
        }
    }
}

impl TryFrom<String> for WeightScaling {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Equal weights `1/set_size`, scaled by the profile multiplier and then
/// handled according to `scaling`.
pub fn weight_vector(set_size: usize, profile: RiskProfile, scaling: WeightScaling) -> Vec<f64> {
    if set_size == 0 {
        return Vec::new();
    }
    let base = 1.0 / set_size as f64;
    let mut weights = vec![base * profile.multiplier(); set_size];
    if scaling == WeightScaling::Normalized {
        let sum: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= sum);
    }
    weights
}
