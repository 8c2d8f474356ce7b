use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Failures of the combinatorial metrics core.
///
/// Numeric indeterminacy inside a single subset (zero volatility, empty tail,
/// no downside returns) is not represented here: those surface as `NaN`
/// metric values on an otherwise valid record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid range: {reason}")]
    InvalidRange { reason: String },

    #[error("Invalid set size {set_size}: must be between 1 and {asset_count}")]
    InvalidSize { set_size: usize, asset_count: usize },

    #[error("Insufficient data for subset [{}]: {reason}", subset.join(", "))]
    InsufficientData { subset: Vec<String>, reason: String },

    #[error(
        "Combination count C({asset_count}, {set_size}) = {} exceeds the ceiling of {ceiling}",
        count.map(|c| c.to_string()).unwrap_or_else(|| "overflow".to_string())
    )]
    CombinationLimitExceeded {
        asset_count: usize,
        set_size: usize,
        /// `None` when the count does not fit in a `u128`.
        count: Option<u128>,
        ceiling: u64,
    },

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Invalid price table: {reason}")]
    InvalidTable { reason: String },
}

impl AnalysisError {
    pub(crate) fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_table(reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
