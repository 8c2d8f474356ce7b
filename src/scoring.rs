use crate::metrics::MetricsRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use thiserror::Error;

/// A sortable metric column of the result table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricField {
    ExpectedReturn,
    Volatility,
    SharpeRatio,
    Var,
    Cvar,
    MaxDrawdown,
    SortinoRatio,
    TotalReturn,
    Cagr,
    PortfolioBeta,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown metric field `{name}`; expected one of: {}", MetricField::ALL.map(|f| f.as_str()).join(", "))]
pub struct UnknownMetricField {
    pub name: String,
}

impl MetricField {
    pub const ALL: [MetricField; 10] = [
        Self::ExpectedReturn,
        Self::Volatility,
        Self::SharpeRatio,
        Self::Var,
        Self::Cvar,
        Self::MaxDrawdown,
        Self::SortinoRatio,
        Self::TotalReturn,
        Self::Cagr,
        Self::PortfolioBeta,
    ];

    /// Column name as it appears in serialized records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExpectedReturn => "Expected_Return",
            Self::Volatility => "Volatility",
            Self::SharpeRatio => "Sharpe_Ratio",
            Self::Var => "VaR",
            Self::Cvar => "CVaR",
            Self::MaxDrawdown => "Max_Drawdown",
            Self::SortinoRatio => "Sortino_Ratio",
            Self::TotalReturn => "Total_Return",
            Self::Cagr => "CAGR",
            Self::PortfolioBeta => "Portfolio_Beta",
        }
    }

    /// Metric value, `None` when absent (beta without benchmark) or `NaN`.
    pub fn value(self, record: &MetricsRecord) -> Option<f64> {
        let v = match self {
            Self::ExpectedReturn => record.expected_return,
            Self::Volatility => record.volatility,
            Self::SharpeRatio => record.sharpe_ratio,
            Self::Var => record.var,
            Self::Cvar => record.cvar,
            Self::MaxDrawdown => record.max_drawdown,
            Self::SortinoRatio => record.sortino_ratio,
            Self::TotalReturn => record.total_return,
            Self::Cagr => record.cagr,
            Self::PortfolioBeta => record.portfolio_beta?,
        };
        Some(v).filter(|x| !x.is_nan())
    }
}

impl FromStr for MetricField {
    type Err = UnknownMetricField;

    /// Accepts the column name in any letter case (`Sharpe_Ratio`,
    /// `sharpe_ratio`, `SHARPE_RATIO`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownMetricField {
                name: trimmed.to_string(),
            })
    }
}

impl std::fmt::Display for MetricField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Investment goal, each mapped to one scoring function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentGoal {
    /// Highest total return over the window.
    ShortTermGains,
    /// Highest compound annual growth.
    LongTermGrowth,
    /// Highest Sharpe ratio.
    RiskAdjusted,
    /// Highest Sortino ratio.
    DownsideAware,
    /// Shallowest maximum drawdown.
    CapitalPreservation,
}

impl InvestmentGoal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortTermGains => "short_term_gains",
            Self::LongTermGrowth => "long_term_growth",
            Self::RiskAdjusted => "risk_adjusted",
            Self::DownsideAware => "downside_aware",
            Self::CapitalPreservation => "capital_preservation",
        }
    }

    /// Higher is better for every goal.
    pub fn score(self, record: &MetricsRecord) -> f64 {
        match self {
            Self::ShortTermGains => record.total_return,
            Self::LongTermGrowth => record.cagr,
            Self::RiskAdjusted => record.sharpe_ratio,
            Self::DownsideAware => record.sortino_ratio,
            // Drawdowns are <= 0, so the largest value is the shallowest.
            Self::CapitalPreservation => record.max_drawdown,
        }
    }
}

impl FromStr for InvestmentGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "short_term_gains" => Ok(Self::ShortTermGains),
            "long_term_growth" => Ok(Self::LongTermGrowth),
            "risk_adjusted" => Ok(Self::RiskAdjusted),
            "downside_aware" => Ok(Self::DownsideAware),
            "capital_preservation" => Ok(Self::CapitalPreservation),
            other => Err(format!("unknown investment goal `{}`", other)),
        }
    }
}

/// What a result table is ordered by.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RankKey {
    Field(MetricField),
    Goal(InvestmentGoal),
}

impl RankKey {
    pub fn key(self, record: &MetricsRecord) -> Option<f64> {
        match self {
            Self::Field(field) => field.value(record),
            Self::Goal(goal) => Some(goal.score(record)).filter(|x| !x.is_nan()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Field(field) => field.as_str(),
            Self::Goal(goal) => goal.as_str(),
        }
    }
}

/// Sort key plus direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ranking {
    pub key: RankKey,
    pub ascending: bool,
}

impl Ranking {
    pub fn by_field(field: MetricField, ascending: bool) -> Self {
        Self {
            key: RankKey::Field(field),
            ascending,
        }
    }

    /// Goals always rank best-first.
    pub fn by_goal(goal: InvestmentGoal) -> Self {
        Self {
            key: RankKey::Goal(goal),
            ascending: false,
        }
    }

    /// `Less` means `a` ranks ahead of `b`. Missing values go last in both
    /// directions.
    pub fn compare_keys(&self, a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => {
                let ord = x.total_cmp(&y);
                if self.ascending { ord } else { ord.reverse() }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    pub fn compare(&self, a: &MetricsRecord, b: &MetricsRecord) -> Ordering {
        self.compare_keys(self.key.key(a), self.key.key(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total_return: f64, sharpe: f64, drawdown: f64) -> MetricsRecord {
        MetricsRecord {
            stocks: vec!["AAA".into()],
            expected_return: 0.0,
            volatility: 0.0,
            sharpe_ratio: sharpe,
            var: 0.0,
            cvar: 0.0,
            max_drawdown: drawdown,
            sortino_ratio: f64::NAN,
            total_return,
            cagr: total_return,
            portfolio_beta: None,
        }
    }

    #[test]
    fn test_parse_field_names() {
        assert_eq!("Sharpe_Ratio".parse::<MetricField>().unwrap(), MetricField::SharpeRatio);
        assert_eq!("total_return".parse::<MetricField>().unwrap(), MetricField::TotalReturn);
        assert_eq!("cvar".parse::<MetricField>().unwrap(), MetricField::Cvar);
        let err = "Alpha".parse::<MetricField>().unwrap_err();
        assert_eq!(err.name, "Alpha");
        assert!(err.to_string().contains("Sharpe_Ratio"));
        for field in MetricField::ALL {
            assert_eq!(field.as_str().parse::<MetricField>().unwrap(), field);
        }
    }

    #[test]
    fn test_nan_and_absent_values_sort_last_both_ways() {
        let ranked = record(0.1, 1.0, -0.1);
        let undefined = record(0.2, f64::NAN, -0.1);
        for ascending in [true, false] {
            let r = Ranking::by_field(MetricField::SharpeRatio, ascending);
            assert_eq!(r.compare(&ranked, &undefined), Ordering::Less);
            assert_eq!(r.compare(&undefined, &ranked), Ordering::Greater);
            let beta = Ranking::by_field(MetricField::PortfolioBeta, ascending);
            assert_eq!(beta.compare(&ranked, &undefined), Ordering::Equal);
        }
    }

    #[test]
    fn test_direction() {
        let low = record(0.1, 0.5, -0.3);
        let high = record(0.4, 1.5, -0.05);
        let asc = Ranking::by_field(MetricField::TotalReturn, true);
        assert_eq!(asc.compare(&low, &high), Ordering::Less);
        let desc = Ranking::by_field(MetricField::TotalReturn, false);
        assert_eq!(desc.compare(&low, &high), Ordering::Greater);
    }

    #[test]
    fn test_goals_rank_best_first() {
        let shallow = record(0.05, 0.2, -0.02);
        let deep = record(0.50, 1.2, -0.40);
        let preserve = Ranking::by_goal(InvestmentGoal::CapitalPreservation);
        assert_eq!(preserve.compare(&shallow, &deep), Ordering::Less);
        let gains = Ranking::by_goal(InvestmentGoal::ShortTermGains);
        assert_eq!(gains.compare(&deep, &shallow), Ordering::Less);
        assert_eq!("long-term growth".parse::<InvestmentGoal>().unwrap(), InvestmentGoal::LongTermGrowth);
    }
}
