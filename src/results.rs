use crate::metrics::MetricsRecord;
use crate::scoring::{MetricField, Ranking};

/// One record per evaluated subset. Rows come out of the engine in
/// enumeration order (or rank order for top-k runs).
#[derive(Clone, Debug, PartialEq)]
pub struct ResultTable {
    set_size: usize,
    has_benchmark: bool,
    records: Vec<MetricsRecord>,
}

impl ResultTable {
    pub fn new(set_size: usize, has_benchmark: bool, records: Vec<MetricsRecord>) -> Self {
        Self {
            set_size,
            has_benchmark,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn set_size(&self) -> usize {
        self.set_size
    }

    pub fn has_benchmark(&self) -> bool {
        self.has_benchmark
    }

    pub fn records(&self) -> &[MetricsRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MetricsRecord> {
        self.records
    }

    /// Flat column names of every record: `stock_1..stock_k`, then metrics.
    pub fn schema(&self) -> Vec<String> {
        (1..=self.set_size)
            .map(|i| format!("stock_{}", i))
            .chain(MetricField::ALL.iter().map(|f| f.as_str().to_string()))
            .collect()
    }

    /// Stable sort by `ranking`, optionally truncated.
    pub fn sorted(&self, ranking: Ranking, limit: Option<usize>) -> Self {
        let mut records = self.records.clone();
        records.sort_by(|a, b| ranking.compare(a, b));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Self {
            records,
            ..*self
        }
    }

    /// Boxed terminal rendering: the stock columns plus either the sort
    /// column only or, with `wide`, every metric.
    pub fn print(&self, sort_column: Option<MetricField>, wide: bool) {
        let metrics: Vec<MetricField> = if wide {
            MetricField::ALL
                .into_iter()
                .filter(|f| self.has_benchmark || *f != MetricField::PortfolioBeta)
                .collect()
        } else {
            vec![sort_column.unwrap_or(MetricField::TotalReturn)]
        };

        let stock_width = self
            .records
            .iter()
            .flat_map(|r| r.stocks.iter().map(|s| s.len()))
            .chain(std::iter::once(7))
            .max()
            .unwrap_or(7);
        let metric_width = metrics.iter().map(|m| m.as_str().len()).max().unwrap_or(8).max(9);

        let schema = self.schema();
        let mut header = String::from("  #  ");
        for name in &schema[..self.set_size] {
            header.push_str(&format!(" {:<w$}", name, w = stock_width));
        }
        for m in &metrics {
            header.push_str(&format!(" {:>w$}", m.as_str(), w = metric_width));
        }
        let rule = "═".repeat(header.chars().count() + 1);

        println!("\n╔{}╗", rule);
        println!("║{} ║", header);
        println!("╠{}╣", rule);
        for (rank, record) in self.records.iter().enumerate() {
            let mut line = format!(" {:>3} ", rank + 1);
            for stock in &record.stocks {
                line.push_str(&format!(" {:<w$}", stock, w = stock_width));
            }
            for m in &metrics {
                let cell = match m.value(record) {
                    Some(v) => format!("{:.4}", v),
                    None => "n/a".to_string(),
                };
                line.push_str(&format!(" {:>w$}", cell, w = metric_width));
            }
            println!("║{} ║", line);
        }
        println!("╚{}╝", rule);
        println!("  {} portfolio(s) of {} asset(s)", self.len(), self.set_size);
    }
}
