//! Derived financial figures for downstream analysis of merged records.

use serde::Serialize;

use crate::model::MergedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Financials {
    pub profit: Option<f64>,
    /// Percent return on budget; `None` when the budget is absent or zero.
    pub roi: Option<f64>,
}

impl Financials {
    pub fn new(budget: Option<f64>, revenue: Option<f64>) -> Self {
        let profit = match (budget, revenue) {
            (Some(budget), Some(revenue)) => Some(revenue - budget),
            _ => None,
        };
        let roi = match (profit, budget) {
            (Some(profit), Some(budget)) if budget != 0.0 => {
                Some(profit / budget * 100.0).filter(|value| value.is_finite())
            }
            _ => None,
        };
        Self { profit, roi }
    }

    pub fn from_record(record: &MergedRecord) -> Self {
        Self::new(record.budget, record.revenue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawDetail;
    use serde_json::json;

    fn record(budget: Option<f64>, revenue: Option<f64>) -> MergedRecord {
        MergedRecord {
            id: "278".to_string(),
            external_id: "tt0111161".to_string(),
            title: None,
            year: None,
            budget,
            revenue,
            runtime: None,
            genres: Vec::new(),
            imdb_rating: None,
            rotten_rating: None,
            metacritic_rating: None,
            raw_a: RawDetail::new(json!({})),
            raw_b: RawDetail::new(json!({})),
        }
    }

    #[test]
    fn profit_and_roi() {
        let figures = Financials::from_record(&record(Some(25_000_000.0), Some(50_000_000.0)));
        assert_eq!(figures.profit, Some(25_000_000.0));
        assert_eq!(figures.roi, Some(100.0));

        let loss = Financials::new(Some(200.0), Some(50.0));
        assert_eq!(loss.profit, Some(-150.0));
        assert_eq!(loss.roi, Some(-75.0));
    }

    #[test]
    fn zero_budget_has_no_roi() {
        let figures = Financials::from_record(&record(Some(0.0), Some(28_341_469.0)));
        assert_eq!(figures.profit, Some(28_341_469.0));
        assert_eq!(figures.roi, None);

        let figures = Financials::new(Some(0.0), Some(0.0));
        assert_eq!(figures.roi, None);
    }

    #[test]
    fn absent_inputs() {
        assert_eq!(
            Financials::new(None, Some(10.0)),
            Financials {
                profit: None,
                roi: None
            }
        );
        assert_eq!(Financials::new(Some(10.0), None).roi, None);
    }
}
