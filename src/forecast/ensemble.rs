//! Confidence-weighted ensembling of adapter forecasts.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::forecast::{AdapterKind, Prediction};

/// One adapter's forecast entering the ensemble.
#[derive(Debug, Clone)]
pub struct EnsembleMember {
    pub kind: AdapterKind,
    pub predictions: Vec<Prediction>,
}

/// Normalized weight of a surviving member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberWeight {
    pub model: AdapterKind,
    pub weight: f64,
}

/// A member excluded from the ensemble and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedMember {
    pub model: AdapterKind,
    pub reason: String,
}

/// What the ensemble was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub weights: Vec<MemberWeight>,
    pub dropped: Vec<DroppedMember>,
}

impl EnsembleReport {
    pub fn members(&self) -> Vec<AdapterKind> {
        self.weights.iter().map(|w| w.model).collect()
    }
}

/// Merges aligned forecasts into one, weighting each member by its mean
/// confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleCombiner;

impl EnsembleCombiner {
    pub fn new() -> Self {
        Self
    }

    /// Combine `members`; `dropped` carries members that already failed.
    ///
    /// Members whose steps do not line up with the first usable member are
    /// dropped as well. Fails only when no member survives.
    pub fn combine(
        &self,
        members: Vec<EnsembleMember>,
        mut dropped: Vec<DroppedMember>,
    ) -> Result<(Vec<Prediction>, EnsembleReport)> {
        let mut usable: Vec<EnsembleMember> = Vec::with_capacity(members.len());
        for member in members {
            let aligned = match usable.first() {
                None => !member.predictions.is_empty(),
                Some(reference) => same_steps(&reference.predictions, &member.predictions),
            };
            if aligned {
                usable.push(member);
            } else {
                warn!("Dropping {} from ensemble: forecast steps are misaligned", member.kind);
                dropped.push(DroppedMember {
                    model: member.kind,
                    reason: "forecast steps misaligned with other members".to_string(),
                });
            }
        }

        if usable.is_empty() {
            return Err(AnalysisError::ModelUnavailable(
                "ensemble has no surviving members".to_string(),
            ));
        }

        let raw: Vec<f64> = usable
            .iter()
            .map(|m| {
                let mean = m.predictions.iter().map(|p| p.confidence).sum::<f64>()
                    / m.predictions.len() as f64;
                if mean.is_finite() {
                    mean.max(0.0)
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = raw.iter().sum();
        let weights: Vec<f64> = if total > 0.0 {
            raw.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / usable.len() as f64; usable.len()]
        };

        let steps = usable[0].predictions.len();
        let combined: Vec<Prediction> = (0..steps)
            .map(|i| {
                let weighted = |f: fn(&Prediction) -> f64| -> f64 {
                    usable
                        .iter()
                        .zip(&weights)
                        .map(|(m, w)| f(&m.predictions[i]) * w)
                        .sum()
                };
                Prediction {
                    timestamp: usable[0].predictions[i].timestamp,
                    predicted_price: weighted(|p| p.predicted_price),
                    confidence: weighted(|p| p.confidence),
                    lower_bound: weighted(|p| p.lower_bound),
                    upper_bound: weighted(|p| p.upper_bound),
                }
            })
            .collect();

        let report = EnsembleReport {
            weights: usable
                .iter()
                .zip(&weights)
                .map(|(m, &weight)| MemberWeight {
                    model: m.kind,
                    weight,
                })
                .collect(),
            dropped,
        };
        debug!("Ensemble weights: {:?}", report.weights);

        Ok((combined, report))
    }
}

fn same_steps(a: &[Prediction], b: &[Prediction]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.timestamp == y.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(kind: AdapterKind, price: f64, confidence: f64, steps: usize) -> EnsembleMember {
        EnsembleMember {
            kind,
            predictions: (1..=steps)
                .map(|s| Prediction {
                    timestamp: s as i64 * 1_000,
                    predicted_price: price,
                    confidence,
                    lower_bound: price - 1.0,
                    upper_bound: price + 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_weights_follow_confidence() {
        let members = vec![
            member(AdapterKind::Arima, 100.0, 60.0, 3),
            member(AdapterKind::Holt, 110.0, 20.0, 3),
            member(AdapterKind::LinearTrend, 90.0, 20.0, 3),
        ];
        let (combined, report) = EnsembleCombiner::new().combine(members, vec![]).unwrap();

        let sum: f64 = report.weights.iter().map(|w| w.weight).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!((report.weights[0].weight - 0.6).abs() < 1e-12);
        // 0.6 * 100 + 0.2 * 110 + 0.2 * 90
        assert!((combined[0].predicted_price - 100.0).abs() < 1e-9);
        assert!((combined[0].confidence - 44.0).abs() < 1e-9);
        assert_eq!(combined.len(), 3);
    }

    #[test]
    fn test_failed_member_is_reported_and_weights_renormalize() {
        let members = vec![
            member(AdapterKind::Arima, 100.0, 50.0, 3),
            member(AdapterKind::LinearTrend, 104.0, 50.0, 3),
        ];
        let failed = vec![DroppedMember {
            model: AdapterKind::Holt,
            reason: "fit failed".into(),
        }];
        let (combined, report) = EnsembleCombiner::new().combine(members, failed).unwrap();

        assert_eq!(report.members(), vec![AdapterKind::Arima, AdapterKind::LinearTrend]);
        assert_eq!(report.dropped.len(), 1);
        assert!((report.weights[0].weight - 0.5).abs() < 1e-12);
        assert!((combined[1].predicted_price - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_misaligned_member_dropped() {
        let members = vec![
            member(AdapterKind::Arima, 100.0, 50.0, 3),
            member(AdapterKind::Holt, 100.0, 50.0, 2),
        ];
        let (_, report) = EnsembleCombiner::new().combine(members, vec![]).unwrap();
        assert_eq!(report.members(), vec![AdapterKind::Arima]);
        assert_eq!(report.dropped[0].model, AdapterKind::Holt);
        assert_eq!(report.weights[0].weight, 1.0);
    }

    #[test]
    fn test_all_failed() {
        let err = EnsembleCombiner::new().combine(vec![], vec![]).unwrap_err();
        assert!(matches!(err, AnalysisError::ModelUnavailable(_)));
    }

    #[test]
    fn test_zero_confidence_uses_equal_weights() {
        let members = vec![
            member(AdapterKind::Arima, 100.0, 0.0, 2),
            member(AdapterKind::Holt, 200.0, 0.0, 2),
        ];
        let (combined, _) = EnsembleCombiner::new().combine(members, vec![]).unwrap();
        assert!((combined[0].predicted_price - 150.0).abs() < 1e-9);
    }
}
