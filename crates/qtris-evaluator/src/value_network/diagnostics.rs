use std::{collections::HashMap, fmt};

use qtris_stats::descriptive::DescriptiveStats;

use super::{SOFT_WEIGHT_LIMIT, ValueNetwork};

/// Values closer than this are treated as identical by the saturation report.
pub const SATURATION_TOLERANCE: f32 = 1e-3;
/// Groups with a population variance below this are flagged as collapsed.
pub const LOW_VARIANCE_THRESHOLD: f32 = 0.01;
/// Groups with a population variance above this are flagged as exploding.
pub const HIGH_VARIANCE_THRESHOLD: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ParameterGroup {
    #[display("w1")]
    InputWeights,
    #[display("b1")]
    HiddenBiases,
    #[display("w2")]
    OutputWeights,
    #[display("b2")]
    OutputBiases,
}

impl ParameterGroup {
    pub const ALL: [Self; 4] = [
        Self::InputWeights,
        Self::HiddenBiases,
        Self::OutputWeights,
        Self::OutputBiases,
    ];
}

/// Saturation and spread of one parameter group.
#[derive(Debug, Clone)]
pub struct GroupSaturation {
    pub group: ParameterGroup,
    pub count: usize,
    pub mean: f32,
    /// Population variance.
    pub variance: f32,
    /// Percentage of values within [`SATURATION_TOLERANCE`] of the most common value.
    pub modal_share_percent: f32,
    /// Percentage of values at or beyond the soft weight limit.
    pub boundary_share_percent: f32,
}

impl GroupSaturation {
    #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn measure(group: ParameterGroup, values: &[f32]) -> Self {
        let stats = DescriptiveStats::new(values.iter().copied());
        let (mean, variance) = stats.map_or((0.0, 0.0), |s| (s.mean, s.variance));

        let mut buckets = HashMap::<i64, usize>::new();
        for value in values {
            *buckets
                .entry((value / SATURATION_TOLERANCE).round() as i64)
                .or_default() += 1;
        }
        let modal = buckets.values().copied().max().unwrap_or(0);
        let at_boundary = values
            .iter()
            .filter(|v| v.abs() >= SOFT_WEIGHT_LIMIT - SATURATION_TOLERANCE)
            .count();

        let percent = |n: usize| {
            if values.is_empty() {
                0.0
            } else {
                n as f32 * 100.0 / values.len() as f32
            }
        };
        Self {
            group,
            count: values.len(),
            mean,
            variance,
            modal_share_percent: percent(modal),
            boundary_share_percent: percent(at_boundary),
        }
    }

    #[must_use]
    pub fn is_low_variance(&self) -> bool {
        self.count > 1 && self.variance < LOW_VARIANCE_THRESHOLD
    }

    #[must_use]
    pub fn is_high_variance(&self) -> bool {
        self.variance > HIGH_VARIANCE_THRESHOLD
    }
}

impl fmt::Display for GroupSaturation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<3} n={:<5} mean={:>8.4} var={:>8.4} modal={:>6.2}% boundary={:>6.2}%",
            self.group,
            self.count,
            self.mean,
            self.variance,
            self.modal_share_percent,
            self.boundary_share_percent,
        )?;
        if self.is_low_variance() {
            write!(f, " [low variance]")?;
        }
        if self.is_high_variance() {
            write!(f, " [high variance]")?;
        }
        Ok(())
    }
}

/// Per-group saturation figures. Observability only.
#[derive(Debug, Clone)]
pub struct SaturationReport {
    pub groups: [GroupSaturation; 4],
}

impl SaturationReport {
    #[must_use]
    pub fn group(&self, group: ParameterGroup) -> &GroupSaturation {
        &self.groups[group as usize]
    }

    /// Whether any group looks collapsed or exploding.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.is_low_variance() || g.is_high_variance())
    }
}

impl fmt::Display for SaturationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{group}")?;
        }
        Ok(())
    }
}

/// Range and spread over every parameter of a network.
#[derive(Debug, Clone, Copy)]
pub struct WeightStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std_dev: f32,
}

impl fmt::Display for WeightStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "weights: min={:.4} max={:.4} mean={:.4} std={:.4}",
            self.min, self.max, self.mean, self.std_dev
        )
    }
}

impl ValueNetwork {
    fn group_values(&self, group: ParameterGroup) -> Vec<f32> {
        match group {
            ParameterGroup::InputWeights => self.w1.iter().flatten().copied().collect(),
            ParameterGroup::HiddenBiases => self.b1.to_vec(),
            ParameterGroup::OutputWeights => self.w2.iter().flatten().copied().collect(),
            ParameterGroup::OutputBiases => self.b2.to_vec(),
        }
    }

    #[must_use]
    pub fn saturation_report(&self) -> SaturationReport {
        SaturationReport {
            groups: ParameterGroup::ALL
                .map(|group| GroupSaturation::measure(group, &self.group_values(group))),
        }
    }

    #[must_use]
    pub fn weight_stats(&self) -> WeightStats {
        // The network always has parameters, so the fallback is never taken.
        DescriptiveStats::new(self.parameters()).map_or(
            WeightStats {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                std_dev: 0.0,
            },
            |stats| WeightStats {
                min: stats.min,
                max: stats.max,
                mean: stats.mean,
                std_dev: stats.std_dev,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;
    use crate::value_network::{HIDDEN_SIZE, WEIGHT_LIMIT};

    fn network(seed: u64) -> ValueNetwork {
        ValueNetwork::new(&mut Pcg32::seed_from_u64(seed))
    }

    #[test]
    fn fresh_network_is_not_saturated() {
        let report = network(2).saturation_report();
        let w1 = report.group(ParameterGroup::InputWeights);
        assert_eq!(w1.count, 29 * HIDDEN_SIZE);
        assert!(w1.modal_share_percent < 5.0);
        assert_eq!(w1.boundary_share_percent, 0.0);
        assert!(!w1.is_low_variance());
        assert!(!w1.is_high_variance());
    }

    #[test]
    fn zero_hidden_biases_are_fully_modal() {
        let report = network(2).saturation_report();
        let b1 = report.group(ParameterGroup::HiddenBiases);
        assert_eq!(b1.modal_share_percent, 100.0);
        assert!(b1.is_low_variance());
        assert!(report.has_warnings());
    }

    #[test]
    fn pinned_weights_show_up_at_the_boundary() {
        let mut net = network(2);
        for param in net.parameters_mut() {
            *param = WEIGHT_LIMIT;
        }
        net.clamp_parameters();
        let report = net.saturation_report();
        for group in &report.groups {
            assert_eq!(group.boundary_share_percent, 100.0, "{group}");
            assert_eq!(group.modal_share_percent, 100.0, "{group}");
        }
    }

    #[test]
    fn report_lists_every_group() {
        let text = network(2).saturation_report().to_string();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("w1"));
        assert!(text.contains("[low variance]"));
    }

    #[test]
    fn weight_stats_cover_all_parameters() {
        let net = network(8);
        let stats = net.weight_stats();
        let max = net.parameters().fold(f32::MIN, f32::max);
        assert_eq!(stats.max, max);
        assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        assert!(stats.to_string().starts_with("weights: "));
    }
}
