//! Trend measures over ordered samples (oldest first).

/// Mean of the newest `window` samples against the `window` samples before them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowComparison {
    pub previous_mean: f32,
    pub recent_mean: f32,
}

impl WindowComparison {
    /// Compares the last two back-to-back windows of `values`.
    ///
    /// Returns `None` unless at least `2 * window` samples are available.
    ///
    /// ```
    /// use qtris_stats::trend::WindowComparison;
    ///
    /// let values = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
    /// let cmp = WindowComparison::of_last(&values, 3).unwrap();
    /// assert_eq!(cmp.percent_change(), 100.0);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn of_last(values: &[f32], window: usize) -> Option<Self> {
        if window == 0 || values.len() < window * 2 {
            return None;
        }
        let recent = &values[values.len() - window..];
        let previous = &values[values.len() - window * 2..values.len() - window];
        let n = window as f32;
        Some(Self {
            previous_mean: previous.iter().sum::<f32>() / n,
            recent_mean: recent.iter().sum::<f32>() / n,
        })
    }

    /// Relative increase of the recent mean, in percent. Zero when the
    /// previous mean is zero.
    #[must_use]
    pub fn percent_change(&self) -> f32 {
        percent_change(self.previous_mean, self.recent_mean).unwrap_or(0.0)
    }

    /// Relative decrease of the recent mean, in percent.
    #[must_use]
    pub fn percent_reduction(&self) -> f32 {
        -self.percent_change()
    }
}

/// `(current - previous) / |previous|` in percent; `None` if `previous` is zero.
#[must_use]
pub fn percent_change(previous: f32, current: f32) -> Option<f32> {
    (previous.abs() > f32::EPSILON).then(|| (current - previous) / previous.abs() * 100.0)
}

/// Least-squares slope of the samples against their index.
///
/// Returns `None` for fewer than two samples.
#[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
#[must_use]
pub fn linear_slope<I>(values: I) -> Option<f32>
where
    I: IntoIterator<Item = f32>,
{
    let values = values.into_iter().collect::<Vec<_>>();
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (f64::from(y) - mean_y), den + dx * dx)
        });
    Some((num / den) as f32)
}
