//! Small statistics toolkit shared by the trainer, the tuner and the reports.
//!
//! - [`descriptive`]: summary statistics (mean, variance, coefficient of variation, ...)
//! - [`rolling`]: bounded first-in first-out histories
//! - [`trend`]: window-over-window changes and least-squares slopes
//!
//! # Examples
//!
//! ```
//! use qtris_stats::{descriptive::DescriptiveStats, rolling::RollingWindow, trend};
//!
//! let mut scores = RollingWindow::new(4);
//! for score in [10.0, 20.0, 30.0, 40.0, 50.0] {
//!     scores.push(score);
//! }
//! assert_eq!(scores.len(), 4);
//!
//! let stats = DescriptiveStats::new(scores.iter().copied()).unwrap();
//! assert_eq!(stats.mean, 35.0);
//!
//! let slope = trend::linear_slope(scores.iter().copied()).unwrap();
//! assert!((slope - 10.0).abs() < 1e-4);
//! ```

pub mod descriptive;
pub mod rolling;
pub mod trend;
