//! Two-layer perceptron estimating the quality of a resulting game state.
//!
//! ```text
//! state (29) ──w1,b1──▶ leaky ReLU hidden (64) ──w2,b2──▶ clipped scalar
//! ```
//!
//! # Numeric guards
//!
//! The network is trained online from noisy bootstrapped targets, so every
//! stage is bounded:
//!
//! - the output is clipped to ±[`OUTPUT_LIMIT`]
//! - the error signal is clipped to ±[`ERROR_LIMIT`]
//! - each individual parameter step is clipped to ±[`STEP_LIMIT`]
//! - parameters are clamped after every update by [`clamp_parameter`]: values
//!   that reach ±[`WEIGHT_LIMIT`] are pulled back to ±[`SOFT_WEIGHT_LIMIT`] so a
//!   parameter cannot sit on the boundary indefinitely
//! - non-finite parameters are reinitialized to a tiny random value
//!   (±[`REINIT_SCALE`]) and training carries on
//!
//! # Initialization
//!
//! Both weight matrices use He initialization (Gaussian with standard deviation
//! `sqrt(2 / fan_in)`). Hidden biases start at zero; the output bias starts near
//! [`OUTPUT_BIAS_INIT`] so that fresh networks lean slightly positive.

use rand::{Rng, SeedableRng as _};
use rand_distr::StandardNormal;
use rand_pcg::Pcg32;

use crate::state_vector::{INPUT_SIZE, StateVector};

pub use self::{diagnostics::*, persist::*};

mod diagnostics;
mod persist;

pub const HIDDEN_SIZE: usize = 64;
pub const OUTPUT_SIZE: usize = 1;

/// Slope of the hidden activation for negative inputs.
pub const LEAK: f32 = 0.01;
/// Symmetric bound of the network output (and of Q-targets built from it).
pub const OUTPUT_LIMIT: f32 = 100.0;
/// Symmetric bound of the `target - output` error signal.
pub const ERROR_LIMIT: f32 = 50.0;
/// Symmetric bound of a single `rate × gradient` step.
pub const STEP_LIMIT: f32 = 0.5;
/// Hard bound of every weight and bias.
pub const WEIGHT_LIMIT: f32 = 5.0;
/// Where parameters that hit [`WEIGHT_LIMIT`] are pulled back to.
pub const SOFT_WEIGHT_LIMIT: f32 = 4.5;
/// Magnitude bound of values used to replace diverged parameters.
pub const REINIT_SCALE: f32 = 0.05;

pub const OUTPUT_BIAS_INIT: f32 = 0.1;
const OUTPUT_BIAS_NOISE: f32 = 0.01;
const OUTPUT_BIAS_BAND: (f32, f32) = (0.01, 0.5);

/// Clamps one parameter into the valid range.
///
/// Values beyond the hard limit, or exactly on it, end up at the soft limit
/// with the same sign. The result is a fixed point: clamping twice equals
/// clamping once.
///
/// ```
/// use qtris_evaluator::value_network::{SOFT_WEIGHT_LIMIT, clamp_parameter};
///
/// assert_eq!(clamp_parameter(1.25), 1.25);
/// assert_eq!(clamp_parameter(-50.0), -SOFT_WEIGHT_LIMIT);
/// assert_eq!(clamp_parameter(clamp_parameter(7.0)), clamp_parameter(7.0));
/// ```
#[must_use]
pub fn clamp_parameter(value: f32) -> f32 {
    let clamped = value.clamp(-WEIGHT_LIMIT, WEIGHT_LIMIT);
    if clamped.abs() >= WEIGHT_LIMIT {
        SOFT_WEIGHT_LIMIT.copysign(clamped)
    } else {
        clamped
    }
}

fn leaky_relu(x: f32) -> f32 {
    if x > 0.0 { x } else { LEAK * x }
}

fn leaky_relu_derivative(x: f32) -> f32 {
    if x > 0.0 { 1.0 } else { LEAK }
}

type Parameters = (
    [[f32; HIDDEN_SIZE]; INPUT_SIZE],
    [f32; HIDDEN_SIZE],
    [[f32; OUTPUT_SIZE]; HIDDEN_SIZE],
    [f32; OUTPUT_SIZE],
);

/// Intermediate values of one forward pass, kept for backpropagation.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub hidden_input: [f32; HIDDEN_SIZE],
    pub hidden: [f32; HIDDEN_SIZE],
    pub output: f32,
}

#[derive(Debug, Clone)]
pub struct ValueNetwork {
    w1: [[f32; HIDDEN_SIZE]; INPUT_SIZE],
    b1: [f32; HIDDEN_SIZE],
    w2: [[f32; OUTPUT_SIZE]; HIDDEN_SIZE],
    b2: [f32; OUTPUT_SIZE],
    /// Source of replacement values for diverged parameters.
    heal_rng: Pcg32,
}

impl ValueNetwork {
    /// Creates a freshly initialized network.
    pub fn new<R>(rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut heal_rng = Pcg32::seed_from_u64(rng.random());
        let (w1, b1, w2, b2) = Self::initial_parameters(&mut heal_rng);
        Self {
            w1,
            b1,
            w2,
            b2,
            heal_rng,
        }
    }

    #[expect(clippy::cast_precision_loss)]
    fn initial_parameters(rng: &mut Pcg32) -> Parameters {
        let mut gaussian =
            |std_dev: f32| clamp_parameter(rng.sample::<f32, _>(StandardNormal) * std_dev);

        let w1_std = (2.0 / INPUT_SIZE as f32).sqrt();
        let w2_std = (2.0 / HIDDEN_SIZE as f32).sqrt();
        let w1 = std::array::from_fn(|_| std::array::from_fn(|_| gaussian(w1_std)));
        let w2 = std::array::from_fn(|_| std::array::from_fn(|_| gaussian(w2_std)));
        let b2 = std::array::from_fn(|_| {
            let noise = gaussian(OUTPUT_BIAS_NOISE);
            (OUTPUT_BIAS_INIT + noise).clamp(OUTPUT_BIAS_BAND.0, OUTPUT_BIAS_BAND.1)
        });
        (w1, [0.0; HIDDEN_SIZE], w2, b2)
    }

    /// Replaces every parameter with a fresh random initialization.
    pub fn reinitialize(&mut self) {
        let (w1, b1, w2, b2) = Self::initial_parameters(&mut self.heal_rng);
        self.w1 = w1;
        self.b1 = b1;
        self.w2 = w2;
        self.b2 = b2;
    }

    /// Estimates the quality of a state. Deterministic for fixed weights and
    /// always within ±[`OUTPUT_LIMIT`].
    #[must_use]
    pub fn forward(&self, state: &StateVector) -> f32 {
        self.forward_pass(state).output
    }

    #[must_use]
    pub fn forward_pass(&self, state: &StateVector) -> ForwardPass {
        let input = state.as_array();

        let mut hidden_input = self.b1;
        for (x, row) in input.iter().zip(&self.w1) {
            for (acc, w) in hidden_input.iter_mut().zip(row) {
                *acc += x * w;
            }
        }
        let hidden = hidden_input.map(leaky_relu);

        let raw = self.b2[0]
            + hidden
                .iter()
                .zip(&self.w2)
                .map(|(h, w)| h * w[0])
                .sum::<f32>();
        let output = if raw.is_finite() {
            raw.clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT)
        } else {
            0.0
        };

        ForwardPass {
            hidden_input,
            hidden,
            output,
        }
    }

    /// Moves the output for `state` one gradient step towards `target`.
    ///
    /// Returns the clipped error `target - output` measured before the step,
    /// or `None` (leaving the weights untouched) when the target, the rate or
    /// the error is not finite.
    pub fn update(&mut self, state: &StateVector, target: f32, rate: f32) -> Option<f32> {
        if !target.is_finite() || !rate.is_finite() {
            return None;
        }
        let pass = self.forward_pass(state);
        let error = (target - pass.output).clamp(-ERROR_LIMIT, ERROR_LIMIT);
        if !error.is_finite() {
            return None;
        }
        let step = |gradient: f32| (rate * gradient).clamp(-STEP_LIMIT, STEP_LIMIT);

        // Hidden deltas use the output weights from before this step.
        let deltas: [f32; HIDDEN_SIZE] = std::array::from_fn(|j| {
            error * self.w2[j][0] * leaky_relu_derivative(pass.hidden_input[j])
        });

        for (w, h) in self.w2.iter_mut().zip(&pass.hidden) {
            w[0] += step(error * h);
        }
        self.b2[0] += step(error);

        for (row, x) in self.w1.iter_mut().zip(state.as_array()) {
            for (w, delta) in row.iter_mut().zip(&deltas) {
                *w += step(delta * x);
            }
        }
        for (b, delta) in self.b1.iter_mut().zip(&deltas) {
            *b += step(*delta);
        }

        let healed = self.clamp_parameters();
        if healed > 0 {
            tracing::warn!(healed, "reinitialized diverged network parameters");
        }
        Some(error)
    }

    /// Clamps every parameter with [`clamp_parameter`] and replaces
    /// non-finite ones with small random values. Returns how many were replaced.
    pub fn clamp_parameters(&mut self) -> usize {
        let Self {
            w1,
            b1,
            w2,
            b2,
            heal_rng,
        } = self;
        let mut healed = 0;
        let params = w1
            .iter_mut()
            .flatten()
            .chain(b1.iter_mut())
            .chain(w2.iter_mut().flatten())
            .chain(b2.iter_mut());
        for param in params {
            let clamped = clamp_parameter(*param);
            *param = if clamped.is_finite() {
                clamped
            } else {
                healed += 1;
                heal_rng.random_range(-REINIT_SCALE..=REINIT_SCALE)
            };
        }
        healed
    }

    /// Input→hidden weights, one row per input.
    #[must_use]
    pub fn input_weights(&self) -> &[[f32; HIDDEN_SIZE]; INPUT_SIZE] {
        &self.w1
    }

    #[must_use]
    pub fn hidden_biases(&self) -> &[f32; HIDDEN_SIZE] {
        &self.b1
    }

    /// Hidden→output weights, one row per hidden unit.
    #[must_use]
    pub fn output_weights(&self) -> &[[f32; OUTPUT_SIZE]; HIDDEN_SIZE] {
        &self.w2
    }

    #[must_use]
    pub fn output_biases(&self) -> &[f32; OUTPUT_SIZE] {
        &self.b2
    }

    /// Mutable access to all parameters, mainly for tests and checkpoint loading.
    pub fn parameters_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.w1
            .iter_mut()
            .flatten()
            .chain(self.b1.iter_mut())
            .chain(self.w2.iter_mut().flatten())
            .chain(self.b2.iter_mut())
    }

    /// All parameters in checkpoint order: w1 row-major, b1, w2, b2.
    pub fn parameters(&self) -> impl Iterator<Item = f32> + '_ {
        self.w1
            .iter()
            .flatten()
            .chain(&self.b1)
            .chain(self.w2.iter().flatten())
            .chain(&self.b2)
            .copied()
    }
}
