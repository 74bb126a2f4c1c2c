/// One combination of learning hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSet {
    pub name: &'static str,
    pub learning_rate: f32,
    /// Discount factor of bootstrapped targets.
    pub gamma: f32,
    pub epsilon_decay: f32,
    /// Floor of the exploration rate.
    pub epsilon_min: f32,
    pub batch_size: usize,
}

impl ParameterSet {
    pub const MODERATE: Self = Self {
        name: "moderate",
        learning_rate: 0.002,
        gamma: 0.99,
        epsilon_decay: 0.995,
        epsilon_min: 0.05,
        batch_size: 32,
    };

    /// The rotation used by the tuner, starting with [`Self::MODERATE`].
    pub const PRESETS: [Self; 7] = [
        Self::MODERATE,
        Self {
            name: "conservative",
            learning_rate: 0.001,
            ..Self::MODERATE
        },
        Self {
            name: "aggressive",
            learning_rate: 0.003,
            ..Self::MODERATE
        },
        Self {
            name: "slow-decay",
            epsilon_decay: 0.998,
            epsilon_min: 0.10,
            ..Self::MODERATE
        },
        Self {
            name: "fast-decay",
            epsilon_decay: 0.992,
            epsilon_min: 0.02,
            ..Self::MODERATE
        },
        Self {
            name: "large-batch",
            batch_size: 64,
            ..Self::MODERATE
        },
        Self {
            name: "far-sighted",
            gamma: 0.995,
            ..Self::MODERATE
        },
    ];
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::MODERATE
    }
}
