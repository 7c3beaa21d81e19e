//! Analysis windows

use sf_core::Sample;
use std::f64::consts::PI;

/// Window function selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    None,
    Hann,
    Hamming,
    Blackman,
    Bartlett,
}

impl WindowKind {
    /// Parse the wire name used in stage parameters
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "hann" => Some(Self::Hann),
            "hamming" => Some(Self::Hamming),
            "blackman" => Some(Self::Blackman),
            "bartlett" => Some(Self::Bartlett),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hann => "hann",
            Self::Hamming => "hamming",
            Self::Blackman => "blackman",
            Self::Bartlett => "bartlett",
        }
    }

    /// Symmetric window coefficients of length `n`
    pub fn coefficients(self, n: usize) -> Vec<Sample> {
        if n < 2 {
            return vec![1.0; n];
        }
        self.fill(n, (n - 1) as f64)
    }

    /// Periodic (DFT-even) coefficients of length `n`
    ///
    /// Used for streaming STFT: periodic Hann at 50% overlap sums exactly
    /// to one, so overlap-add reconstructs without amplitude ripple.
    pub fn periodic(self, n: usize) -> Vec<Sample> {
        if n < 2 {
            return vec![1.0; n];
        }
        self.fill(n, n as f64)
    }

    fn fill(self, n: usize, denom: f64) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let x = i as f64 / denom;
                let w = match self {
                    Self::None => 1.0,
                    Self::Hann => 0.5 - 0.5 * (2.0 * PI * x).cos(),
                    Self::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                    Self::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                    }
                    Self::Bartlett => 1.0 - (2.0 * x - 1.0).abs(),
                };
                w as Sample
            })
            .collect()
    }
}
