//! Digital Filter Implementations
//!
//! Butterworth low-pass filters built from second-order sections (biquads)
//! for numerical stability, applied forward and backward for zero phase shift.

use std::f64::consts::PI;

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Gain at 0 Hz
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// State for a single biquad section (Direct Form II Transposed)
#[derive(Debug, Clone, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

/// Single biquad filter section
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    /// Process a single sample using Direct Form II Transposed
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.b0 * input + self.state.z1;
        self.state.z1 = c.b1 * input - c.a1 * output + self.state.z2;
        self.state.z2 = c.b2 * input - c.a2 * output;
        output
    }

    /// Set the state a constant `input` would settle to; returns the
    /// settled output.
    pub fn prime(&mut self, input: f64) -> f64 {
        let c = &self.coeffs;
        let output = c.dc_gain() * input;
        self.state.z2 = c.b2 * input - c.a2 * output;
        self.state.z1 = c.b1 * input - c.a1 * output + self.state.z2;
        output
    }

    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadFilter>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>) -> Self {
        Self {
            sections: sections.into_iter().map(BiquadFilter::new).collect(),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.sections
            .iter_mut()
            .fold(input, |acc, section| section.process(acc))
    }

    fn prime(&mut self, input: f64) {
        self.sections
            .iter_mut()
            .fold(input, |acc, section| section.prime(acc));
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Filter a signal in one direction, starting from the steady state of
    /// its first value so there is no start-up transient.
    pub fn filter(&mut self, signal: &[f64]) -> Vec<f64> {
        self.reset();
        if let Some(&first) = signal.first() {
            self.prime(first);
        }
        signal.iter().map(|&s| self.process(s)).collect()
    }

    /// Forward-backward filtering (zero phase, squared magnitude response)
    pub fn filtfilt(&mut self, signal: &[f64]) -> Vec<f64> {
        let mut forward = self.filter(signal);
        forward.reverse();
        let mut backward = self.filter(&forward);
        backward.reverse();
        backward
    }
}

/// Butterworth filter designer
pub struct ButterworthFilter;

impl ButterworthFilter {
    /// Design a Butterworth lowpass filter
    pub fn lowpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        let wn = Self::prewarp(cutoff, sample_rate);
        SosFilter::new(Self::design_lowpass(wn, order))
    }

    /// Prewarp frequency for bilinear transform
    fn prewarp(freq: f64, sample_rate: f64) -> f64 {
        (PI * freq / sample_rate).tan()
    }

    /// Conjugate pole pairs become biquads; an odd order adds one
    /// first-order section for the real pole.
    fn design_lowpass(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
        let pairs = order / 2;
        let mut sections = Vec::with_capacity(pairs + order % 2);
        let wn2 = wn * wn;

        for k in 0..pairs {
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
            // analog section: s^2 + q*s + 1
            let q = 2.0 * theta.sin();
            let denom = 1.0 + q * wn + wn2;

            let b0 = wn2 / denom;
            sections.push(BiquadCoeffs {
                b0,
                b1: 2.0 * b0,
                b2: b0,
                a1: 2.0 * (wn2 - 1.0) / denom,
                a2: (1.0 - q * wn + wn2) / denom,
            });
        }

        if order % 2 == 1 {
            let k = wn / (1.0 + wn);
            sections.push(BiquadCoeffs {
                b0: k,
                b1: k,
                b2: 0.0,
                a1: (wn - 1.0) / (wn + 1.0),
                a2: 0.0,
            });
        }

        sections
    }
}

/// Zero-phase Butterworth low-pass of a uniformly sampled signal.
///
/// Signals shorter than two samples are returned unchanged.
pub fn lowpass_filtfilt(signal: &[f64], cutoff: f64, sample_rate: f64, order: usize) -> Vec<f64> {
    if signal.len() < 2 {
        return signal.to_vec();
    }
    ButterworthFilter::lowpass(cutoff, sample_rate, order).filtfilt(signal)
}
