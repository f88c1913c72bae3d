// Copyright 2022 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Per-hop delays.

use crate::core::error::ConfigError;
use rand::Rng;
use rand_distr::{Distribution, Exp};
use std::time::Duration;

/// Upper bound on a delay honoured by a mix. Delays come from the packet, so a hostile sender
/// could otherwise park a packet forever.
pub const MAX_HOP_DELAY: Duration = Duration::from_secs(3600);

/// Delay in seconds, as carried in the routing commands.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Delay(f64);

impl Delay {
	/// Returns a delay of zero time.
	pub fn zero() -> Self {
		Self(0.0)
	}

	pub fn from_secs(secs: f64) -> Self {
		Self(secs)
	}

	/// Returns a random delay sampled from an exponential distribution with the given rate, so
	/// with mean `1 / rate` seconds.
	pub fn exp(rng: &mut impl Rng, rate: f64) -> Result<Self, ConfigError> {
		Ok(Self(exp_distribution(rate)?.sample(rng)))
	}

	pub fn as_secs(self) -> f64 {
		self.0
	}

	/// Convert into a [`Duration`] a timer can wait on. Negative or non-finite values map to zero
	/// and the result is capped at [`MAX_HOP_DELAY`].
	pub fn to_duration(self) -> Duration {
		if !self.0.is_finite() || self.0 <= 0.0 {
			return Duration::ZERO
		}
		Duration::try_from_secs_f64(self.0).unwrap_or(MAX_HOP_DELAY).min(MAX_HOP_DELAY)
	}
}

fn exp_distribution(rate: f64) -> Result<Exp<f64>, ConfigError> {
	// Exp::new accepts a zero rate (infinite mean), which is useless here.
	if rate.is_nan() || rate <= 0.0 || rate.is_infinite() {
		return Err(ConfigError::BadRate(rate))
	}
	Exp::new(rate).map_err(|_| ConfigError::BadRate(rate))
}

/// `n` independent samples from Exp(`rate`), in seconds.
pub fn generate_delay_sequence(
	rng: &mut impl Rng,
	rate: f64,
	n: usize,
) -> Result<Vec<f64>, ConfigError> {
	let exp = exp_distribution(rate)?;
	let delays = (0..n).map(|_| exp.sample(&mut *rng)).collect();
	log::trace!(target: "loopix", "Drew {} delays at rate {}", n, rate);
	Ok(delays)
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;

	#[test]
	fn rejects_bad_rates() {
		let mut rng = rand::thread_rng();
		for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
			assert!(matches!(
				generate_delay_sequence(&mut rng, rate, 3),
				Err(ConfigError::BadRate(_))
			));
		}
		assert!(Delay::exp(&mut rng, 0.0).is_err());
	}

	#[test]
	fn empirical_mean_matches_rate() {
		let mut rng = rand_xoshiro::Xoshiro256StarStar::seed_from_u64(7);
		for rate in [0.5, 2.0, 10.0] {
			let n = 200_000;
			let delays = generate_delay_sequence(&mut rng, rate, n).unwrap();
			assert_eq!(delays.len(), n);
			assert!(delays.iter().all(|d| *d >= 0.0));
			let mean = delays.iter().sum::<f64>() / n as f64;
			let expected = 1.0 / rate;
			assert!((mean - expected).abs() < 0.05 * expected, "rate {rate}: mean {mean}");
		}
	}

	#[test]
	fn empty_sequence() {
		let mut rng = rand::thread_rng();
		assert!(generate_delay_sequence(&mut rng, 1.0, 0).unwrap().is_empty());
	}

	#[test]
	fn duration_conversion() {
		assert_eq!(Delay::zero().to_duration(), Duration::ZERO);
		assert_eq!(Delay::from_secs(-3.0).to_duration(), Duration::ZERO);
		assert_eq!(Delay::from_secs(f64::NAN).to_duration(), Duration::ZERO);
		assert_eq!(Delay::from_secs(1.5).to_duration(), Duration::from_millis(1500));
		assert_eq!(Delay::from_secs(1e12).to_duration(), MAX_HOP_DELAY);
		assert_eq!(Delay::from_secs(f64::INFINITY).to_duration(), Duration::ZERO);
	}
}
