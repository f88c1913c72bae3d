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


//! Node and client configuration.

use std::{path::PathBuf, time::Duration};

/// Default rate of the per-hop delay distribution, so half a second on average.
pub const DEFAULT_MIX_DELAY_RATE: f64 = 2.0;

/// Default maximum size of a frame on the wire.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Configuration data for nodes and clients.
#[derive(Clone, Debug)]
pub struct Config {
	/// Rate of the exponential distribution per-hop delays are drawn from, per second.
	pub mix_delay_rate: f64,
	/// Number of mixes between the two providers of a path.
	pub num_mixes: usize,
	/// Interval between inbox pulls.
	pub poll_interval: Duration,
	/// Rate of loop cover messages, per second. 0 disables.
	pub loop_cover_rate: f64,
	/// Rate of drop cover messages, per second. 0 disables.
	pub drop_cover_rate: f64,
	/// Inbound connections idle for longer than this are closed.
	pub idle_timeout: Duration,
	/// Timeout to connect to a peer and write a frame.
	pub dial_timeout: Duration,
	/// How long a stopping node keeps waiting for delayed packets.
	pub drain_timeout: Duration,
	/// Root of the provider inbox tree.
	pub inbox_root: PathBuf,
	/// Frames above this size are rejected.
	pub max_frame_size: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			mix_delay_rate: DEFAULT_MIX_DELAY_RATE,
			num_mixes: 2,
			poll_interval: Duration::from_secs(10),
			loop_cover_rate: 0.0,
			drop_cover_rate: 0.0,
			idle_timeout: Duration::from_secs(30),
			dial_timeout: Duration::from_secs(5),
			drain_timeout: Duration::from_secs(10),
			inbox_root: PathBuf::from("inboxes"),
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
		}
	}
}
