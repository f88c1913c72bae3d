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


// Core packet logic. This module tries to be network agnostic.

mod config;
pub mod cover;
pub mod error;
pub mod replay_filter;
pub mod sphinx;
pub mod topology;

pub use self::{
	config::{Config, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MIX_DELAY_RATE},
	error::{CodecError, ConfigError, CryptoError, Error, PacketError, PersistenceError},
	sphinx::{
		generate_delay_sequence, process_packet, Delay, Flag, Processed, PublicKey, SecretKey,
		SphinxPacket, MAX_HOPS,
	},
	topology::{choose_random_path, ClientDescriptor, E2EPath, NodeDescriptor},
};
use rand::{CryptoRng, Rng};

/// Encode `plaintext` for `path`. `delays[i]` is the delay applied by the i-th hop.
pub fn encode_message(
	rng: &mut (impl Rng + CryptoRng),
	plaintext: &[u8],
	path: &E2EPath,
	delays: &[f64],
) -> Result<SphinxPacket, PacketError> {
	sphinx::new_packet(
		rng,
		&path.hops(),
		&path.recipient.to_recipient_hop(),
		&sphinx::hop_commands(delays),
		plaintext,
	)
}

/// Generate a long-term key pair.
pub fn generate_new_keys() -> (PublicKey, SecretKey) {
	sphinx::crypto::generate_key_pair(&mut rand::thread_rng())
}
