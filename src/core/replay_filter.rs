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


//! Packet replay filter.

use super::sphinx::crypto::{self, Key};
use rand::{
	distributions::{Distribution, Standard},
	CryptoRng, Rng,
};

// https://hur.st/bloomfilter/?n=1000000&p=&m=16777216&k=8
// The false positive rate stays below 0.05% up to 1m packets in the filter. The filter lives as
// long as the node process, so a node restarted once a day can absorb ~11 packets per second.
const NUM_BITS: usize = 16 * 1024 * 1024;
const NUM_WORDS: usize = NUM_BITS / 64;
const NUM_TAG_BITS: usize = 8;

const TAG_CONTEXT: &[u8] = b"loopix-replay-tg";

#[derive(Clone, Copy)]
pub struct ReplayTag {
	base: u32,
	inc: u32,
}

impl Distribution<ReplayTag> for Standard {
	fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ReplayTag {
		ReplayTag { base: rng.gen(), inc: rng.gen() }
	}
}

pub struct ReplayFilter {
	key: [u8; 32],
	/// Allocated on demand.
	words: Option<Box<[u64]>>,
}

impl ReplayFilter {
	fn new_with_key(key: [u8; 32]) -> Self {
		Self { key, words: None }
	}

	pub fn new(rng: &mut (impl Rng + CryptoRng)) -> Self {
		let mut key = [0; 32];
		rng.fill_bytes(&mut key);
		Self::new_with_key(key)
	}

	/// Tag of a packet, derived from the hash of its shared secret at this hop.
	pub fn tag(&self, secret_hash: &Key) -> ReplayTag {
		let mut input = Vec::with_capacity(TAG_CONTEXT.len() + secret_hash.len());
		input.extend_from_slice(TAG_CONTEXT);
		input.extend_from_slice(secret_hash);
		let mac = crypto::hmac(&self.key, &input);
		let mut bytes = [0; 8];
		bytes.copy_from_slice(&mac[..8]);
		let tag = u64::from_le_bytes(bytes);
		ReplayTag { base: tag as u32, inc: (tag >> 32) as u32 }
	}

	pub fn insert(&mut self, tag: ReplayTag) {
		let mut i = tag.base;
		let words = self.words.get_or_insert_with(|| vec![0; NUM_WORDS].into_boxed_slice());
		for _ in 0..NUM_TAG_BITS {
			words[((i as usize) >> 6) % NUM_WORDS] |= 1 << (i & 63);
			i = i.wrapping_add(tag.inc);
		}
	}

	pub fn contains(&self, tag: ReplayTag) -> bool {
		match &self.words {
			None => false,
			Some(words) => {
				let mut i = tag.base;
				for _ in 0..NUM_TAG_BITS {
					if (words[((i as usize) >> 6) % NUM_WORDS] & (1 << (i & 63))) == 0 {
						return false
					}
					i = i.wrapping_add(tag.inc);
				}
				true
			},
		}
	}

	/// Insert the tag, returning `false` if it was (probably) already present.
	pub fn check_and_insert(&mut self, tag: ReplayTag) -> bool {
		if self.contains(tag) {
			return false
		}
		self.insert(tag);
		true
	}
}
