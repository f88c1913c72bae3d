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


//! Node descriptors and path selection.

use super::{
	error::ConfigError,
	sphinx::{Hop, PathHop, PublicKey, MAX_HOPS},
};
use rand::Rng;

/// Published description of a mix or provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeDescriptor {
	pub id: String,
	pub host: String,
	pub port: String,
	pub pub_key: PublicKey,
}

impl NodeDescriptor {
	/// `host:port`.
	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	pub fn to_path_hop(&self) -> PathHop {
		PathHop { id: self.id.clone(), address: self.address(), public_key: self.pub_key }
	}
}

/// Published description of a client and the provider holding its inbox.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientDescriptor {
	pub id: String,
	pub host: String,
	pub port: String,
	pub pub_key: PublicKey,
	pub provider: NodeDescriptor,
}

impl ClientDescriptor {
	pub fn address(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}

	/// Final destination as encoded in the innermost routing info. The key is left out.
	pub fn to_recipient_hop(&self) -> Hop {
		Hop { id: self.id.clone(), address: self.address(), pub_key: Vec::new() }
	}
}

/// End to end path: ingress provider, mixes, egress provider, recipient.
#[derive(Clone, Debug)]
pub struct E2EPath {
	pub ingress: NodeDescriptor,
	pub mixes: Vec<NodeDescriptor>,
	pub egress: NodeDescriptor,
	pub recipient: ClientDescriptor,
}

impl E2EPath {
	pub fn new(
		ingress: NodeDescriptor,
		mixes: Vec<NodeDescriptor>,
		egress: NodeDescriptor,
		recipient: ClientDescriptor,
	) -> Result<Self, ConfigError> {
		let len = mixes.len() + 2;
		if !(3..=MAX_HOPS).contains(&len) {
			return Err(ConfigError::PathLength(len))
		}
		Ok(Self { ingress, mixes, egress, recipient })
	}

	/// Number of Sphinx hops.
	pub fn num_hops(&self) -> usize {
		self.mixes.len() + 2
	}

	/// Sphinx hops: ingress, mixes, egress.
	pub fn hops(&self) -> Vec<PathHop> {
		std::iter::once(&self.ingress)
			.chain(&self.mixes)
			.chain(std::iter::once(&self.egress))
			.map(NodeDescriptor::to_path_hop)
			.collect()
	}
}

/// `k` distinct elements of `items`, in random order.
pub fn random_sample<T: Clone>(
	rng: &mut impl Rng,
	items: &[T],
	k: usize,
) -> Result<Vec<T>, ConfigError> {
	if k > items.len() {
		return Err(ConfigError::SampleLargerThanPopulation { requested: k, available: items.len() })
	}
	Ok(rand::seq::index::sample(rng, items.len(), k).into_iter().map(|i| items[i].clone()).collect())
}

/// `min(k, |mixes|)` distinct mixes in random order.
pub fn choose_random_mixes(
	rng: &mut impl Rng,
	mixes: &[NodeDescriptor],
	k: usize,
) -> Result<Vec<NodeDescriptor>, ConfigError> {
	if mixes.is_empty() {
		return Err(ConfigError::EmptyMixSet)
	}
	random_sample(rng, mixes, k.min(mixes.len()))
}

/// Path from `ingress` (the sender's provider) to `recipient` through up to `num_mixes` random
/// mixes.
pub fn choose_random_path(
	rng: &mut impl Rng,
	mixes: &[NodeDescriptor],
	num_mixes: usize,
	ingress: &NodeDescriptor,
	recipient: &ClientDescriptor,
) -> Result<E2EPath, ConfigError> {
	let chosen = choose_random_mixes(rng, mixes, num_mixes)?;
	log::trace!(
		target: "loopix",
		"Random path {} -> {:?} -> {}",
		ingress.id,
		chosen.iter().map(|mix| mix.id.as_str()).collect::<Vec<_>>(),
		recipient.provider.id
	);
	E2EPath::new(ingress.clone(), chosen, recipient.provider.clone(), recipient.clone())
}
