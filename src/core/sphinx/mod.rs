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


// Sphinx over P-224, loosely following Danezis and Goldberg.
//
// Notable choices:
// * Routing information is a protobuf message per hop, nested so that each hop's
//   RoutingInfo carries the encrypted RoutingInfo of the next hop.
// * Beta is padded to BETA_SIZE with filler derived from the previous hop's secret, which
//   the relaying hop regenerates when it strips its layer.
// * No SURBs.

//! Sphinx packet building and processing.

pub mod crypto;
pub mod delay;
pub mod packet;
#[cfg(test)]
mod tests;

pub use self::{
	crypto::{PublicKey, SecretKey},
	delay::{generate_delay_sequence, Delay, MAX_HOP_DELAY},
	packet::{Commands, Flag, Header, Hop, RoutingInfo, SphinxPacket, BETA_SIZE, MAX_HOPS},
};
use self::crypto::{Key, Point, KEY_SIZE};
use crate::core::error::{CodecError, CryptoError, PacketError};
use p224::Scalar;
use prost::Message;
use rand::{CryptoRng, Rng};
use zeroize::Zeroize;

/// A hop of the path a packet is built for.
#[derive(Clone, Debug)]
pub struct PathHop {
	pub id: String,
	/// `host:port`.
	pub address: String,
	pub public_key: PublicKey,
}

impl PathHop {
	/// Routing target as written into the previous hop's routing info.
	pub fn to_hop(&self) -> Hop {
		Hop {
			id: self.id.clone(),
			address: self.address.clone(),
			pub_key: crypto::public_key_to_bytes(&self.public_key),
		}
	}
}

/// Per-hop key material computed by the packet builder. Never transmitted.
pub struct HeaderInitials {
	/// Group element the hop receives.
	pub alpha: Point,
	pub shared_secret: Point,
	pub blinder: Scalar,
	/// `kdf` of the marshalled shared secret.
	pub secret_hash: Key,
}

impl HeaderInitials {
	/// Key for the layer of beta and payload belonging to this hop.
	pub fn layer_key(&self) -> Key {
		crypto::kdf(&self.secret_hash)
	}
}

impl Drop for HeaderInitials {
	fn drop(&mut self) {
		self.secret_hash.zeroize();
	}
}

/// Blinding factor derived from a hop's secret hash.
fn derive_blinder(secret_hash: &Key) -> Result<Scalar, CryptoError> {
	let bytes = crypto::keystream(secret_hash, crypto::BLINDING_IV, KEY_SIZE)?;
	crypto::bytes_to_scalar(&bytes)
}

/// Compute the group element, shared secret, blinder and secret hash of every hop, starting
/// from the ephemeral scalar `x`.
pub fn derive_header_initials(
	x: &Scalar,
	public_keys: &[PublicKey],
) -> Result<Vec<HeaderInitials>, CryptoError> {
	let mut exponent = *x;
	let mut initials = Vec::with_capacity(public_keys.len());
	for public_key in public_keys {
		let alpha = crypto::group_base(&exponent);
		let shared_secret = crypto::ecdh(&exponent, &public_key.to_projective());
		let secret_hash = crypto::kdf(&crypto::marshal_point(&shared_secret));
		let blinder = derive_blinder(&secret_hash)?;
		exponent *= blinder;
		initials.push(HeaderInitials { alpha, shared_secret, blinder, secret_hash });
	}
	Ok(initials)
}

/// `len` bytes of filler keyed by a hop's secret hash. Appended after the next hop's routing
/// info by both the builder and the relaying hop, so the next hop MACs the same beta.
pub fn filler(secret_hash: &Key, len: usize) -> Result<Vec<u8>, CryptoError> {
	let filler_key = crypto::keystream(secret_hash, crypto::FILLER_IV, KEY_SIZE)?;
	crypto::keystream(&filler_key, &crypto::ZERO_IV, len)
}

fn check_beta_len(len: usize) -> Result<(), CodecError> {
	if len > BETA_SIZE {
		return Err(CodecError::HeaderTooLarge { size: len, max: BETA_SIZE })
	}
	Ok(())
}

/// Per-hop commands for the given delays: every hop relays except the last one.
pub fn hop_commands(delays: &[f64]) -> Vec<Commands> {
	let last = delays.len().saturating_sub(1);
	delays
		.iter()
		.enumerate()
		.map(|(i, delay)| Commands::new(*delay, if i == last { Flag::LastHop } else { Flag::Relay }))
		.collect()
}

/// Build the header for `path`, delivering to `recipient` at the last hop.
///
/// `commands[i]` is read by `path[i]`. Returns the header and the per-hop key material, from
/// which the payload layers are derived.
pub fn create_header(
	rng: &mut (impl Rng + CryptoRng),
	path: &[PathHop],
	recipient: &Hop,
	commands: &[Commands],
) -> Result<(Header, Vec<HeaderInitials>), PacketError> {
	check_flags(commands)?;
	let x = crypto::random_scalar(rng);
	build_header(rng, &x, path, recipient, commands)
}

/// Every command relays except the last one, which delivers.
fn check_flags(commands: &[Commands]) -> Result<(), PacketError> {
	let last = commands.len().saturating_sub(1);
	for (i, command) in commands.iter().enumerate() {
		if (command.flag()? == Flag::LastHop) != (i == last) {
			return Err(PacketError::FlagSequence { hop: i })
		}
	}
	Ok(())
}

pub(crate) fn build_header(
	rng: &mut (impl Rng + CryptoRng),
	x: &Scalar,
	path: &[PathHop],
	recipient: &Hop,
	commands: &[Commands],
) -> Result<(Header, Vec<HeaderInitials>), PacketError> {
	let num_hops = path.len();
	if num_hops == 0 || num_hops > MAX_HOPS {
		return Err(PacketError::HopCount(num_hops))
	}
	if commands.len() != num_hops {
		return Err(PacketError::CommandCount { expected: num_hops, got: commands.len() })
	}

	let public_keys: Vec<PublicKey> = path.iter().map(|hop| hop.public_key).collect();
	let initials = derive_header_initials(x, &public_keys)?;

	// Innermost first. `next` holds the encrypted routing info and MAC of hop `i + 1`.
	let mut next: Option<(Vec<u8>, Vec<u8>)> = None;
	let mut beta = Vec::new();
	for i in (0..num_hops).rev() {
		let next_hop = match path.get(i + 1) {
			Some(hop) => hop.to_hop(),
			None => Hop { pub_key: Vec::new(), ..recipient.clone() },
		};
		let (next_hop_meta_data, mac) = next.take().unwrap_or_default();
		let routing = RoutingInfo {
			next_hop: Some(next_hop),
			commands: Some(commands[i].clone()),
			next_hop_meta_data,
			mac,
		};
		let layer_key = initials[i].layer_key();
		let encrypted = crypto::aes_ctr(&layer_key, &routing.encode_length_delimited_to_vec())?;
		check_beta_len(encrypted.len())?;

		let pad_len = BETA_SIZE - encrypted.len();
		beta = encrypted.clone();
		if i == 0 {
			let mut pad = vec![0; pad_len];
			rng.fill_bytes(&mut pad);
			beta.extend_from_slice(&pad);
		} else {
			beta.extend_from_slice(&filler(&initials[i - 1].secret_hash, pad_len)?);
		}
		let mac = crypto::hmac(&layer_key, &beta);

		next = Some((encrypted, mac.to_vec()));
	}

	let (_, mac) = next.unwrap_or_default();
	let header = Header { alpha: crypto::marshal_point(&initials[0].alpha), beta, mac };
	Ok((header, initials))
}

/// Create a new Sphinx packet carrying `message` along `path`.
pub fn new_packet(
	rng: &mut (impl Rng + CryptoRng),
	path: &[PathHop],
	recipient: &Hop,
	commands: &[Commands],
	message: &[u8],
) -> Result<SphinxPacket, PacketError> {
	if message.is_empty() {
		return Err(CodecError::PayloadTooShort.into())
	}
	let (header, initials) = create_header(rng, path, recipient, commands)?;
	let mut payload = message.to_vec();
	for hop in initials.iter().rev() {
		payload = crypto::aes_ctr(&hop.layer_key(), &payload)?;
	}
	Ok(SphinxPacket { hdr: Some(header), pld: payload })
}

/// Outcome of processing one layer.
#[derive(Clone)]
pub struct Processed {
	/// Next hop for a relay, or the recipient for the last hop.
	pub next_hop: Hop,
	pub flag: Flag,
	pub delay: Delay,
	/// Packet with this hop's layer removed. For the last hop the payload is the plaintext.
	pub packet: SphinxPacket,
	/// Hash of the shared secret, used as replay tag input.
	pub(crate) secret_hash: Key,
}

/// Remove one layer of `packet` using this node's long-term secret.
pub fn process_packet(packet: &SphinxPacket, secret: &SecretKey) -> Result<Processed, PacketError> {
	let header = packet.header()?;
	let alpha = crypto::unmarshal_point(&header.alpha)?;

	let shared_secret = crypto::ecdh(&crypto::secret_scalar(secret), &alpha);
	let secret_hash = crypto::kdf(&crypto::marshal_point(&shared_secret));
	let layer_key = crypto::kdf(&secret_hash);

	if !crypto::mac_ok(&layer_key, &header.beta, &header.mac) {
		return Err(CryptoError::MacMismatch.into())
	}
	if header.beta.len() != BETA_SIZE {
		return Err(CodecError::BadSerialization.into())
	}
	if packet.pld.is_empty() {
		return Err(CodecError::PayloadTooShort.into())
	}

	let blinder = derive_blinder(&secret_hash)?;
	let next_alpha = crypto::ecdh(&blinder, &alpha);

	let plain_beta = crypto::aes_ctr(&layer_key, &header.beta)?;
	let routing = RoutingInfo::decode_length_delimited(plain_beta.as_slice())
		.map_err(CodecError::from)?;
	let next_hop = routing.next_hop.ok_or(CodecError::MissingField("next_hop"))?;
	let commands = routing.commands.ok_or(CodecError::MissingField("commands"))?;
	let flag = commands.flag()?;

	let payload = crypto::aes_ctr(&layer_key, &packet.pld)?;

	let mut beta = routing.next_hop_meta_data;
	if flag == Flag::Relay {
		check_beta_len(beta.len())?;
		let pad = filler(&secret_hash, BETA_SIZE - beta.len())?;
		beta.extend_from_slice(&pad);
	}
	let header = Header { alpha: crypto::marshal_point(&next_alpha), beta, mac: routing.mac };

	log::trace!(target: "loopix", "Processed layer for {:?}, flag {:?}", next_hop.id, flag);
	Ok(Processed {
		next_hop,
		flag,
		delay: Delay::from_secs(commands.delay),
		packet: SphinxPacket { hdr: Some(header), pld: payload },
		secret_hash,
	})
}
