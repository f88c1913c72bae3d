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


//! Cover packet generation.

use super::{
	encode_message,
	error::{ConfigError, Error},
	sphinx::{generate_delay_sequence, SphinxPacket},
	topology::{choose_random_path, ClientDescriptor, NodeDescriptor},
};
use rand::{seq::SliceRandom, CryptoRng, Rng};

/// Payload of every cover packet. Recipients discard messages equal to it.
pub const COVER_PAYLOAD: &[u8] = b"LOOPIX_COVER_MSG";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoverKind {
	/// Addressed to a random other client, which discards it.
	Drop,
	/// Addressed back to the sender.
	Loop,
}

/// A packet and the address of its first hop.
#[derive(Clone)]
pub struct AddressedPacket {
	pub address: String,
	pub packet: SphinxPacket,
}

pub fn is_cover(payload: &[u8]) -> bool {
	payload == COVER_PAYLOAD
}

/// Build a cover packet from `sender` through up to `num_mixes` random mixes.
pub fn gen_cover_packet(
	rng: &mut (impl Rng + CryptoRng),
	kind: CoverKind,
	sender: &ClientDescriptor,
	mixes: &[NodeDescriptor],
	clients: &[ClientDescriptor],
	num_mixes: usize,
	delay_rate: f64,
) -> Result<AddressedPacket, Error> {
	let recipient = match kind {
		CoverKind::Loop => sender.clone(),
		CoverKind::Drop => {
			let others: Vec<&ClientDescriptor> =
				clients.iter().filter(|client| client.id != sender.id).collect();
			(*others.choose(rng).ok_or(ConfigError::NoCoverRecipient)?).clone()
		},
	};
	let path = choose_random_path(rng, mixes, num_mixes, &sender.provider, &recipient)?;
	let delays = generate_delay_sequence(rng, delay_rate, path.num_hops())?;
	let packet = encode_message(rng, COVER_PAYLOAD, &path, &delays)?;
	log::trace!(target: "loopix", "Generated {:?} cover packet to {}", kind, recipient.id);
	Ok(AddressedPacket { address: path.ingress.address(), packet })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::sphinx::{crypto::generate_key_pair, process_packet, Flag, SecretKey};
	use std::collections::HashMap;

	struct Net {
		secrets: HashMap<String, SecretKey>,
		mixes: Vec<NodeDescriptor>,
		clients: Vec<ClientDescriptor>,
	}

	fn node(secrets: &mut HashMap<String, SecretKey>, id: &str, port: u16) -> NodeDescriptor {
		let (pub_key, secret) = generate_key_pair(&mut rand::thread_rng());
		secrets.insert(id.to_owned(), secret);
		NodeDescriptor { id: id.into(), host: "127.0.0.1".into(), port: port.to_string(), pub_key }
	}

	fn net() -> Net {
		let mut secrets = HashMap::new();
		let mixes = vec![node(&mut secrets, "m1", 9001), node(&mut secrets, "m2", 9002)];
		let provider = node(&mut secrets, "p1", 9100);
		let clients = ["alice", "bob"]
			.iter()
			.map(|id| {
				let (pub_key, _) = generate_key_pair(&mut rand::thread_rng());
				ClientDescriptor {
					id: (*id).into(),
					host: "127.0.0.1".into(),
					port: "9200".into(),
					pub_key,
					provider: provider.clone(),
				}
			})
			.collect();
		Net { secrets, mixes, clients }
	}

	/// Process the packet hop by hop, returning the recipient id and the payload.
	fn unwrap_all(net: &Net, mut packet: SphinxPacket, mut hop_id: String) -> (String, Vec<u8>) {
		loop {
			let processed = process_packet(&packet, &net.secrets[&hop_id]).unwrap();
			match processed.flag {
				Flag::Relay => {
					hop_id = processed.next_hop.id;
					packet = processed.packet;
				},
				Flag::LastHop => return (processed.next_hop.id, processed.packet.pld),
			}
		}
	}

	#[test]
	fn loop_cover_returns_to_sender() {
		let mut rng = rand::thread_rng();
		let net = net();
		let alice = &net.clients[0];
		let cover =
			gen_cover_packet(&mut rng, CoverKind::Loop, alice, &net.mixes, &net.clients, 2, 10.0)
				.unwrap();
		assert_eq!(cover.address, "127.0.0.1:9100");
		let (recipient, payload) = unwrap_all(&net, cover.packet, "p1".into());
		assert_eq!(recipient, "alice");
		assert!(is_cover(&payload));
	}

	#[test]
	fn drop_cover_goes_to_another_client() {
		let mut rng = rand::thread_rng();
		let net = net();
		let alice = &net.clients[0];
		let cover =
			gen_cover_packet(&mut rng, CoverKind::Drop, alice, &net.mixes, &net.clients, 1, 10.0)
				.unwrap();
		let (recipient, payload) = unwrap_all(&net, cover.packet, "p1".into());
		assert_eq!(recipient, "bob");
		assert!(is_cover(&payload));

		let alone = vec![alice.clone()];
		let result =
			gen_cover_packet(&mut rng, CoverKind::Drop, alice, &net.mixes, &alone, 1, 10.0);
		assert!(matches!(result, Err(Error::Config(ConfigError::NoCoverRecipient))));
	}
}
