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


//! Sphinx packet building/processing tests.

#![cfg(test)]

use super::{crypto::*, *};
use crate::core::error::{CodecError, CryptoError, PacketError};
use rand::{CryptoRng, Rng};

fn gen_path(rng: &mut (impl Rng + CryptoRng), num_hops: usize) -> (Vec<SecretKey>, Vec<PathHop>) {
	(0..num_hops)
		.map(|i| {
			let (public_key, secret) = generate_key_pair(&mut *rng);
			let hop =
				PathHop { id: format!("node{i}"), address: format!("127.0.0.1:{}", 9000 + i), public_key };
			(secret, hop)
		})
		.unzip()
}

fn recipient() -> Hop {
	Hop { id: "bob".into(), address: "127.0.0.1:9999".into(), pub_key: vec![7; GROUP_ELEMENT_SIZE] }
}

fn gen_message(rng: &mut impl Rng) -> Vec<u8> {
	let mut message = vec![0; rng.gen_range(1..2048)];
	rng.fill_bytes(&mut message);
	message
}

fn encrypt_payload(initials: &[HeaderInitials], message: &[u8]) -> Vec<u8> {
	initials
		.iter()
		.rev()
		.fold(message.to_vec(), |payload, hop| aes_ctr(&hop.layer_key(), &payload).unwrap())
}

#[test]
fn round_trip_through_every_path_length() {
	let mut rng = rand::thread_rng();

	for num_hops in 1..=MAX_HOPS {
		let (secrets, path) = gen_path(&mut rng, num_hops);
		let delays: Vec<f64> = (0..num_hops).map(|i| i as f64 * 0.25).collect();
		let message = gen_message(&mut rng);

		let mut packet =
			new_packet(&mut rng, &path, &recipient(), &hop_commands(&delays), &message).unwrap();
		let payload_len = packet.pld.len();
		assert_eq!(payload_len, message.len());

		for (i, secret) in secrets.iter().enumerate() {
			let header = packet.header().unwrap();
			assert_eq!(header.alpha.len(), GROUP_ELEMENT_SIZE);
			assert_eq!(header.beta.len(), BETA_SIZE);
			assert_eq!(header.mac.len(), MAC_SIZE);

			let processed = process_packet(&packet, secret).unwrap();
			assert_eq!(processed.delay, Delay::from_secs(delays[i]));
			assert_eq!(processed.packet.pld.len(), payload_len);

			if i + 1 < num_hops {
				assert_eq!(processed.flag, Flag::Relay);
				assert_eq!(processed.next_hop, path[i + 1].to_hop());
				packet = processed.packet;
			} else {
				assert_eq!(processed.flag, Flag::LastHop);
				assert_eq!(processed.next_hop.id, "bob");
				assert_eq!(processed.next_hop.address, "127.0.0.1:9999");
				assert!(processed.next_hop.pub_key.is_empty());
				assert_eq!(processed.packet.pld, message);
			}
		}
	}
}

#[test]
fn wire_encoding_between_hops() {
	let mut rng = rand::thread_rng();
	let (secrets, path) = gen_path(&mut rng, 4);
	let commands = hop_commands(&[0.0; 4]);

	let mut bytes = new_packet(&mut rng, &path, &recipient(), &commands, b"hello").unwrap().to_bytes();
	let wire_len = bytes.len();
	for (i, secret) in secrets.iter().enumerate() {
		let packet = SphinxPacket::from_bytes(&bytes).unwrap();
		let processed = process_packet(&packet, secret).unwrap();
		if i < 3 {
			bytes = processed.packet.to_bytes();
			assert_eq!(bytes.len(), wire_len);
		} else {
			assert_eq!(processed.packet.pld, b"hello");
			assert_eq!(processed.next_hop.id, "bob");
		}
	}
}

#[test]
fn tampering_is_detected_at_every_hop() {
	let mut rng = rand::thread_rng();
	let num_hops = MAX_HOPS;
	let (secrets, path) = gen_path(&mut rng, num_hops);
	let commands = hop_commands(&vec![0.0; num_hops]);

	for tampered_hop in 0..num_hops {
		for tamper_mac in [false, true] {
			let mut packet = new_packet(&mut rng, &path, &recipient(), &commands, b"ping").unwrap();
			for secret in &secrets[..tampered_hop] {
				packet = process_packet(&packet, secret).unwrap().packet;
			}

			let header = packet.hdr.as_mut().unwrap();
			let target = if tamper_mac { &mut header.mac } else { &mut header.beta };
			let index = rng.gen_range(0..target.len());
			target[index] ^= 1 << rng.gen_range(0..8);

			let result = process_packet(&packet, &secrets[tampered_hop]);
			assert_eq!(result.err(), Some(PacketError::Crypto(CryptoError::MacMismatch)));
		}
	}
}

#[test]
fn wrong_key_never_decrypts() {
	let mut rng = rand::thread_rng();
	let (secrets, path) = gen_path(&mut rng, 3);
	let packet = new_packet(&mut rng, &path, &recipient(), &hop_commands(&[0.0; 3]), b"x").unwrap();

	for secret in &secrets[1..] {
		let result = process_packet(&packet, secret);
		assert!(result.err().unwrap().is_mac_mismatch());
	}
	let (_, stranger) = generate_key_pair(&mut rng);
	assert!(process_packet(&packet, &stranger).err().unwrap().is_mac_mismatch());
}

#[test]
fn blinding_follows_the_scalar_chain() {
	let mut rng = rand::thread_rng();
	let num_hops = 4;
	let (secrets, path) = gen_path(&mut rng, num_hops);
	let x = random_scalar(&mut rng);
	let (header, initials) =
		build_header(&mut rng, &x, &path, &recipient(), &hop_commands(&[0.0; 4])).unwrap();
	let mut packet =
		SphinxPacket { hdr: Some(header), pld: encrypt_payload(&initials, b"blinded") };

	let mut exponent = x;
	for (i, secret) in secrets.iter().enumerate() {
		// Client and hop agree on the shared secret.
		let alpha = unmarshal_point(&packet.header().unwrap().alpha).unwrap();
		assert_eq!(marshal_point(&alpha), marshal_point(&initials[i].alpha));
		assert_eq!(
			marshal_point(&ecdh(&secret_scalar(secret), &alpha)),
			marshal_point(&initials[i].shared_secret)
		);

		let processed = process_packet(&packet, secret).unwrap();
		exponent *= initials[i].blinder;
		assert_eq!(processed.packet.header().unwrap().alpha, marshal_point(&group_base(&exponent)));
		packet = processed.packet;
	}
	assert_eq!(packet.pld, b"blinded");
}

#[test]
fn initials_are_deterministic_in_the_ephemeral_scalar() {
	let mut rng = rand::thread_rng();
	let (_, path) = gen_path(&mut rng, 3);
	let public_keys: Vec<PublicKey> = path.iter().map(|hop| hop.public_key).collect();
	let x = random_scalar(&mut rng);

	let a = derive_header_initials(&x, &public_keys).unwrap();
	let b = derive_header_initials(&x, &public_keys).unwrap();
	for (a, b) in a.iter().zip(&b) {
		assert_eq!(a.secret_hash, b.secret_hash);
		assert_eq!(marshal_point(&a.alpha), marshal_point(&b.alpha));
	}
	assert_eq!(marshal_point(&a[0].alpha), marshal_point(&group_base(&x)));
	assert_ne!(a[0].secret_hash, a[1].secret_hash);
}

#[test]
fn packets_depend_only_on_the_rng() {
	use rand::SeedableRng;
	let build = |seed: u64| {
		let mut rng = rand_chacha::ChaChaRng::seed_from_u64(seed);
		let (_, path) = gen_path(&mut rng, 4);
		new_packet(&mut rng, &path, &recipient(), &hop_commands(&[0.1; 4]), b"seeded")
			.unwrap()
			.to_bytes()
	};
	assert_eq!(build(1), build(1));
	assert_ne!(build(1), build(2));
}

#[test]
fn filler_is_keyed() {
	let a = filler(&kdf(b"a"), 100).unwrap();
	assert_eq!(a.len(), 100);
	assert_eq!(filler(&kdf(b"a"), 40).unwrap(), a[..40]);
	assert_ne!(filler(&kdf(b"b"), 100).unwrap(), a);
	assert!(filler(&kdf(b"a"), 0).unwrap().is_empty());
}

#[test]
fn unknown_flag_is_rejected() {
	let mut rng = rand::thread_rng();
	let (secrets, path) = gen_path(&mut rng, 2);
	let commands =
		vec![Commands { delay: 0.0, flag: "F2".into() }, Commands::new(0.0, Flag::LastHop)];
	assert_eq!(
		new_packet(&mut rng, &path, &recipient(), &commands, b"x").err(),
		Some(PacketError::Codec(CodecError::UnknownFlag("F2".into())))
	);
	let x = random_scalar(&mut rng);
	let (header, initials) = build_header(&mut rng, &x, &path, &recipient(), &commands).unwrap();
	let packet = SphinxPacket { hdr: Some(header), pld: encrypt_payload(&initials, b"x") };

	let result = process_packet(&packet, &secrets[0]);
	assert_eq!(result.err(), Some(PacketError::Codec(CodecError::UnknownFlag("F2".into()))));
}

#[test]
fn last_hop_flag_only_on_the_final_hop() {
	let mut rng = rand::thread_rng();
	let (_, path) = gen_path(&mut rng, 3);
	let relay = Commands::new(0.0, Flag::Relay);
	let last = Commands::new(0.0, Flag::LastHop);

	let early = [relay.clone(), last.clone(), last.clone()];
	assert_eq!(
		new_packet(&mut rng, &path, &recipient(), &early, b"x").err(),
		Some(PacketError::FlagSequence { hop: 1 })
	);
	let missing = [relay.clone(), relay.clone(), relay.clone()];
	assert_eq!(
		new_packet(&mut rng, &path, &recipient(), &missing, b"x").err(),
		Some(PacketError::FlagSequence { hop: 2 })
	);
	assert!(new_packet(&mut rng, &path, &recipient(), &[relay.clone(), relay, last], b"x").is_ok());
}

#[test]
fn invalid_paths_are_rejected() {
	let mut rng = rand::thread_rng();
	let (_, path) = gen_path(&mut rng, MAX_HOPS + 1);

	let result = new_packet(&mut rng, &path, &recipient(), &hop_commands(&[0.0; MAX_HOPS + 1]), b"x");
	assert_eq!(result.err(), Some(PacketError::HopCount(MAX_HOPS + 1)));

	let result = new_packet(&mut rng, &[], &recipient(), &[], b"x");
	assert_eq!(result.err(), Some(PacketError::HopCount(0)));

	let result = new_packet(&mut rng, &path[..3], &recipient(), &hop_commands(&[0.0; 2]), b"x");
	assert_eq!(result.err(), Some(PacketError::CommandCount { expected: 3, got: 2 }));

	let result = new_packet(&mut rng, &path[..3], &recipient(), &hop_commands(&[0.0; 3]), b"");
	assert_eq!(result.err(), Some(PacketError::Codec(CodecError::PayloadTooShort)));
}

#[test]
fn oversized_routing_info_is_rejected() {
	let mut rng = rand::thread_rng();
	let (_, path) = gen_path(&mut rng, 2);
	let recipient = Hop { id: "r".repeat(BETA_SIZE), ..recipient() };

	let result = new_packet(&mut rng, &path, &recipient, &hop_commands(&[0.0; 2]), b"x");
	assert!(matches!(
		result.err(),
		Some(PacketError::Codec(CodecError::HeaderTooLarge { max: BETA_SIZE, .. }))
	));
}

#[test]
fn long_names_on_a_five_hop_path_do_not_fit() {
	let mut rng = rand::thread_rng();
	let (_, path) = gen_path(&mut rng, MAX_HOPS);
	let long = |hop: PathHop, i: usize| PathHop {
		id: format!("{i}-{}", "n".repeat(78)),
		address: format!("{}.example:{}", "h".repeat(68), 9000 + i),
		..hop
	};
	let path: Vec<PathHop> = path.into_iter().enumerate().map(|(i, hop)| long(hop, i)).collect();
	let recipient = Hop { id: "c".repeat(80), address: format!("{}:9999", "a".repeat(75)), ..recipient() };

	let result = new_packet(&mut rng, &path, &recipient, &hop_commands(&[0.0; MAX_HOPS]), b"x");
	assert!(matches!(
		result.err(),
		Some(PacketError::Codec(CodecError::HeaderTooLarge { max: BETA_SIZE, .. }))
	));
}

#[test]
fn malformed_alpha_is_rejected() {
	let mut rng = rand::thread_rng();
	let (secrets, path) = gen_path(&mut rng, 2);
	let mut packet = new_packet(&mut rng, &path, &recipient(), &hop_commands(&[0.0; 2]), b"x").unwrap();
	packet.hdr.as_mut().unwrap().alpha.truncate(10);

	let result = process_packet(&packet, &secrets[0]);
	assert_eq!(result.err(), Some(PacketError::Crypto(CryptoError::BadPoint)));

	let result = process_packet(&SphinxPacket { hdr: None, pld: vec![1] }, &secrets[0]);
	assert_eq!(result.err(), Some(PacketError::Codec(CodecError::MissingField("hdr"))));
}

#[test]
fn commands_flag_only_the_last_hop() {
	let commands = hop_commands(&[0.1, 0.2, 0.3]);
	let flags: Vec<Flag> = commands.iter().map(|c| c.flag().unwrap()).collect();
	assert_eq!(flags, vec![Flag::Relay, Flag::Relay, Flag::LastHop]);
	assert_eq!(commands[1].delay, 0.2);
	assert!(hop_commands(&[]).is_empty());
}
