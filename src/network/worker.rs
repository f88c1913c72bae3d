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


//! Mix worker: peel one layer, hold the packet for its delay, then hand it to the dispatcher.
//!
//! Processing is synchronous and runs on the connection task. Each accepted packet then gets its
//! own timer task, so the read path never waits on a delay and packets leave in delay order,
//! not arrival order.

use super::protocol::Envelope;
use crate::{
	core::{
		process_packet, replay_filter::ReplayFilter, sphinx::Hop, Delay, Flag, PacketError,
		SecretKey, SphinxPacket,
	},
	provider::Provider,
	traits::Transport,
};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use std::sync::Arc;
use tokio::{
	sync::mpsc::{UnboundedReceiver, UnboundedSender},
	task::JoinSet,
};

/// What to do with a packet once its delay expired.
#[derive(Clone)]
pub enum Dispatch {
	/// Send to the next hop.
	Forward { address: String, packet: SphinxPacket },
	/// Store in the inbox of a client of this provider.
	Deliver { recipient: String, payload: Vec<u8> },
}

/// Single hop result in wire form.
pub struct Routed {
	/// `host:port` of the next hop, or of the recipient for the last hop.
	pub next_address: String,
	pub packet_bytes: Vec<u8>,
	pub delay: Delay,
	pub flag: Flag,
	pub next_hop: Hop,
}

/// Process one layer of an encoded packet.
pub fn process(packet_bytes: &[u8], secret: &SecretKey) -> Result<Routed, PacketError> {
	let packet = SphinxPacket::from_bytes(packet_bytes)?;
	let processed = process_packet(&packet, secret)?;
	Ok(Routed {
		next_address: processed.next_hop.address.clone(),
		packet_bytes: processed.packet.to_bytes(),
		delay: processed.delay,
		flag: processed.flag,
		next_hop: processed.next_hop,
	})
}

pub struct MixWorker {
	id: String,
	secret: SecretKey,
	replay_filter: Mutex<ReplayFilter>,
	dispatch: UnboundedSender<Dispatch>,
}

impl MixWorker {
	pub fn new(id: String, secret: SecretKey, dispatch: UnboundedSender<Dispatch>) -> Self {
		Self { id, secret, replay_filter: Mutex::new(ReplayFilter::new(&mut OsRng)), dispatch }
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	/// Peel our layer and decide where the packet goes. Replays are rejected.
	pub fn process(&self, packet: &SphinxPacket) -> Result<(Delay, Dispatch), PacketError> {
		let processed = process_packet(packet, &self.secret)?;

		{
			let mut replay_filter = self.replay_filter.lock();
			let tag = replay_filter.tag(&processed.secret_hash);
			if !replay_filter.check_and_insert(tag) {
				return Err(PacketError::Replayed)
			}
		}

		let dispatch = match processed.flag {
			Flag::Relay => Dispatch::Forward {
				address: processed.next_hop.address,
				packet: processed.packet,
			},
			Flag::LastHop => Dispatch::Deliver {
				recipient: processed.next_hop.id,
				payload: processed.packet.pld,
			},
		};
		Ok((processed.delay, dispatch))
	}

	/// Process a packet and schedule its dispatch after the delay it carries.
	///
	/// Must be called within a tokio runtime.
	pub fn handle_packet(&self, packet: &SphinxPacket) -> Result<Delay, PacketError> {
		let (delay, dispatch) = self.process(packet)?;
		let sender = self.dispatch.clone();
		let duration = delay.to_duration();
		tokio::spawn(async move {
			tokio::time::sleep(duration).await;
			if sender.send(dispatch).is_err() {
				log::debug!(target: "loopix", "Dispatcher stopped, dropping delayed packet");
			}
		});
		log::trace!(target: "loopix", "{}: packet scheduled in {:?}", self.id, duration);
		Ok(delay)
	}
}

/// Drain the dispatch queue until every sender is gone. Forwards are single attempts run
/// concurrently; deliveries go to `provider` when this node has one.
pub async fn run_dispatcher(
	mut queue: UnboundedReceiver<Dispatch>,
	transport: Arc<dyn Transport>,
	provider: Option<Arc<Provider>>,
) {
	let mut sends = JoinSet::new();
	while let Some(dispatch) = queue.recv().await {
		match dispatch {
			Dispatch::Forward { address, packet } => {
				let send = transport.send(&address, Envelope::Comm(packet).encode());
				sends.spawn(async move {
					if let Err(e) = send.await {
						log::warn!(target: "loopix", "Dropping packet for {}: {}", address, e);
					}
				});
			},
			Dispatch::Deliver { recipient, payload } => match &provider {
				Some(provider) => {
					let provider = provider.clone();
					sends.spawn(async move {
						let stored = tokio::task::spawn_blocking(move || {
							provider.deliver(&recipient, &payload).map(|id| (recipient, id))
						})
						.await;
						match stored {
							Ok(Ok((recipient, message_id))) => {
								log::trace!(target: "loopix", "Delivered {} to {}", message_id, recipient)
							},
							Ok(Err(e)) => log::error!(target: "loopix", "Dropping message: {}", e),
							Err(e) => log::error!(target: "loopix", "Inbox write task failed: {}", e),
						}
					});
				},
				None => {
					log::warn!(target: "loopix", "Last hop packet for {} reached a mix", recipient)
				},
			},
		}
		// Reap finished sends.
		while sends.try_join_next().is_some() {}
	}
	while sends.join_next().await.is_some() {}
	log::debug!(target: "loopix", "Dispatcher stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::{
		sphinx::{crypto::generate_key_pair, hop_commands, new_packet, PathHop, PublicKey},
		CodecError,
	};
	use futures::{future::BoxFuture, FutureExt};
	use std::{io, time::Duration};
	use tokio::sync::mpsc;

	fn hop(id: &str, port: u16, public_key: PublicKey) -> PathHop {
		PathHop { id: id.into(), address: format!("127.0.0.1:{port}"), public_key }
	}

	fn recipient() -> Hop {
		Hop { id: "bob".into(), address: "127.0.0.1:9300".into(), pub_key: vec![] }
	}

	/// A worker for `m1` and a packet m1 -> p1 -> bob.
	fn setup(delays: &[f64]) -> (MixWorker, UnboundedReceiver<Dispatch>, SphinxPacket, SecretKey) {
		let mut rng = rand::thread_rng();
		let (m1_public, m1_secret) = generate_key_pair(&mut rng);
		let (p1_public, p1_secret) = generate_key_pair(&mut rng);
		let path = vec![hop("m1", 9001, m1_public), hop("p1", 9100, p1_public)];
		let packet =
			new_packet(&mut rng, &path, &recipient(), &hop_commands(delays), b"hello").unwrap();
		let (sender, receiver) = mpsc::unbounded_channel();
		(MixWorker::new("m1".into(), m1_secret, sender), receiver, packet, p1_secret)
	}

	#[tokio::test(start_paused = true)]
	async fn forward_after_delay() {
		let (worker, mut queue, packet, _) = setup(&[5.0, 0.0]);
		let start = tokio::time::Instant::now();
		assert_eq!(worker.handle_packet(&packet).unwrap(), Delay::from_secs(5.0));

		assert!(tokio::time::timeout(Duration::from_secs(4), queue.recv()).await.is_err());
		match queue.recv().await {
			Some(Dispatch::Forward { address, packet: forwarded }) => {
				assert_eq!(address, "127.0.0.1:9100");
				assert_eq!(forwarded.pld.len(), packet.pld.len());
			},
			_ => panic!("Expected a forward"),
		}
		assert!(start.elapsed() >= Duration::from_secs(5));
	}

	#[tokio::test(start_paused = true)]
	async fn delays_reorder_packets() {
		let mut rng = rand::thread_rng();
		let (m1_public, m1_secret) = generate_key_pair(&mut rng);
		let (sender, mut queue) = mpsc::unbounded_channel();
		let worker = MixWorker::new("m1".into(), m1_secret, sender);
		let mut via_m1 = |port: u16, delay: f64| {
			let (next_public, _) = generate_key_pair(&mut rng);
			let path = vec![hop("m1", 9001, m1_public), hop("next", port, next_public)];
			new_packet(&mut rng, &path, &recipient(), &hop_commands(&[delay, 0.0]), b"x").unwrap()
		};
		let slow = via_m1(9100, 3.0);
		let fast = via_m1(9200, 1.0);

		worker.handle_packet(&slow).unwrap();
		worker.handle_packet(&fast).unwrap();
		let mut addresses = Vec::new();
		for _ in 0..2 {
			match queue.recv().await {
				Some(Dispatch::Forward { address, .. }) => addresses.push(address),
				_ => panic!("Expected a forward"),
			}
		}
		assert_eq!(addresses, vec!["127.0.0.1:9200", "127.0.0.1:9100"]);
	}

	#[tokio::test]
	async fn replays_are_rejected() {
		let (worker, _queue, packet, _) = setup(&[0.0, 0.0]);
		assert!(worker.handle_packet(&packet).is_ok());
		assert_eq!(worker.handle_packet(&packet).err(), Some(PacketError::Replayed));
	}

	#[tokio::test]
	async fn bad_packets_schedule_nothing() {
		let (worker, mut queue, mut packet, _) = setup(&[0.0, 0.0]);
		packet.hdr.as_mut().unwrap().mac[0] ^= 1;
		assert!(worker.handle_packet(&packet).err().unwrap().is_mac_mismatch());
		drop(worker);
		assert!(queue.recv().await.is_none());
	}

	#[test]
	fn last_hop_delivers_to_recipient() {
		let (worker, _queue, packet, p1_secret) = setup(&[0.0, 0.0]);
		let (_, dispatch) = worker.process(&packet).unwrap();
		let Dispatch::Forward { packet, .. } = dispatch else { panic!("Expected a forward") };

		let (sender, _receiver) = mpsc::unbounded_channel();
		let provider = MixWorker::new("p1".into(), p1_secret, sender);
		match provider.process(&packet).unwrap() {
			(_, Dispatch::Deliver { recipient, payload }) => {
				assert_eq!(recipient, "bob");
				assert_eq!(payload, b"hello");
			},
			_ => panic!("Expected a delivery"),
		}
	}

	#[test]
	fn wire_level_process() {
		let (worker, _queue, packet, p1_secret) = setup(&[0.5, 0.0]);
		let routed = process(&packet.to_bytes(), &worker.secret).unwrap();
		assert_eq!(routed.next_address, "127.0.0.1:9100");
		assert_eq!(routed.flag, Flag::Relay);
		assert_eq!(routed.delay, Delay::from_secs(0.5));

		let routed = process(&routed.packet_bytes, &p1_secret).unwrap();
		assert_eq!(routed.flag, Flag::LastHop);
		assert_eq!(routed.next_address, "127.0.0.1:9300");
		assert_eq!(routed.next_hop.id, "bob");

		assert_eq!(
			process(&[0xff; 3], &p1_secret).err(),
			Some(PacketError::Codec(CodecError::BadSerialization))
		);
	}

	struct RecordingTransport(Mutex<Vec<(String, Vec<u8>)>>);

	impl Transport for RecordingTransport {
		fn send(&self, address: &str, frame: Vec<u8>) -> BoxFuture<'static, io::Result<()>> {
			self.0.lock().push((address.to_owned(), frame));
			async { Ok::<(), io::Error>(()) }.boxed()
		}
	}

	#[tokio::test]
	async fn dispatcher_forwards_and_stops() {
		let transport = Arc::new(RecordingTransport(Mutex::new(Vec::new())));
		let (sender, receiver) = mpsc::unbounded_channel();
		let dispatcher = tokio::spawn(run_dispatcher(receiver, transport.clone(), None));

		let packet = SphinxPacket { hdr: None, pld: vec![1, 2, 3] };
		sender
			.send(Dispatch::Forward { address: "127.0.0.1:9001".into(), packet: packet.clone() })
			.unwrap();
		sender.send(Dispatch::Deliver { recipient: "bob".into(), payload: vec![1] }).unwrap();
		drop(sender);
		dispatcher.await.unwrap();

		let sent = transport.0.lock();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].0, "127.0.0.1:9001");
		assert!(Envelope::decode(&sent[0].1).unwrap() == Envelope::Comm(packet));
	}

	#[tokio::test]
	async fn dispatcher_delivers_into_provider_inbox() {
		let root = std::env::temp_dir().join(format!("loopix-dispatch-{:016x}", rand::random::<u64>()));
		let provider = Arc::new(Provider::new(&root));
		let transport = Arc::new(RecordingTransport(Mutex::new(Vec::new())));
		let (sender, receiver) = mpsc::unbounded_channel();
		let dispatcher =
			tokio::spawn(run_dispatcher(receiver, transport.clone(), Some(provider.clone())));

		for payload in [b"one".to_vec(), b"two".to_vec()] {
			sender.send(Dispatch::Deliver { recipient: "bob".into(), payload }).unwrap();
		}
		drop(sender);
		dispatcher.await.unwrap();

		assert!(transport.0.lock().is_empty());
		match provider.fetch_messages("bob").unwrap() {
			crate::provider::Fetched::Messages(messages) => {
				let mut payloads: Vec<Vec<u8>> = messages.into_iter().map(|m| m.data).collect();
				payloads.sort();
				assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);
			},
			other => panic!("Unexpected fetch result {:?}", other),
		}
		let _ = std::fs::remove_dir_all(root);
	}
}
