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


//! Client core: registration with a provider, sending through random paths, pulling the inbox
//! and optional cover traffic.

use crate::{
	core::{
		choose_random_path,
		cover::{gen_cover_packet, is_cover, AddressedPacket, CoverKind},
		encode_message, generate_delay_sequence,
		sphinx::crypto,
		ClientDescriptor, Config, ConfigError, Delay, Error, NodeDescriptor,
	},
	network::{
		connect,
		protocol::{
			expect_frame, recv_pull_reply, send_frame, token_from_envelope, ClientPubs, Envelope,
			PullRequest, ACK,
		},
	},
	provider::{Signal, Token},
	traits::{Directory, Transport},
};
use futures::Future;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use std::{io, sync::Arc};
use tokio::{net::TcpStream, sync::mpsc::UnboundedSender};

pub struct Client {
	descriptor: ClientDescriptor,
	config: Config,
	directory: Arc<dyn Directory>,
	transport: Arc<dyn Transport>,
	token: Mutex<Option<Token>>,
}

impl Client {
	/// New client with a fresh key pair, attached to `provider`.
	pub fn new(
		id: &str,
		host: &str,
		port: &str,
		provider: NodeDescriptor,
		config: Config,
		directory: Arc<dyn Directory>,
		transport: Arc<dyn Transport>,
	) -> Self {
		let (pub_key, _) = crypto::generate_key_pair(&mut OsRng);
		let descriptor = ClientDescriptor {
			id: id.to_owned(),
			host: host.to_owned(),
			port: port.to_owned(),
			pub_key,
			provider,
		};
		Self { descriptor, config, directory, transport, token: Mutex::new(None) }
	}

	pub fn descriptor(&self) -> &ClientDescriptor {
		&self.descriptor
	}

	pub fn token(&self) -> Option<Token> {
		*self.token.lock()
	}

	async fn connect_provider(&self) -> Result<TcpStream, Error> {
		Ok(connect(&self.descriptor.provider.address(), self.config.dial_timeout).await?)
	}

	/// Run a request/response exchange with the provider, bounded by the idle timeout.
	async fn with_timeout<T>(
		&self,
		exchange: impl Future<Output = Result<T, Error>>,
	) -> Result<T, Error> {
		tokio::time::timeout(self.config.idle_timeout, exchange).await.unwrap_or_else(|_| {
			Err(io::Error::new(io::ErrorKind::TimedOut, "Provider did not answer").into())
		})
	}

	/// Publish this client in the directory and register with the provider. Registering again
	/// rotates the token.
	pub async fn register(&self) -> Result<Token, Error> {
		self.directory.publish_client(&self.descriptor)?;
		let pubs = ClientPubs {
			id: self.descriptor.id.clone(),
			host: self.descriptor.host.clone(),
			port: self.descriptor.port.clone(),
			pub_key: crypto::public_key_to_bytes(&self.descriptor.pub_key),
		};
		let token = self
			.with_timeout(async {
				let mut stream = self.connect_provider().await?;
				send_frame(&mut stream, &Envelope::Assign(pubs).encode()).await?;
				let reply = expect_frame(&mut stream, self.config.max_frame_size).await?;
				Ok::<_, Error>(token_from_envelope(Envelope::decode(&reply)?)?)
			})
			.await?;
		*self.token.lock() = Some(token);
		log::info!(
			target: "loopix",
			"Client {} registered with {}",
			self.descriptor.id,
			self.descriptor.provider.id
		);
		Ok(token)
	}

	/// Encode `plaintext` for `recipient_id` over a random path starting at our provider.
	pub fn encode_message(
		&self,
		recipient_id: &str,
		plaintext: &[u8],
	) -> Result<AddressedPacket, Error> {
		let recipient = self
			.directory
			.client(recipient_id)?
			.ok_or_else(|| ConfigError::UnknownNode(recipient_id.to_owned()))?;
		let mixes = self.directory.mixes()?;
		let path = choose_random_path(
			&mut OsRng,
			&mixes,
			self.config.num_mixes,
			&self.descriptor.provider,
			&recipient,
		)?;
		let delays = generate_delay_sequence(&mut OsRng, self.config.mix_delay_rate, path.num_hops())?;
		let packet = encode_message(&mut OsRng, plaintext, &path, &delays)?;
		Ok(AddressedPacket { address: path.ingress.address(), packet })
	}

	async fn dispatch(&self, addressed: AddressedPacket) -> Result<(), Error> {
		let frame = Envelope::Comm(addressed.packet).encode();
		self.transport.send(&addressed.address, frame).await?;
		Ok(())
	}

	/// Send `plaintext` to `recipient_id`.
	pub async fn send(&self, recipient_id: &str, plaintext: &[u8]) -> Result<(), Error> {
		let addressed = self.encode_message(recipient_id, plaintext)?;
		self.dispatch(addressed).await?;
		log::trace!(target: "loopix", "{} sent {} bytes to {}", self.descriptor.id, plaintext.len(), recipient_id);
		Ok(())
	}

	/// Send one cover packet.
	pub async fn send_cover(&self, kind: CoverKind) -> Result<(), Error> {
		let mixes = self.directory.mixes()?;
		let clients = match kind {
			CoverKind::Loop => Vec::new(),
			CoverKind::Drop => self.directory.clients()?,
		};
		let addressed = gen_cover_packet(
			&mut OsRng,
			kind,
			&self.descriptor,
			&mixes,
			&clients,
			self.config.num_mixes,
			self.config.mix_delay_rate,
		)?;
		self.dispatch(addressed).await
	}

	/// Pull the inbox once. Returns the received messages, cover traffic removed.
	pub async fn fetch(&self) -> Result<Vec<Vec<u8>>, Error> {
		let token = self.token().ok_or_else(|| Error::Unauthenticated(self.descriptor.id.clone()))?;
		let request = PullRequest { client_id: self.descriptor.id.clone(), token: token.to_vec() };
		let (signal, messages) = self
			.with_timeout(async {
				let mut stream = self.connect_provider().await?;
				send_frame(&mut stream, &Envelope::Pull(request).encode()).await?;
				let (signal, messages) =
					recv_pull_reply(&mut stream, self.config.max_frame_size).await?;
				if signal == Signal::SI {
					send_frame(&mut stream, ACK).await?;
				}
				Ok::<_, Error>((signal, messages))
			})
			.await?;
		if signal == Signal::NI {
			log::warn!(target: "loopix", "Provider has no inbox for {}", self.descriptor.id);
		}
		let total = messages.len();
		let messages: Vec<Vec<u8>> = messages.into_iter().filter(|m| !is_cover(m)).collect();
		log::trace!(
			target: "loopix",
			"{} fetched {} messages, {} cover",
			self.descriptor.id,
			messages.len(),
			total - messages.len()
		);
		Ok(messages)
	}

	/// Pull the inbox every poll interval, handing messages to `inbox`. Returns when `inbox` is
	/// closed.
	pub async fn poll_inbox(&self, inbox: UnboundedSender<Vec<u8>>) {
		let mut interval = tokio::time::interval(self.config.poll_interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			interval.tick().await;
			match self.fetch().await {
				Ok(messages) =>
					for message in messages {
						if inbox.send(message).is_err() {
							return
						}
					},
				Err(e) => log::warn!(target: "loopix", "Inbox pull failed: {}", e),
			}
			if inbox.is_closed() {
				return
			}
		}
	}

	/// Send cover packets of `kind` with Exp(`rate`) inter-arrival times. Never returns when the
	/// rate is positive.
	async fn cover_loop(&self, kind: CoverKind, rate: f64) {
		if rate <= 0.0 {
			return futures::future::pending().await
		}
		loop {
			let wait = match Delay::exp(&mut OsRng, rate) {
				Ok(delay) => delay.to_duration(),
				Err(e) => {
					log::error!(target: "loopix", "Cover traffic disabled: {}", e);
					return futures::future::pending().await
				},
			};
			tokio::time::sleep(wait).await;
			if let Err(e) = self.send_cover(kind).await {
				log::debug!(target: "loopix", "{:?} cover not sent: {}", kind, e);
			}
		}
	}

	/// Poll the inbox and emit cover traffic until `shutdown` resolves or `inbox` is closed.
	pub async fn run_until(&self, shutdown: impl Future<Output = ()>, inbox: UnboundedSender<Vec<u8>>) {
		tokio::select! {
			() = shutdown => (),
			_ = self.poll_inbox(inbox) => (),
			_ = self.cover_loop(CoverKind::Loop, self.config.loop_cover_rate) => (),
			_ = self.cover_loop(CoverKind::Drop, self.config.drop_cover_rate) => (),
		}
		log::info!(target: "loopix", "Client {} stopped", self.descriptor.id);
	}
}
