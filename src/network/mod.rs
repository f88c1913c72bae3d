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


//! TCP glue: a [`Node`] accepts frames from clients and other nodes, feeds Sphinx packets to its
//! [`MixWorker`] and, for providers, serves registrations and inbox pulls.

pub mod protocol;
pub mod worker;

pub use self::worker::{process, run_dispatcher, Dispatch, MixWorker, Routed};

use self::protocol::{
	expect_frame, recv_frame, send_frame, send_pull_reply, Envelope, ACK,
};
use crate::{
	core::{
		sphinx::crypto, Config, Error, NodeDescriptor, PacketError, PublicKey, SecretKey,
	},
	provider::{Fetched, Provider, Signal},
	traits::{Directory, Transport},
};
use futures::{future::BoxFuture, Future, FutureExt};
use rand::rngs::OsRng;
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
	net::{TcpListener, TcpStream},
	sync::mpsc,
	task::{JoinHandle, JoinSet},
};

/// Whether a node only relays or also keeps inboxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
	Mix,
	Provider,
}

/// Connect to `address` within `timeout`.
pub async fn connect(address: &str, timeout: Duration) -> io::Result<TcpStream> {
	match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
		Ok(stream) => stream,
		Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, format!("Connecting to {address}"))),
	}
}

/// [`Transport`] opening a fresh TCP connection per frame.
#[derive(Clone)]
pub struct TcpTransport {
	dial_timeout: Duration,
}

impl TcpTransport {
	pub fn new(dial_timeout: Duration) -> Self {
		Self { dial_timeout }
	}
}

impl Transport for TcpTransport {
	fn send(&self, address: &str, frame: Vec<u8>) -> BoxFuture<'static, io::Result<()>> {
		let address = address.to_owned();
		let timeout = self.dial_timeout;
		async move {
			let mut stream = connect(&address, timeout).await?;
			match tokio::time::timeout(timeout, send_frame(&mut stream, &frame)).await {
				Ok(result) => result,
				Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "Writing frame")),
			}
		}
		.boxed()
	}
}

/// State shared by the connection tasks of a node.
struct ConnectionContext {
	worker: Arc<MixWorker>,
	provider: Option<Arc<Provider>>,
	config: Config,
}

impl ConnectionContext {
	/// Run `f` against the provider on the blocking pool; inbox operations hit the filesystem.
	async fn with_provider<T, F>(&self, f: F) -> Result<T, Error>
	where
		T: Send + 'static,
		F: FnOnce(&Provider) -> Result<T, Error> + Send + 'static,
	{
		let provider =
			self.provider.clone().ok_or_else(|| Error::Protocol("Not a provider".into()))?;
		tokio::task::spawn_blocking(move || f(&provider))
			.await
			.map_err(|e| Error::Fatal(format!("Provider task failed: {e}")))?
	}

	async fn on_frame(&self, stream: &mut TcpStream, frame: &[u8]) -> Result<(), Error> {
		match Envelope::decode(frame)? {
			Envelope::Comm(packet) => {
				self.worker.handle_packet(&packet)?;
			},
			Envelope::Assign(pubs) => {
				crypto::public_key_from_bytes(&pubs.pub_key)?;
				let token = self
					.with_provider(move |provider| {
						Ok(provider.register_client(&pubs.id, &pubs.host, &pubs.port, pubs.pub_key)?)
					})
					.await?;
				send_frame(stream, &Envelope::Token(token).encode()).await?;
			},
			Envelope::Pull(request) => {
				let client_id = request.client_id.clone();
				let fetched = self
					.with_provider(move |provider| provider.pull(&request.client_id, &request.token))
					.await?;
				let messages = match &fetched {
					Fetched::Messages(messages) => messages.as_slice(),
					_ => &[],
				};
				send_pull_reply(stream, fetched.signal(), messages).await?;
				if fetched.signal() == Signal::SI {
					let ack = tokio::time::timeout(
						self.config.idle_timeout,
						expect_frame(stream, self.config.max_frame_size),
					)
					.await
					.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "Waiting for AK"))??;
					if ack != ACK {
						return Err(Error::Protocol("Expected delivery acknowledgement".into()))
					}
					let ids: Vec<String> = messages.iter().map(|message| message.id.clone()).collect();
					let count = ids.len();
					let inbox_id = client_id.clone();
					self.with_provider(move |provider| Ok(provider.acknowledge(&inbox_id, &ids)?))
						.await?;
					log::debug!(target: "loopix", "Delivered {} messages to {}", count, client_id);
				}
			},
			Envelope::Token(_) => return Err(Error::Protocol("Unexpected token frame".into())),
		}
		Ok(())
	}
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, context: Arc<ConnectionContext>) {
	let config = &context.config;
	loop {
		let frame =
			match tokio::time::timeout(config.idle_timeout, recv_frame(&mut stream, config.max_frame_size))
				.await
			{
				Err(_) => {
					log::trace!(target: "loopix", "Closing idle connection from {}", peer);
					break
				},
				Ok(Ok(Some(frame))) => frame,
				Ok(Ok(None)) => break,
				Ok(Err(e)) => {
					log::debug!(target: "loopix", "Read error from {}: {}", peer, e);
					break
				},
			};
		match context.on_frame(&mut stream, &frame).await {
			Ok(()) => (),
			// Packet scoped, the connection stays usable.
			Err(Error::Packet(PacketError::Replayed)) => {
				log::debug!(target: "loopix", "Dropped replayed packet from {}", peer)
			},
			Err(Error::Packet(e)) => {
				log::debug!(target: "loopix", "Dropped packet from {}: {}", peer, e)
			},
			Err(Error::Persistence(e)) => {
				log::error!(target: "loopix", "Storage failure serving {}: {}", peer, e);
				break
			},
			Err(e) => {
				log::debug!(target: "loopix", "Closing connection from {}: {}", peer, e);
				break
			},
		}
	}
}

/// A running mix or provider.
pub struct Node {
	role: Role,
	descriptor: NodeDescriptor,
	listener: TcpListener,
	worker: Arc<MixWorker>,
	provider: Option<Arc<Provider>>,
	config: Config,
	dispatcher: JoinHandle<()>,
}

impl Node {
	/// Bind the listening socket, generate a fresh key pair and publish the node in `directory`.
	///
	/// `id` defaults to `host:port`, with the port actually bound.
	pub async fn start(
		role: Role,
		id: Option<String>,
		host: &str,
		port: &str,
		config: Config,
		directory: &dyn Directory,
		transport: Arc<dyn Transport>,
	) -> Result<Self, Error> {
		let address = format!("{host}:{port}");
		let listener = TcpListener::bind(&address)
			.await
			.map_err(|e| Error::Fatal(format!("Cannot bind {address}: {e}")))?;
		let local_addr = listener.local_addr()?;
		let port = local_addr.port().to_string();
		let id = id.unwrap_or_else(|| format!("{host}:{port}"));

		let secret = SecretKey::random(&mut OsRng);
		let pub_key: PublicKey = secret.public_key();
		let descriptor = NodeDescriptor { id: id.clone(), host: host.to_owned(), port, pub_key };

		let provider = match role {
			Role::Mix => {
				directory.publish_mix(&descriptor)?;
				None
			},
			Role::Provider => {
				directory.publish_provider(&descriptor)?;
				Some(Arc::new(Provider::new(config.inbox_root.clone())))
			},
		};

		let (sender, receiver) = mpsc::unbounded_channel();
		let worker = Arc::new(MixWorker::new(id.clone(), secret, sender));
		let dispatcher = tokio::spawn(run_dispatcher(receiver, transport, provider.clone()));

		log::info!(target: "loopix", "{:?} {} listening on {}", role, id, local_addr);
		Ok(Self { role, descriptor, listener, worker, provider, config, dispatcher })
	}

	pub fn descriptor(&self) -> &NodeDescriptor {
		&self.descriptor
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	pub fn provider(&self) -> Option<Arc<Provider>> {
		self.provider.clone()
	}

	/// Serve connections until `shutdown` resolves, then wait up to the configured drain timeout
	/// for packets still being delayed.
	pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
		let Node { role, descriptor, listener, worker, provider, config, dispatcher } = self;
		let drain_timeout = config.drain_timeout;
		let context = Arc::new(ConnectionContext { worker, provider, config });
		let mut connections = JoinSet::new();

		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				_ = &mut shutdown => break,
				accepted = listener.accept() => match accepted {
					Ok((stream, peer)) => {
						log::trace!(target: "loopix", "Accepted connection from {}", peer);
						connections.spawn(handle_connection(stream, peer, context.clone()));
					},
					Err(e) => log::warn!(target: "loopix", "Accept failed: {}", e),
				},
				Some(_) = connections.join_next(), if !connections.is_empty() => (),
			}
		}

		log::info!(target: "loopix", "{:?} {} shutting down", role, descriptor.id);
		drop(listener);
		connections.shutdown().await;
		// The dispatcher ends once the worker and every pending delay released their queue handle.
		drop(context);
		match tokio::time::timeout(drain_timeout, dispatcher).await {
			Ok(_) => log::info!(target: "loopix", "{} drained", descriptor.id),
			Err(_) => log::warn!(
				target: "loopix",
				"{} stopped with delayed packets still pending",
				descriptor.id
			),
		}
		Ok(())
	}
}
