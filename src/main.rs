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


//! Run a mix, a provider or a client.
//!
//! ```sh
//! loopix provider --host 127.0.0.1 --port 9100 --pki pki.db --id p1
//! loopix mix --host 127.0.0.1 --port 9001 --pki pki.db
//! loopix mix --host 127.0.0.1 --port 9002 --pki pki.db
//! loopix client --host 127.0.0.1 --port 9200 --pki pki.db --id bob --provider p1
//! loopix client --host 127.0.0.1 --port 9201 --pki pki.db --id alice --provider p1 \
//!     --send-to bob --message hello
//! ```

use clap::{value_parser, Arg, ArgMatches, Command};
use loopix::{
	core::ConfigError, traits::Directory, Client, Config, Error, Node, Role, SqliteDirectory,
	TcpTransport,
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc;

fn node_args(command: Command) -> Command {
	command
		.arg(Arg::new("host").long("host").required(true).help("Address to listen on"))
		.arg(
			Arg::new("port")
				.long("port")
				.required(true)
				.value_parser(value_parser!(u16))
				.help("Port to listen on, 0 picks a free one"),
		)
		.arg(
			Arg::new("pki")
				.long("pki")
				.required(true)
				.value_parser(value_parser!(PathBuf))
				.help("Path of the shared SQLite directory"),
		)
		.arg(Arg::new("id").long("id").help("Identifier, defaults to host:port"))
}

fn cli() -> Command {
	Command::new("loopix")
		.about("Loopix mix network node")
		.subcommand_required(true)
		.subcommand(node_args(Command::new("mix").about("Run a mix node")))
		.subcommand(
			node_args(Command::new("provider").about("Run a provider keeping client inboxes")).arg(
				Arg::new("inboxes")
					.long("inboxes")
					.value_parser(value_parser!(PathBuf))
					.help("Inbox root directory"),
			),
		)
		.subcommand(
			node_args(Command::new("client").about("Run a client"))
				.arg(
					Arg::new("provider")
						.long("provider")
						.required(true)
						.help("Identifier of the provider to register with"),
				)
				.arg(
					Arg::new("send-to")
						.long("send-to")
						.requires("message")
						.help("Recipient of --message"),
				)
				.arg(Arg::new("message").long("message").requires("send-to").help("Text to send")),
		)
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		log::warn!(target: "loopix", "Cannot listen for Ctrl-C: {}", e);
	}
}

fn required<'a, T: Clone + Send + Sync + 'static>(
	matches: &'a ArgMatches,
	name: &'static str,
) -> Result<&'a T, ConfigError> {
	matches.get_one::<T>(name).ok_or(ConfigError::MissingArgument(name))
}

/// Host, port, optional id and directory shared by every subcommand.
fn endpoint(matches: &ArgMatches) -> Result<(String, String, Option<String>, SqliteDirectory), Error> {
	let host = required::<String>(matches, "host")?.clone();
	let port = required::<u16>(matches, "port")?.to_string();
	let id = matches.get_one::<String>("id").cloned();
	let directory = SqliteDirectory::open(required::<PathBuf>(matches, "pki")?)?;
	Ok((host, port, id, directory))
}

async fn run_node(role: Role, matches: &ArgMatches) -> Result<(), Error> {
	let (host, port, id, directory) = endpoint(matches)?;
	let mut config = Config::default();
	if let Some(inboxes) = matches.try_get_one::<PathBuf>("inboxes").ok().flatten() {
		config.inbox_root = inboxes.clone();
	}
	let transport = Arc::new(TcpTransport::new(config.dial_timeout));
	let node = Node::start(role, id, &host, &port, config, &directory, transport).await?;
	node.run_until(shutdown_signal()).await
}

async fn run_client(matches: &ArgMatches) -> Result<(), Error> {
	let (host, port, id, directory) = endpoint(matches)?;
	let directory: Arc<dyn Directory> = Arc::new(directory);
	let config = Config::default();
	let provider_id = required::<String>(matches, "provider")?.clone();
	let provider = directory
		.provider(&provider_id)?
		.ok_or_else(|| ConfigError::UnknownNode(provider_id.clone()))?;
	let id = id.unwrap_or_else(|| format!("{host}:{port}"));
	let transport = Arc::new(TcpTransport::new(config.dial_timeout));
	let client = Client::new(&id, &host, &port, provider, config, directory, transport);
	client.register().await?;

	if let (Some(recipient), Some(message)) =
		(matches.get_one::<String>("send-to"), matches.get_one::<String>("message"))
	{
		client.send(recipient, message.as_bytes()).await?;
		log::info!(target: "loopix", "Sent message to {}", recipient);
	}

	let (sender, mut receiver) = mpsc::unbounded_channel::<Vec<u8>>();
	let printer = tokio::spawn(async move {
		while let Some(message) = receiver.recv().await {
			println!("{}", String::from_utf8_lossy(&message));
		}
	});
	client.run_until(shutdown_signal(), sender).await;
	let _ = printer.await;
	Ok(())
}

#[tokio::main]
async fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let matches = match cli().try_get_matches() {
		Ok(matches) => matches,
		Err(e) => {
			let _ = e.print();
			std::process::exit(if e.use_stderr() { 1 } else { 0 });
		},
	};
	let result = match matches.subcommand() {
		Some(("mix", matches)) => run_node(Role::Mix, matches).await,
		Some(("provider", matches)) => run_node(Role::Provider, matches).await,
		Some(("client", matches)) => run_client(matches).await,
		_ => Ok(()),
	};
	if let Err(e) = result {
		log::error!(target: "loopix", "{}", e);
		std::process::exit(e.exit_code());
	}
}
