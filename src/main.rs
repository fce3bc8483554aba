use clap::{Arg, Command};
use std::error::Error;
use std::path;

use packrat::channel::{Channel, Message};
use packrat::client::Client;
use packrat::{connect, logging, Server, DEBUG_LOG};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = Command::new("packrat")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Versioned directory synchronizer")
		.subcommand_required(true)
		.subcommand(
			Command::new("init")
				.about("Initialize a server store")
				.arg(Arg::new("root").required(true)),
		)
		.subcommand(
			Command::new("serve")
				.about("Serving mode on stdin/stdout (used internally)")
				.arg(Arg::new("root").required(true)),
		)
		.subcommand(
			Command::new("sync")
				.about("Sync a local tree against a server")
				.arg(Arg::new("root").required(true).help("Local tree to synchronize"))
				.arg(Arg::new("remote").required(true).help("host:path, or a local store path")),
		)
		.get_matches();

	if let Some(matches) = matches.subcommand_matches("init") {
		let root = matches.get_one::<String>("root").expect("required arg");
		Server::init(path::Path::new(root))?;
		println!("initialized packrat store at {}", root);
	} else if let Some(matches) = matches.subcommand_matches("serve") {
		let root = path::PathBuf::from(matches.get_one::<String>("root").expect("required arg"));
		let mut channel = Channel::new(tokio::io::stdin(), tokio::io::stdout());

		// Failures before the session proper still go to the peer; stderr
		// may be swallowed by the transport.
		let server = match Server::open(&root) {
			Ok(server) => server,
			Err(e) => {
				let _ = channel.send(&Message::Error { msg: e.to_string() }).await;
				return Err(e.into());
			}
		};
		if let Err(e) = logging::init_server_log(&root.join(DEBUG_LOG)) {
			let _ = channel.send(&Message::Error { msg: e.to_string() }).await;
			return Err(e.into());
		}
		server.serve(&mut channel).await?;
	} else if let Some(matches) = matches.subcommand_matches("sync") {
		logging::init_tracing();
		let root = matches.get_one::<String>("root").expect("required arg");
		let remote_spec = matches.get_one::<String>("remote").expect("required arg");

		let connect::Remote { mut child, channel } = connect::connect(remote_spec).await?;
		let mut client = Client::new(path::Path::new(root), channel);
		let report = client.sync().await?;
		let _ = child.wait().await?;

		println!(
			"in sync at version {} ({} sent, {} received, {} removed)",
			report.version, report.files_sent, report.files_received, report.files_removed
		);
	}

	Ok(())
}

// vim: ts=4
