use clap::{Arg, ArgMatches, Command};
use std::path::Path;
use std::sync::Arc;
use std::{env, fs};

use mssmon::callbacks::{ObserverBuilder, StatusCallback};
use mssmon::config::Config;
use mssmon::connection::ConnectionOptions;
use mssmon::credentials::Credentials;
use mssmon::delivery::Delivery;
use mssmon::directory::{fetch_directory, Directory, HttpDirectory};
use mssmon::dispatcher::Dispatcher;
use mssmon::error::MonitorError;
use mssmon::logging::*;
use mssmon::notify::LogNotifier;
use mssmon::protocol::{Document, SubjectStatus};
use mssmon::registry::UnitRegistry;
use mssmon::session::login::{self, LoggedIn};
use mssmon::session::{file, RunState, SessionBuilder};

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> Result<Config, MonitorError> {
	let path = matches.get_one::<String>("config").map(Path::new);
	let config = Config::load(path)?;
	mssmon::logging::init_tracing(&config.log_level);
	Ok(config)
}

/// Credentials given on the command line; the password may come from the
/// environment instead
fn cli_credentials(matches: &ArgMatches, config: &Config) -> Option<Credentials> {
	let user = matches.get_one::<String>("user")?;
	let client = matches.get_one::<String>("client").cloned().or_else(|| config.client_id.clone())?;
	let password = matches
		.get_one::<String>("password")
		.cloned()
		.or_else(|| env::var("MSSMON_PASSWORD").ok())
		.unwrap_or_default();
	Some(Credentials::new(&client, user, &password))
}

async fn resolve_directory(config: &Config) -> Result<Directory, MonitorError> {
	if config.directory_url.is_empty() {
		return Ok(Directory::default());
	}
	let source = HttpDirectory::new(&config.directory_url, config.command_timeout())?;
	let directory =
		fetch_directory(&source, config.directory_fetch_attempts, config.directory_retry_delay()).await;
	Ok(directory.unwrap_or_default())
}

/// One-off authenticated connection outside of a session
async fn connect_once(matches: &ArgMatches, config: &Config) -> Result<LoggedIn, MonitorError> {
	let credentials = cli_credentials(matches, config).ok_or("--user and --client (or clientId) are required")?;
	let directory = resolve_directory(config).await?;
	let endpoint = directory.resolve(&credentials.client_id, &config.default_server, config.default_port);
	let listener = Dispatcher::new(UnitRegistry::new(), Delivery::start());
	let logged_in = login::login(
		&endpoint,
		&credentials.username,
		&credentials.password,
		ConnectionOptions::from(config),
		Arc::new(listener),
	)
	.await?;
	Ok(logged_in)
}

/// "2 occupants: Bath: Sitting on toilet; Bedroom: On bed"
///
/// Subjects are "status,id,yyyyMMddHHmmss" strings grouped by room.
fn describe_status(status: Option<&Document>) -> String {
	let doc = match status {
		Some(doc) => doc,
		None => return "device not ready".to_string(),
	};
	let mut subjects = Vec::new();
	for room in doc.get_array("rooms/room") {
		let name = room.get_string("name");
		for sub in room.get_array("subs/sub") {
			let code = sub.as_string().split(',').next().and_then(|c| c.trim().parse().ok()).unwrap_or(0);
			let posture = SubjectStatus::from_code(code).unwrap_or(SubjectStatus(0));
			subjects.push(format!("{}: {}", name, posture.name()));
		}
	}
	format!("{} occupants: {}", doc.get_int("unitsub"), subjects.join("; "))
}

//////////////////
// Subcommands  //
//////////////////

async fn monitor(matches: &ArgMatches) -> Result<(), MonitorError> {
	let config = load_config(matches)?;
	let observer = ObserverBuilder::new()
		.on_state(|state: RunState| info!("{}", state.status_text()))
		.on_failure(|message: &str| error!("{}", message))
		.build();

	let session = SessionBuilder::from_config(&config)?
		.observer(Arc::from(observer))
		.notifier(Arc::new(LogNotifier))
		.start();

	match cli_credentials(matches, &config) {
		Some(c) => session.login(&c.client_id, &c.username, &c.password)?,
		None => session.relogin()?,
	}

	let on_status = |mdu: &str, status: Option<&Document>| info!(mdu, status = %describe_status(status), "status");
	let callback: Arc<dyn StatusCallback> = Arc::new(on_status);
	let mut started = false;
	let mut states = session.watch_state();

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			changed = states.changed() => {
				if changed.is_err() {
					break;
				}
				let state = *states.borrow_and_update();
				if state == RunState::Running && !started {
					session.status_start(callback.clone())?;
					started = true;
				}
				if state == RunState::AwaitingUserLogin {
					warn!("login required: pass --client, --user and --password");
				}
			}
		}
	}

	info!("shutting down");
	session.shutdown().await?;
	Ok(())
}

async fn login_check(matches: &ArgMatches) -> Result<(), MonitorError> {
	let config = load_config(matches)?;
	let logged_in = connect_once(matches, &config).await?;
	println!("login ok, user type: {}", logged_in.user_type);
	logged_in.connection.close().await;
	Ok(())
}

async fn fetch(matches: &ArgMatches) -> Result<(), MonitorError> {
	let config = load_config(matches)?;
	let remote = matches.get_one::<String>("remote").ok_or("fetch: remote path required")?;
	let local = matches.get_one::<String>("local").ok_or("fetch: local path required")?;

	let logged_in = connect_once(matches, &config).await?;
	let data = file::read_remote_file(&logged_in.connection, remote, config.file_chunk_size).await;
	logged_in.connection.close().await;

	if data.is_empty() {
		return Err(format!("{}: nothing read", remote).into());
	}
	fs::write(local, &data)?;
	eprintln!("{}: {} bytes written to {}", remote, data.len(), local);
	Ok(())
}

fn digest(sub: &ArgMatches) -> Result<(), MonitorError> {
	let arg = |name: &str| sub.get_one::<String>(name).map(|s| s.as_str()).unwrap_or("");
	println!("{}", login::compute_digest(arg("user"), arg("salt"), arg("password"), arg("challenge")));
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
	let matches = Command::new("mssmon")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Unit monitoring client for mss_msg servers")
		.subcommand_required(true)
		.arg(Arg::new("config").short('c').long("config").value_name("FILE").global(true).help("Config file"))
		.arg(Arg::new("client").long("client").value_name("CLIENT").global(true).help("Client id"))
		.arg(Arg::new("user").short('u').long("user").value_name("USER").global(true).help("Username"))
		.arg(
			Arg::new("password")
				.short('p')
				.long("password")
				.value_name("PASSWORD")
				.global(true)
				.help("Password (default: $MSSMON_PASSWORD)"),
		)
		.subcommand(Command::new("monitor").about("Run the session and log status and alerts until Ctrl-C"))
		.subcommand(Command::new("login-check").about("Log in once and print the user type"))
		.subcommand(
			Command::new("fetch")
				.about("Read a remote file")
				.arg(Arg::new("remote").required(true))
				.arg(Arg::new("local").required(true)),
		)
		.subcommand(
			Command::new("digest")
				.about("Print the login digest")
				.arg(Arg::new("salt").required(true))
				.arg(Arg::new("challenge").required(true)),
		)
		.get_matches();

	match matches.subcommand() {
		Some(("monitor", sub)) => monitor(sub).await,
		Some(("login-check", sub)) => login_check(sub).await,
		Some(("fetch", sub)) => fetch(sub).await,
		Some(("digest", sub)) => digest(sub),
		_ => Ok(()),
	}
}

// vim: ts=4
