//! Main entry point for the fuel price monitor.
//!
//! The `run` command keeps the prices of every configured station fresh
//! until interrupted. `setup` walks through binding a new station, `reauth`
//! checks a replacement API key and `check` validates a configuration file.

use clap::{Parser, Subcommand};
use fuel_client::{PriceClientError, PriceClientInterface};
use fuel_config::{Config, StationConfig};
use fuel_core::{reauthenticate, AbortReason, ClientConnector, HostBuilder, SetupFlow, StationStatus};
use fuel_types::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod factory_registry;
mod interactive;

use factory_registry::get_registry;
use interactive::{run_flow, Prompt};

/// Command-line arguments for the fuel price monitor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, global = true, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, global = true, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Refresh prices of all configured stations until interrupted
	Run,
	/// Bind a new station, or change the products of a configured one
	Setup {
		/// Write the generated TOML here instead of stdout
		#[arg(short, long)]
		output: Option<PathBuf>,
		/// Entry id of a configured station to change
		#[arg(long)]
		reconfigure: Option<String>,
		/// API key for a fresh setup
		#[arg(long, env = "FUELPRICES_API_KEY", hide_env_values = true)]
		api_key: Option<String>,
		/// Price API base url for a fresh setup
		#[arg(long)]
		base_url: Option<String>,
	},
	/// Check a replacement API key
	Reauth {
		#[arg(long)]
		base_url: Option<String>,
	},
	/// Validate the configuration and list its stations
	Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	tracing::info!(version = env!("CARGO_PKG_VERSION"), "Fuelprices.dk");

	match args.command.unwrap_or(Command::Run) {
		Command::Run => run(&args.config).await,
		Command::Setup {
			output,
			reconfigure,
			api_key,
			base_url,
		} => {
			let api_key = api_key.map(SecretString::new);
			setup(&args.config, output, reconfigure, api_key, base_url).await
		},
		Command::Reauth { base_url } => reauth(&args.config, base_url).await,
		Command::Check => check(&args.config).await,
	}
}

async fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
	let path = path.to_str().ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(path).await?;
	tracing::info!(
		service = %config.service.id,
		stations = config.stations.len(),
		"Loaded configuration"
	);
	Ok(config)
}

async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
	let config = load_config(config_path).await?;
	let host = HostBuilder::new(config)
		.build(&get_registry().client)
		.await?;

	for station in host.stations() {
		if let StationStatus::Failed(reason) = station.status() {
			tracing::error!(entry_id = %station.entry_id(), reason = %reason, "Station not running");
		}
	}

	tokio::signal::ctrl_c().await?;
	tracing::info!("Shutting down");
	host.shutdown().await;
	tracing::info!("Stopped");
	Ok(())
}

async fn check(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
	let config = load_config(config_path).await?;
	let client = get_registry().build_primary_client(&config)?;
	client
		.config_schema()
		.validate(config.client.primary_config().ok_or("Missing client configuration")?)?;

	println!("Configuration OK: {} (client: {})", config.service.id, config.client.primary);
	for station in &config.stations {
		let products: Vec<&str> = station.products.selected().collect();
		println!(
			"  {} [{}]: {}",
			station.binding().title(),
			station.entry_id(),
			products.join(", ")
		);
	}
	Ok(())
}

/// Connector building an HTTP client for a candidate key.
fn http_connector(base_url: Option<String>) -> ClientConnector {
	Box::new(
		move |key: &SecretString| -> Result<Arc<dyn PriceClientInterface>, PriceClientError> {
			let mut table = toml::map::Map::new();
			table.insert(
				"api_key".to_string(),
				toml::Value::String(key.expose_secret().to_string()),
			);
			if let Some(url) = &base_url {
				table.insert("base_url".to_string(), toml::Value::String(url.clone()));
			}
			let client =
				fuel_client::implementations::http::create_client(&toml::Value::Table(table))?;
			Ok(Arc::from(client))
		},
	)
}

async fn setup(
	config_path: &Path,
	output: Option<PathBuf>,
	reconfigure: Option<String>,
	api_key: Option<SecretString>,
	base_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
	let mut prompt = Prompt::new();

	let rendered = if config_path.exists() {
		let config = load_config(config_path).await?;
		let client: Arc<dyn PriceClientInterface> = get_registry().build_primary_client(&config)?;

		let mut flow = match &reconfigure {
			Some(entry_id) => {
				let station = config
					.station(entry_id)
					.ok_or_else(|| format!("No configured station '{}'", entry_id))?;
				SetupFlow::reconfigure(client, station).await?
			},
			None => {
				let existing = config.stations.iter().map(StationConfig::entry_id);
				SetupFlow::add_station(client, existing).await?
			},
		};
		let outcome = run_flow(&mut flow, &mut prompt, None).await?;
		outcome.station_config().to_toml_entry()?
	} else {
		if reconfigure.is_some() {
			return Err(format!("{} does not exist", config_path.display()).into());
		}
		let mut flow = SetupFlow::initial(http_connector(base_url.clone()), Vec::new());
		let outcome = run_flow(&mut flow, &mut prompt, api_key).await?;
		let key = outcome.api_key.clone().ok_or("Setup finished without an API key")?;
		render_new_config(&key, base_url.as_deref(), &outcome.station_config())?
	};

	match output {
		Some(path) => {
			tokio::fs::write(&path, rendered).await?;
			tracing::info!(path = %path.display(), "Wrote configuration");
		},
		None => print!("{}", rendered),
	}
	Ok(())
}

/// Renders a complete configuration for a first station.
fn render_new_config(
	api_key: &SecretString,
	base_url: Option<&str>,
	station: &StationConfig,
) -> Result<String, Box<dyn std::error::Error>> {
	let mut http = toml::map::Map::new();
	http.insert(
		"api_key".into(),
		toml::Value::String(api_key.expose_secret().to_string()),
	);
	if let Some(url) = base_url {
		http.insert("base_url".into(), toml::Value::String(url.to_string()));
	}

	let mut implementations = toml::map::Map::new();
	implementations.insert("http".into(), toml::Value::Table(http));

	let mut client = toml::map::Map::new();
	client.insert("primary".into(), toml::Value::String("http".into()));
	client.insert("implementations".into(), toml::Value::Table(implementations));

	let mut service = toml::map::Map::new();
	service.insert("id".into(), toml::Value::String("fuelprices".into()));
	service.insert("update_interval_seconds".into(), toml::Value::Integer(3600));

	let mut root = toml::map::Map::new();
	root.insert("service".into(), toml::Value::Table(service));
	root.insert("client".into(), toml::Value::Table(client));

	let mut rendered = toml::to_string(&toml::Value::Table(root))?;
	rendered.push('\n');
	rendered.push_str(&station.to_toml_entry()?);
	Ok(rendered)
}

async fn reauth(config_path: &Path, base_url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
	// Prefer the base url of an existing http client configuration.
	let base_url = match base_url {
		Some(url) => Some(url),
		None if config_path.exists() => load_config(config_path)
			.await?
			.client
			.implementations
			.get("http")
			.and_then(|http| http.get("base_url"))
			.and_then(|url| url.as_str())
			.map(str::to_string),
		None => None,
	};

	let connector = http_connector(base_url);
	let mut prompt = Prompt::new();
	loop {
		let key = SecretString::new(prompt.ask("New API key").await?);
		match reauthenticate(&connector, &key).await {
			Ok(()) => {
				println!("API key accepted. Set it as `api_key` under [client.implementations.http].");
				return Ok(());
			},
			Err(AbortReason::InvalidApiKey) => println!("The API key was rejected, try again."),
			Err(reason) => println!("Could not check the key ({}), try again.", reason),
		}
	}
}
