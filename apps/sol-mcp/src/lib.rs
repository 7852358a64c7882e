pub mod server;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre};

use sol_cli::Transport;
use sol_config::Security;
use sol_service::SolService;

#[derive(Debug, Parser)]
#[command(
	version = sol_cli::VERSION,
	rename_all = "kebab",
	styles = sol_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, value_enum, default_value_t = Transport::Http)]
	pub transport: Transport,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum McpAuthState {
	Off,
	StaticKeys { bearer_token: String },
}

pub async fn run(args: Args) -> Result<()> {
	let config = sol_config::load(&args.config)?;

	sol_cli::init_tracing(&config.service.log_level);

	let mcp_bind = config.service.mcp_bind.clone();
	let auth_state = match args.transport {
		Transport::Http => Some(build_auth_state(&config.security, &mcp_bind)?),
		Transport::Stdio => None,
	};
	let service = Arc::new(SolService::new(config)?);

	tracing::info!(
		version = sol_cli::VERSION,
		transport = ?args.transport,
		collection = %service.cfg.solr.default_collection,
		"Starting Solr MCP server."
	);

	match auth_state {
		Some(auth_state) => server::serve_http(&mcp_bind, auth_state, service).await,
		None => server::serve_stdio(service).await,
	}
}

fn build_auth_state(security: &Security, mcp_bind: &str) -> Result<McpAuthState> {
	match security.auth_mode.trim() {
		"off" => {
			enforce_loopback_for_off_mode(mcp_bind)?;

			Ok(McpAuthState::Off)
		},
		"static_token" => {
			let bearer_token = security
				.bearer_token
				.as_deref()
				.map(str::trim)
				.filter(|token| !token.is_empty())
				.ok_or_else(|| {
					eyre::eyre!(
						"security.auth_mode=static_token requires a non-empty security.bearer_token."
					)
				})?;

			Ok(McpAuthState::StaticKeys { bearer_token: bearer_token.to_string() })
		},
		other => Err(eyre::eyre!(
			"security.auth_mode must be one of off or static_token for sol-mcp, got {other}."
		)),
	}
}

fn enforce_loopback_for_off_mode(mcp_bind: &str) -> Result<()> {
	let bind_addr: SocketAddr = mcp_bind.parse().map_err(|err| {
		eyre::eyre!(
			"service.mcp_bind must be a valid socket address when security.auth_mode=off: {err}"
		)
	})?;

	if !bind_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"service.mcp_bind must be a loopback address when security.auth_mode=off."
		));
	}

	Ok(())
}
