use clap::Parser;

use sol_mcp::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	sol_mcp::run(args).await
}
