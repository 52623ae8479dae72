use blewake::Controller;
use blewake_cli::{cli::Cli, logging};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		error!(target = "blewake", error = %err, "run failed");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let mut controller = Controller::new(cli.to_config()).await?;
	let report = controller.run().await;

	println!("{}", serde_json::to_string_pretty(&report)?);

	if !report.success {
		anyhow::bail!("BLE connection failed on adapter {}", report.adapter_id);
	}
	Ok(())
}
