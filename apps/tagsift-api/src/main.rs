use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = tagsift_api::Args::parse();

	tagsift_api::run(args).await
}
