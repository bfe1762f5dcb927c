use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "eternity-server", version, about = "Eternity guild bot: member directory, polls and roster board")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/eternity.toml")]
    pub config: String,
}
