use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[clap(author, version)]
#[clap(name = "Chess Policy Self Learning Client")]
#[clap(about = "Trains a language model chess policy from engine scored self-play", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Runs the training loop, resuming from the latest checkpoint.
    Train(TrainCommand),
    /// Plays and scores a single rollout with the base policy, printed as JSON.
    Rollout(RolloutCommand),
}

#[derive(Args)]
pub struct TrainCommand {
    #[clap(short, long, default_value_t = String::from("client.conf"))]
    pub config: String,
}

#[derive(Args)]
pub struct RolloutCommand {
    #[clap(short, long, default_value_t = String::from("client.conf"))]
    pub config: String,
}
