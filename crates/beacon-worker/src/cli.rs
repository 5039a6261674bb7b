use beacon_scheduler::QueueName;
use clap::{Parser, ValueEnum};

/// Worker process: claims due jobs from the trigger and archive queues.
#[derive(Debug, Parser)]
#[command(name = "beacon-worker", version, about)]
pub struct Args {
    /// Path to beacon.toml (defaults to ~/.beacon/beacon.toml).
    #[arg(short, long, env = "BEACON_CONFIG")]
    pub config: Option<String>,

    /// Which queue(s) this process consumes.
    #[arg(short, long, value_enum, default_value_t = QueueChoice::All)]
    pub queue: QueueChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueChoice {
    Trigger,
    Archive,
    All,
}

impl QueueChoice {
    pub fn queues(self) -> Vec<QueueName> {
        match self {
            QueueChoice::Trigger => vec![QueueName::Trigger],
            QueueChoice::Archive => vec![QueueName::Archive],
            QueueChoice::All => QueueName::ALL.to_vec(),
        }
    }
}
