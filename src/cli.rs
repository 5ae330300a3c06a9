use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "calendar-api", version, about = "Calendar events REST service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Apply pending migrations, provision the admin user, then serve HTTP (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Print the state of every migration and exit
    MigrateStatus,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}
