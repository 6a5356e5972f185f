//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "rustplus", about = "Rust+ companion client", version)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/rustplus/config.toml)
    #[arg(long, short = 'c', global = true, env = "RUSTPLUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print query results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Seconds to wait for a response
    #[arg(long, global = true, default_value = "10")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Server name, map and population
    Info,
    /// In-game time of day
    Time,
    /// Map size and monuments
    Map,
    /// Map markers (players, vending machines, events)
    Markers,
    /// Team roster
    Team,
    /// Recent team chat
    Chat,
    /// Send a team chat message
    Say {
        message: Vec<String>,
    },
    /// Turn a smart switch on or off
    Switch {
        id: u32,
        #[arg(value_enum)]
        state: SwitchState,
    },
    /// Resolve an entity and print its type and state
    Entity {
        id: u32,
    },
    /// Stream entity updates, team chat and team changes until ctrl-c
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_bool(self) -> bool {
        self == Self::On
    }
}

/// Default config path: `$XDG_CONFIG_HOME/rustplus/config.toml`, falling
/// back to `~/.config/rustplus/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("rustplus/config.toml");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/rustplus/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_switch_command() {
        let cli = Cli::try_parse_from(["rustplus", "--json", "switch", "42", "on"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Command::Switch { id, state } => {
                assert_eq!(id, 42);
                assert!(state.as_bool());
            }
            _ => panic!("expected switch"),
        }
    }

    #[test]
    fn say_joins_words() {
        let cli = Cli::try_parse_from(["rustplus", "say", "raid", "at", "B4"]).unwrap();
        match cli.command {
            Command::Say { message } => assert_eq!(message.join(" "), "raid at B4"),
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn rejects_bad_switch_state() {
        assert!(Cli::try_parse_from(["rustplus", "switch", "1", "maybe"]).is_err());
    }
}
