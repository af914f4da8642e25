//! Command-line interface of the `stockguard` binary.

use clap::{Parser, Subcommand};
use stockguard_core::ItemId;

/// Stock reservation operations.
#[derive(Debug, Parser)]
#[command(name = "stockguard", version, about)]
pub struct Cli {
    /// What to run
    #[command(subcommand)]
    pub command: Command,
}

/// A parsed subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the reconciliation consumer pool until SIGINT/SIGTERM
    Worker,
    /// Overwrite fast-store counts from the ledger
    SyncStock {
        /// Item to sync; every active item when omitted
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        item_id: Option<i64>,
    },
    /// Apply the database schema
    Migrate,
    /// Insert the demo catalog when the items table is empty
    Seed,
}

impl Command {
    /// Item selected by `sync-stock`, if any.
    #[must_use]
    pub const fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::SyncStock {
                item_id: Some(id),
            } => Some(ItemId::new(*id)),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Cli::try_parse_from(std::iter::once("stockguard").chain(args.iter().copied()))
            .map(|cli| cli.command)
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(parse(&["worker"]).unwrap(), Command::Worker);
        assert_eq!(parse(&["migrate"]).unwrap(), Command::Migrate);
        assert_eq!(parse(&["seed"]).unwrap(), Command::Seed);
        assert_eq!(
            parse(&["sync-stock"]).unwrap(),
            Command::SyncStock { item_id: None }
        );

        let command = parse(&["sync-stock", "42"]).unwrap();
        assert_eq!(command, Command::SyncStock { item_id: Some(42) });
        assert_eq!(command.item_id(), Some(ItemId::new(42)));
    }

    #[test]
    fn rejects_non_positive_item_ids() {
        for raw in ["0", "abc"] {
            let err = parse(&["sync-stock", raw]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation, "{raw}");
        }
    }

    #[test]
    fn rejects_missing_unknown_and_extra() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["serve"]).is_err());
        assert!(parse(&["seed", "now"]).is_err());
        assert!(parse(&["sync-stock", "1", "2"]).is_err());
    }
}
