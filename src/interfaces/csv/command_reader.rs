use crate::application::escrow::{CancelOutcome, EscrowCreated, EscrowService, ReleaseOutcome};
use crate::domain::guard::{Actor, ActorRole};
use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Create,
    Release,
    Cancel,
}

/// One row of the commands file.
///
/// `amount`/`currency` are read by `create`, `force` by `release` and `reason`
/// by `cancel`; the other columns may be left empty.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct EscrowCommand {
    pub command: CommandType,
    pub order: String,
    pub actor: String,
    pub role: Option<ActorRole>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub force: Option<bool>,
    pub reason: Option<String>,
}

/// What a command did when applied.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Created(EscrowCreated),
    Released(ReleaseOutcome),
    Cancelled(CancelOutcome),
}

impl EscrowCommand {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.actor.clone(),
            role: self.role.unwrap_or_default(),
        }
    }

    /// Runs the command against `service`. A missing currency means USD.
    pub async fn apply(&self, service: &EscrowService) -> Result<CommandOutcome> {
        let actor = self.actor();
        match self.command {
            CommandType::Create => {
                let amount = self.amount.ok_or_else(|| {
                    EscrowError::ValidationError("create requires an amount".to_string())
                })?;
                let currency = self.currency.as_deref().unwrap_or("usd");
                service
                    .create_escrow(&self.order, amount, currency, &actor)
                    .await
                    .map(CommandOutcome::Created)
            }
            CommandType::Release => service
                .release_escrow(&self.order, &actor, self.force.unwrap_or(false))
                .await
                .map(CommandOutcome::Released),
            CommandType::Cancel => service
                .cancel_escrow(&self.order, &actor, self.reason.as_deref().unwrap_or(""))
                .await
                .map(CommandOutcome::Cancelled),
        }
    }
}

/// Reads escrow commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<EscrowCommand>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<EscrowCommand>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EscrowError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "command, order, actor, role, amount, currency, force, reason";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{}\ncreate, O1, B, , 100.00, usd, ,\nrelease, O1, A, admin, , , true,\ncancel, O2, B, user, , , ,\"changed my mind, sorry\"",
            HEADER
        );
        let reader = CommandReader::new(data.as_bytes());
        let results: Vec<Result<EscrowCommand>> = reader.commands().collect();

        assert_eq!(results.len(), 3);
        let create = results[0].as_ref().unwrap();
        assert_eq!(create.command, CommandType::Create);
        assert_eq!(create.amount, Some(dec!(100.00)));
        assert_eq!(create.actor(), Actor::user("B"));

        let release = results[1].as_ref().unwrap();
        assert_eq!(release.force, Some(true));
        assert!(release.actor().is_admin());

        let cancel = results[2].as_ref().unwrap();
        assert_eq!(cancel.reason.as_deref(), Some("changed my mind, sorry"));
    }

    #[test]
    fn test_reader_short_rows() {
        let data = format!("{}\nrelease, O1, S", HEADER);
        let reader = CommandReader::new(data.as_bytes());
        let command = reader.commands().next().unwrap().unwrap();
        assert_eq!(command.command, CommandType::Release);
        assert_eq!(command.force, None);
        assert_eq!(command.reason, None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = format!("{}\nrefund, O1, B, , , , ,", HEADER);
        let reader = CommandReader::new(data.as_bytes());
        let results: Vec<Result<EscrowCommand>> = reader.commands().collect();

        assert!(results[0].is_err());
    }
}
