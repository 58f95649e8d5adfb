use thiserror::Error;
use tracing::instrument;

/// One row of the roster: a member handle and the role it should receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub line: u64,
    pub handle: String,
    pub role_name: String,
}

impl RosterEntry {
    #[instrument(level = "trace", skip(fields))]
    pub fn from_fields<I, S>(line: u64, fields: I) -> Result<Self, RosterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Vec<String> = fields.into_iter().map(Into::into).collect();

        if fields.len() != 2 {
            return Err(RosterError::Malformed {
                line,
                reason: format!("expected 2 fields, found {}", fields.len()),
            });
        }

        let role_name = fields.pop().unwrap_or_default();
        let handle = fields.pop().unwrap_or_default();

        Ok(Self {
            line,
            handle,
            role_name,
        })
    }
}

pub type RosterEntries = Box<dyn Iterator<Item = Result<RosterEntry, RosterError>> + Send>;

#[cfg_attr(feature = "mock", mockall::automock)]
pub trait RosterRepository {
    /// Opens the roster from the start. Entries are read lazily; reopening is
    /// the only way to restart the sequence.
    fn open(&self) -> Result<RosterEntries, RosterError>;
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Roster is unavailable: {0}")]
    Unavailable(String),
    #[error("Roster row at line {line} is malformed: {reason}")]
    Malformed { line: u64, reason: String },
}
