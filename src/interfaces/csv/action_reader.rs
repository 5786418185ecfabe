use crate::domain::action::Action;
use crate::error::{LedgerError, Result};
use std::io::Read;

/// Reads actions from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Action>`.
/// Whitespace is trimmed and short rows are accepted, so trailing optional
/// columns can be left out.
pub struct ActionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ActionReader<R> {
    /// Creates a new `ActionReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes actions.
    pub fn actions(self) -> impl Iterator<Item = Result<Action>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
