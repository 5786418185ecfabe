use crate::domain::account::Account;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AccountRow<'a> {
    account: &'a str,
    owner: &'a str,
    balance: String,
    locked: bool,
}

/// Writes the final account state as CSV: `account,owner,balance,locked`.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts<I>(&mut self, accounts: I) -> Result<()>
    where
        I: IntoIterator<Item = Account>,
    {
        for account in accounts {
            self.writer.serialize(AccountRow {
                account: account.id.as_str(),
                owner: &account.owner,
                balance: account.balance.to_string(),
                locked: account.is_locked(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
