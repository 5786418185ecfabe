pub mod account_writer;
pub mod action_reader;
