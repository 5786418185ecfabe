pub mod account;
pub mod action;
pub mod audit;
pub mod ports;
pub mod request;
