//! Backend for a whitelisted on-chain token sale: typed access to the sale and
//! token contracts, plus the HTTP surface in front of them.

pub mod config;
pub mod ethereum;
pub mod server;
