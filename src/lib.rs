//! Asset/sats swap engine and price oracle.
//!
//! The swap side selects channels with a peer, negotiates a quote, pays one
//! leg and tracks what the other leg delivered. The oracle side turns a
//! polled reference price into fixed-point asset rates for the market maker.

pub mod channels;
pub mod config;
pub mod errors;
pub mod feed;
pub mod models;
pub mod negotiator;
pub mod oracle;
pub mod rates;
pub mod rpc;
pub mod swap;
pub mod tracker;
pub mod utils;

#[cfg(test)]
mod fakes;
