//! DreamPool concierge.
//!
//! Negotiates a crowdfunding goal with the user over chat (through a remote
//! goal extractor), turns the finished conversation into exactly one
//! `createPool` call and lists the pools stored in the DreamPool contract.

pub mod abi;
pub mod api;
pub mod config;
pub mod conversation;
pub mod errors;
pub mod extractor;
pub mod finalize;
pub mod pools;
pub mod rpc;
pub mod session;
pub mod store;
pub mod transactions;
pub mod units;
pub mod wallet;
