pub mod errors;

pub mod cache;

pub mod clock;

pub mod consensus;

pub mod context;

pub mod dkg;

pub mod election;

pub mod future;

pub mod genesis;

pub mod messages;

pub mod monitor;

pub mod network;

pub mod processor;

pub mod store;

pub mod types;

pub mod wire;
