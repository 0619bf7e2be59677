pub mod chain;

pub mod config;

pub mod node;

pub mod test_helpers;
