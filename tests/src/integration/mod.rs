//! Cross-crate scenarios: host bridge and sandbox runtime talking over a
//! duplex channel, nothing mocked.


pub mod boundary;
pub mod failures;
pub mod scenarios;
