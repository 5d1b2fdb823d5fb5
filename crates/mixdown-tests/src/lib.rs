//! Integration test crate for the mixdown engine.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives `mixdown-engine` mixers over `mixdown-core` formats and
//! envelopes end to end.


#[cfg(test)]
mod mixing;

#[cfg(test)]
mod routing;

#[cfg(test)]
mod formats;
