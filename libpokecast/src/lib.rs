//! Pokecast - a "Pokemon of the day" publisher for Bluesky
//!
//! This library picks a species that has not been featured yet, builds a
//! post from PokeAPI data, publishes it over the AT Protocol, and records
//! the choice so it is never repeated.

pub mod bluesky;
pub mod chart;
pub mod compose;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod media;
pub mod pokeapi;
pub mod publisher;
pub mod types;

// Re-export commonly used types
pub use bluesky::{BlueskyClient, Credentials, Session};
pub use config::Config;
pub use error::{PokecastError, Result};
pub use history::{open_history, HistoryStore};
pub use publisher::{CandidateSource, PublishOutcome, Publisher, PublisherOptions};
pub use types::{CandidateId, MediaBlob, SpeciesRecord};
