//! PokeAPI client for species metadata and flavor text
//!
//! Every call is a single GET with no retries; retry policy belongs to the
//! caller. Responses that decode to an all-empty value are rejected, since
//! that means the API answered with something other than a species.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ContentError, Result};
use crate::types::{BaseStat, CandidateId, SpeciesRecord};

#[derive(Debug, Default, Deserialize)]
struct PokemonResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    sprites: Sprites,
    #[serde(default)]
    stats: Vec<StatEntry>,
    #[serde(default)]
    types: Vec<TypeEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct Sprites {
    #[serde(default)]
    other: OtherSprites,
}

#[derive(Debug, Default, Deserialize)]
struct OtherSprites {
    #[serde(rename = "official-artwork", default)]
    official_artwork: Artwork,
}

#[derive(Debug, Default, Deserialize)]
struct Artwork {
    #[serde(default)]
    front_default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    base_stat: u32,
    stat: NamedResource,
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    #[serde(default)]
    slot: u32,
    #[serde(rename = "type")]
    kind: NamedResource,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct SpeciesResponse {
    #[serde(default)]
    flavor_text_entries: Vec<FlavorTextEntry>,
}

#[derive(Debug, Deserialize)]
struct FlavorTextEntry {
    flavor_text: String,
    language: NamedResource,
}

impl From<PokemonResponse> for SpeciesRecord {
    fn from(response: PokemonResponse) -> Self {
        let mut types = response.types;
        types.sort_by_key(|t| t.slot);

        SpeciesRecord {
            name: response.name,
            types: types.into_iter().map(|t| t.kind.name).collect(),
            stats: response
                .stats
                .into_iter()
                .map(|s| BaseStat {
                    name: s.stat.name,
                    value: s.base_stat,
                })
                .collect(),
            sprite_url: response
                .sprites
                .other
                .official_artwork
                .front_default
                .filter(|url| !url.is_empty()),
        }
    }
}

/// Client for the two read-only PokeAPI endpoints the publisher needs
#[derive(Debug, Clone)]
pub struct PokeApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl PokeApiClient {
    /// Create a client against `base_url` (e.g. "https://pokeapi.co/api/v2")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch name, types, base stats, and artwork URL for species `id`
    ///
    /// # Errors
    ///
    /// Returns `ContentError` on transport failure, a non-success status,
    /// an undecodable body, or a body that carries no species data at all.
    pub async fn fetch_species(&self, id: CandidateId) -> Result<SpeciesRecord> {
        let target = format!("pokemon/{}", id);
        let response: PokemonResponse = self.get_json("fetch species", &target).await?;

        let species = SpeciesRecord::from(response);
        if species.is_empty() {
            return Err(ContentError::Empty {
                operation: "fetch species",
                target,
            }
            .into());
        }

        debug!(%id, name = %species.name, "Fetched species");
        Ok(species)
    }

    /// Fetch the first English flavor text entry for species `id`
    ///
    /// Whitespace runs (the API embeds hard line breaks and form feeds) are
    /// collapsed to single spaces.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::MissingEnglishFlavorText` when no entry is
    /// tagged `en`, in addition to the transport/decode errors of
    /// [`fetch_species`](Self::fetch_species).
    pub async fn fetch_flavor_text(&self, id: CandidateId) -> Result<String> {
        let target = format!("pokemon-species/{}", id);
        let response: SpeciesResponse = self.get_json("fetch flavor text", &target).await?;

        if response.flavor_text_entries.is_empty() {
            return Err(ContentError::Empty {
                operation: "fetch flavor text",
                target,
            }
            .into());
        }

        let flavor_text = response
            .flavor_text_entries
            .into_iter()
            .find(|entry| entry.language.name == "en")
            .map(|entry| normalize_flavor_text(&entry.flavor_text))
            .filter(|text| !text.is_empty())
            .ok_or(ContentError::MissingEnglishFlavorText { id })?;

        Ok(flavor_text)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        target: &str,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, target);
        debug!(%url, operation, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ContentError::Request {
                operation,
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Status {
                operation,
                target: target.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.bytes().await.map_err(|e| ContentError::Request {
            operation,
            target: target.to_string(),
            reason: e.to_string(),
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            ContentError::Decode {
                operation,
                target: target.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Collapse every whitespace run (including form feeds) to a single space
pub fn normalize_flavor_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
