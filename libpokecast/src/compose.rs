//! Post composition
//!
//! Turns a species record and its flavor text into post text, link facets,
//! and the list of images to attach. Composition is pure: nothing here
//! touches the network. Uploading the images and turning the result into a
//! [`PostRecord`] are separate steps so the caller decides when blobs leave
//! the process.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::bluesky::{BlobRef, Embed, EmbedImage, Facet, PostRecord, POST_COLLECTION};
use crate::error::{PokecastError, Result};
use crate::types::{BaseStat, CandidateId, MediaBlob, SpeciesRecord};

/// Display order for stats, independent of the order the API returns them in
pub const STAT_ORDER: [&str; 6] = [
    "hp",
    "attack",
    "defense",
    "special-attack",
    "special-defense",
    "speed",
];

/// An image to attach once uploaded
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub alt: String,
    pub blob: MediaBlob,
}

impl PendingImage {
    pub fn new(alt: impl Into<String>, blob: MediaBlob) -> Self {
        Self {
            alt: alt.into(),
            blob,
        }
    }
}

/// Composed post content, before image upload
#[derive(Debug, Clone)]
pub struct ComposedPost {
    pub text: String,
    pub facets: Vec<Facet>,
    pub images: Vec<PendingImage>,
}

impl ComposedPost {
    /// Build the record to publish
    ///
    /// `blob_refs` pairs with `images` by position; an empty slice means the
    /// post goes out without an embed.
    pub fn to_record(&self, blob_refs: &[BlobRef], created_at: DateTime<Utc>) -> PostRecord {
        let embed = if blob_refs.is_empty() {
            None
        } else {
            Some(Embed::images(
                self.images
                    .iter()
                    .zip(blob_refs)
                    .map(|(image, blob_ref)| EmbedImage {
                        alt: image.alt.clone(),
                        image: blob_ref.clone(),
                    })
                    .collect(),
            ))
        };

        PostRecord {
            kind: POST_COLLECTION.to_string(),
            text: self.text.clone(),
            created_at: format_created_at(created_at),
            facets: self.facets.clone(),
            embed,
        }
    }
}

/// RFC3339 in UTC with millisecond precision, e.g. `2026-10-16T09:30:00.000Z`
pub fn format_created_at(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Compose the post for species `id`
///
/// Empty stats, an empty type list, or no link template simply drop the
/// corresponding section. The species name is mandatory.
///
/// # Errors
///
/// Returns `PokecastError::Composition` when the species name or the
/// resulting text is empty.
pub fn compose(
    id: CandidateId,
    species: &SpeciesRecord,
    flavor_text: &str,
    link_template: Option<&str>,
    images: Vec<PendingImage>,
) -> Result<ComposedPost> {
    let name = species.name.trim();
    if name.is_empty() {
        return Err(PokecastError::Composition(format!(
            "species #{} has no name",
            id
        )));
    }

    let mut sections = vec![format!(
        "Today's #Pokemon of the day is {}",
        title_case(name)
    )];

    if !species.types.is_empty() {
        let types: Vec<String> = species.types.iter().map(|t| title_case(t)).collect();
        sections.push(format!("Type: {}", types.join("/")));
    }

    let flavor_text = flavor_text.trim();
    if !flavor_text.is_empty() {
        sections.push(flavor_text.to_string());
    }

    if !species.stats.is_empty() {
        let mut lines: Vec<String> = ordered_stats(&species.stats)
            .into_iter()
            .map(|stat| format!("{} - {}", format_stat_name(&stat.name), stat.value))
            .collect();
        lines.push(format!("BST - {}", species.base_stat_total()));
        sections.push(lines.join("\n"));
    }

    let mut text = sections.join("\n\n");
    let mut facets = Vec::new();

    if let Some(link) = link_template
        .map(|template| render_link(template, name, id))
        .filter(|link| !link.is_empty())
    {
        text.push_str("\n\n");
        let byte_start = text.len();
        text.push_str(&link);
        facets.push(Facet::link(byte_start, text.len(), link));
    }

    if text.trim().is_empty() {
        return Err(PokecastError::Composition(format!(
            "post text for #{} is empty",
            id
        )));
    }

    Ok(ComposedPost {
        text,
        facets,
        images,
    })
}

/// Substitute `{name}` (lowercase API name) and `{id}` into a link template
pub fn render_link(template: &str, name: &str, id: CandidateId) -> String {
    template
        .replace("{name}", &name.to_lowercase())
        .replace("{id}", &id.to_string())
        .trim()
        .to_string()
}

/// Alt text for the official artwork image
pub fn sprite_alt_text(name: &str) -> String {
    format!("official artwork of the pokemon {}", title_case(name))
}

/// Stats sorted by [`STAT_ORDER`]; unknown stat names follow in input order
pub fn ordered_stats(stats: &[BaseStat]) -> Vec<&BaseStat> {
    let rank = |stat: &BaseStat| {
        STAT_ORDER
            .iter()
            .position(|known| *known == stat.name)
            .unwrap_or(STAT_ORDER.len())
    };

    let mut ordered: Vec<&BaseStat> = stats.iter().collect();
    // Stable sort keeps unknown stats in response order
    ordered.sort_by_key(|stat| rank(*stat));
    ordered
}

/// Lowercase, then capitalize the first letter of every word
///
/// Words are separated by anything that is not alphanumeric, so
/// "mr-mime" becomes "Mr-Mime".
pub fn title_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut at_word_start = true;

    for c in s.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                result.extend(c.to_uppercase());
            } else {
                result.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            result.push(c);
            at_word_start = true;
        }
    }
    result
}

/// "special-attack" → "Special Attack"
pub fn format_stat_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            '-' | '_' => Some(' '),
            c if c.is_ascii_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();
    title_case(cleaned.trim())
}
