//! Base-stat bar chart
//!
//! One horizontal bar per stat, top to bottom in [`STAT_ORDER`](crate::compose::STAT_ORDER) so charts
//! for different species line up row for row. Bars are scaled against the
//! largest possible base stat (255). There is no text in the image; the
//! numbers travel in the alt text instead.

use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::compose::{format_stat_name, ordered_stats, title_case};
use crate::error::{PokecastError, Result};
use crate::types::{ImageMimeType, MediaBlob, SpeciesRecord};

pub const MAX_BASE_STAT: u32 = 255;

const CHART_WIDTH: u32 = 600;
const PADDING: u32 = 24;
const BAR_HEIGHT: u32 = 36;
const BAR_GAP: u32 = 16;
const TRACK_WIDTH: u32 = CHART_WIDTH - 2 * PADDING;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRACK: Rgba<u8> = Rgba([230, 230, 230, 255]);

/// Bar colour by value band, low to high
fn bar_color(value: u32) -> Rgba<u8> {
    match value {
        0..=59 => Rgba([243, 68, 68, 255]),
        60..=89 => Rgba([255, 127, 15, 255]),
        90..=119 => Rgba([255, 221, 87, 255]),
        120..=149 => Rgba([160, 229, 21, 255]),
        _ => Rgba([35, 205, 94, 255]),
    }
}

/// Pixel length of the filled part of a bar
pub fn bar_length(value: u32) -> u32 {
    let clamped = value.min(MAX_BASE_STAT);
    ((u64::from(TRACK_WIDTH) * u64::from(clamped)) / u64::from(MAX_BASE_STAT)) as u32
}

fn row_top(row: u32) -> u32 {
    PADDING + row * (BAR_HEIGHT + BAR_GAP)
}

fn fill_rect(img: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>) {
    for py in y..(y + height).min(img.height()) {
        for px in x..(x + width).min(img.width()) {
            img.put_pixel(px, py, color);
        }
    }
}

/// Render the stats of `species` as a PNG
///
/// Returns `Ok(None)` when the species has no stats.
///
/// # Errors
///
/// Returns `PokecastError::Composition` if PNG encoding fails.
pub fn render_stats_chart(species: &SpeciesRecord) -> Result<Option<MediaBlob>> {
    let stats = ordered_stats(&species.stats);
    if stats.is_empty() {
        return Ok(None);
    }

    let rows = stats.len() as u32;
    let height = row_top(rows) - BAR_GAP + PADDING;
    let mut img = RgbaImage::from_pixel(CHART_WIDTH, height, BACKGROUND);

    for (row, stat) in stats.iter().enumerate() {
        let top = row_top(row as u32);
        fill_rect(&mut img, PADDING, top, TRACK_WIDTH, BAR_HEIGHT, TRACK);
        fill_rect(
            &mut img,
            PADDING,
            top,
            bar_length(stat.value),
            BAR_HEIGHT,
            bar_color(stat.value),
        );
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| PokecastError::Composition(format!("failed to encode stats chart: {}", e)))?;

    Ok(Some(MediaBlob::new(bytes, ImageMimeType::Png)))
}

/// Alt text listing every charted stat in chart order, then the total
pub fn chart_alt_text(species: &SpeciesRecord) -> String {
    let stats: Vec<String> = ordered_stats(&species.stats)
        .into_iter()
        .map(|stat| format!("{} {}", format_stat_name(&stat.name), stat.value))
        .collect();

    format!(
        "bar chart of the base stats of {}, top to bottom: {}; total {}",
        title_case(species.name.trim()),
        stats.join(", "),
        species.base_stat_total()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::STAT_ORDER;
    use crate::types::BaseStat;

    fn species(stats: &[(&str, u32)]) -> SpeciesRecord {
        SpeciesRecord {
            name: "pikachu".to_string(),
            types: vec!["electric".to_string()],
            stats: stats
                .iter()
                .map(|(name, value)| BaseStat {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
            sprite_url: None,
        }
    }

    fn pikachu() -> SpeciesRecord {
        species(&[
            ("speed", 90),
            ("hp", 35),
            ("attack", 55),
            ("defense", 40),
            ("special-attack", 50),
            ("special-defense", 50),
        ])
    }

    #[test]
    fn test_no_stats_no_chart() {
        assert!(render_stats_chart(&species(&[])).unwrap().is_none());
    }

    #[test]
    fn test_chart_is_valid_png() {
        let blob = render_stats_chart(&pikachu()).unwrap().unwrap();
        assert_eq!(blob.mime_type, ImageMimeType::Png);
        assert!(blob.ensure_within_limit().is_ok());

        let decoded = image::load_from_memory(&blob.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.width(), CHART_WIDTH);
        assert_eq!(decoded.height(), row_top(STAT_ORDER.len() as u32) - BAR_GAP + PADDING);
    }

    #[test]
    fn test_rows_follow_fixed_order() {
        let blob = render_stats_chart(&pikachu()).unwrap().unwrap();
        let decoded = image::load_from_memory(&blob.bytes).unwrap().to_rgba8();

        // Row 0 is hp (35): filled just inside the bar, track beyond it
        let y = row_top(0) + BAR_HEIGHT / 2;
        assert_eq!(*decoded.get_pixel(PADDING, y), bar_color(35));
        assert_eq!(*decoded.get_pixel(PADDING + bar_length(35) + 1, y), TRACK);

        // Row 5 is speed (90) even though the API listed it first
        let y = row_top(5) + BAR_HEIGHT / 2;
        assert_eq!(*decoded.get_pixel(PADDING, y), bar_color(90));
        assert_eq!(*decoded.get_pixel(PADDING + bar_length(90) - 1, y), bar_color(90));
    }

    #[test]
    fn test_bar_length_scales_and_clamps() {
        assert_eq!(bar_length(0), 0);
        assert_eq!(bar_length(255), TRACK_WIDTH);
        assert_eq!(bar_length(300), TRACK_WIDTH);
        assert!(bar_length(100) <= bar_length(101));
    }

    #[test]
    fn test_alt_text_lists_stats_in_order() {
        assert_eq!(
            chart_alt_text(&pikachu()),
            "bar chart of the base stats of Pikachu, top to bottom: Hp 35, Attack 55, \
             Defense 40, Special Attack 50, Special Defense 50, Speed 90; total 320"
        );
    }
}
