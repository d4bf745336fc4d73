// src/render.rs
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, ImageResult, Rgb, RgbImage};
use std::io::Cursor;
use tabled::{settings::Style, Table, Tabled};

use crate::report::Report;

const GLYPH: u32 = 8;
const SCALE: u32 = 2;
const PADDING: u32 = 24;
const LINE_GAP: u32 = 4;

const BACKGROUND: Rgb<u8> = Rgb([17, 20, 28]);
const FOREGROUND: Rgb<u8> = Rgb([226, 232, 240]);

#[derive(Tabled)]
struct PoolRow {
    #[tabled(rename = "Pool")]
    name: String,
    #[tabled(rename = "APY (30d)")]
    apy: String,
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "AMP")]
    amp: String,
}

/// ASCII table of the per-pool lines.
pub fn report_table(report: &Report) -> String {
    let rows = report.pools.iter().map(|line| PoolRow {
        name: line.name.clone(),
        apy: line.apy_30d.clone(),
        capacity: line.capacity.clone(),
        amp: format!("{} {}", line.amount, line.delta).trim_end().to_string(),
    });

    let mut table = Table::new(rows);
    table.with(Style::ascii());
    table.to_string()
}

/// Post text accompanying the table image.
pub fn status_text(bot_name: &str, report: &Report) -> String {
    format!(
        "{bot_name} TVL update\n\nSpending Capacity: {}\nStaked AMP: {}",
        report.spending_capacity.render("$"),
        report.staked_amp.render(""),
    )
}

/// Rasterise monospaced text onto a PNG with an 8x8 bitmap font.
pub fn table_png(text: &str) -> ImageResult<Vec<u8>> {
    let lines: Vec<&str> = text.lines().collect();
    let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;

    let cell = GLYPH * SCALE;
    let line_height = cell + LINE_GAP * SCALE;
    let width = columns.max(1) * cell + 2 * PADDING;
    let height = (lines.len().max(1) as u32) * line_height + 2 * PADDING;

    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    for (row, line) in lines.iter().enumerate() {
        let y = PADDING + row as u32 * line_height;
        for (col, ch) in line.chars().enumerate() {
            let x = PADDING + col as u32 * cell;
            draw_glyph(&mut img, x, y, ch);
        }
    }

    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

fn draw_glyph(img: &mut RgbImage, x: u32, y: u32, ch: char) {
    let Some(bitmap) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
        return;
    };

    // each byte is one row, least significant bit is the leftmost pixel
    for (gy, bits) in bitmap.iter().enumerate() {
        for gx in 0..GLYPH {
            if bits & (1 << gx) == 0 {
                continue;
            }
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    img.put_pixel(x + gx * SCALE + dx, y + gy as u32 * SCALE + dy, FOREGROUND);
                }
            }
        }
    }
}
