//! Pairing code rendering: Unicode for the console, PNG for `/qr`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use image::{ImageBuffer, Luma};
use qrcode::{Color, EcLevel, QrCode};

use wabridge_core::PairingChallenge;

const MODULE_SIZE: u32 = 8;
const QUIET_ZONE: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("QR generation failed: {0}")]
    Encode(String),

    #[error("PNG encoding failed: {0}")]
    Png(String),
}

fn encode(code: &str) -> Result<QrCode, QrError> {
    QrCode::with_error_correction_level(code.as_bytes(), EcLevel::L)
        .map_err(|e| QrError::Encode(e.to_string()))
}

/// Render a compact QR code using Unicode half-block characters.
///
/// Packs two rows of modules into one line of text using `▀`, `▄`, `█`, and space.
pub fn render_terminal(code: &str) -> Result<String, QrError> {
    let qr = encode(code)?;
    let width = qr.width();
    let colors = qr.into_colors();
    let is_dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::new();
    let mut row = 0;
    while row < width {
        for col in 0..width {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
        row += 2;
    }
    Ok(out)
}

/// Render the code as a grayscale PNG with a white quiet zone.
pub fn render_png(code: &str) -> Result<Vec<u8>, QrError> {
    let qr = encode(code)?;
    let modules = qr.width() as u32;
    let img_size = (modules + QUIET_ZONE * 2) * MODULE_SIZE;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let (cx, cy) = (x / MODULE_SIZE, y / MODULE_SIZE);
        if cx < QUIET_ZONE || cy < QUIET_ZONE {
            return Luma([255u8]);
        }
        let (mx, my) = (cx - QUIET_ZONE, cy - QUIET_ZONE);
        if mx >= modules || my >= modules {
            return Luma([255u8]);
        }
        match qr[(mx as usize, my as usize)] {
            Color::Dark => Luma([0u8]),
            Color::Light => Luma([255u8]),
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| QrError::Png(e.to_string()))?;
    Ok(buf.into_inner())
}

pub fn png_data_url(code: &str) -> Result<String, QrError> {
    let png = render_png(code)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Build the cached challenge for a freshly issued pairing code.
pub fn challenge(code: &str) -> Result<PairingChallenge, QrError> {
    Ok(PairingChallenge {
        code: code.to_string(),
        data_url: png_data_url(code)?,
        issued_at: Utc::now(),
    })
}
