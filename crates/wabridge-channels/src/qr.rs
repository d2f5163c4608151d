//! Pairing QR rendering: terminal text for the log, PNG for the API.

use qrcode::{Color, EcLevel, QrCode};
use wabridge_core::error::BridgeError;

fn encode(payload: &str) -> Result<QrCode, BridgeError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(BridgeError::Qr("QR payload is empty".into()));
    }
    QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
        .map_err(|e| BridgeError::Qr(format!("QR generation failed: {e}")))
}

/// Render a pairing code with Unicode half blocks, two module rows per line.
pub fn render_terminal(payload: &str) -> Result<String, BridgeError> {
    let code = encode(payload)?;
    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2));
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

/// Render a pairing code as PNG bytes with a white quiet zone.
pub fn render_png(payload: &str) -> Result<Vec<u8>, BridgeError> {
    use image::{ImageBuffer, ImageFormat, Luma};

    const MODULE_PX: u32 = 10;
    const QUIET_ZONE: u32 = 2;

    let code = encode(payload)?;
    let modules = code.width() as u32;
    let side = (modules + QUIET_ZONE * 2) * MODULE_PX;

    let img = ImageBuffer::from_fn(side, side, |x, y| {
        let (mx, my) = (x / MODULE_PX, y / MODULE_PX);
        let inside = (QUIET_ZONE..QUIET_ZONE + modules).contains(&mx)
            && (QUIET_ZONE..QUIET_ZONE + modules).contains(&my);
        if inside
            && code[((mx - QUIET_ZONE) as usize, (my - QUIET_ZONE) as usize)] == Color::Dark
        {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| BridgeError::Qr(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}
