//! Terminal rendering of pairing challenges.

use qrcode::QrCode;
use qrcode::render::unicode;

/// Render a QR payload as block characters for a terminal.
///
/// Returns `None` when the payload does not fit in a QR code.
pub fn render_qr(payload: &str) -> Option<String> {
    let code = QrCode::new(payload.as_bytes()).ok()?;
    Some(
        code.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}
