//! Color parsing utilities
//!
//! Used by `--background` and by the alpha flattening step of the
//! default image preparer.

/// Parse 6-digit hex color (e.g., "ff0000" -> (255, 0, 0))
/// Also supports 3-digit short format (e.g., "f00" -> (255, 0, 0))
/// Returns None on invalid input.
pub fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        3 => {
            // Short format: expand F -> FF
            let r = u8::from_str_radix(&hex[0..1], 16).ok()? * 17;
            let g = u8::from_str_radix(&hex[1..2], 16).ok()? * 17;
            let b = u8::from_str_radix(&hex[2..3], 16).ok()? * 17;
            Some((r, g, b))
        }
        _ => None,
    }
}

/// Parse X11 style `rgb:RR/GG/BB` (1 to 4 hex digits per component)
fn parse_x11_rgb(rgb: &str) -> Option<(u8, u8, u8)> {
    let parts: Vec<&str> = rgb.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    // Use high byte of 16-bit values
    let parse_component = |s: &str| -> Option<u8> {
        let v = u16::from_str_radix(s, 16).ok()?;
        match s.len() {
            4 => Some((v >> 8) as u8),
            3 => Some((v >> 4) as u8),
            2 => Some(v as u8),
            1 => Some((v as u8) * 17),
            _ => None,
        }
    };

    let r = parse_component(parts[0])?;
    let g = parse_component(parts[1])?;
    let b = parse_component(parts[2])?;
    Some((r, g, b))
}

/// Parse a user supplied color specification.
///
/// Supported formats:
/// - #RRGGBB, #RGB, RRGGBB, RGB
/// - rgb:RR/GG/BB (X11 format)
/// - basic color names (black, white, red, green, blue, yellow, cyan, magenta, gray)
pub fn parse_color_spec(spec: &str) -> Option<(u8, u8, u8)> {
    let spec = spec.trim();
    if let Some(rgb) = spec.strip_prefix("rgb:") {
        return parse_x11_rgb(rgb);
    }
    let named = match spec.to_ascii_lowercase().as_str() {
        "black" => Some((0, 0, 0)),
        "white" => Some((255, 255, 255)),
        "red" => Some((255, 0, 0)),
        "green" => Some((0, 255, 0)),
        "blue" => Some((0, 0, 255)),
        "yellow" => Some((255, 255, 0)),
        "cyan" => Some((0, 255, 255)),
        "magenta" => Some((255, 0, 255)),
        "gray" | "grey" => Some((190, 190, 190)),
        _ => None,
    };
    named.or_else(|| parse_hex_color(spec))
}

/// Composite an RGBA pixel over an opaque background, returning RGB.
#[inline]
pub fn flatten_pixel(px: [u8; 4], bg: (u8, u8, u8)) -> [u8; 3] {
    let a = px[3] as u32;
    let blend = |fg: u8, bg: u8| -> u8 { ((fg as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8 };
    [blend(px[0], bg.0), blend(px[1], bg.1), blend(px[2], bg.2)]
}
