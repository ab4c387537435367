//! Escaping for units forwarded inside the outer event framing.

/// Escape a unit for embedding in a JSON string literal.
///
/// Backslash, quote, CR, LF and tab get their short escapes; any other control
/// character is written as `\u00XX`. The result never contains a raw newline,
/// so one event always stays on one `data:` line.
pub fn escape_unit(unit: &str) -> String {
    let mut out = String::with_capacity(unit.len() + 8);
    for c in unit.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
