//! Input normalization for the one-name-per-line wire protocol

use std::borrow::Cow;

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// Replace every run of carriage returns and line feeds with a single space
///
/// Names without line breaks are returned borrowed and unchanged.
pub fn sanitize(name: &str) -> Cow<'_, str> {
    if !name.contains(is_line_break) {
        return Cow::Borrowed(name);
    }

    let mut out = String::with_capacity(name.len());
    let mut in_break = false;
    for c in name.chars() {
        if is_line_break(c) {
            if !in_break {
                out.push(' ');
                in_break = true;
            }
        } else {
            out.push(c);
            in_break = false;
        }
    }
    Cow::Owned(out)
}
