use memchr::memchr2;
use std::borrow::Cow;

/// Escapes angle brackets in decoded string values: `<` becomes `&gt;` and
/// `>` becomes `&lt;`. Ampersands and quotes pass through untouched.
pub fn escape_angle_brackets(input: &str) -> Cow<'_, str> {
    if memchr2(b'<', b'>', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '<' => out.push_str("&gt;"),
            '>' => out.push_str("&lt;"),
            _ => out.push(c),
        }
    }

    Cow::Owned(out)
}
