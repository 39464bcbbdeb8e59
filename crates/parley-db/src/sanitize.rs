/// Trim and HTML-escape user input. Escapes both quote styles so the output is
/// safe inside element content and attribute values.
pub fn sanitize(input: &str) -> String {
    let trimmed = input.trim();
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            sanitize("  <b onclick='x()'>\"hi\" & bye</b> "),
            "&lt;b onclick=&#039;x()&#039;&gt;&quot;hi&quot; &amp; bye&lt;/b&gt;"
        );
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(sanitize("hello"), "hello");
        assert_eq!(sanitize("héllo wörld"), "héllo wörld");
    }
}
