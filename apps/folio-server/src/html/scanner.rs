//! Linear-time HTML tokenizer
//!
//! A small finite-state scanner that splits markup into tags and text runs.
//! A `<` that never finds its `>` is treated as text, and the scanner
//! remembers which (offset, quote state) pairs lead to end of input without
//! one. Later tag scans stop as soon as they reach such a pair, so each byte
//! is walked at most once per quote state and input like `"<a "` repeated
//! stays linear. Comments and declarations record the first offset past
//! which no terminator exists.

/// One lexical piece of an HTML string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Character data between tags (entities left encoded)
    Text(&'a str),
    /// `<name ...>` or `<name ... />`
    StartTag {
        name: &'a str,
        raw: &'a str,
        self_closing: bool,
    },
    /// `</name>`
    EndTag { name: &'a str, raw: &'a str },
    /// Comments, doctype and processing instructions
    Other(&'a str),
}

impl<'a> Token<'a> {
    /// Raw source slice of the token
    pub fn raw(&self) -> &'a str {
        match self {
            Token::Text(s) | Token::Other(s) => s,
            Token::StartTag { raw, .. } | Token::EndTag { raw, .. } => raw,
        }
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "image", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Whether an element never has a closing tag
pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Whether an element starts a new block of text
pub fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

/// Tokenize an HTML string
pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    Scanner::new(html).collect()
}

/// Iterator over the tokens of an HTML string
pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    /// Set after `<script>`/`<style>`: the next text run ends at the
    /// matching close tag regardless of `<` inside it
    raw_text_end: Option<&'static str>,
    /// Per byte, a bitmask of quote states from which a tag scan runs off
    /// the end without `>`. Allocated on the first unterminated tag.
    dead_ends: Vec<u8>,
    /// No `>` exists at or after this offset
    no_gt_from: Option<usize>,
    /// No `-->` exists at or after this offset
    no_comment_end_from: Option<usize>,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            raw_text_end: None,
            dead_ends: Vec::new(),
            no_gt_from: None,
            no_comment_end_from: None,
        }
    }

    fn is_dead_end(&self, at: usize, quote: Option<u8>) -> bool {
        self.dead_ends
            .get(at)
            .is_some_and(|mask| mask & quote_bit(quote) != 0)
    }

    /// Walk from `from` to `stop` again, marking every state seen as a dead end
    fn mark_dead_ends(&mut self, from: usize, stop: usize) {
        if self.dead_ends.is_empty() {
            self.dead_ends = vec![0; self.src.len()];
        }
        let bytes = self.src.as_bytes();
        let mut quote: Option<u8> = None;
        for i in from..stop {
            self.dead_ends[i] |= quote_bit(quote);
            quote = step_quote(quote, bytes[i]);
        }
    }

    /// Offset of the `>` closing a tag whose attributes start at `from`
    fn find_tag_end(&mut self, from: usize) -> Option<usize> {
        let bytes = self.src.as_bytes();
        let mut quote: Option<u8> = None;
        let mut i = from;
        while i < bytes.len() {
            if self.is_dead_end(i, quote) {
                break;
            }
            if quote.is_none() && bytes[i] == b'>' {
                return Some(i);
            }
            quote = step_quote(quote, bytes[i]);
            i += 1;
        }
        self.mark_dead_ends(from, i);
        None
    }

    fn no_terminator(limit: Option<usize>, at: usize) -> bool {
        matches!(limit, Some(from) if at >= from)
    }

    fn scan_raw_text(&mut self, closing: &str) -> Option<Token<'a>> {
        let rest = &self.src[self.pos..];
        let end = find_ascii_case_insensitive(rest, closing).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(Token::Text(&rest[..end]))
    }

    fn scan_text(&mut self) -> Token<'a> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let mut i = start + 1;
        while i < bytes.len() {
            if bytes[i] == b'<' && starts_markup(&bytes[i..]) {
                break;
            }
            i += 1;
        }
        self.pos = i;
        Token::Text(&self.src[start..i])
    }

    fn scan_markup(&mut self) -> Option<Token<'a>> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let rest = &self.src[start..];

        if rest.starts_with("<!--") {
            if Self::no_terminator(self.no_comment_end_from, start) {
                return None;
            }
            let Some(i) = rest[4..].find("-->") else {
                self.no_comment_end_from = Some(start);
                return None;
            };
            let end = start + 4 + i + 3;
            self.pos = end;
            return Some(Token::Other(&self.src[start..end]));
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            if Self::no_terminator(self.no_gt_from, start) {
                return None;
            }
            let Some(i) = rest.find('>') else {
                self.no_gt_from = Some(start);
                return None;
            };
            let end = start + i + 1;
            self.pos = end;
            return Some(Token::Other(&self.src[start..end]));
        }
        if Self::no_terminator(self.no_gt_from, start) {
            return None;
        }

        let closing = bytes.get(start + 1) == Some(&b'/');
        let name_start = if closing { start + 2 } else { start + 1 };
        let mut i = name_start;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        let name_end = i;
        if name_end == name_start {
            return None;
        }

        // Closing '>' outside quoted attribute values
        let end = self.find_tag_end(name_end)? + 1;
        let raw = &self.src[start..end];
        let name = &self.src[name_start..name_end];
        self.pos = end;

        if closing {
            return Some(Token::EndTag { name, raw });
        }

        let self_closing = raw.ends_with("/>");
        if !self_closing {
            if name.eq_ignore_ascii_case("script") {
                self.raw_text_end = Some("</script");
            } else if name.eq_ignore_ascii_case("style") {
                self.raw_text_end = Some("</style");
            }
        }
        Some(Token::StartTag {
            name,
            raw,
            self_closing,
        })
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.pos >= self.src.len() {
            return None;
        }

        if let Some(closing) = self.raw_text_end.take() {
            if let Some(token) = self.scan_raw_text(closing) {
                return Some(token);
            }
        }

        if self.src.as_bytes()[self.pos] == b'<' {
            if let Some(token) = self.scan_markup() {
                return Some(token);
            }
        }
        Some(self.scan_text())
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b':' || b == b'_'
}

/// Quote state after consuming `b`
fn step_quote(quote: Option<u8>, b: u8) -> Option<u8> {
    match quote {
        Some(q) if b == q => None,
        Some(q) => Some(q),
        None if b == b'"' || b == b'\'' => Some(b),
        None => None,
    }
}

fn quote_bit(quote: Option<u8>) -> u8 {
    match quote {
        None => 1,
        Some(b'"') => 2,
        Some(_) => 4,
    }
}

fn starts_markup(bytes: &[u8]) -> bool {
    match bytes.get(1) {
        Some(b) if b.is_ascii_alphabetic() => true,
        Some(b'/') | Some(b'!') | Some(b'?') => true,
        _ => false,
    }
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Read an attribute value from a raw start tag
pub fn attribute<'a>(raw_tag: &'a str, attr: &str) -> Option<&'a str> {
    let bytes = raw_tag.as_bytes();
    let attr_bytes = attr.as_bytes();
    let mut i = 1;
    // Skip tag name
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            // Not an attribute name; skip one byte to guarantee progress
            i += 1;
            continue;
        }
        let name = &bytes[name_start..i];
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value: Option<&'a str> = None;
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                Some(&q) if q == b'"' || q == b'\'' => {
                    let vstart = i + 1;
                    let vend = raw_tag[vstart..].find(q as char).map(|n| vstart + n).unwrap_or(bytes.len());
                    value = Some(&raw_tag[vstart..vend]);
                    i = vend + 1;
                }
                _ => {
                    let vstart = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = Some(&raw_tag[vstart..i]);
                }
            }
        }
        if name.eq_ignore_ascii_case(attr_bytes) {
            return Some(value.unwrap_or(""));
        }
    }
    None
}

/// Apply `f` to every text run that is not inside an element for which
/// `skip` returns true. Tags are copied through untouched.
///
/// `skip` receives the element name and its raw start tag.
pub fn map_text<S, F>(html: &str, skip: S, mut f: F) -> String
where
    S: Fn(&str, &str) -> bool,
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(html.len() + html.len() / 8);
    // Stack of open skipped elements; only skipped elements are tracked so
    // malformed nesting elsewhere cannot desynchronize the walk.
    let mut skipped: Vec<&str> = Vec::new();

    for token in Scanner::new(html) {
        match token {
            Token::Text(text) => {
                if skipped.is_empty() {
                    out.push_str(&f(text));
                } else {
                    out.push_str(text);
                }
            }
            Token::StartTag {
                name,
                raw,
                self_closing,
            } => {
                if !self_closing && !is_void(name) && (!skipped.is_empty() || skip(name, raw)) {
                    skipped.push(name);
                }
                out.push_str(raw);
            }
            Token::EndTag { name, raw } => {
                if let Some(pos) = skipped.iter().rposition(|open| open.eq_ignore_ascii_case(name)) {
                    skipped.truncate(pos);
                }
                out.push_str(raw);
            }
            Token::Other(raw) => out.push_str(raw),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize(r#"<p class="a">Hi <b>there</b></p>"#);
        assert_eq!(tokens.len(), 6);
        assert!(matches!(tokens[0], Token::StartTag { name: "p", .. }));
        assert_eq!(tokens[1], Token::Text("Hi "));
        assert!(matches!(tokens[5], Token::EndTag { name: "p", .. }));
    }

    #[test]
    fn test_quoted_gt_in_attribute() {
        let tokens = tokenize(r#"<a title="x > y">t</a>"#);
        assert_eq!(tokens[0].raw(), r#"<a title="x > y">"#);
        assert_eq!(tokens[1], Token::Text("t"));
    }

    #[test]
    fn test_unterminated_tag_is_text() {
        let tokens = tokenize("a <b c=\"oops");
        let joined: String = tokens.iter().map(|t| t.raw()).collect();
        assert_eq!(joined, "a <b c=\"oops");
    }

    #[test]
    fn test_lone_less_than_is_text() {
        let tokens = tokenize("1 < 2 and 3 > 2");
        assert_eq!(tokens, vec![Token::Text("1 < 2 and 3 > 2")]);
    }

    #[test]
    fn test_script_contents_are_raw() {
        let tokens = tokenize("<script>if (a<b) {}</script><p>x</p>");
        assert_eq!(tokens[1], Token::Text("if (a<b) {}"));
        assert!(matches!(tokens[2], Token::EndTag { name: "script", .. }));
    }

    #[test]
    fn test_attribute_lookup() {
        let raw = r#"<img alt='pic' src="../images/a.png"/>"#;
        assert_eq!(attribute(raw, "src"), Some("../images/a.png"));
        assert_eq!(attribute(raw, "alt"), Some("pic"));
        assert_eq!(attribute(raw, "id"), None);
    }

    #[test]
    fn test_map_text_skips_elements() {
        let html = "<p>a<code>b</code>c</p>";
        let out = map_text(html, |name, _| name == "code", |t| t.to_uppercase());
        assert_eq!(out, "<p>A<code>b</code>C</p>");
    }

    fn assert_fast_and_lossless(html: &str) {
        let started = std::time::Instant::now();
        let joined: String = tokenize(html).iter().map(|t| t.raw()).collect();
        assert!(started.elapsed() < std::time::Duration::from_secs(2), "took {:?}", started.elapsed());
        assert_eq!(joined, html);
    }

    #[test]
    fn test_repeated_unterminated_tags_are_linear() {
        assert_fast_and_lossless(&"<a ".repeat(200_000));
        assert_fast_and_lossless(&"<a x=\"".repeat(150_000));
        assert_fast_and_lossless(&"<a '\"".repeat(150_000));
    }

    #[test]
    fn test_repeated_unterminated_comments_are_linear() {
        assert_fast_and_lossless(&"<!-- ".repeat(150_000));
        assert_fast_and_lossless(&"<!x ".repeat(150_000));
        assert_fast_and_lossless(&"<?x ".repeat(150_000));
    }

    #[test]
    fn test_tag_inside_unterminated_quote_still_found() {
        let tokens = tokenize("<a x=\"<b>t");
        assert_eq!(tokens[0], Token::Text("<a x=\""));
        assert!(matches!(tokens[1], Token::StartTag { name: "b", .. }));
        assert_eq!(tokens[2], Token::Text("t"));
    }

    #[test]
    fn test_later_tags_after_failed_scan() {
        let tokens = tokenize("<a \"x<b>y</b>");
        assert_eq!(tokens[0], Token::Text("<a \"x"));
        assert!(matches!(tokens[1], Token::StartTag { name: "b", .. }));
        assert!(matches!(tokens[3], Token::EndTag { name: "b", .. }));
    }
}
