//! HTML → markdown normalization.
//!
//! Converts raw help-center HTML into clean markdown text. The converter is
//! deliberately deterministic (same input, same output, no wall-clock or
//! random state) because the sync engine fingerprints the normalized output
//! for change detection: upstream formatting noise must not cause false
//! positives, and repeated runs over unchanged content must hash identically.

/// Convert an HTML fragment to markdown and strip help-center boilerplate.
pub fn normalize(html: &str, base_url: &str) -> String {
    clean_markdown(&html_to_markdown(html, base_url))
}

/// Convert an HTML fragment to markdown.
///
/// Relative links and image sources (paths starting with `/`) are resolved
/// against the origin of `base_url`.
pub fn html_to_markdown(html: &str, base_url: &str) -> String {
    let mut conv = Converter::new(base_url);
    conv.feed(html);
    conv.finish()
}

/// Post-conversion cleanup: trailing whitespace, excess blank lines, and
/// navigation/feedback boilerplate commonly appended to help-center pages.
pub fn clean_markdown(text: &str) -> String {
    const BOILERPLATE: [&str; 3] = [
        "was this article helpful",
        "related articles",
        "did you find it helpful",
    ];

    let stripped: String = text
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = collapse_blank_lines(&stripped);

    let paragraphs: Vec<&str> = collapsed
        .split("\n\n")
        .filter(|para| {
            let head = para.trim_start().to_lowercase();
            !BOILERPLATE.iter().any(|pat| head.starts_with(pat))
        })
        .collect();

    paragraphs.join("\n\n").trim().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

struct Converter {
    out: String,
    base_origin: String,
    list_stack: Vec<ListKind>,
    in_pre: bool,
    /// Href of the currently open `<a>`, emitted at the closing tag.
    link_href: Option<String>,
}

impl Converter {
    fn new(base_url: &str) -> Self {
        Self {
            out: String::new(),
            base_origin: origin_of(base_url),
            list_stack: Vec::new(),
            in_pre: false,
            link_href: None,
        }
    }

    fn feed(&mut self, html: &str) {
        let mut rest = html;
        while let Some(lt) = rest.find('<') {
            self.text(&rest[..lt]);
            rest = &rest[lt..];

            if rest.starts_with("<!--") {
                rest = match rest.find("-->") {
                    Some(end) => &rest[end + 3..],
                    None => "",
                };
                continue;
            }

            let Some(gt) = find_tag_end(rest) else {
                // Unterminated tag: treat the remainder as text.
                self.text(rest);
                return;
            };
            let inner = &rest[1..gt];
            rest = &rest[gt + 1..];

            if inner.starts_with('!') || inner.starts_with('?') {
                continue;
            }
            if let Some(name) = inner.strip_prefix('/') {
                self.end_tag(&name.trim().to_lowercase());
                continue;
            }

            let inner = inner.trim_end_matches('/');
            let (name, attr_src) = match inner.find(char::is_whitespace) {
                Some(pos) => (&inner[..pos], &inner[pos..]),
                None => (inner, ""),
            };
            let name = name.to_lowercase();

            // Script and style contents are never document text.
            if name == "script" || name == "style" {
                let close = format!("</{}", name);
                rest = match find_ignore_ascii_case(rest, &close) {
                    Some(pos) => {
                        let after = &rest[pos..];
                        match after.find('>') {
                            Some(end) => &after[end + 1..],
                            None => "",
                        }
                    }
                    None => "",
                };
                continue;
            }

            self.start_tag(&name, attr_src);
        }
        self.text(rest);
    }

    fn start_tag(&mut self, name: &str, attr_src: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.out.push('\n');
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            "p" | "br" => self.out.push('\n'),
            "ul" => self.list_stack.push(ListKind::Unordered),
            "ol" => self.list_stack.push(ListKind::Ordered),
            "li" => {
                if let Some(kind) = self.list_stack.last().copied() {
                    let indent = "  ".repeat(self.list_stack.len() - 1);
                    let marker = match kind {
                        ListKind::Unordered => "• ",
                        ListKind::Ordered => "1. ",
                    };
                    self.out.push('\n');
                    self.out.push_str(&indent);
                    self.out.push_str(marker);
                }
            }
            "strong" | "b" => self.out.push_str("**"),
            "em" | "i" => self.out.push('*'),
            "code" => {
                if !self.in_pre {
                    self.out.push('`');
                }
            }
            "pre" => {
                self.in_pre = true;
                self.out.push_str("\n```\n");
            }
            "a" => {
                let href = attr_value(attr_src, "href").unwrap_or_else(|| "#".to_string());
                self.link_href = Some(self.resolve(&href));
                self.out.push('[');
            }
            "img" => {
                let src = attr_value(attr_src, "src").unwrap_or_default();
                let alt = attr_value(attr_src, "alt").unwrap_or_else(|| "image".to_string());
                let src = self.resolve(&src);
                self.out.push_str(&format!("![{}]({})", alt, src));
            }
            "blockquote" => self.out.push_str("\n> "),
            // Wrapper elements carry no markdown of their own.
            _ => {}
        }
    }

    fn end_tag(&mut self, name: &str) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" => self.out.push('\n'),
            "ul" | "ol" => {
                self.list_stack.pop();
                self.out.push('\n');
            }
            "strong" | "b" => self.out.push_str("**"),
            "em" | "i" => self.out.push('*'),
            "code" => {
                if !self.in_pre {
                    self.out.push('`');
                }
            }
            "pre" => {
                self.in_pre = false;
                if !self.out.ends_with('\n') {
                    self.out.push('\n');
                }
                self.out.push_str("```\n");
            }
            "a" => {
                let href = self.link_href.take().unwrap_or_else(|| "#".to_string());
                self.out.push_str(&format!("]({})", href));
            }
            "blockquote" => self.out.push('\n'),
            _ => {}
        }
    }

    fn text(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        let decoded = decode_entities(data);

        if self.in_pre {
            self.out.push_str(&decoded);
            return;
        }

        if decoded.trim().is_empty() {
            // Whitespace-only node: keep at most one separating space.
            if !self.ends_with_whitespace() {
                self.out.push(' ');
            }
            return;
        }

        if decoded.starts_with(char::is_whitespace) && !self.ends_with_whitespace() {
            self.out.push(' ');
        }
        let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        self.out.push_str(&collapsed);
        if decoded.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
    }

    fn ends_with_whitespace(&self) -> bool {
        self.out
            .chars()
            .last()
            .map(|c| c.is_whitespace())
            .unwrap_or(true)
    }

    fn resolve(&self, href: &str) -> String {
        if href.starts_with('/') && !self.base_origin.is_empty() {
            format!("{}{}", self.base_origin, href)
        } else {
            href.to_string()
        }
    }

    fn finish(self) -> String {
        collapse_blank_lines(&self.out).trim().to_string()
    }
}

/// Byte index of the first ASCII-case-insensitive occurrence of `needle`.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let n = needle.len();
    if n == 0 || haystack.len() < n {
        return None;
    }
    (0..=haystack.len() - n).find(|&i| {
        haystack.is_char_boundary(i)
            && haystack.is_char_boundary(i + n)
            && haystack[i..i + n].eq_ignore_ascii_case(needle)
    })
}

/// Find the index of the `>` closing a tag, honoring quoted attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '>' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Extract a single attribute value from the raw attribute source of a tag.
///
/// The name match is ASCII-case-insensitive against the original string;
/// attribute values may contain arbitrary Unicode.
fn attr_value(attr_src: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(found) = find_ignore_ascii_case(&attr_src[search..], name) {
        let start = search + found;
        // Must be a word boundary (start of string or preceded by whitespace).
        let boundary = attr_src[..start]
            .chars()
            .last()
            .map(|c| c.is_whitespace())
            .unwrap_or(true);
        let after = &attr_src[start + name.len()..];
        if boundary {
            let after_trimmed = after.trim_start();
            if let Some(value_src) = after_trimmed.strip_prefix('=') {
                let value_src = value_src.trim_start();
                let value = match value_src.chars().next() {
                    Some(q @ ('"' | '\'')) => {
                        let rest = &value_src[1..];
                        rest.find(q).map(|end| rest[..end].to_string())
                    }
                    Some(_) => Some(
                        value_src
                            .split(|c: char| c.is_whitespace())
                            .next()
                            .unwrap_or("")
                            .to_string(),
                    ),
                    None => None,
                };
                return value.map(|v| decode_entities(&v));
            }
        }
        search = start + name.len();
    }
    None
}

/// Decode the HTML entities that occur in help-center content.
fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        // Entity names are short; only probe the next few chars for the
        // terminator. char_indices keeps the probe on char boundaries.
        let semi = rest
            .char_indices()
            .take_while(|&(i, _)| i < 12)
            .find(|&(_, c)| c == ';')
            .map(|(i, _)| i);
        match semi {
            Some(end) => {
                let entity = &rest[1..end];
                let decoded = match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => decode_numeric_entity(entity),
                };
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        rest = &rest[end + 1..];
                    }
                    None => {
                        out.push('&');
                        rest = &rest[1..];
                    }
                }
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_numeric_entity(entity: &str) -> Option<char> {
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(code)
}

/// The `scheme://host` part of a URL, with no trailing slash.
fn origin_of(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return String::new();
    };
    let host_start = scheme_end + 3;
    match url[host_start..].find('/') {
        Some(pos) => url[..host_start + pos].to_string(),
        None => url.to_string(),
    }
}

/// Collapse runs of three or more newlines down to two.
fn collapse_blank_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut newlines = 0;
    for ch in s.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}
