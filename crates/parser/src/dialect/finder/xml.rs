//! Minimal element scanner for the `<event_message>` payloads.
//!
//! Handles elements, attributes, text, self-closing tags, comments, CDATA,
//! processing instructions and the predefined/numeric entities. Anything
//! malformed yields `None` so the payload is skipped like any unparseable line.

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Trimmed text of the first child called `name`, if non-empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// All descendants reached by a `a/b/c` path below this element.
    pub fn find_all<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        let mut level: Vec<&Element> = vec![self];
        for step in path.split('/') {
            level = level
                .into_iter()
                .flat_map(|el| el.children.iter().filter(|c| c.name == step))
                .collect();
        }
        level
    }

    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }
}

pub(crate) fn parse_document(xml: &str) -> Option<Element> {
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut rest = xml;

    while !rest.is_empty() {
        let Some(pos) = rest.find('<') else {
            push_text(&mut stack, rest);
            break;
        };
        push_text(&mut stack, &rest[..pos]);
        rest = &rest[pos..];

        if rest.starts_with("<?") {
            rest = skip_past(rest, "?>")?;
            continue;
        }
        if rest.starts_with("<!--") {
            rest = skip_past(rest, "-->")?;
            continue;
        }
        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let end = body.find("]]>")?;
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&body[..end]);
            }
            rest = &body[end + 3..];
            continue;
        }
        if rest.starts_with("<!") {
            rest = skip_past(rest, ">")?;
            continue;
        }

        let end = tag_end(rest)?;
        let tag = &rest[1..end];
        rest = &rest[end + 1..];

        if let Some(name) = tag.strip_prefix('/') {
            let el = stack.pop()?;
            if el.name != name.trim() {
                return None;
            }
            attach(el, &mut stack, &mut root);
        } else {
            let (body, self_closing) = match tag.strip_suffix('/') {
                Some(body) => (body, true),
                None => (tag, false),
            };
            let el = parse_start_tag(body)?;
            if self_closing {
                attach(el, &mut stack, &mut root);
            } else {
                stack.push(el);
            }
        }
    }

    if !stack.is_empty() {
        return None;
    }
    root
}

fn push_text(stack: &mut [Element], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.text.push_str(&unescape(text));
    }
}

fn attach(el: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None if root.is_none() => *root = Some(el),
        None => {}
    }
}

fn skip_past<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    text.find(marker).map(|i| &text[i + marker.len()..])
}

/// Index of the `>` closing the tag at the start of `text`, ignoring quoted `>`.
fn tag_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

fn parse_start_tag(body: &str) -> Option<Element> {
    let body = body.trim();
    let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
    let name = &body[..name_end];
    if name.is_empty() {
        return None;
    }

    let mut attrs = Vec::new();
    let mut rest = body[name_end..].trim_start();
    while !rest.is_empty() {
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let close = after[1..].find(quote)? + 1;
        attrs.push((key.to_string(), unescape(&after[1..close])));
        rest = after[close + 1..].trim_start();
    }

    Some(Element {
        name: name.to_string(),
        attrs,
        ..Element::default()
    })
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
