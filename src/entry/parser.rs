//! Entry markup scanner.
//!
//! Pulls scripts, stylesheets and preload hints out of an entry document and
//! produces the template the host renders. This is a tolerant tag scanner,
//! not a full HTML tree builder: anything it does not need is copied through
//! verbatim, and structurally broken script or style elements degrade the
//! whole parse to a passthrough.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::entry::base;
use crate::entry::resource::{Attributes, ResourceDescriptor, ResourceKind};
use crate::error::ParseFailure;

/// `name`, `name=value`, `name="value"` or `name='value'`.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

/// `type` values that mark a script element as runnable.
const SCRIPT_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
    "javascript",
    "module",
];

/// Position of a script body in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRef {
    /// Index into [`EntryResources::scripts`].
    External(usize),
    /// Index into [`EntryResources::inline_scripts`].
    Inline(usize),
}

/// Everything extracted from an entry, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryResources {
    pub scripts: Vec<ResourceDescriptor>,
    pub inline_scripts: Vec<String>,
    pub styles: Vec<ResourceDescriptor>,
    pub inline_styles: Vec<String>,
    /// `<link rel="preload">` / `<link rel="prefetch">` hints for scripts and styles.
    pub preloads: Vec<ResourceDescriptor>,
}

impl EntryResources {
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
            && self.inline_scripts.is_empty()
            && self.styles.is_empty()
            && self.inline_styles.is_empty()
            && self.preloads.is_empty()
    }
}

/// Result of scanning an entry document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Body markup with every extracted script element removed.
    pub template: String,
    pub resources: EntryResources,
    /// Inline and external scripts interleaved in document order.
    pub script_order: Vec<ScriptRef>,
    /// Base every relative reference was resolved against.
    pub base_path: Url,
}

impl ParsedEntry {
    /// The degraded result for markup that could not be scanned.
    pub fn passthrough(html: &str, base_path: &Url) -> Self {
        Self {
            template: html.to_string(),
            resources: EntryResources::default(),
            script_order: Vec::new(),
            base_path: base_path.clone(),
        }
    }
}

/// Stateless entry markup parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryParser;

impl EntryParser {
    /// Parse `html`, resolving references against `base_path`. Never fails:
    /// malformed markup is logged and returned unchanged with no resources.
    pub fn parse(html: &str, base_path: &Url) -> ParsedEntry {
        match Self::try_parse(html, base_path) {
            Ok(parsed) => parsed,
            Err(failure) => {
                warn!(%failure, "entry markup degraded to passthrough");
                ParsedEntry::passthrough(html, base_path)
            }
        }
    }

    /// Parse `html`, reporting structurally broken markup as a [`ParseFailure`].
    pub fn try_parse(html: &str, base_path: &Url) -> Result<ParsedEntry, ParseFailure> {
        let lower = html.to_ascii_lowercase();
        let mut resources = EntryResources::default();
        let mut script_order = Vec::new();
        let mut out = String::with_capacity(html.len());
        let mut copied = 0;
        let mut pos = 0;

        while let Some(offset) = html[pos..].find('<') {
            let start = pos + offset;

            if lower[start..].starts_with("<!--") {
                pos = lower[start + 4..]
                    .find("-->")
                    .map_or(html.len(), |end| start + 4 + end + 3);
                continue;
            }

            let name = match tag_name(&lower, start + 1) {
                Some(name @ ("script" | "style" | "link")) => name,
                _ => {
                    pos = start + 1;
                    continue;
                }
            };

            let tag_end = find_tag_end(html.as_bytes(), start + 1 + name.len()).ok_or_else(|| {
                ParseFailure {
                    offset: start,
                    message: format!("unterminated <{name}> start tag"),
                }
            })?;
            let attributes = parse_attributes(&html[start + 1 + name.len()..tag_end]);

            match name {
                "script" => {
                    let (close, element_end) = find_closing(&lower, tag_end + 1, "script")
                        .ok_or_else(|| ParseFailure {
                            offset: start,
                            message: "missing </script>".into(),
                        })?;
                    pos = element_end;

                    if !is_runnable(attributes.get("type")) {
                        continue;
                    }

                    out.push_str(&html[copied..start]);
                    copied = element_end;

                    match attributes.get("src") {
                        Some(src) if src.trim().is_empty() => {
                            debug!("dropping script with empty src");
                        }
                        Some(src) => match base::resolve(src, base_path) {
                            Ok(url) => {
                                script_order.push(ScriptRef::External(resources.scripts.len()));
                                resources.scripts.push(ResourceDescriptor {
                                    url,
                                    kind: ResourceKind::Script,
                                    attributes: attributes.without("src"),
                                });
                            }
                            Err(e) => warn!(src, error = %e, "skipping unresolvable script"),
                        },
                        None => {
                            script_order.push(ScriptRef::Inline(resources.inline_scripts.len()));
                            resources
                                .inline_scripts
                                .push(html[tag_end + 1..close].to_string());
                        }
                    }
                }
                "style" => {
                    let (close, element_end) = find_closing(&lower, tag_end + 1, "style")
                        .ok_or_else(|| ParseFailure {
                            offset: start,
                            message: "missing </style>".into(),
                        })?;
                    resources
                        .inline_styles
                        .push(html[tag_end + 1..close].to_string());
                    pos = element_end;
                }
                _ => {
                    collect_link(&attributes, base_path, &mut resources);
                    pos = tag_end + 1;
                }
            }
        }
        out.push_str(&html[copied..]);

        debug!(
            scripts = resources.scripts.len(),
            inline_scripts = resources.inline_scripts.len(),
            styles = resources.styles.len(),
            inline_styles = resources.inline_styles.len(),
            preloads = resources.preloads.len(),
            "parsed entry"
        );

        Ok(ParsedEntry {
            template: body_inner(&out).to_string(),
            resources,
            script_order,
            base_path: base_path.clone(),
        })
    }
}

fn collect_link(attributes: &Attributes, base_path: &Url, resources: &mut EntryResources) {
    let Some(href) = attributes.get("href").filter(|h| !h.trim().is_empty()) else {
        return;
    };
    let rel = attributes.get("rel").unwrap_or_default().to_ascii_lowercase();
    let rel: Vec<&str> = rel.split_ascii_whitespace().collect();

    let kind = if rel.contains(&"stylesheet") {
        ResourceKind::Style
    } else if rel.contains(&"preload") || rel.contains(&"prefetch") {
        match attributes.get("as").map(str::to_ascii_lowercase).as_deref() {
            Some("script") => ResourceKind::Script,
            Some("style") => ResourceKind::Style,
            _ => return,
        }
    } else {
        return;
    };

    let url = match base::resolve(href, base_path) {
        Ok(url) => url,
        Err(e) => {
            warn!(href, error = %e, "skipping unresolvable link");
            return;
        }
    };
    let descriptor = ResourceDescriptor {
        url,
        kind,
        attributes: attributes.without("href"),
    };
    if rel.contains(&"stylesheet") {
        resources.styles.push(descriptor);
    } else {
        resources.preloads.push(descriptor);
    }
}

/// The lowercase tag name starting at `at`, if a real start tag begins there.
fn tag_name(lower: &str, at: usize) -> Option<&str> {
    let rest = &lower[at..];
    let len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-')
        .count();
    if len == 0 {
        return None;
    }
    match rest.as_bytes().get(len) {
        None => Some(&rest[..len]),
        Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => Some(&rest[..len]),
        Some(_) => None,
    }
}

/// Index of the `>` closing a start tag, skipping quoted attribute values.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote = None;
    let mut last = 0u8;
    for (i, &b) in bytes.iter().enumerate().skip(from) {
        match quote {
            Some(q) if b == q => {
                quote = None;
                last = b;
            }
            Some(_) => {}
            None => match b {
                b'>' => return Some(i),
                b'"' | b'\'' if last == b'=' => quote = Some(b),
                b if b.is_ascii_whitespace() => {}
                b => last = b,
            },
        }
    }
    None
}

/// Start of `</name` and the index just past its `>`.
fn find_closing(lower: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let pattern = format!("</{name}");
    let close = from + lower[from..].find(&pattern)?;
    let end = close + lower[close..].find('>')? + 1;
    Some((close, end))
}

fn parse_attributes(source: &str) -> Attributes {
    ATTRIBUTE
        .captures_iter(source)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or(String::new(), |m| decode_entities(m.as_str()));
            (caps[1].to_string(), value)
        })
        .collect()
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn is_runnable(script_type: Option<&str>) -> bool {
    match script_type.map(str::trim) {
        None | Some("") => true,
        Some(t) => SCRIPT_TYPES.iter().any(|known| known.eq_ignore_ascii_case(t)),
    }
}

/// Inner markup of `<body>`, or the whole document when there is none.
fn body_inner(markup: &str) -> &str {
    let lower = markup.to_ascii_lowercase();
    let mut search = 0;
    while let Some(offset) = lower[search..].find("<body") {
        let open = search + offset;
        if tag_name(&lower, open + 1) != Some("body") {
            search = open + 1;
            continue;
        }
        let Some(open_end) = find_tag_end(markup.as_bytes(), open + 5) else {
            return markup;
        };
        let inner_start = open_end + 1;
        return match lower.rfind("</body") {
            Some(close) if close >= inner_start => &markup[inner_start..close],
            _ => &markup[inner_start..],
        };
    }
    markup
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/app/").unwrap()
    }

    #[test]
    fn test_script_removed_from_template() {
        let parsed = EntryParser::parse(r#"<div><script src="a.js"></script><p>hi</p></div>"#, &base());

        assert_eq!(parsed.template, "<div><p>hi</p></div>");
        assert_eq!(parsed.resources.scripts.len(), 1);
        assert_eq!(
            parsed.resources.scripts[0].url.as_str(),
            "https://cdn.example.com/app/a.js"
        );
        assert_eq!(parsed.script_order, vec![ScriptRef::External(0)]);
    }

    #[test]
    fn test_document_order_is_recorded() {
        let html = r#"
            <script>first = 1</script>
            <script src="./two.js" defer data-x="y"></script>
            <script>third = 3</script>
            <script src="https://other.example.com/four.js"></script>
        "#;
        let parsed = EntryParser::parse(html, &base());

        assert_eq!(
            parsed.script_order,
            vec![
                ScriptRef::Inline(0),
                ScriptRef::External(0),
                ScriptRef::Inline(1),
                ScriptRef::External(1),
            ]
        );
        assert_eq!(parsed.resources.inline_scripts, vec!["first = 1", "third = 3"]);
        let two = &parsed.resources.scripts[0];
        assert_eq!(two.url.as_str(), "https://cdn.example.com/app/two.js");
        assert_eq!(two.attributes.get("defer"), Some(""));
        assert_eq!(two.attributes.get("data-x"), Some("y"));
        assert!(!two.attributes.contains("src"));
        assert_eq!(
            parsed.resources.scripts[1].url.as_str(),
            "https://other.example.com/four.js"
        );
        assert!(!parsed.template.contains("<script"));
    }

    #[test]
    fn test_styles_and_links() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="theme.css" media="screen">
            <link rel="icon" href="favicon.ico">
            <link rel="preload" href="big.js" as="script">
            <link rel="prefetch" href="font.woff2" as="font">
            <style>.a { color: red }</style>
            </head><body><main>app</main></body></html>"#;
        let parsed = EntryParser::parse(html, &base());

        assert_eq!(parsed.resources.styles.len(), 1);
        let theme = &parsed.resources.styles[0];
        assert_eq!(theme.url.as_str(), "https://cdn.example.com/app/theme.css");
        assert_eq!(theme.kind, ResourceKind::Style);
        assert_eq!(theme.attributes.get("media"), Some("screen"));
        assert!(!theme.attributes.contains("href"));

        assert_eq!(parsed.resources.inline_styles, vec![".a { color: red }"]);
        assert_eq!(parsed.resources.preloads.len(), 1);
        assert_eq!(parsed.resources.preloads[0].kind, ResourceKind::Script);
        assert_eq!(parsed.template, "<main>app</main>");
    }

    #[test]
    fn test_non_script_types_stay_in_template() {
        let html = r#"<script type="text/template"><b>{{x}}</b></script><script type="module">m = 1</script>"#;
        let parsed = EntryParser::parse(html, &base());

        assert!(parsed.template.contains("text/template"));
        assert_eq!(parsed.resources.inline_scripts, vec!["m = 1"]);
    }

    #[test]
    fn test_comments_are_not_scanned() {
        let html = "<!-- <script src=\"hidden.js\"></script> --><p>x</p>";
        let parsed = EntryParser::parse(html, &base());

        assert!(parsed.resources.scripts.is_empty());
        assert_eq!(parsed.template, html);
    }

    #[test]
    fn test_quoted_gt_and_entities_in_attributes() {
        let html = r#"<script src="lib.js?a=1&amp;b=2" data-note="x>y"></script>"#;
        let parsed = EntryParser::parse(html, &base());

        let script = &parsed.resources.scripts[0];
        assert_eq!(script.url.as_str(), "https://cdn.example.com/app/lib.js?a=1&b=2");
        assert_eq!(script.attributes.get("data-note"), Some("x>y"));
        assert_eq!(parsed.template, "");
    }

    #[test]
    fn test_uppercase_tags() {
        let parsed = EntryParser::parse("<SCRIPT SRC='A.js'></SCRIPT><P>hi</P>", &base());
        assert_eq!(parsed.resources.scripts.len(), 1);
        assert_eq!(parsed.template, "<P>hi</P>");
    }

    #[test]
    fn test_empty_src_is_dropped() {
        let parsed = EntryParser::parse(r#"<script src=""></script><p>x</p>"#, &base());
        assert!(parsed.resources.scripts.is_empty());
        assert!(parsed.script_order.is_empty());
        assert_eq!(parsed.template, "<p>x</p>");
    }

    #[test]
    fn test_malformed_degrades_to_passthrough() {
        let html = "<div><script>var a = 1;</div>";
        let failure = EntryParser::try_parse(html, &base()).unwrap_err();
        assert!(failure.message.contains("</script>"));

        let parsed = EntryParser::parse(html, &base());
        assert_eq!(parsed.template, html);
        assert!(parsed.resources.is_empty());
        assert!(parsed.script_order.is_empty());
    }

    #[test]
    fn test_unterminated_start_tag_degrades() {
        let html = "<p>ok</p><link rel=\"stylesheet\" href=\"a.css\"";
        assert!(EntryParser::try_parse(html, &base()).is_err());
        assert_eq!(EntryParser::parse(html, &base()).template, html);
    }

    #[test]
    fn test_fragments_render_as_is() {
        let html = "<div><p>unclosed <b>bold</div> < 3 <scriptx>";
        let parsed = EntryParser::parse(html, &base());
        assert_eq!(parsed.template, html);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let html = r#"<body><script src="a.js"></script><style>p{}</style><p>hi</p></body>"#;
        assert_eq!(EntryParser::parse(html, &base()), EntryParser::parse(html, &base()));
    }
}
