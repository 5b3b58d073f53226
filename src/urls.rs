// src/urls.rs
//! URL extraction and shape inspection.
//!
//! - `extract` finds URLs in free text, swaps each for `URL_SENTINEL` and stops at a cap.
//! - `strip_tags` / `remove_sentinels` turn that into the "plain" text used for word analysis.
//! - `UrlParts::parse` is a permissive component split (never fails; missing parts are `None`).
//! - `UrlInspector` judges single URLs and returns signals; it never touches a score.
//!
//! The URL pattern is the classic "unrolled loop": trailing punctuation is only taken when
//! more URL characters follow. `regex` has no lookahead, so the length guard on the run
//! after `://` is checked first and the full pattern only ever sees that bounded run.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::UrlSection;

/// Stands in for an extracted URL inside the body text.
pub const URL_SENTINEL: &str = "%COMMENT_SIEVE_URL%";

/// Non-punctuation URL characters: word chars, any non-ASCII char and `#%~/@[]*(+=&$-`.
const URL_CHAR: &str = r"[\w\x{80}-\x{10FFFF}\#%\~/@\[\]*(+=\&$\-]";

static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9A-Za-z_]{1,20}://").expect("url scheme regex"));

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(r"^[0-9A-Za-z_]{{1,20}}://{c}*(?:['.,;:!?)]{c}+)*", c = URL_CHAR);
    Regex::new(&pattern).expect("url regex")
});

static TLD_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)://.+\.[a-z]{2,10}").expect("tld shape regex"));

static COMPONENTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]*)(?:\?([^#]*))?(?:#(.*))?$")
        .expect("url components regex")
});

/// Result of scanning one text for URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// URLs in order of appearance, duplicates kept, at most `cap` of them.
    pub urls: Vec<String>,
    /// Padded input with every collected URL replaced by `URL_SENTINEL`.
    pub with_placeholders: String,
}

impl Extraction {
    pub fn count(&self) -> usize {
        self.urls.len()
    }
}

/// Scan `text` for URLs, collecting at most `cap`.
///
/// The text is padded with a space on both sides. A candidate only counts when the
/// non-whitespace run right after `://` is between 1 and `lookahead_limit` bytes long;
/// otherwise the scan resumes one character after the candidate's start.
pub fn extract(text: &str, cap: usize, lookahead_limit: usize) -> Extraction {
    let padded = format!(" {text} ");
    let mut urls = Vec::new();
    let mut out = String::with_capacity(padded.len());
    let mut last = 0usize;
    let mut pos = 0usize;

    while urls.len() < cap {
        let Some((start, end)) = next_url(&padded, pos, lookahead_limit) else {
            break;
        };
        out.push_str(&padded[last..start]);
        out.push_str(URL_SENTINEL);
        urls.push(padded[start..end].to_string());
        last = end;
        pos = end;
    }
    out.push_str(&padded[last..]);

    Extraction {
        urls,
        with_placeholders: out,
    }
}

/// Next accepted URL span at or after `pos`.
fn next_url(text: &str, mut pos: usize, limit: usize) -> Option<(usize, usize)> {
    while pos < text.len() {
        let cand = SCHEME_RE.find_at(text, pos)?;
        let start = cand.start();
        if let Some(run_end) = lookahead_end(text, cand.end(), limit) {
            // the run bounds the full match, so matching stays O(limit)
            if let Some(m) = URL_RE.find(&text[start..run_end]) {
                return Some((start, start + m.end()));
            }
        }
        let step = text[start..].chars().next().map_or(1, char::len_utf8);
        pos = start + step;
    }
    None
}

/// End of the non-whitespace run starting at `from`, if it is 1..=limit bytes long.
fn lookahead_end(text: &str, from: usize, limit: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let window = &bytes[from..(from + limit + 1).min(bytes.len())];
    let run = window.iter().position(|&b| is_space(b))?;
    (run >= 1).then_some(from + run)
}

/// ASCII whitespace including vertical tab; non-ASCII chars are URL material.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0B' | b'\x0C' | b'\r')
}

/// Remove HTML tags and comments.
///
/// `<` opens a tag only when followed by a non-whitespace char; the tag runs to the next
/// `>` outside a quoted attribute value, or to the end of the text.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '<' && chars.peek().is_some_and(|n| !n.is_whitespace()) {
            let mut quote: Option<char> = None;
            for c in chars.by_ref() {
                match (quote, c) {
                    (Some(q), c) if c == q => quote = None,
                    (Some(_), _) => {}
                    (None, '"' | '\'') => quote = Some(c),
                    (None, '>') => break,
                    _ => {}
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}

/// Drop every sentinel, returning the cleaned text and how many were removed.
pub fn remove_sentinels(text: &str) -> (String, usize) {
    let n = text.matches(URL_SENTINEL).count();
    (text.replace(URL_SENTINEL, ""), n)
}

/// URL split into components. Absent components are `None`; empty path is `None`,
/// while an empty query or fragment after `?`/`#` is `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts<'a> {
    pub scheme: Option<&'a str>,
    pub user: Option<&'a str>,
    pub pass: Option<&'a str>,
    pub host: Option<&'a str>,
    pub port: Option<&'a str>,
    pub path: Option<&'a str>,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> UrlParts<'a> {
    pub fn parse(url: &'a str) -> Self {
        let Some(caps) = COMPONENTS_RE.captures(url) else {
            return Self::default();
        };
        let get = |i: usize| caps.get(i).map(|m| m.as_str());

        let mut parts = UrlParts {
            scheme: get(1),
            path: get(3).filter(|p| !p.is_empty()),
            query: get(4),
            fragment: get(5),
            ..Default::default()
        };

        if let Some(authority) = get(2) {
            let host_port = match authority.rfind('@') {
                Some(at) => {
                    let userinfo = &authority[..at];
                    match userinfo.split_once(':') {
                        Some((u, p)) => {
                            parts.user = Some(u);
                            parts.pass = Some(p);
                        }
                        None => parts.user = Some(userinfo),
                    }
                    &authority[at + 1..]
                }
                None => authority,
            };
            // a port that is not a number fails the whole decomposition
            let Some((host, port)) = split_port(host_port) else {
                return Self::default();
            };
            parts.host = Some(host).filter(|h| !h.is_empty());
            parts.port = port;
        }
        parts
    }

    /// Anything a plain shortener link would never carry.
    pub fn has_extras(&self) -> bool {
        self.user.is_some()
            || self.pass.is_some()
            || self.port.is_some()
            || self.query.is_some()
            || self.fragment.is_some()
    }

    /// Host component, else the path up to its first `/`, else empty.
    pub fn effective_host(&self) -> &'a str {
        if let Some(h) = self.host {
            return h;
        }
        match self.path {
            Some(p) => p.split('/').next().unwrap_or(p),
            None => "",
        }
    }
}

/// `host:port` → (host, Some(port)); brackets guard IPv6. An empty port counts as absent.
/// `None` when the port is not a number in `0..=65535`.
fn split_port(host_port: &str) -> Option<(&str, Option<&str>)> {
    let search_from = if host_port.starts_with('[') {
        host_port.find(']').unwrap_or(0)
    } else {
        0
    };
    let Some(rel) = host_port[search_from..].rfind(':') else {
        return Some((host_port, None));
    };
    let idx = search_from + rel;
    let port = &host_port[idx + 1..];
    if port.is_empty() {
        return Some((&host_port[..idx], None));
    }
    if !port.bytes().all(|b| b.is_ascii_digit()) || port.parse::<u16>().is_err() {
        return None;
    }
    Some((&host_port[..idx], Some(port)))
}

/// Outcome of the short-URL test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortCheck {
    /// Looks like a shortener redirect.
    pub short: bool,
    /// Short enough to be a candidate but carries user/password/port/query/fragment.
    pub suspicious: bool,
}

/// Signals from the unconditional per-URL checkup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlCheckup {
    /// No `.` followed by a 2 to 10 letter label after the scheme.
    pub malformed_tld: bool,
    pub low_trust_tld: bool,
    /// Something outside `[.:_a-zA-Z0-9/-]`.
    pub uncommon_chars: bool,
}

/// Config-bound URL judge.
#[derive(Debug, Clone)]
pub struct UrlInspector {
    cfg: UrlSection,
    low_trust: Option<Regex>,
}

impl UrlInspector {
    pub fn new(cfg: &UrlSection) -> anyhow::Result<Self> {
        let low_trust = if cfg.low_trust_tlds.is_empty() {
            None
        } else {
            let alts = cfg
                .low_trust_tlds
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            let re = Regex::new(&format!(r"(?i)://.+\.(?:{alts})"))
                .map_err(|e| anyhow::anyhow!("low-trust TLD regex error: {e}"))?;
            Some(re)
        };
        Ok(Self {
            cfg: cfg.clone(),
            low_trust,
        })
    }

    pub fn config(&self) -> &UrlSection {
        &self.cfg
    }

    pub fn extract(&self, text: &str, cap: usize) -> Extraction {
        extract(text, cap, self.cfg.lookahead_limit)
    }

    pub fn is_long(&self, url: &str) -> bool {
        url.len() > self.cfg.long_url_len
    }

    /// Shortener shape: short host, at most two path segments, short alphanumeric tail,
    /// nothing else attached.
    pub fn is_short(&self, url: &str) -> ShortCheck {
        let no = ShortCheck::default();
        if url.len() > self.cfg.short_url_max_len {
            return no;
        }

        let parts = UrlParts::parse(url);
        if parts.has_extras() {
            return ShortCheck {
                short: false,
                suspicious: true,
            };
        }

        let Some(path) = parts.path else {
            return no;
        };
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() > 2 {
            return no;
        }
        let tail = segments.last().copied().unwrap_or_default();
        if tail.len() > self.cfg.short_segment_max_len
            || !tail.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return no;
        }

        if parts.effective_host().len() > self.cfg.short_host_max_len {
            return no;
        }
        ShortCheck {
            short: true,
            suspicious: false,
        }
    }

    pub fn checkup(&self, url: &str) -> UrlCheckup {
        UrlCheckup {
            malformed_tld: !TLD_SHAPE_RE.is_match(url),
            low_trust_tld: self.low_trust.as_ref().is_some_and(|re| re.is_match(url)),
            uncommon_chars: url
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '_' | '/' | '-'))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspector() -> UrlInspector {
        UrlInspector::new(&UrlSection::default()).expect("default inspector")
    }

    #[test]
    fn extracts_in_order_and_replaces() {
        let ex = extract("see http://a.com/x and https://b.org/y.", 7, 2000);
        assert_eq!(ex.urls, vec!["http://a.com/x", "https://b.org/y"]);
        assert_eq!(
            ex.with_placeholders,
            format!(" see {URL_SENTINEL} and {URL_SENTINEL}. ")
        );
    }

    #[test]
    fn trailing_punctuation_is_excluded_unless_followed_by_url_chars() {
        let ex = extract("(go to http://x.com/a_b), or http://y.com/q.html!", 7, 2000);
        assert_eq!(ex.urls, vec!["http://x.com/a_b", "http://y.com/q.html"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let ex = extract("http://d.com http://d.com", 7, 2000);
        assert_eq!(ex.count(), 2);
    }

    #[test]
    fn stops_at_cap() {
        let body = (0..9)
            .map(|i| format!("http://site{i}.com"))
            .collect::<Vec<_>>()
            .join(" ");
        let ex = extract(&body, 7, 2000);
        assert_eq!(ex.count(), 7);
        assert!(ex.with_placeholders.contains("http://site7.com"));
        assert!(ex.with_placeholders.contains("http://site8.com"));
    }

    #[test]
    fn url_inside_anchor_attribute_is_found() {
        let ex = extract(r#"<a href="http://spam.com/buy">cheap</a>"#, 7, 2000);
        assert_eq!(ex.urls, vec!["http://spam.com/buy"]);
    }

    #[test]
    fn overlong_run_is_skipped() {
        let long = format!("http://{}", "a".repeat(2100));
        let ex = extract(&format!("x {long} y http://ok.com"), 7, 2000);
        assert_eq!(ex.urls, vec!["http://ok.com"]);
    }

    #[test]
    fn lookahead_limit_is_inclusive() {
        // 16 + ".com" = 20 bytes after `://`
        let at_limit = format!("see http://{}.com now", "a".repeat(16));
        let over_limit = format!("see http://{}.com now", "a".repeat(17));

        assert_eq!(extract(&at_limit, 7, 20).count(), 1);
        assert_eq!(extract(&over_limit, 7, 20).count(), 0);
        assert_eq!(extract(&over_limit, 7, 21).count(), 1);
    }

    #[test]
    fn nested_scheme_inside_overlong_run_can_still_match() {
        // the outer candidate fails the length guard; the inner `://` is within limit
        let body = format!("http://{}?u=go://ok.com", "a".repeat(30));
        let ex = extract(&body, 7, 20);
        assert_eq!(ex.urls, vec!["go://ok.com"]);
    }

    #[test]
    fn scheme_without_body_is_not_a_url() {
        let ex = extract("broken http:// here", 7, 2000);
        assert_eq!(ex.count(), 0);
    }

    #[test]
    fn adversarial_input_finishes() {
        let nasty = "a://".repeat(5_000) + &"!".repeat(50_000);
        let ex = extract(&nasty, 7, 2000);
        assert!(ex.count() <= 7);
    }

    #[test]
    fn strip_tags_basics() {
        assert_eq!(strip_tags("a <b>bold</b> c"), "a bold c");
        assert_eq!(strip_tags("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
        assert_eq!(strip_tags(r#"<a title="x>y">t</a>"#), "t");
        assert_eq!(strip_tags("keep <!-- hidden --> this"), "keep  this");
        assert_eq!(strip_tags("cut <unclosed rest"), "cut ");
    }

    #[test]
    fn sentinel_in_attribute_disappears_with_the_tag() {
        let ex = extract(r#"<a href="http://x.com/1">x</a> http://y.com/2"#, 7, 2000);
        let (plain, n) = remove_sentinels(&strip_tags(&ex.with_placeholders));
        assert_eq!(ex.count(), 2);
        assert_eq!(n, 1);
        assert!(!plain.contains(URL_SENTINEL));
    }

    #[test]
    fn parse_components() {
        let p = UrlParts::parse("https://u:pw@example.com:8080/a/b?x=1#top");
        assert_eq!(p.scheme, Some("https"));
        assert_eq!(p.user, Some("u"));
        assert_eq!(p.pass, Some("pw"));
        assert_eq!(p.host, Some("example.com"));
        assert_eq!(p.port, Some("8080"));
        assert_eq!(p.path, Some("/a/b"));
        assert_eq!(p.query, Some("x=1"));
        assert_eq!(p.fragment, Some("top"));
    }

    #[test]
    fn parse_is_permissive() {
        let p = UrlParts::parse("example.com/path");
        assert_eq!(p.host, None);
        assert_eq!(p.path, Some("example.com/path"));
        assert_eq!(p.effective_host(), "example.com");

        let p = UrlParts::parse("http://bit.ly");
        assert_eq!(p.path, None);
        assert_eq!(p.effective_host(), "bit.ly");

        let p = UrlParts::parse("http:///nohost");
        assert_eq!(p.host, None);
        assert_eq!(p.effective_host(), "");

        let p = UrlParts::parse("http://x.com/?");
        assert_eq!(p.query, Some(""));
    }

    #[test]
    fn bad_port_fails_the_whole_split() {
        assert_eq!(UrlParts::parse("http://a.co:x/abc"), UrlParts::default());
        assert_eq!(UrlParts::parse("http://a.co:99999/abc"), UrlParts::default());

        let p = UrlParts::parse("http://a.co:/abc");
        assert_eq!(p.host, Some("a.co"));
        assert_eq!(p.port, None);

        let p = UrlParts::parse("http://[::1]:8080/x");
        assert_eq!(p.host, Some("[::1]"));
        assert_eq!(p.port, Some("8080"));
    }

    #[test]
    fn bad_port_is_not_short() {
        assert_eq!(inspector().is_short("http://a.co:x/abc"), ShortCheck::default());
    }

    #[test]
    fn short_url_shapes() {
        let i = inspector();
        assert!(i.is_short("http://bit.ly/abcDE").short);
        assert!(i.is_short("http://a.co/x").short);
        assert!(!i.is_short("http://example.com/a/b/c").short);
        assert!(!i.is_short("http://longerhost.com/abc").short);
        assert!(!i.is_short("http://bit.ly/abc-de").short);
        assert!(!i.is_short("http://bit.ly").short);
        assert!(!i.is_short("http://bit.ly/abcdefghijklmnopq").short);
    }

    #[test]
    fn query_makes_suspicious_not_short() {
        let s = inspector().is_short("http://example.com/?x=1");
        assert!(!s.short);
        assert!(s.suspicious);
    }

    #[test]
    fn long_urls_skip_short_test_entirely() {
        let s = inspector().is_short("http://example.com/some/long/path?with=query");
        assert_eq!(s, ShortCheck::default());
    }

    #[test]
    fn checkup_flags() {
        let i = inspector();
        let ok = i.checkup("https://example.com/page");
        assert_eq!(ok, UrlCheckup::default());

        let c = i.checkup("http://localhost/x");
        assert!(c.malformed_tld);

        let c = i.checkup("http://shop.example.info/x");
        assert!(c.low_trust_tld);

        let c = i.checkup("http://example.com/a?b=c");
        assert!(c.uncommon_chars);
    }

    #[test]
    fn scheme_less_url_has_no_tld_shape() {
        assert!(inspector().checkup("example.com").malformed_tld);
    }

    #[test]
    fn empty_low_trust_list_disables_that_check() {
        let cfg = UrlSection {
            low_trust_tlds: vec![],
            ..UrlSection::default()
        };
        let i = UrlInspector::new(&cfg).unwrap();
        assert!(!i.checkup("http://example.pl").low_trust_tld);
    }
}
