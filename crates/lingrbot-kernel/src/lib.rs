use std::sync::LazyLock;

use regex::Regex;

mod decor;
mod title;

pub use decor::{char_width, display_width, render_box, sudden_death};
pub use title::extract_title;

/// Replies longer than this many code points are cut down.
pub const MAX_REPLY_CHARS: usize = 1000;

pub const NO_SUCH_DOCUMENTS: &str = "No such documents";

// Lines before this index in a godoc text page are the package header.
const GODOC_SYNOPSIS_START: usize = 5;

static RE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^a-zA-Z0-9])(https?://[a-zA-Z][a-zA-Z0-9_-]*(\.[a-zA-Z0-9][a-zA-Z0-9_-]*)*(:\d+)?(?:/[a-zA-Z0-9_/.\-+%#?&=;@$,!*~]*)?)",
    )
    .unwrap()
});
static RE_PLUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([a-zA-Z0-9_{^}]+)\+\+\s*$").unwrap());
static RE_MINUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([a-zA-Z0-9_{^}]+)--\s*$").unwrap());
static RE_PLUS_EQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([a-zA-Z0-9_{^}]+)\+=([0-9])\s*$").unwrap());
static RE_MINUS_EQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([a-zA-Z0-9_{^}]+)-=([0-9])\s*$").unwrap());
static RE_SUDDEN_DEATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^突然の.+$").unwrap());
static RE_QUOTED_ECHO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(>+)([^<]+)(<+)$").unwrap());

struct CounterPattern {
    regex: &'static LazyLock<Regex>,
    sign: i64,
}

/// Tried in order; the first pattern that matches decides the delta.
static COUNTER_PATTERNS: &[CounterPattern] = &[
    CounterPattern {
        regex: &RE_PLUS,
        sign: 1,
    },
    CounterPattern {
        regex: &RE_MINUS,
        sign: -1,
    },
    CounterPattern {
        regex: &RE_PLUS_EQ,
        sign: 1,
    },
    CounterPattern {
        regex: &RE_MINUS_EQ,
        sign: -1,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterOp {
    pub nickname: String,
    pub delta: i64,
}

/// What a single message asks the bot to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    None,
    UrlList(Vec<String>),
    CounterOp(CounterOp),
    CommandGo { code: String },
    CommandGoDoc { package: String },
    DecorativeBox { text: String, repeat: usize },
}

impl Classification {
    pub fn name(&self) -> &'static str {
        match self {
            Classification::None => "none",
            Classification::UrlList(_) => "url_list",
            Classification::CounterOp(_) => "counter_op",
            Classification::CommandGo { .. } => "command_go",
            Classification::CommandGoDoc { .. } => "command_godoc",
            Classification::DecorativeBox { .. } => "decorative_box",
        }
    }
}

/// Splits on the first space. The remainder is `Some` even when empty.
pub fn split_verb(text: &str) -> (&str, Option<&str>) {
    match text.split_once(' ') {
        Some((verb, rest)) => (verb, Some(rest)),
        None => (text, None),
    }
}

/// Runs the message rules in their fixed order; the first one that fires wins.
///
/// Counter syntax is only reported when the text holds no URL. A URL list that
/// later yields no title is expected to fall back to [`parse_counter`].
pub fn classify(text: &str) -> Classification {
    match split_verb(text) {
        ("!go", Some(code)) => {
            return Classification::CommandGo {
                code: code.to_string(),
            }
        }
        ("!godoc", Some(package)) => {
            return Classification::CommandGoDoc {
                package: package.to_string(),
            }
        }
        _ => {}
    }

    if RE_SUDDEN_DEATH.is_match(text) {
        return Classification::DecorativeBox {
            text: text.to_string(),
            repeat: 1,
        };
    }
    if let Some(caps) = RE_QUOTED_ECHO.captures(text) {
        let (open, close) = (&caps[1], &caps[3]);
        if open.len() == close.len() {
            return Classification::DecorativeBox {
                text: caps[2].to_string(),
                repeat: open.len(),
            };
        }
    }

    let urls = extract_urls(text);
    if !urls.is_empty() {
        return Classification::UrlList(urls);
    }
    parse_counter(text).map_or(Classification::None, Classification::CounterOp)
}

/// All http(s) URLs in order of appearance, duplicates kept.
pub fn extract_urls(text: &str) -> Vec<String> {
    RE_URL
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

pub fn parse_counter(text: &str) -> Option<CounterOp> {
    COUNTER_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.regex.captures(text)?;
        let step = match caps.get(2) {
            Some(digit) => digit.as_str().parse::<i64>().ok()?,
            None => 1,
        };
        Some(CounterOp {
            nickname: caps[1].to_string(),
            delta: pattern.sign * step,
        })
    })
}

/// Pulls the indented synopsis block out of a godoc plain-text page.
pub fn godoc_synopsis(page: &str) -> String {
    let lines: Vec<&str> = page
        .split('\n')
        .skip(GODOC_SYNOPSIS_START)
        .take_while(|line| line.is_empty() || line.starts_with(' '))
        .map(str::trim)
        .collect();
    lines.join("\n").trim().to_string()
}

/// Reply line(s) for a documentation lookup.
pub fn godoc_reply(url: &str, synopsis: &str) -> String {
    if synopsis.is_empty() {
        format!("{url}\n{NO_SUCH_DOCUMENTS}\n")
    } else {
        format!("{url}\n{synopsis}\n")
    }
}

pub fn counter_reply(nickname: &str, count: i64) -> String {
    format!("{nickname} ({count})\n")
}

pub fn title_reply(title: &str) -> String {
    format!("Title: {title}\n")
}

/// Strips trailing newlines and bounds the length. `None` for an empty
/// accumulator.
///
/// Over-long replies keep `MAX_REPLY_CHARS - 1` code points, one short of the
/// limit.
pub fn finish_reply(acc: &str) -> Option<String> {
    if acc.is_empty() {
        return None;
    }
    let trimmed = acc.trim_end_matches('\n');
    if trimmed.chars().count() > MAX_REPLY_CHARS {
        Some(trimmed.chars().take(MAX_REPLY_CHARS - 1).collect())
    } else {
        Some(trimmed.to_string())
    }
}
