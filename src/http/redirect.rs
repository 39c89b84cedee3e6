//! Redirect helper.
//!
//! Three ways to send the client elsewhere:
//! - `Header(status)`: `Location` header with a 3xx status; dispatch stops
//! - `Meta { delay }`: an HTML meta refresh written to the output
//! - `Script { delay }`: a script that changes `window.location` after
//!   `delay` seconds
//!
//! A header redirect requested after output was written falls back to an
//! immediate meta refresh.

use std::fmt;
use std::str::FromStr;

use axum::http::StatusCode;
use url::{Position, Url};

use crate::routing::{Context, HandlerError};

/// How [`Context::redirect`] sends the client away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Header(StatusCode),
    Meta { delay: u64 },
    Script { delay: u64 },
}

impl Default for RedirectMode {
    fn default() -> Self {
        RedirectMode::Header(StatusCode::FOUND)
    }
}

/// A redirect mode string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRedirectMode(pub String);

impl fmt::Display for InvalidRedirectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid redirect mode {:?}", self.0)
    }
}

impl std::error::Error for InvalidRedirectMode {}

impl FromStr for RedirectMode {
    type Err = InvalidRedirectMode;

    /// `"301"`, `"html"`, `"html:3"`, `"js"`, `"js:2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRedirectMode(s.to_string());
        let (kind, delay) = match s.split_once(':') {
            Some((kind, delay)) => (kind, Some(delay)),
            None => (s, None),
        };
        let delay = match delay {
            Some(d) => d.trim().parse::<u64>().map_err(|_| invalid())?,
            None => 0,
        };
        match kind.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(RedirectMode::Meta { delay }),
            "js" => Ok(RedirectMode::Script { delay }),
            code => {
                let status = code
                    .parse::<u16>()
                    .ok()
                    .and_then(|c| StatusCode::from_u16(c).ok())
                    .filter(StatusCode::is_redirection)
                    .ok_or_else(invalid)?;
                Ok(RedirectMode::Header(status))
            }
        }
    }
}

/// Absolute URLs are kept; anything else is joined to `base_url`. The
/// result is percent-encoded, so it is always a valid header value.
pub fn resolve_target(base_url: &str, to: &str) -> String {
    if let Ok(url) = Url::parse(to) {
        return url.into();
    }
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        to.trim_start_matches('/')
    );
    if let Ok(url) = Url::parse(&joined) {
        return url.into();
    }
    match Url::parse(RELATIVE_BASE).and_then(|base| base.join(&joined)) {
        Ok(url) => url[Position::BeforePath..].to_string(),
        Err(_) => encode_unsafe(&joined),
    }
}

/// Stand-in origin used to percent-encode relative targets.
const RELATIVE_BASE: &str = "http://relative.invalid/";

fn encode_unsafe(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    for c in target.chars() {
        if c.is_ascii_graphic() && !matches!(c, '"' | '\'' | '<' | '>' | '`') {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_js(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn apply(cx: &mut Context, to: &str, mode: RedirectMode) -> Result<(), HandlerError> {
    let target = resolve_target(&cx.app().base_url, to);
    let mode = match mode {
        RedirectMode::Header(_) if !cx.output().is_empty() => RedirectMode::Meta { delay: 0 },
        other => other,
    };
    tracing::debug!(target = %target, mode = ?mode, "Redirecting");

    match mode {
        RedirectMode::Header(status) => {
            cx.set_status(status);
            cx.set_header("location", &target)?;
            cx.halt();
        }
        RedirectMode::Meta { delay } => {
            cx.echo(&format!(
                "<meta http-equiv=\"refresh\" content=\"{delay}; URL={}\">",
                escape_html(&target)
            ));
        }
        RedirectMode::Script { delay } => {
            cx.echo(&format!(
                "<script type=\"text/javascript\">setTimeout(function(){{window.location=\"{}\";}}, {});</script>",
                escape_js(&target),
                delay * 1000
            ));
        }
    }
    Ok(())
}
