//! Guarded web fetch: allow-listed, content-validated, truncated.
//!
//! This is the only path by which agent-directed tool calls reach the
//! network. Every gate is fail-closed and every expected failure is returned
//! as a plain string, never as an error, so a bad fetch cannot abort the
//! surrounding turn. The allow-list check runs before any request is issued.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::debug;

use super::tool::{AgentTool, Tool, ToolExecutionContext};
use super::types::AgentToolParameters;

/// Default per-fetch timeout in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 10;
/// Ceiling on returned content, in characters.
pub const FETCH_MAX_CHARS: usize = 4096;

const TRUNCATION_NOTICE: &str = "\n... (truncated)";
const MAX_REDIRECTS: usize = 10;

/// Immutable allow-list of permitted hostnames.
///
/// Injected into [`fetch`] rather than read from global state, so alternate
/// policies can be exercised in tests without module-level mutation.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    allowed_hosts: BTreeSet<String>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::new(["example.com", "api.github.com", "raw.githubusercontent.com"])
    }
}

impl FetchPolicy {
    /// Build a policy from hostnames; stored lowercased.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether the given (lowercase) hostname may be fetched.
    pub fn allows(&self, host: &str) -> bool {
        self.allowed_hosts.contains(host)
    }

    /// The exact refusal string for a disallowed hostname. This format is a
    /// tested contract, not merely a message.
    pub fn refusal(&self, host: &str) -> String {
        format!("Refused: domain '{host}' not in allow-list.")
    }
}

/// Input for one fetch call.
#[derive(Debug, Clone)]
pub struct FetchInput {
    pub url: String,
    pub timeout: Duration,
}

impl FetchInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

static FETCH_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

// Automatic redirects are disabled; `fetch` walks each hop itself so the
// allow-list applies to every redirect target, not just the first URL.
fn fetch_client() -> &'static reqwest::Client {
    FETCH_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build fetch client")
    })
}

/// Fetch a URL through the gateway.
///
/// Gates, in order: URL parse, allow-list, HTTP GET with timeout,
/// content-type validation, text decode, character-boundary truncation.
/// Redirects are followed hop by hop, with the allow-list re-checked on
/// every target. Every expected failure mode returns a string.
pub async fn fetch(policy: &FetchPolicy, input: &FetchInput) -> String {
    let mut url = match reqwest::Url::parse(&input.url) {
        Ok(url) => url,
        Err(_) => return format!("Error: invalid URL '{}'.", input.url),
    };

    for _ in 0..=MAX_REDIRECTS {
        let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) else {
            return format!("Error: invalid URL '{url}'.");
        };

        if !policy.allows(&host) {
            debug!(%host, "fetch refused by allow-list");
            return policy.refusal(&host);
        }

        let resp = match fetch_client()
            .get(url.clone())
            .timeout(input.timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return format!(
                    "Error: request timed out after {}s.",
                    input.timeout.as_secs()
                );
            }
            Err(e) => return format!("Error: request failed ({e})."),
        };

        let status = resp.status();
        if status.is_redirection() {
            let Some(location) = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return format!("Error: HTTP {} from {host}.", status.as_u16());
            };
            // Location may be relative; resolve against the current URL.
            url = match url.join(location) {
                Ok(next) => next,
                Err(_) => return format!("Error: invalid redirect target '{location}'."),
            };
            continue;
        }

        if !status.is_success() {
            return format!("Error: HTTP {} from {host}.", status.as_u16());
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type_allowed(&content_type) {
            return format!("Error: unsupported content type '{content_type}'.");
        }

        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return format!(
                    "Error: request timed out after {}s.",
                    input.timeout.as_secs()
                );
            }
            Err(_) => return "Error: failed to decode response body.".to_string(),
        };

        let (mut text, truncated) = truncate_chars(&body, FETCH_MAX_CHARS);
        if truncated {
            text.push_str(TRUNCATION_NOTICE);
        }
        return text;
    }

    "Error: too many redirects.".to_string()
}

/// Whether a `Content-Type` header value names a text-like type.
fn content_type_allowed(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || matches!(
            mime.as_str(),
            "application/json"
                | "application/xml"
                | "application/rss+xml"
                | "application/markdown"
                | "application/x-markdown"
        )
}

/// Truncate to at most `max_chars` characters, always on a char boundary.
fn truncate_chars(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (s[..byte_idx].to_string(), true),
        None => (s.to_string(), false),
    }
}

/// Create the `web_fetch` tool bound to an injected policy.
pub fn web_fetch_tool(policy: Arc<FetchPolicy>) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "web_fetch",
        "Fetch the text content of an allow-listed URL",
        AgentToolParameters::object()
            .string("url", "The URL to fetch", true)
            .number("timeout", "Timeout in seconds (default 10)", false)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let policy = policy.clone();
            async move {
                let url = args.get_str("url")?;
                let mut input = FetchInput::new(url);
                if let Some(secs) = args.get_u64_opt("timeout") {
                    input = input.with_timeout_secs(secs);
                }
                // Gateway outcomes (refusals included) are values the model
                // can read, never errors.
                Ok(serde_json::Value::String(fetch(&policy, &input).await))
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_string_is_exact() {
        let policy = FetchPolicy::default();
        assert_eq!(
            policy.refusal("evil.com"),
            "Refused: domain 'evil.com' not in allow-list."
        );
    }

    #[test]
    fn default_policy_contains_expected_hosts() {
        let policy = FetchPolicy::default();
        assert!(policy.allows("example.com"));
        assert!(policy.allows("api.github.com"));
        assert!(policy.allows("raw.githubusercontent.com"));
        assert!(!policy.allows("evil.com"));
    }

    #[test]
    fn policy_hosts_are_lowercased() {
        let policy = FetchPolicy::new(["Example.COM"]);
        assert!(policy.allows("example.com"));
    }

    #[tokio::test]
    async fn disallowed_host_is_refused_before_any_request() {
        // evil.com is never contacted; the refusal is produced pre-flight.
        let policy = FetchPolicy::default();
        let result = fetch(&policy, &FetchInput::new("https://evil.com/page")).await;
        assert_eq!(result, "Refused: domain 'evil.com' not in allow-list.");
    }

    #[tokio::test]
    async fn invalid_url_returns_error_string() {
        let policy = FetchPolicy::default();
        let result = fetch(&policy, &FetchInput::new("not a url")).await;
        assert!(result.starts_with("Error: invalid URL"));
    }

    #[test]
    fn content_type_allow_set() {
        assert!(content_type_allowed("text/html; charset=utf-8"));
        assert!(content_type_allowed("text/plain"));
        assert!(content_type_allowed("text/markdown"));
        assert!(content_type_allowed("application/json"));
        assert!(content_type_allowed("application/rss+xml"));
        assert!(content_type_allowed("Application/JSON"));
        assert!(!content_type_allowed("image/png"));
        assert!(!content_type_allowed("application/octet-stream"));
        assert!(!content_type_allowed(""));
    }

    #[test]
    fn truncate_chars_respects_ceiling() {
        let long = "x".repeat(5000);
        let (text, truncated) = truncate_chars(&long, FETCH_MAX_CHARS);
        assert!(truncated);
        assert_eq!(text.chars().count(), FETCH_MAX_CHARS);
    }

    #[test]
    fn truncate_chars_never_splits_multibyte() {
        // 4095 ASCII chars then multi-byte codepoints across the boundary
        let mut s = "a".repeat(FETCH_MAX_CHARS - 1);
        s.push_str("日本語のテキスト");
        let (text, truncated) = truncate_chars(&s, FETCH_MAX_CHARS);
        assert!(truncated);
        assert_eq!(text.chars().count(), FETCH_MAX_CHARS);
        assert!(text.ends_with('日'));
        assert!(std::str::from_utf8(text.as_bytes()).is_ok());
    }

    #[test]
    fn short_content_is_untouched() {
        let (text, truncated) = truncate_chars("hello", FETCH_MAX_CHARS);
        assert_eq!(text, "hello");
        assert!(!truncated);
    }

    #[test]
    fn web_fetch_tool_metadata() {
        let tool = web_fetch_tool(Arc::new(FetchPolicy::default()));
        assert_eq!(tool.name(), "web_fetch");
        assert_eq!(tool.parameters().schema["type"], "object");
    }
}
