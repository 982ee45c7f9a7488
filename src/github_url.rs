//! Parsing of user-supplied repository references.
//!
//! Accepted forms:
//!
//! | Input | Example |
//! |-------|---------|
//! | Full URL, optional trailing slash | `https://github.com/vercel/next.js/` |
//! | Shorthand | `vercel/next.js` |
//!
//! Owner and repository names are limited to `[A-Za-z0-9._-]+`.

use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

use repo_index_core::RepoKey;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https://github\.com/([a-zA-Z0-9._-]+)/([a-zA-Z0-9._-]+)/?$")
            .expect("valid GitHub URL pattern")
    })
}

fn shorthand_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([a-zA-Z0-9._-]+)/([a-zA-Z0-9._-]+)$").expect("valid shorthand pattern")
    })
}

/// Parse a GitHub repository URL or `owner/repo` shorthand.
pub fn parse_repo_url(input: &str) -> Result<RepoKey> {
    let input = input.trim();
    let captures = url_regex()
        .captures(input)
        .or_else(|| shorthand_regex().captures(input));

    let Some(caps) = captures else {
        bail!(
            "invalid GitHub repository '{}': expected https://github.com/<owner>/<repo> or <owner>/<repo>",
            input
        );
    };

    let owner = &caps[1];
    let repo = &caps[2];
    for name in [owner, repo] {
        if name == "." || name == ".." {
            bail!("invalid GitHub repository '{}': '{}' is not a name", input, name);
        }
    }
    Ok(RepoKey::new(owner, repo))
}
