//! slack-moderator setup wizard.
//!
//! Prompts for the Slack and Watson credentials on the terminal and writes a
//! `config.toml` the moderator can load. The target directory is taken from
//! `MODERATOR_ROOT`, falling back to the current directory.

use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    verification_token: &'a str,
    access_token: &'a str,
    vr_api_key: &'a str,
    nlu_api_key: &'a str,
    nlu_username: &'a str,
    nlu_password: &'a str,
    bind: &'a str,
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> String {
    let verification_token = p.verification_token;
    let access_token = p.access_token;
    let vr_api_key = p.vr_api_key;
    let bind = p.bind;

    let nlu_auth = if p.nlu_api_key.is_empty() {
        format!(
            "username = \"{}\"\npassword = \"{}\"",
            p.nlu_username, p.nlu_password
        )
    } else {
        format!("api_key = \"{}\"", p.nlu_api_key)
    };

    format!(
        r#"[slack]
verification_token = "{verification_token}"
access_token = "{access_token}"
api_base = "https://slack.com/api"

[visual_recognition]
api_key = "{vr_api_key}"
url = "https://gateway.watsonplatform.net/visual-recognition/api"
version = "2016-05-20"
threshold = 0.6

[natural_language]
{nlu_auth}
url = "https://gateway.watsonplatform.net/natural-language-understanding/api"
version = "2018-03-16"
keyword_limit = 2

[moderation]
explicit_notice = "File removed due to containing explicit content"
civility_notice = "please be more polite ..."
hostility_threshold = 0.5

[server]
bind = "{bind}"
request_timeout_secs = 10
"#
    )
}

// ── CLI ────────────────────────────────────────────────────────────────────────

fn run_cli(project_root: &Path) -> Result<()> {
    println!("=== slack-moderator setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let verification_token = read_line("Slack verification token: ")?;
    let access_token = read_line("Slack bot access token (xoxb-...): ")?;
    if verification_token.is_empty() || access_token.is_empty() {
        bail!("Both Slack tokens are required");
    }

    let vr_api_key = read_line("Visual Recognition API key: ")?;
    let nlu_api_key = read_line("Natural Language Understanding API key (blank for username/password): ")?;
    let (nlu_username, nlu_password) = if nlu_api_key.is_empty() {
        (
            read_line("Natural Language Understanding username: ")?,
            read_line("Natural Language Understanding password: ")?,
        )
    } else {
        (String::new(), String::new())
    };
    let bind = or_default(read_line("Listen address [0.0.0.0:8080]: ")?, "0.0.0.0:8080");

    let config = format_config(&ConfigParams {
        verification_token: &verification_token,
        access_token: &access_token,
        vr_api_key: &vr_api_key,
        nlu_api_key: &nlu_api_key,
        nlu_username: &nlu_username,
        nlu_password: &nlu_password,
        bind: &bind,
    });

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the moderator with:  cargo run --bin slack-moderator");
    Ok(())
}

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("MODERATOR_ROOT").unwrap_or_else(|_| ".".to_string()));
    run_cli(&project_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
