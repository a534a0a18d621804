use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::state::ensure_studyplan_home;

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub anthropic_token: Option<String>,
    pub openai_api_key: Option<String>,
}

impl AuthState {
    pub fn openai_key(&self) -> Option<String> {
        stored_or_env(self.openai_api_key.as_deref(), std::env::var(OPENAI_KEY_ENV).ok())
    }

    pub fn anthropic_key(&self) -> Option<String> {
        stored_or_env(self.anthropic_token.as_deref(), std::env::var(ANTHROPIC_KEY_ENV).ok())
    }
}

/// The stored secret, else the environment value; blanks count as unset.
fn stored_or_env(stored: Option<&str>, env: Option<String>) -> Option<String> {
    stored
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| env.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

fn auth_path() -> Result<PathBuf> {
    Ok(ensure_studyplan_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    let p = auth_path()?;
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_auth(auth: &AuthState) -> Result<()> {
    let p = auth_path()?;
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn anthropic_paste_token() -> Result<()> {
    let mut auth = load_auth()?;
    let token = prompt_secret("Paste Anthropic token (starts with sk-ant-)")?;
    if !token.starts_with("sk-ant-") {
        bail!("token didn't look like an Anthropic token (expected prefix sk-ant-)");
    }
    auth.anthropic_token = Some(token);
    save_auth(&auth)?;
    println!("Saved Anthropic token to ~/.studyplan/auth.json");
    Ok(())
}

pub fn openai_paste_api_key() -> Result<()> {
    let mut auth = load_auth()?;
    let key = prompt_secret("Paste OpenAI-compatible API key")?;
    if key.is_empty() {
        bail!("no key entered");
    }
    auth.openai_api_key = Some(key);
    save_auth(&auth)?;
    println!("Saved API key to ~/.studyplan/auth.json");
    Ok(())
}
