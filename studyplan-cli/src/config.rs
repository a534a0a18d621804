use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use studyplan_core::{CompletionPurpose, PipelineConfig};
use studyplan_ingest::PdfCommand;

use crate::state::{default_memory_path, ensure_studyplan_home};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub profile: ProfileSection,
    pub ingest: IngestSection,
    pub memory: MemorySection,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// "openai" (any OpenAI-compatible endpoint) or "anthropic".
    pub provider: String,
    pub model: String,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub temperature: StageTemperatures,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_tokens: 2000,
            timeout_secs: 120,
            temperature: StageTemperatures::default(),
        }
    }
}

/// Sampling temperature for each kind of pipeline call (`[llm.temperature]`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTemperatures {
    pub extract: f32,
    pub schedule: f32,
    pub repair: f32,
}

impl Default for StageTemperatures {
    fn default() -> Self {
        Self {
            extract: 0.0,
            schedule: 0.3,
            repair: 0.2,
        }
    }
}

impl StageTemperatures {
    pub fn for_purpose(&self, purpose: CompletionPurpose) -> f32 {
        match purpose {
            CompletionPurpose::Extract => self.extract,
            CompletionPurpose::Schedule => self.schedule,
            CompletionPurpose::Repair => self.repair,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    pub timezone: String,
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// Read images through the configured LLM instead of a placeholder.
    pub vision: bool,
    /// Model for image reading; defaults to `llm.model`.
    pub vision_model: Option<String>,
    /// Unset disables PDF extraction.
    pub pdf: Option<PdfCommand>,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            vision: false,
            vision_model: None,
            pdf: Some(PdfCommand::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// Defaults to ~/.studyplan/memory.json.
    pub path: Option<PathBuf>,
    /// Load the sample history when the store is empty.
    pub seed_when_empty: bool,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            path: None,
            seed_when_empty: true,
        }
    }
}

impl MemorySection {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(p.clone()),
            None => default_memory_path(),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&s).with_context(|| format!("parse {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self).context("serialize config")?;
        fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_studyplan_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    Config::load_from(&config_path()?)
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    Config::default().save_to(&p)?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyplan_core::OverlapMode;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(
            &p,
            r#"
[llm]
provider = "anthropic"
model = "claude-3-5-sonnet-latest"

[llm.temperature]
schedule = 0.5

[ingest]
vision = true

[pipeline.detector]
overlap_mode = "active_set"

[pipeline.repair]
max_attempts = 5
"#,
        )
        .unwrap();

        let cfg = Config::load_from(&p).unwrap();
        assert_eq!(cfg.llm.provider, "anthropic");
        assert_eq!(cfg.llm.max_tokens, 2000);
        assert_eq!(
            cfg.llm.temperature,
            StageTemperatures {
                extract: 0.0,
                schedule: 0.5,
                repair: 0.2,
            }
        );
        assert!(cfg.ingest.vision);
        assert_eq!(cfg.ingest.vision_model, None);
        assert_eq!(cfg.pipeline.detector.overlap_mode, OverlapMode::ActiveSet);
        assert_eq!(cfg.pipeline.detector.duration_ceiling_hours, 5.0);
        assert_eq!(cfg.pipeline.repair.max_attempts, 5);
        assert_eq!(cfg.pipeline.repair.policy.min_gap_minutes, 15);
        assert_eq!(cfg.profile.timezone, "America/Chicago");
        assert!(cfg.ingest.pdf.is_some());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.memory.path = Some(dir.path().join("mem.json"));
        cfg.pipeline.similar_tasks_k = 4;
        cfg.llm.temperature.repair = 0.1;
        cfg.ingest.vision_model = Some("gpt-4o".to_string());
        cfg.save_to(&p).unwrap();

        assert_eq!(Config::load_from(&p).unwrap(), cfg);
    }

    #[test]
    fn temperatures_follow_the_call_purpose() {
        let t = StageTemperatures::default();
        assert_eq!(t.for_purpose(CompletionPurpose::Extract), 0.0);
        assert_eq!(t.for_purpose(CompletionPurpose::Schedule), 0.3);
        assert_eq!(t.for_purpose(CompletionPurpose::Repair), 0.2);
    }
}
