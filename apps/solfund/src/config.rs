use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use chain::Commitment;
use client_core::DEFAULT_FOUNDER;
use serde::{
    de::{self, value::StrDeserializer, IntoDeserializer},
    Deserialize,
};

pub const CONFIG_FILE: &str = "solfund.toml";

const KEYS: &[&str] = &[
    "rpc_url",
    "fallback_rpc_url",
    "program_id",
    "founder_pubkey",
    "metadata_url",
    "metadata_api_key",
    "keypair_path",
    "commitment",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub rpc_url: String,
    pub fallback_rpc_url: Option<String>,
    pub program_id: Option<String>,
    pub founder_pubkey: String,
    pub metadata_url: Option<String>,
    pub metadata_api_key: String,
    pub keypair_path: Option<PathBuf>,
    pub commitment: Commitment,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".into(),
            fallback_rpc_url: None,
            program_id: None,
            founder_pubkey: DEFAULT_FOUNDER.into(),
            metadata_url: None,
            metadata_api_key: String::new(),
            keypair_path: None,
            commitment: Commitment::Confirmed,
        }
    }
}

impl Settings {
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim();
        let optional = || (!value.is_empty()).then(|| value.to_string());
        match key {
            "rpc_url" => self.rpc_url = value.to_string(),
            "fallback_rpc_url" => self.fallback_rpc_url = optional(),
            "program_id" => self.program_id = optional(),
            "founder_pubkey" => self.founder_pubkey = value.to_string(),
            "metadata_url" => self.metadata_url = optional(),
            "metadata_api_key" => self.metadata_api_key = value.to_string(),
            "keypair_path" => self.keypair_path = optional().map(PathBuf::from),
            "commitment" => self.commitment = parse_commitment(value)?,
            other => bail!("unknown setting '{other}'"),
        }
        Ok(())
    }
}

/// Accepts the same lowercase names the RPC uses, in any case.
pub fn parse_commitment(raw: &str) -> anyhow::Result<Commitment> {
    let lower = raw.trim().to_ascii_lowercase();
    let deserializer: StrDeserializer<'_, de::value::Error> = lower.as_str().into_deserializer();
    Commitment::deserialize(deserializer).with_context(|| format!("unknown commitment level '{raw}'"))
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_with(path, |name| std::env::var(name).ok())
}

/// Defaults, then the TOML file at `path` if present, then `SOLFUND_<KEY>`
/// and `APP__<KEY>` variables read through `env`. Later sources win.
pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    if let Some(home) = env("HOME") {
        settings.keypair_path = Some(Path::new(&home).join(".config/solana/id.json"));
    }

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: HashMap<String, String> = toml::from_str(&raw)
                .with_context(|| format!("failed to parse '{}'", path.display()))?;
            for (key, value) in &file_cfg {
                settings
                    .set(key, value)
                    .with_context(|| format!("invalid entry in '{}'", path.display()))?;
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    }

    for key in KEYS {
        let upper = key.to_ascii_uppercase();
        for name in [format!("SOLFUND_{upper}"), format!("APP__{upper}")] {
            if let Some(value) = env(&name) {
                settings
                    .set(key, &value)
                    .with_context(|| format!("invalid value in {name}"))?;
            }
        }
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
