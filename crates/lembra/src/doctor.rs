// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lembra doctor` command implementation.
//!
//! Offline sanity checks over the effective configuration and the local
//! database: nothing here talks to the network, so it is safe to run on a
//! box with no connectivity.

use lembra_config::model::LembraConfig;
use lembra_config::validation;
use lembra_core::StorageAdapter;
use lembra_storage::SqliteStorage;

struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

fn check(name: &'static str, ok: bool, detail: impl Into<String>) -> Check {
    Check {
        name,
        ok,
        detail: detail.into(),
    }
}

/// Run all checks, print a report, and return overall health.
pub async fn run_doctor(config: &LembraConfig) -> bool {
    let mut checks = Vec::new();

    // Config semantic validation.
    match validation::validate_config(config) {
        Ok(()) => checks.push(check("config", true, "valid")),
        Err(errors) => checks.push(check(
            "config",
            false,
            format!("{} validation error(s)", errors.len()),
        )),
    }

    // Database opens and migrates.
    match SqliteStorage::open(&config.storage).await {
        Ok(storage) => {
            let _ = storage.close().await;
            checks.push(check(
                "storage",
                true,
                format!("database at {}", config.storage.database_path),
            ));
        }
        Err(e) => checks.push(check("storage", false, e.to_string())),
    }

    // Channels: at least one configured, and each configured one is sane.
    let telegram = config.telegram.bot_token.is_some();
    let cloud = config.whatsapp.cloud.access_token.is_some();
    let evolution = config.whatsapp.evolution.base_url.is_some();
    let discord = config.discord.bot_token.is_some();

    checks.push(check(
        "channels",
        telegram || cloud || evolution || discord,
        format!(
            "telegram={telegram} whatsapp_cloud={cloud} evolution={evolution} discord={discord}"
        ),
    ));

    if telegram {
        checks.push(check(
            "telegram.webhook_secret",
            config.telegram.webhook_secret.is_some() || config.gateway.dev_allow_unverified,
            if config.telegram.webhook_secret.is_some() {
                "configured"
            } else {
                "missing (webhooks will be rejected)"
            },
        ));
    }
    if cloud {
        checks.push(check(
            "whatsapp.cloud",
            config.whatsapp.cloud.phone_number_id.is_some()
                && config.whatsapp.cloud.app_secret.is_some(),
            "phone_number_id and app_secret",
        ));
    }
    if evolution {
        checks.push(check(
            "whatsapp.evolution",
            config.whatsapp.evolution.api_key.is_some()
                && config.whatsapp.evolution.instance.is_some(),
            "api_key and instance",
        ));
    }
    if discord {
        let key_ok = match config.discord.public_key.as_deref() {
            Some(key) => hex::decode(key).map(|b| b.len() == 32).unwrap_or(false),
            None => true,
        };
        checks.push(check("discord.public_key", key_ok, "32-byte hex when set"));
    }

    // LLM and enrichment are optional but worth surfacing.
    checks.push(check(
        "llm",
        true,
        if config.llm.api_key.is_some() {
            format!("backend={} model={}", config.llm.backend, config.llm.model)
        } else {
            "no api key (deterministic tiers only)".to_string()
        },
    ));
    checks.push(check(
        "enrichment",
        true,
        format!(
            "tmdb={} youtube={}",
            config.enrichment.tmdb_api_key.is_some(),
            config.enrichment.youtube_api_key.is_some()
        ),
    ));

    let mut healthy = true;
    for c in &checks {
        let mark = if c.ok { "ok " } else { "FAIL" };
        println!("[{mark}] {:<24} {}", c.name, c.detail);
        healthy &= c.ok;
    }
    if healthy {
        println!("\nlembra doctor: all checks passed");
    } else {
        println!("\nlembra doctor: problems found");
    }
    healthy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn doctor_flags_missing_channels() {
        let mut config = LembraConfig::default();
        let dir = tempfile::tempdir().unwrap();
        config.storage.database_path = dir
            .path()
            .join("doctor.db")
            .to_str()
            .unwrap()
            .to_string();

        // No channels configured: unhealthy but does not panic.
        assert!(!run_doctor(&config).await);
    }

    #[tokio::test]
    async fn doctor_passes_with_one_channel() {
        let mut config = LembraConfig::default();
        let dir = tempfile::tempdir().unwrap();
        config.storage.database_path = dir
            .path()
            .join("doctor.db")
            .to_str()
            .unwrap()
            .to_string();
        config.telegram.bot_token = Some("123:ABC".to_string());
        config.telegram.webhook_secret = Some("secret".to_string());

        assert!(run_doctor(&config).await);
    }
}
