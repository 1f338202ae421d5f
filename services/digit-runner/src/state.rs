//! State Management - Write "chatty" state files for observability
//!
//! Per instance:
//! - `state/<instance>/now.json`: latest engine snapshot, rewritten on every
//!   resolution and heartbeat
//! - `journal/<instance>.jsonl`: one line per resolved decision

use crate::config::TradingMode;
use crate::engine::{EngineSnapshot, ResolvedDecision};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Manages state files for observability
pub struct StateManager {
    state_dir: PathBuf,
    journal_path: PathBuf,
}

/// Current status (state/<instance>/now.json)
#[derive(Debug, Clone, Serialize)]
pub struct NowState<'a> {
    pub timestamp: String,
    pub mode: TradingMode,
    pub venue: &'a str,
    pub connected: bool,
    #[serde(flatten)]
    pub engine: &'a EngineSnapshot,
}

impl StateManager {
    pub fn new(base_dir: &Path, instance: &str) -> Self {
        Self {
            state_dir: base_dir.join("state").join(instance),
            journal_path: base_dir.join("journal").join(format!("{}.jsonl", instance)),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        if let Some(parent) = self.journal_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    pub fn now_path(&self) -> PathBuf {
        self.state_dir.join("now.json")
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Replace now.json; written to a temp file first so readers never see half a file
    pub async fn write_now(&self, state: &NowState<'_>) -> anyhow::Result<()> {
        let path = self.now_path();
        let tmp = self.state_dir.join("now.json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    /// Append one resolved decision to the journal
    pub async fn append_resolution(&self, resolved: &ResolvedDecision) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(resolved)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceConfig, SymbolConfig};
    use crate::engine::Engine;
    use crate::types::Outcome;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tick_feed::ContractKind;
    use uuid::Uuid;

    fn engine() -> Engine {
        Engine::new(&InstanceConfig::new(
            "alpha",
            vec![SymbolConfig {
                symbol: "R_10".to_string(),
                precision: 3,
            }],
        ))
    }

    fn resolved(profit: i64) -> ResolvedDecision {
        ResolvedDecision {
            decision_id: Uuid::new_v4(),
            contract_id: Some("123".to_string()),
            symbol: "R_10".to_string(),
            contract: ContractKind::DigitEven,
            barrier: None,
            stake: Decimal::ONE,
            outcome: if profit > 0 { Outcome::Win } else { Outcome::Loss },
            profit: Decimal::from(profit),
            exit_digit: None,
            cumulative_profit: Decimal::from(profit),
            next_stake: Decimal::ONE,
            consecutive_losses: 0,
            stake_reset: None,
            detector: "run_length".to_string(),
            leg: None,
            round: None,
            resolved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_write_now() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path(), "alpha");
        manager.init().await.unwrap();

        let snapshot = engine().snapshot();
        let state = NowState {
            timestamp: Utc::now().to_rfc3339(),
            mode: TradingMode::Paper,
            venue: "paper",
            connected: true,
            engine: &snapshot,
        };
        manager.write_now(&state).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("state/alpha/now.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["instance"], "alpha");
        assert_eq!(json["mode"], "paper");
        assert_eq!(json["status"]["state"], "running");
        assert!(!dir.path().join("state/alpha/now.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path(), "alpha");
        manager.init().await.unwrap();

        manager.append_resolution(&resolved(-1)).await.unwrap();
        manager.append_resolution(&resolved(2)).await.unwrap();

        let raw = std::fs::read_to_string(manager.journal_path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["outcome"], "win");
        assert_eq!(second["contract"], "digit_even");
    }
}
