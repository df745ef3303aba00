use crate::potential::{TaskStatus, PERCENT_RANGE};
use crate::snapshots::PotentialSnapshot;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const HISTORY_FORMAT_V1: &str = "homework-potential-history-v1";

/// On-disk potential history. Snapshots are stored oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFile {
    pub format: String,
    pub app_version: String,
    pub exported_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    pub snapshot_count: usize,
    pub snapshots_sha256: String,
    pub snapshots: Vec<PotentialSnapshot>,
}

pub fn snapshots_sha256(snapshots: &[PotentialSnapshot]) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(snapshots).context("failed to serialize snapshots")?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn build_history_file(
    subject_id: Option<&str>,
    snapshots: Vec<PotentialSnapshot>,
) -> anyhow::Result<HistoryFile> {
    Ok(HistoryFile {
        format: HISTORY_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        subject_id: subject_id.map(|s| s.to_string()),
        snapshot_count: snapshots.len(),
        snapshots_sha256: snapshots_sha256(&snapshots)?,
        snapshots,
    })
}

/// Parses and checks a history file. Nothing is returned unless the format,
/// the digest and every snapshot are valid.
pub fn parse_history_file(text: &str) -> anyhow::Result<Vec<PotentialSnapshot>> {
    let file: HistoryFile =
        serde_json::from_str(text).context("not a potential history file")?;
    if file.format != HISTORY_FORMAT_V1 {
        return Err(anyhow!("unsupported history format: {}", file.format));
    }
    if file.snapshot_count != file.snapshots.len() {
        return Err(anyhow!(
            "snapshot count mismatch: header says {}, file has {}",
            file.snapshot_count,
            file.snapshots.len()
        ));
    }

    let expected = file.snapshots_sha256.to_ascii_lowercase();
    let actual = snapshots_sha256(&file.snapshots)?;
    if actual != expected {
        return Err(anyhow!(
            "snapshots checksum mismatch: expected {}, got {}",
            expected,
            actual
        ));
    }

    let mut out = Vec::with_capacity(file.snapshots.len());
    for (index, s) in file.snapshots.into_iter().enumerate() {
        out.push(validate_snapshot(s).with_context(|| format!("snapshot {}", index))?);
    }
    Ok(out)
}

fn validate_snapshot(mut s: PotentialSnapshot) -> anyhow::Result<PotentialSnapshot> {
    if s.id.trim().is_empty() {
        return Err(anyhow!("empty id"));
    }
    if s.subject_id.trim().is_empty() {
        return Err(anyhow!("empty subjectId"));
    }
    if !PERCENT_RANGE.contains(&s.percent) {
        return Err(anyhow!("percent out of range: {}", s.percent));
    }
    let label = TaskStatus::parse(&s.label).ok_or_else(|| anyhow!("unknown label: {}", s.label))?;
    s.label = label.as_str().to_string();
    if s.task_count < 0 {
        return Err(anyhow!("negative taskCount: {}", s.task_count));
    }
    chrono::DateTime::parse_from_rfc3339(&s.recorded_at)
        .with_context(|| format!("bad recordedAt: {}", s.recorded_at))?;
    Ok(s)
}
