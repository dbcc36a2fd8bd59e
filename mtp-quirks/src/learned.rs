use std::hash::Hasher;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

/// Tuning refined from observed transfers for one device fingerprint
/// (§3 `LearnedProfile`). Refinements narrow tuning only -- they never
/// flip a capability flag (§4.4 step 5).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedProfile {
    /// The fingerprint (`"vid:pid"`) this profile was learned for.
    pub fingerprint_hash: String,
    /// How many samples have contributed to this profile.
    pub sample_count: u64,
    /// Chunk size observed to perform best.
    pub optimal_chunk_bytes: Option<u64>,
    /// Average OpenSession handshake latency observed.
    pub avg_handshake_ms: Option<u64>,
    /// I/O timeout observed to avoid both false timeouts and long stalls.
    pub optimal_io_timeout_ms: Option<u64>,
    /// 95th-percentile observed read throughput, MB/s.
    pub p95_read_throughput: Option<f64>,
    /// 95th-percentile observed write throughput, MB/s.
    pub p95_write_throughput: Option<f64>,
    /// Fraction of attempts that completed without a permanent error.
    pub success_rate: Option<f64>,
    /// A short description of the host environment the sample was
    /// taken on (OS/arch), for cross-host comparison.
    pub host_env: Option<String>,
}

/// Stable filename-safe hash of a `"vid:pid"` fingerprint, used as the
/// learned-profile filename (§9A.5, §6 `learned/<fingerprint-hash>.json`).
pub fn fingerprint_hash(fingerprint: &str) -> String {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write(fingerprint.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Path to a learned-profile file under `data_dir/learned/`.
pub fn learned_path(data_dir: &Path, fingerprint: &str) -> PathBuf {
    data_dir
        .join("learned")
        .join(format!("{}.json", fingerprint_hash(fingerprint)))
}

impl LearnedProfile {
    /// Load a learned profile from disk, if present.
    pub fn load(data_dir: &Path, fingerprint: &str) -> std::io::Result<Option<Self>> {
        let path = learned_path(data_dir, fingerprint);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, e)
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist this profile under `data_dir/learned/`, creating the
    /// directory if needed.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = learned_path(data_dir, &self.fingerprint_hash);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)
    }

    /// Fold this profile's refinements into `policy`, never flipping a
    /// flag (§4.4 step 5).
    pub fn apply(&self, policy: &mut super::policy::DevicePolicy) {
        if let Some(v) = self.optimal_chunk_bytes {
            policy.tuning.max_chunk_bytes = v;
        }
        if let Some(v) = self.optimal_io_timeout_ms {
            policy.tuning.io_timeout_ms = v;
        }
    }
}
