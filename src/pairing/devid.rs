use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceIdState {
    next_available_id: u64,
}

/// Hands out unique, increasing local device ids.
/// Allocation is read-increment-store under one lock, optionally persisted to json file.
pub struct DeviceIdAllocator {
    path: Option<String>,
    next: std::sync::Mutex<u64>,
}

impl DeviceIdAllocator {
    pub fn in_memory(first_id: u64) -> Self {
        Self {
            path: None,
            next: std::sync::Mutex::new(first_id),
        }
    }

    /// Load state from path. Missing file starts at first_id.
    pub fn load(path: &str, first_id: u64) -> Result<Self> {
        let next = match std::fs::read_to_string(path) {
            Ok(data) => {
                let state: DeviceIdState =
                    serde_json::from_str(&data).context(format!("parsing {}", path))?;
                state.next_available_id
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => first_id,
            Err(e) => return Err(e).context(format!("reading {}", path)),
        };
        Ok(Self {
            path: Some(path.to_owned()),
            next: std::sync::Mutex::new(next),
        })
    }

    fn save(&self, next_available_id: u64) -> Result<()> {
        if let Some(path) = &self.path {
            let data = serde_json::to_string_pretty(&DeviceIdState { next_available_id })?;
            std::fs::write(path, data).context(format!("writing device id state to {}", path))?;
        }
        Ok(())
    }

    pub fn allocate(&self) -> Result<u64> {
        let mut next = self
            .next
            .lock()
            .map_err(|e| anyhow::anyhow!("device id lock: {}", e))?;
        let id = *next;
        let following = id.checked_add(1).context("device id space exhausted")?;
        // id is consumed only when new state is stored
        self.save(following)?;
        *next = following;
        Ok(id)
    }

    pub fn peek(&self) -> Result<u64> {
        let next = self
            .next
            .lock()
            .map_err(|e| anyhow::anyhow!("device id lock: {}", e))?;
        Ok(*next)
    }
}
