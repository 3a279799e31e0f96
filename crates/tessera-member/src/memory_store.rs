use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tessera_core::{StateStore, StoreKey, TesseraError, TesseraResult};

/// State store kept in process memory.
///
/// Nothing survives a restart; suited to tests and short-lived clients.
pub struct InMemoryStateStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

fn lock_data(
    mutex: &Mutex<HashMap<String, Vec<u8>>>,
) -> TesseraResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
    mutex
        .lock()
        .map_err(|e| TesseraError::Storage(format!("lock poisoned: {}", e)))
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        lock_data(&self.data)
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        lock_data(&self.data).map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, key: &StoreKey) -> TesseraResult<bool> {
        let mut data = lock_data(&self.data)?;
        Ok(data.remove(key.as_str()).is_some())
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &StoreKey) -> TesseraResult<Option<Vec<u8>>> {
        let data = lock_data(&self.data)?;
        Ok(data.get(key.as_str()).cloned())
    }

    fn set(&self, key: &StoreKey, value: &[u8]) -> TesseraResult<()> {
        let mut data = lock_data(&self.data)?;
        data.insert(key.as_str().to_string(), value.to_vec());
        Ok(())
    }
}
