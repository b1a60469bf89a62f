use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct IdGenerator {}

static ID_MAP: Lazy<Mutex<HashMap<&'static str, AtomicUsize>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl IdGenerator {
    /// Returns the next id for `key`, starting at 1. Ids are never reused.
    pub fn next_id(key: &'static str) -> usize {
        let mut map = match ID_MAP.lock() {
            Ok(map) => map,
            //计数器本身不会处于不一致状态
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(key)
            .or_insert_with(|| AtomicUsize::new(1))
            .fetch_add(1, Ordering::SeqCst)
    }
}
