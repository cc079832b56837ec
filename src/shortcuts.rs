use std::collections::HashMap;

/// Keyboard shortcut handlers keyed by key name ("space", "s", "f11").
pub struct ShortcutRegistry {
    handlers: HashMap<String, Box<dyn FnMut()>>,
}

impl ShortcutRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind `handler` to `key`. Returns true if it replaced an existing binding.
    pub fn set(&mut self, key: &str, handler: impl FnMut() + 'static) -> bool {
        self.handlers
            .insert(normalize(key), Box::new(handler))
            .is_some()
    }

    /// Remove the binding for `key`. Returns false if nothing was bound.
    pub fn clear(&mut self, key: &str) -> bool {
        self.handlers.remove(&normalize(key)).is_some()
    }

    /// Run the handler bound to `key`, if any.
    pub fn trigger(&mut self, key: &str) -> bool {
        match self.handlers.get_mut(&normalize(key)) {
            Some(handler) => {
                handler();
                true
            }
            None => {
                log::debug!("no shortcut bound to '{key}'");
                false
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(&normalize(key))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Bound keys, sorted (for help overlays).
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for ShortcutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
