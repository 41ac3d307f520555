//! Event-name listener table.

use std::{collections::HashMap, fmt::Debug};

use serde_json::Value;

type Listener = Box<dyn Fn(&Value) + Send + Sync>;

/// Listeners keyed by event name.
///
/// Listeners of one name run synchronously, in registration order.
#[derive(Default)]
pub struct Listeners {
    table: HashMap<String, Vec<Listener>>,
}

impl Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.table.iter().map(|(name, l)| (name, l.len())))
            .finish()
    }
}

impl Listeners {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for event `name`
    pub fn on<S, F>(&mut self, name: S, listener: F) -> &mut Self
    where
        S: Into<String>,
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let name = name.into();
        log::debug!("Register listener for {}", name);
        self.table.entry(name).or_default().push(Box::new(listener));
        self
    }

    /// Invoke every listener of `name`, returns how many ran
    pub fn emit(&self, name: &str, payload: &Value) -> usize {
        match self.table.get(name) {
            Some(listeners) => {
                for listener in listeners {
                    listener(payload);
                }
                listeners.len()
            }
            None => {
                log::trace!("No listener for {}", name);
                0
            }
        }
    }

    /// Number of listeners of `name`
    pub fn count(&self, name: &str) -> usize {
        self.table.get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    #[test]
    fn test_emit_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::new();

        for i in 0..3 {
            let calls = Arc::clone(&calls);
            listeners.on("MESSAGE_CREATE", move |payload: &Value| {
                calls.lock().unwrap().push((i, payload["content"].clone()));
            });
        }

        let ran = listeners.emit("MESSAGE_CREATE", &json!({"content": "hi"}));

        assert_eq!(ran, 3);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(0, json!("hi")), (1, json!("hi")), (2, json!("hi"))]
        );
    }

    #[test]
    fn test_emit_unknown_name() {
        let mut listeners = Listeners::new();
        listeners.on("ready", |_: &Value| panic!("must not run"));

        assert_eq!(listeners.emit("READY", &Value::Null), 0);
        assert_eq!(listeners.count("ready"), 1);
        assert_eq!(listeners.count("READY"), 0);
    }
}
