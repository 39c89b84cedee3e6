//! Tagged event hooks.
//!
//! Listeners are grouped by tag and ordered by priority (lowest first,
//! then registration order). Each listener sees the result of the one
//! before it; the last result wins, and an empty result means "no change".

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::http::Request;

pub const DISPATCH_BEFORE: &str = "dispatch.before";
pub const DISPATCH_AFTER: &str = "dispatch.after";
pub const OUTPUT_BEFORE: &str = "output.before";
pub const OUTPUT_FILTER: &str = "output.filter";
pub const OUTPUT_AFTER: &str = "output.after";

/// What a listener is called with.
#[derive(Debug)]
pub struct Event<'a> {
    pub tag: &'a str,
    pub request: &'a Request,
    /// Output produced so far.
    pub output: &'a str,
    /// Result of the previous listener for this trigger.
    pub previous: Option<&'a str>,
}

pub type Listener = Arc<dyn Fn(&Event<'_>) -> Option<String> + Send + Sync>;

#[derive(Default, Clone)]
pub struct Events {
    listeners: HashMap<String, BTreeMap<i32, Vec<Listener>>>,
}

impl std::fmt::Debug for Events {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&String> = self.listeners.keys().collect();
        tags.sort();
        f.debug_struct("Events").field("tags", &tags).finish()
    }
}

impl Events {
    pub fn listen<F>(&mut self, tag: &str, priority: i32, listener: F)
    where
        F: Fn(&Event<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.listeners
            .entry(tag.to_string())
            .or_default()
            .entry(priority)
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn has(&self, tag: &str) -> bool {
        self.listeners.contains_key(tag)
    }

    /// Call every listener of `tag` and return the last non-empty result,
    /// or `default`.
    pub fn trigger(
        &self,
        tag: &str,
        request: &Request,
        output: &str,
        default: Option<String>,
    ) -> Option<String> {
        let Some(by_priority) = self.listeners.get(tag) else {
            return default;
        };
        let mut filtered: Option<String> = None;
        for listener in by_priority.values().flatten() {
            let event = Event {
                tag,
                request,
                output,
                previous: filtered.as_deref(),
            };
            filtered = listener(&event);
        }
        let listeners = by_priority.values().map(Vec::len).sum::<usize>();
        tracing::trace!(tag = %tag, listeners, "Event triggered");
        match filtered {
            Some(result) if !result.is_empty() => Some(result),
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new("GET", "/")
    }

    #[test]
    fn test_no_listeners_returns_default() {
        let events = Events::default();
        assert_eq!(
            events.trigger("x", &request(), "", Some("d".into())),
            Some("d".into())
        );
        assert!(!events.has("x"));
    }

    #[test]
    fn test_priority_order_and_chaining() {
        let mut events = Events::default();
        events.listen("t", 10, |e| Some(format!("{}+late", e.previous.unwrap_or(""))));
        events.listen("t", 0, |_| Some("early".into()));
        events.listen("t", 0, |e| Some(format!("{}+second", e.previous.unwrap_or(""))));

        assert_eq!(
            events.trigger("t", &request(), "", None),
            Some("early+second+late".into())
        );
    }

    #[test]
    fn test_empty_result_falls_back_to_default() {
        let mut events = Events::default();
        events.listen("t", 0, |_| Some("first".into()));
        events.listen("t", 1, |_| None);
        assert_eq!(
            events.trigger("t", &request(), "out", Some("out".into())),
            Some("out".into())
        );
    }

    #[test]
    fn test_listener_sees_output() {
        let mut events = Events::default();
        events.listen(OUTPUT_FILTER, 0, |e| Some(e.output.to_uppercase()));
        assert_eq!(
            events.trigger(OUTPUT_FILTER, &request(), "hello", None),
            Some("HELLO".into())
        );
    }
}
