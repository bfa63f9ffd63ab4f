//! Evaluation observers: start/end/abort events and an audit rendering.
use crate::periods::Period;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Start { variable: String, period: Period },
    End { variable: String, period: Period, len: usize },
    Abort { variable: String, period: Period },
}

/// Notified around every evaluation, including cache hits and nested calls.
/// Implementations must tolerate repeated `(variable, period)` pairs and must
/// not alter evaluation results.
pub trait Tracer: Send {
    fn on_event(&mut self, event: TraceEvent);

    fn boxed_clone(&self) -> Box<dyn Tracer + Send>;
}

/// Records events into a shared log the caller keeps a handle to. Cloning
/// shares the log, so a session clone's tracer appends to the same audit.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clear();
    }
}

impl Tracer for EventLog {
    fn on_event(&mut self, event: TraceEvent) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event);
    }

    fn boxed_clone(&self) -> Box<dyn Tracer + Send> {
        Box::new(self.clone())
    }
}

/// Formats an event sequence as an indented audit trace, one line per event,
/// nesting following the call structure.
pub fn render(events: &[TraceEvent]) -> String {
    let mut out = String::from("CALCULATION TRACE\n");
    out.push_str("--------------------------------------------------\n");
    let mut depth = 0usize;
    for event in events {
        match event {
            TraceEvent::Start { variable, period } => {
                let _ = writeln!(out, "{}> {}<{}>", "  ".repeat(depth), variable, period);
                depth += 1;
            }
            TraceEvent::End { variable, period, len } => {
                depth = depth.saturating_sub(1);
                let _ = writeln!(
                    out,
                    "{}= {}<{}> -> {} value(s)",
                    "  ".repeat(depth),
                    variable,
                    period
                , len);
            }
            TraceEvent::Abort { variable, period } => {
                depth = depth.saturating_sub(1);
                let _ =
                    writeln!(out, "{}! {}<{}> aborted", "  ".repeat(depth), variable, period);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_is_shared_across_clones() {
        let log = EventLog::new();
        let mut copy = log.boxed_clone();
        copy.on_event(TraceEvent::Start {
            variable: "salary".to_string(),
            period: Period::month(2020, 1),
        });
        assert_eq!(log.events().len(), 1);
    }

    #[test]
    fn test_render_nests_by_call_structure() {
        let events = vec![
            TraceEvent::Start { variable: "tax".into(), period: Period::month(2020, 1) },
            TraceEvent::Start { variable: "salary".into(), period: Period::month(2020, 1) },
            TraceEvent::End { variable: "salary".into(), period: Period::month(2020, 1), len: 2 },
            TraceEvent::End { variable: "tax".into(), period: Period::month(2020, 1), len: 2 },
        ];
        let text = render(&events);
        assert!(text.contains("> tax<2020-01>"));
        assert!(text.contains("  > salary<2020-01>"));
        assert!(text.contains("  = salary<2020-01> -> 2 value(s)"));
        assert!(text.contains("= tax<2020-01> -> 2 value(s)"));
    }
}
