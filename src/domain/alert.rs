use super::Occurrence;

/// A message ready for hand-off to the alert channel. Created per
/// occurrence, consumed once, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertMessage {
    pub body: String,
    pub origin: String,
    pub destination: String,
}

impl AlertMessage {
    pub fn for_occurrence(occurrence: &Occurrence, origin: &str, destination: &str) -> Self {
        Self {
            body: render(occurrence),
            origin: origin.to_string(),
            destination: destination.to_string(),
        }
    }
}

/// Evidence of a successful send. Logged, not retained.
#[derive(Clone, Debug)]
pub struct DeliveryReceipt {
    pub id: String,
}

/// Render an occurrence as a human-readable alert body. Pure and
/// deterministic: attributes come out in key order.
pub fn render(occurrence: &Occurrence) -> String {
    let mut lines = vec![format!(
        "Watchdog alert: event '{}' detected on {} at {}.",
        occurrence.event_name, occurrence.source_address, occurrence.sequence
    )];

    if !occurrence.attributes.is_empty() {
        let attrs: Vec<String> = occurrence
            .attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_value(v)))
            .collect();
        lines.push(format!("Details: {}", attrs.join(", ")));
    }

    lines.join("\n")
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
