#[derive(Debug, Clone)]
pub struct TelemetryLabels {
    pub scope_type: String,
    pub scope_id: Option<String>,
    pub sender_id: Option<String>,
    pub message_id: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl TelemetryLabels {
    pub fn new(scope_type: impl Into<String>) -> Self {
        Self {
            scope_type: scope_type.into(),
            scope_id: None,
            sender_id: None,
            message_id: None,
            extra: Vec::new(),
        }
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(4 + self.extra.len());
        tags.push(("scope_type".into(), self.scope_type.clone()));
        if let Some(scope_id) = &self.scope_id {
            tags.push(("scope_id".into(), scope_id.clone()));
        }
        if let Some(sender_id) = &self.sender_id {
            tags.push(("sender_id".into(), sender_id.clone()));
        }
        if let Some(message_id) = &self.message_id {
            tags.push(("message_id".into(), message_id.clone()));
        }
        for (key, value) in &self.extra {
            tags.push((key.clone(), value.clone()));
        }
        tags
    }
}

#[derive(Debug, Clone)]
pub struct EventContext {
    pub labels: TelemetryLabels,
}

impl EventContext {
    pub fn new(labels: TelemetryLabels) -> Self {
        Self { labels }
    }
}
