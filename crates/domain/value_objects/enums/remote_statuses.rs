use std::fmt::Display;

/// Payment status as reported by the gateway (webhook body or status query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Succeeded,
    Pending,
    WaitingForCapture,
    Canceled,
    Unknown(String),
}

impl RemoteStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "succeeded" => RemoteStatus::Succeeded,
            "pending" => RemoteStatus::Pending,
            "waiting_for_capture" => RemoteStatus::WaitingForCapture,
            "canceled" => RemoteStatus::Canceled,
            other => RemoteStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RemoteStatus::Succeeded => "succeeded",
            RemoteStatus::Pending => "pending",
            RemoteStatus::WaitingForCapture => "waiting_for_capture",
            RemoteStatus::Canceled => "canceled",
            RemoteStatus::Unknown(raw) => raw.as_str(),
        }
    }
}

impl Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
