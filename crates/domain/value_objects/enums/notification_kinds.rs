use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ExpiresIn7Days,
    ExpiresIn3Days,
    ExpiresIn1Day,
}

impl NotificationKind {
    pub const REMINDERS: [NotificationKind; 3] = [
        NotificationKind::ExpiresIn7Days,
        NotificationKind::ExpiresIn3Days,
        NotificationKind::ExpiresIn1Day,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ExpiresIn7Days => "expires_in_7_days",
            NotificationKind::ExpiresIn3Days => "expires_in_3_days",
            NotificationKind::ExpiresIn1Day => "expires_in_1_day",
        }
    }

    pub fn days_before_expiry(&self) -> i64 {
        match self {
            NotificationKind::ExpiresIn7Days => 7,
            NotificationKind::ExpiresIn3Days => 3,
            NotificationKind::ExpiresIn1Day => 1,
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
