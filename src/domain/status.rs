/// Terminal status codes as reported by the Vendista API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalStatus {
    Online,
    Offline,
    Inactive,
    NoPower,
    Error,
}

impl TerminalStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Online),
            1 => Some(Self::Offline),
            2 => Some(Self::Inactive),
            3 => Some(Self::NoPower),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Online => 0,
            Self::Offline => 1,
            Self::Inactive => 2,
            Self::NoPower => 3,
            Self::Error => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Inactive => "INACTIVE",
            Self::NoPower => "NO_POWER",
            Self::Error => "ERROR",
        }
    }

    /// Everything except `Online` counts as out of contact for alerting.
    pub fn is_offline(self) -> bool {
        !matches!(self, Self::Online)
    }
}
