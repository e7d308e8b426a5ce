use uuid::Uuid;

/// The single process-wide overlay slot.
///
/// Invariant: at most one `Visible` overlay exists at any time; showing a
/// new one tears the old one down first. The `token` names one shown
/// instance, so a stale auto-dismiss timer can detect that it has been
/// superseded and stand down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    Visible {
        package_id: String,
        token: Uuid,
        shown_at_ms: i64,
        deadline_ms: i64,
    },
}

impl Default for OverlayState {
    fn default() -> Self {
        OverlayState::Hidden
    }
}

impl OverlayState {
    pub fn is_visible(&self) -> bool {
        matches!(self, OverlayState::Visible { .. })
    }

    pub fn token(&self) -> Option<Uuid> {
        match self {
            OverlayState::Hidden => None,
            OverlayState::Visible { token, .. } => Some(*token),
        }
    }

    pub fn package_id(&self) -> Option<&str> {
        match self {
            OverlayState::Hidden => None,
            OverlayState::Visible { package_id, .. } => Some(package_id),
        }
    }
}
