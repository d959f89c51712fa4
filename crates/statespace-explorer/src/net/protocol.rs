use statespace_core::RegistryMsg;

/// Status of the overview link, reported back to the session.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub socket: String,
    pub kind: LinkEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    Connected,
    Disconnected,
    /// A registry message the overview sent back (e.g. `active-pane` after a click).
    Received(RegistryMsg),
    Error(String),
}

impl LinkEvent {
    pub fn connected(socket: String) -> Self {
        Self {
            socket,
            kind: LinkEventKind::Connected,
        }
    }

    pub fn disconnected(socket: String) -> Self {
        Self {
            socket,
            kind: LinkEventKind::Disconnected,
        }
    }

    pub fn received(socket: String, msg: RegistryMsg) -> Self {
        Self {
            socket,
            kind: LinkEventKind::Received(msg),
        }
    }

    pub fn error(socket: String, msg: String) -> Self {
        Self {
            socket,
            kind: LinkEventKind::Error(msg),
        }
    }
}
