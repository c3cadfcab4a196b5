use std::fmt;

use crate::{config::Config, domain::Identity, messaging::types::Sender};

// ============== Authorization ==============

/// Why an inbound event was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejected {
    NoIdentity,
    NotAllowed(Identity),
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::NoIdentity => f.write_str("no user name"),
            Rejected::NotAllowed(id) => write!(f, "id not allowed: {id}"),
        }
    }
}

/// Resolve the sender's identity and check it against the allow-list.
///
/// Rejections are terminal for the event; callers log and drop it.
pub fn authorize(sender: Option<&Sender>, cfg: &Config) -> Result<Identity, Rejected> {
    let identity = sender
        .and_then(Sender::identity)
        .ok_or(Rejected::NoIdentity)?;
    if cfg.is_available_id(&identity) {
        Ok(identity)
    } else {
        Err(Rejected::NotAllowed(identity))
    }
}
