// Administrative access control
// Console is always privileged; players need a configured admin token

use crate::error::{Result, StatsError};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// Who is asking for a privileged operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Server console / local operator
    Console,

    /// Remote player, optionally presenting a token
    Player { id: String, token: Option<String> },
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::Console => write!(f, "console"),
            Caller::Player { id, .. } => write!(f, "player {}", id),
        }
    }
}

/// Token-based permission check for admin actions
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    tokens: HashSet<String>,
}

impl AdminPolicy {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: HashSet<String> = tokens.into_iter().map(Into::into).collect();
        info!(admin_tokens = tokens.len(), "Admin policy initialized");
        Self { tokens }
    }

    /// Allow the console and players holding a configured token
    pub fn authorize(&self, caller: &Caller, action: &'static str) -> Result<()> {
        let allowed = match caller {
            Caller::Console => true,
            Caller::Player { token: Some(token), .. } => self.tokens.contains(token),
            Caller::Player { token: None, .. } => false,
        };

        if allowed {
            Ok(())
        } else {
            warn!(caller = %caller, action, "Denied administrative action");
            Err(StatsError::Unauthorized {
                caller: caller.to_string(),
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTION: &str = "reset vehicle statistics";

    #[test]
    fn test_console_is_always_allowed() {
        let policy = AdminPolicy::default();
        assert!(policy.authorize(&Caller::Console, ACTION).is_ok());
    }

    #[test]
    fn test_player_needs_known_token() {
        let policy = AdminPolicy::new(["s3cret"]);

        let admin = Caller::Player { id: "1".to_string(), token: Some("s3cret".to_string()) };
        assert!(policy.authorize(&admin, ACTION).is_ok());

        let guest = Caller::Player { id: "2".to_string(), token: Some("guess".to_string()) };
        let err = policy.authorize(&guest, ACTION).unwrap_err();
        assert!(matches!(err, StatsError::Unauthorized { .. }));
        assert_eq!(err.to_string(), "player 2 is not allowed to reset vehicle statistics");

        let anonymous = Caller::Player { id: "3".to_string(), token: None };
        assert!(policy.authorize(&anonymous, ACTION).is_err());
    }
}
