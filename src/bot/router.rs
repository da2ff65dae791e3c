//! Conversation router: pairs one end user with at most one operator and
//! decides where free text goes.
//!
//! Both maps live behind a single mutex, so claim/end/clear are atomic
//! check-then-set sequences. Methods never perform I/O; they return plain
//! data and the handlers send notifications and write to the store after
//! the lock is released. A failed notification never rolls routing state
//! back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tracing::info;

/// Why a conversation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Question,
    Order,
    ManualDialog,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Order => "order",
            Self::ManualDialog => "manual_dialog",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "order" => Self::Order,
            "manual_dialog" => Self::ManualDialog,
            _ => Self::Question,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Question => "Question",
            Self::Order => "Order",
            Self::ManualDialog => "Manual dialog",
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum RouterError {
    /// No active conversation for that user.
    NotFound,
    /// Another operator got there first.
    AlreadyClaimed { operator: i64 },
    /// The claiming operator is already paired with someone else.
    OperatorBusy { user: i64 },
    /// An operator sent free text without an active pairing.
    NoActiveConversation,
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no active conversation for that user"),
            Self::AlreadyClaimed { operator } => {
                write!(f, "conversation already claimed by operator {operator}")
            }
            Self::OperatorBusy { user } => {
                write!(f, "you already have an active dialog with user {user}")
            }
            Self::NoActiveConversation => write!(f, "you have no active dialog"),
        }
    }
}

impl std::error::Error for RouterError {}

/// Where a piece of free text should go.
#[derive(Debug, PartialEq)]
pub enum RelayTarget {
    /// Sender is a paired operator; forward to their user.
    ToUser(i64),
    /// Sender is a paired user; forward to their operator.
    ToOperator(i64),
    /// Sender is a user with no pairing; start the new-question flow.
    NewQuestion,
}

/// Snapshot of one active conversation, for the admin listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConversation {
    pub user_id: i64,
    pub kind: ConversationKind,
    pub operator: Option<i64>,
    pub snippet: String,
}

/// Result of a successful claim.
#[derive(Debug, PartialEq)]
pub struct Claimed {
    pub user_id: i64,
    pub kind: ConversationKind,
    pub snippet: String,
}

/// Result of ending a dialog: who was involved, so the handler can notify
/// the other side. `operator` is `None` when the conversation was never
/// claimed.
#[derive(Debug, PartialEq)]
pub struct Ended {
    pub user_id: i64,
    pub operator: Option<i64>,
}

struct Entry {
    kind: ConversationKind,
    operator: Option<i64>,
    snippet: String,
}

struct Maps {
    by_user: HashMap<i64, Entry>,
    by_operator: HashMap<i64, i64>,
}

/// The routing state. One instance per process, injected into handlers.
pub struct Router {
    inner: Mutex<Maps>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Maps { by_user: HashMap::new(), by_operator: HashMap::new() }),
        }
    }

    /// Register (or refresh) an unclaimed conversation for a user.
    /// Returns true when the conversation was newly created, false when an
    /// existing one was updated; the handler broadcasts only new ones.
    pub fn open(&self, user_id: i64, kind: ConversationKind, snippet: &str) -> bool {
        let mut maps = self.inner.lock().unwrap();
        match maps.by_user.get_mut(&user_id) {
            Some(entry) => {
                entry.snippet = snippet.to_string();
                false
            }
            None => {
                maps.by_user.insert(
                    user_id,
                    Entry { kind, operator: None, snippet: snippet.to_string() },
                );
                info!("Opened {} conversation for user {}", kind.as_str(), user_id);
                true
            }
        }
    }

    /// Start a manual dialog: create the conversation already assigned to
    /// the initiating operator. An existing unclaimed conversation is taken
    /// over; a claimed one is refused.
    pub fn open_assigned(
        &self,
        operator_id: i64,
        user_id: i64,
        kind: ConversationKind,
    ) -> Result<(), RouterError> {
        let mut maps = self.inner.lock().unwrap();
        if let Some(&user) = maps.by_operator.get(&operator_id) {
            return Err(RouterError::OperatorBusy { user });
        }
        if let Some(entry) = maps.by_user.get(&user_id) {
            if let Some(op) = entry.operator {
                return Err(RouterError::AlreadyClaimed { operator: op });
            }
        }
        maps.by_user
            .entry(user_id)
            .and_modify(|e| e.operator = Some(operator_id))
            .or_insert(Entry { kind, operator: Some(operator_id), snippet: String::new() });
        maps.by_operator.insert(operator_id, user_id);
        info!("Operator {} opened a {} with user {}", operator_id, kind.as_str(), user_id);
        Ok(())
    }

    /// Claim an unclaimed conversation. First writer wins; the presence
    /// check and the assignment happen under one lock.
    pub fn claim(&self, operator_id: i64, user_id: i64) -> Result<Claimed, RouterError> {
        let mut maps = self.inner.lock().unwrap();
        if let Some(&user) = maps.by_operator.get(&operator_id) {
            return Err(RouterError::OperatorBusy { user });
        }
        let entry = maps.by_user.get_mut(&user_id).ok_or(RouterError::NotFound)?;
        if let Some(op) = entry.operator {
            return Err(RouterError::AlreadyClaimed { operator: op });
        }
        entry.operator = Some(operator_id);
        let claimed = Claimed { user_id, kind: entry.kind, snippet: entry.snippet.clone() };
        maps.by_operator.insert(operator_id, user_id);
        info!("Operator {} claimed user {}", operator_id, user_id);
        Ok(claimed)
    }

    /// Decide where free text from `sender_id` goes. `is_operator` comes
    /// from the config's owner list.
    pub fn relay_target(&self, sender_id: i64, is_operator: bool) -> Result<RelayTarget, RouterError> {
        let maps = self.inner.lock().unwrap();
        if is_operator {
            return match maps.by_operator.get(&sender_id) {
                Some(&user) => Ok(RelayTarget::ToUser(user)),
                None => Err(RouterError::NoActiveConversation),
            };
        }
        match maps.by_user.get(&sender_id).and_then(|e| e.operator) {
            Some(op) => Ok(RelayTarget::ToOperator(op)),
            None => Ok(RelayTarget::NewQuestion),
        }
    }

    /// Update the stored last-message snippet for a user.
    pub fn touch(&self, user_id: i64, snippet: &str) {
        let mut maps = self.inner.lock().unwrap();
        if let Some(entry) = maps.by_user.get_mut(&user_id) {
            entry.snippet = snippet.to_string();
        }
    }

    /// End a dialog from either side. Removes both map entries; the caller
    /// notifies the returned peer and deletes the durable row.
    pub fn end(&self, initiator_id: i64, is_operator: bool) -> Result<Ended, RouterError> {
        let mut maps = self.inner.lock().unwrap();
        if is_operator {
            let user_id = maps
                .by_operator
                .remove(&initiator_id)
                .ok_or(RouterError::NoActiveConversation)?;
            maps.by_user.remove(&user_id);
            info!("Operator {} ended dialog with user {}", initiator_id, user_id);
            Ok(Ended { user_id, operator: Some(initiator_id) })
        } else {
            let entry = maps.by_user.remove(&initiator_id).ok_or(RouterError::NotFound)?;
            if let Some(op) = entry.operator {
                maps.by_operator.remove(&op);
            }
            info!("User {} ended their conversation", initiator_id);
            Ok(Ended { user_id: initiator_id, operator: entry.operator })
        }
    }

    /// Drop every conversation. Returns how many were active. Affected
    /// parties are not notified.
    pub fn clear_all(&self) -> usize {
        let mut maps = self.inner.lock().unwrap();
        let count = maps.by_user.len();
        maps.by_user.clear();
        maps.by_operator.clear();
        info!("Cleared {} active conversations", count);
        count
    }

    /// Snapshot of all active conversations, ordered by user id.
    pub fn active(&self) -> Vec<ActiveConversation> {
        let maps = self.inner.lock().unwrap();
        let mut list: Vec<ActiveConversation> = maps
            .by_user
            .iter()
            .map(|(&user_id, e)| ActiveConversation {
                user_id,
                kind: e.kind,
                operator: e.operator,
                snippet: e.snippet.clone(),
            })
            .collect();
        list.sort_by_key(|c| c.user_id);
        list
    }

    /// Snapshot of conversations nobody has claimed yet.
    pub fn unclaimed(&self) -> Vec<ActiveConversation> {
        self.active().into_iter().filter(|c| c.operator.is_none()).collect()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const USER: i64 = 42;
    const OP_A: i64 = 1001;
    const OP_B: i64 = 1002;

    fn router_with_question() -> Router {
        let router = Router::new();
        assert!(router.open(USER, ConversationKind::Question, "how do I pay?"));
        router
    }

    #[test]
    fn test_open_is_idempotent_per_user() {
        let router = Router::new();
        assert!(router.open(USER, ConversationKind::Question, "first"));
        assert!(!router.open(USER, ConversationKind::Question, "second"));
        let active = router.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].snippet, "second");
    }

    #[test]
    fn test_claim_success() {
        let router = router_with_question();
        let claimed = router.claim(OP_A, USER).unwrap();
        assert_eq!(claimed.user_id, USER);
        assert_eq!(claimed.kind, ConversationKind::Question);
        assert_eq!(claimed.snippet, "how do I pay?");
    }

    #[test]
    fn test_claim_unknown_user() {
        let router = Router::new();
        assert_eq!(router.claim(OP_A, USER), Err(RouterError::NotFound));
    }

    #[test]
    fn test_second_claim_fails() {
        let router = router_with_question();
        router.claim(OP_A, USER).unwrap();
        assert_eq!(router.claim(OP_B, USER), Err(RouterError::AlreadyClaimed { operator: OP_A }));
    }

    #[test]
    fn test_operator_cannot_claim_second_user() {
        // Policy: claiming while paired fails, it never releases the first
        // pairing implicitly.
        let router = router_with_question();
        router.open(77, ConversationKind::Question, "me too");
        router.claim(OP_A, USER).unwrap();
        assert_eq!(router.claim(OP_A, 77), Err(RouterError::OperatorBusy { user: USER }));
        // The first pairing still stands.
        assert_eq!(router.relay_target(OP_A, true), Ok(RelayTarget::ToUser(USER)));
    }

    #[test]
    fn test_relay_targets() {
        let router = router_with_question();

        // Unclaimed: user falls through to the new-question flow, operator
        // gets an error.
        assert_eq!(router.relay_target(USER, false), Ok(RelayTarget::NewQuestion));
        assert_eq!(router.relay_target(OP_A, true), Err(RouterError::NoActiveConversation));

        router.claim(OP_A, USER).unwrap();
        assert_eq!(router.relay_target(USER, false), Ok(RelayTarget::ToOperator(OP_A)));
        assert_eq!(router.relay_target(OP_A, true), Ok(RelayTarget::ToUser(USER)));
    }

    #[test]
    fn test_end_from_operator_clears_both_maps() {
        let router = router_with_question();
        router.claim(OP_A, USER).unwrap();

        let ended = router.end(OP_A, true).unwrap();
        assert_eq!(ended, Ended { user_id: USER, operator: Some(OP_A) });
        assert!(router.active().is_empty());
        assert_eq!(router.relay_target(OP_A, true), Err(RouterError::NoActiveConversation));
        assert_eq!(router.relay_target(USER, false), Ok(RelayTarget::NewQuestion));
    }

    #[test]
    fn test_end_from_user_clears_both_maps() {
        let router = router_with_question();
        router.claim(OP_A, USER).unwrap();

        let ended = router.end(USER, false).unwrap();
        assert_eq!(ended, Ended { user_id: USER, operator: Some(OP_A) });
        assert!(router.active().is_empty());
        assert_eq!(router.relay_target(OP_A, true), Err(RouterError::NoActiveConversation));
    }

    #[test]
    fn test_end_unclaimed_by_user() {
        let router = router_with_question();
        let ended = router.end(USER, false).unwrap();
        assert_eq!(ended, Ended { user_id: USER, operator: None });
    }

    #[test]
    fn test_end_without_dialog() {
        let router = Router::new();
        assert_eq!(router.end(OP_A, true), Err(RouterError::NoActiveConversation));
        assert_eq!(router.end(USER, false), Err(RouterError::NotFound));
    }

    #[test]
    fn test_claim_release_reclaim_scenario() {
        // A and B race for user 42; A wins, B retries after A ends.
        let router = router_with_question();
        assert!(router.claim(OP_A, USER).is_ok());
        assert_eq!(router.claim(OP_B, USER), Err(RouterError::AlreadyClaimed { operator: OP_A }));

        router.end(OP_A, true).unwrap();
        router.open(USER, ConversationKind::Question, "still there?");
        assert!(router.claim(OP_B, USER).is_ok());
        assert_eq!(router.relay_target(OP_B, true), Ok(RelayTarget::ToUser(USER)));
    }

    #[test]
    fn test_concurrent_claims_exactly_one_wins() {
        let router = Arc::new(router_with_question());

        let handles: Vec<_> = [OP_A, OP_B]
            .into_iter()
            .map(|op| {
                let router = router.clone();
                std::thread::spawn(move || router.claim(op, USER).is_ok())
            })
            .collect();

        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|&won| won).count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_manual_dialog() {
        let router = Router::new();
        router.open_assigned(OP_A, USER, ConversationKind::ManualDialog).unwrap();
        assert_eq!(router.relay_target(OP_A, true), Ok(RelayTarget::ToUser(USER)));
        assert_eq!(router.relay_target(USER, false), Ok(RelayTarget::ToOperator(OP_A)));

        // Busy operator cannot open a second one.
        assert_eq!(
            router.open_assigned(OP_A, 77, ConversationKind::ManualDialog),
            Err(RouterError::OperatorBusy { user: USER })
        );
    }

    #[test]
    fn test_manual_dialog_takes_over_unclaimed_question() {
        let router = router_with_question();
        router.open_assigned(OP_A, USER, ConversationKind::ManualDialog).unwrap();
        let active = router.active();
        assert_eq!(active[0].operator, Some(OP_A));

        // But not a claimed one.
        assert_eq!(
            router.open_assigned(OP_B, USER, ConversationKind::ManualDialog),
            Err(RouterError::AlreadyClaimed { operator: OP_A })
        );
    }

    #[test]
    fn test_clear_all() {
        let router = Router::new();
        for id in 1..=5 {
            router.open(id, ConversationKind::Question, "q");
        }
        router.claim(OP_A, 3).unwrap();

        assert_eq!(router.clear_all(), 5);
        assert!(router.active().is_empty());
        assert_eq!(router.relay_target(OP_A, true), Err(RouterError::NoActiveConversation));
        assert_eq!(router.clear_all(), 0);
    }

    #[test]
    fn test_unclaimed_listing() {
        let router = Router::new();
        router.open(1, ConversationKind::Question, "a");
        router.open(2, ConversationKind::Order, "b");
        router.claim(OP_A, 1).unwrap();

        let unclaimed = router.unclaimed();
        assert_eq!(unclaimed.len(), 1);
        assert_eq!(unclaimed[0].user_id, 2);
        assert_eq!(unclaimed[0].kind, ConversationKind::Order);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ConversationKind::Question,
            ConversationKind::Order,
            ConversationKind::ManualDialog,
        ] {
            assert_eq!(ConversationKind::from_str(kind.as_str()), kind);
        }
        assert_eq!(ConversationKind::from_str("whatever"), ConversationKind::Question);
    }
}
