/// Lifecycle of one subscription.
///
/// `Requested -> Active -> (Unsubscribed | Disconnected) -> Terminated`.
/// Only `Active` delivers events and `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Requested,
    Active,
    Unsubscribed,
    Disconnected,
    Terminated,
}

impl SubscriptionState {
    pub fn can_transition_to(self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Requested, Active)
                | (Requested, Terminated)
                | (Active, Unsubscribed)
                | (Active, Disconnected)
                | (Unsubscribed, Terminated)
                | (Disconnected, Terminated)
        )
    }

    pub fn is_delivering(self) -> bool {
        self == SubscriptionState::Active
    }
}
