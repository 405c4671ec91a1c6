// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pure decision table.
//!
//! `decide_action` never touches I/O and never mutates anything: given the
//! classified intent and the current state it names the handler to run.
//! The LLM is kept out of the control-flow loop entirely — it only shows
//! up behind [`Decision::Planner`], and the planner's output is data, not
//! a state transition.
//!
//! | State (pending)            | Intent         | Decision            |
//! |----------------------------|----------------|---------------------|
//! | awaiting_* (any pending)   | confirmation   | HandleConfirmation  |
//! | awaiting_* (any pending)   | denial         | HandleDenial        |
//! | (otherwise, by action)     | save_content   | SaveContent         |
//! |                            | save_previous  | SavePrevious        |
//! |                            | search_items   | Search              |
//! |                            | delete_all     | DeleteAll           |
//! |                            | delete_item    | DeleteItem          |
//! |                            | delete_by_query| DeleteByQuery       |
//! |                            | get_name       | GetName             |
//! |                            | update_settings| UpdateSettings      |
//! |                            | casual_chat    | Casual              |
//! |                            | confirm/deny   | Casual (nothing pending) |
//! |                            | unknown        | Clarify             |
//! |                            | info_request   | Planner             |

use lembra_core::types::{Intent, IntentAction, IntentResult};

use crate::state::ConversationState;

/// The handler selected for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Resolve the pending confirmation in the current state.
    HandleConfirmation,
    /// Resolve the pending flow as denied/cancelled.
    HandleDenial,
    SaveContent,
    SavePrevious,
    Search,
    DeleteAll,
    DeleteItem,
    DeleteByQuery,
    GetName,
    UpdateSettings,
    Casual,
    /// Ambiguous input: start the clarification sub-protocol.
    Clarify,
    /// Delegate to the LLM planner.
    Planner,
}

/// True for states with a pending yes/no resolution.
fn has_pending_confirmation(state: ConversationState) -> bool {
    matches!(
        state,
        ConversationState::AwaitingConfirmation
            | ConversationState::AwaitingFinalConfirmation
            | ConversationState::AwaitingBatchItem
    )
}

/// Select the handler for `(intent, state)`. Pure function.
pub fn decide_action(intent: &IntentResult, state: ConversationState) -> Decision {
    if has_pending_confirmation(state) {
        match intent.intent {
            Intent::Confirmation => return Decision::HandleConfirmation,
            Intent::Denial => return Decision::HandleDenial,
            _ => {}
        }
    }

    match intent.action {
        IntentAction::SaveContent => Decision::SaveContent,
        IntentAction::SavePrevious => Decision::SavePrevious,
        IntentAction::SearchItems => Decision::Search,
        IntentAction::DeleteAll => Decision::DeleteAll,
        IntentAction::DeleteItem => Decision::DeleteItem,
        IntentAction::DeleteByQuery => Decision::DeleteByQuery,
        IntentAction::GetName => Decision::GetName,
        IntentAction::UpdateSettings => Decision::UpdateSettings,
        IntentAction::CasualChat => Decision::Casual,
        // A bare yes/no with nothing pending is just chat.
        IntentAction::Confirm | IntentAction::Deny => Decision::Casual,
        IntentAction::Unknown => Decision::Clarify,
        IntentAction::InfoRequest => Decision::Planner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lembra_core::types::Entities;

    fn intent(intent: Intent, action: IntentAction) -> IntentResult {
        IntentResult {
            intent,
            action,
            confidence: 0.9,
            entities: Entities::default(),
        }
    }

    #[test]
    fn pending_states_route_confirmation_first() {
        let confirm = intent(Intent::Confirmation, IntentAction::Confirm);
        for state in [
            ConversationState::AwaitingConfirmation,
            ConversationState::AwaitingFinalConfirmation,
            ConversationState::AwaitingBatchItem,
        ] {
            assert_eq!(decide_action(&confirm, state), Decision::HandleConfirmation);
        }
    }

    #[test]
    fn pending_states_route_denial_first() {
        let deny = intent(Intent::Denial, IntentAction::Deny);
        assert_eq!(
            decide_action(&deny, ConversationState::AwaitingConfirmation),
            Decision::HandleDenial
        );
    }

    #[test]
    fn pending_state_with_other_intent_falls_through_to_action() {
        let search = intent(Intent::SearchContent, IntentAction::SearchItems);
        assert_eq!(
            decide_action(&search, ConversationState::AwaitingConfirmation),
            Decision::Search
        );
    }

    #[test]
    fn idle_confirm_is_just_casual() {
        let confirm = intent(Intent::Confirmation, IntentAction::Confirm);
        assert_eq!(decide_action(&confirm, ConversationState::Idle), Decision::Casual);
    }

    #[test]
    fn action_rows_dispatch_deterministically() {
        let rows = [
            (IntentAction::SaveContent, Decision::SaveContent),
            (IntentAction::SavePrevious, Decision::SavePrevious),
            (IntentAction::SearchItems, Decision::Search),
            (IntentAction::DeleteAll, Decision::DeleteAll),
            (IntentAction::DeleteItem, Decision::DeleteItem),
            (IntentAction::DeleteByQuery, Decision::DeleteByQuery),
            (IntentAction::GetName, Decision::GetName),
            (IntentAction::UpdateSettings, Decision::UpdateSettings),
            (IntentAction::CasualChat, Decision::Casual),
            (IntentAction::Unknown, Decision::Clarify),
            (IntentAction::InfoRequest, Decision::Planner),
        ];
        for (action, expected) in rows {
            let result = decide_action(
                &intent(Intent::Unknown, action),
                ConversationState::Idle,
            );
            assert_eq!(result, expected, "action {action}");
        }
    }
}
