// SPDX-FileCopyrightText: 2026 Lembra Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session key codec.
//!
//! A session key correlates a conversation to a messaging surface across
//! agent/channel/peer dimensions:
//!
//! `agent:{agentId}:{channel}:{peerKind}:{peerId}[:{dmScope}]`
//!
//! `build_session_key` and `parse_session_key` are exact inverses for every
//! valid parameter combination, including the optional trailing scope.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::LembraError;

/// What kind of peer the conversation is attached to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    Direct,
    Group,
    Channel,
}

/// The components of a session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKeyParams {
    pub agent_id: String,
    pub channel: String,
    pub peer_kind: PeerKind,
    pub peer_id: String,
    /// Optional DM scoping segment, only serialized when present.
    pub dm_scope: Option<String>,
}

/// Number of colon-separated segments without the optional scope.
const BASE_SEGMENTS: usize = 5;

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(':')
}

/// Serialize session key parameters into their canonical string form.
///
/// Segments must be non-empty and colon-free; violations are rejected so
/// that every built key parses back losslessly.
pub fn build_session_key(params: &SessionKeyParams) -> Result<String, LembraError> {
    for segment in [&params.agent_id, &params.channel, &params.peer_id] {
        if !valid_segment(segment) {
            return Err(LembraError::InvalidSessionKey(format!(
                "segment `{segment}` is empty or contains `:`"
            )));
        }
    }
    if let Some(ref scope) = params.dm_scope
        && !valid_segment(scope)
    {
        return Err(LembraError::InvalidSessionKey(format!(
            "dm scope `{scope}` is empty or contains `:`"
        )));
    }

    let mut key = format!(
        "agent:{}:{}:{}:{}",
        params.agent_id, params.channel, params.peer_kind, params.peer_id
    );
    if let Some(ref scope) = params.dm_scope {
        key.push(':');
        key.push_str(scope);
    }
    Ok(key)
}

/// Parse a session key string back into its components.
///
/// Accepts exactly five or six segments with the literal `agent` prefix;
/// anything else is rejected.
pub fn parse_session_key(key: &str) -> Result<SessionKeyParams, LembraError> {
    let segments: Vec<&str> = key.split(':').collect();
    if segments.len() != BASE_SEGMENTS && segments.len() != BASE_SEGMENTS + 1 {
        return Err(LembraError::InvalidSessionKey(format!(
            "expected {BASE_SEGMENTS} or {} segments, got {}",
            BASE_SEGMENTS + 1,
            segments.len()
        )));
    }
    if segments[0] != "agent" {
        return Err(LembraError::InvalidSessionKey(format!(
            "key must start with `agent:`, got `{}`",
            segments[0]
        )));
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(LembraError::InvalidSessionKey(
            "empty segment in session key".to_string(),
        ));
    }

    let peer_kind = segments[3].parse::<PeerKind>().map_err(|_| {
        LembraError::InvalidSessionKey(format!("unknown peer kind `{}`", segments[3]))
    })?;

    Ok(SessionKeyParams {
        agent_id: segments[1].to_string(),
        channel: segments[2].to_string(),
        peer_kind,
        peer_id: segments[4].to_string(),
        dm_scope: segments.get(BASE_SEGMENTS).map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn build_without_scope() {
        let params = SessionKeyParams {
            agent_id: "a1".to_string(),
            channel: "telegram".to_string(),
            peer_kind: PeerKind::Direct,
            peer_id: "12345".to_string(),
            dm_scope: None,
        };
        assert_eq!(
            build_session_key(&params).unwrap(),
            "agent:a1:telegram:direct:12345"
        );
    }

    #[test]
    fn build_with_scope() {
        let params = SessionKeyParams {
            agent_id: "a1".to_string(),
            channel: "discord".to_string(),
            peer_kind: PeerKind::Group,
            peer_id: "guild-9".to_string(),
            dm_scope: Some("thread-7".to_string()),
        };
        assert_eq!(
            build_session_key(&params).unwrap(),
            "agent:a1:discord:group:guild-9:thread-7"
        );
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        assert!(parse_session_key("bot:a:b:direct:c").is_err());
    }

    #[test]
    fn parse_rejects_wrong_segment_count() {
        assert!(parse_session_key("agent:a:b:direct").is_err());
        assert!(parse_session_key("agent:a:b:direct:c:d:e").is_err());
        assert!(parse_session_key("").is_err());
    }

    #[test]
    fn parse_rejects_unknown_peer_kind() {
        assert!(parse_session_key("agent:a:b:robot:c").is_err());
    }

    #[test]
    fn parse_rejects_empty_segment() {
        assert!(parse_session_key("agent::telegram:direct:c").is_err());
    }

    #[test]
    fn build_rejects_colon_in_segment() {
        let params = SessionKeyParams {
            agent_id: "a:1".to_string(),
            channel: "telegram".to_string(),
            peer_kind: PeerKind::Direct,
            peer_id: "x".to_string(),
            dm_scope: None,
        };
        assert!(build_session_key(&params).is_err());
    }

    fn segment_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.-]{1,16}"
    }

    proptest! {
        #[test]
        fn round_trip(
            agent_id in segment_strategy(),
            channel in segment_strategy(),
            kind in prop_oneof![
                Just(PeerKind::Direct),
                Just(PeerKind::Group),
                Just(PeerKind::Channel),
            ],
            peer_id in segment_strategy(),
            dm_scope in proptest::option::of(segment_strategy()),
        ) {
            let params = SessionKeyParams {
                agent_id,
                channel,
                peer_kind: kind,
                peer_id,
                dm_scope,
            };
            let key = build_session_key(&params).unwrap();
            let parsed = parse_session_key(&key).unwrap();
            prop_assert_eq!(parsed, params);
        }
    }
}
