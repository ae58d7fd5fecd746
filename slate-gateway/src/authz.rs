//! Session authorization: pure decision procedures for joining the
//! document room and the video room.
//!
//! Both are side-effect-free functions of (identity, target room); the
//! HTTP layer maps decisions to responses and the credential service turns
//! grants into tokens. The outcome sets are closed enums so a new outcome
//! cannot fall through a default branch.
//!
//! A missing room and a membership mismatch are deliberately distinct:
//! `NotFound` for rooms that do not exist, `Forbidden` when the room exists
//! but the caller's organization does not match. Only the latter may reveal
//! the room's existence, and only to authenticated callers.

use crate::identity::Identity;
use crate::rooms::RoomRecord;

/// Grant produced by an allowed document-room join: full read/write on
/// exactly one room. There are no partial or read-only grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentGrant {
    pub room_id: String,
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Outcome of a document-room join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentJoinDecision {
    Allowed(DocumentGrant),
    Unauthenticated,
    Forbidden,
    NotFound,
}

/// Decide whether `identity` may join `room`'s collaborative document.
///
/// ALLOW iff the identity is resolved AND the room is either ungated or
/// gated on the identity's current organization.
pub fn authorize_document_join(
    identity: Option<&Identity>,
    room: Option<&RoomRecord>,
) -> DocumentJoinDecision {
    let Some(identity) = identity else {
        return DocumentJoinDecision::Unauthenticated;
    };
    let Some(room) = room else {
        return DocumentJoinDecision::NotFound;
    };
    if let Some(room_org) = &room.org_id {
        if identity.org_id.as_ref() != Some(room_org) {
            return DocumentJoinDecision::Forbidden;
        }
    }
    DocumentJoinDecision::Allowed(DocumentGrant {
        room_id: room.id.clone(),
        user_id: identity.user_id.clone(),
        display_name: identity.display_name(),
        avatar_url: identity.avatar_url.clone(),
    })
}

/// Grant produced by an allowed video-room join: a time-bounded capability
/// for exactly one named video room with publish and subscribe permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoGrantSpec {
    pub room: String,
    pub participant_identity: String,
    pub participant_name: String,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

/// Outcome of a video-room join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoJoinDecision {
    Allowed(VideoGrantSpec),
    Unauthenticated,
}

/// Decide whether `identity` may join the named video room.
///
/// Identity is the only check here: the calling room context is assumed
/// already authorized through the document-room path.
pub fn authorize_video_join(identity: Option<&Identity>, room: &str) -> VideoJoinDecision {
    let Some(identity) = identity else {
        return VideoJoinDecision::Unauthenticated;
    };
    VideoJoinDecision::Allowed(VideoGrantSpec {
        room: room.to_string(),
        participant_identity: identity.user_id.clone(),
        participant_name: identity.video_participant_name(),
        can_publish: true,
        can_subscribe: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn room(id: &str, org_id: Option<&str>) -> RoomRecord {
        RoomRecord {
            id: id.to_string(),
            title: "Test Board".to_string(),
            org_id: org_id.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_org_mismatch_is_forbidden() {
        let identity = Identity::new("user_1").with_org("org_B");
        let room = room("r1", Some("org_A"));
        assert_eq!(
            authorize_document_join(Some(&identity), Some(&room)),
            DocumentJoinDecision::Forbidden
        );
    }

    #[test]
    fn test_anonymous_is_unauthenticated_even_for_gated_room() {
        let room = room("r1", Some("org_A"));
        assert_eq!(
            authorize_document_join(None, Some(&room)),
            DocumentJoinDecision::Unauthenticated
        );
        // Anonymous against a missing room is still Unauthenticated:
        // identity is checked first, so existence leaks nothing.
        assert_eq!(
            authorize_document_join(None, None),
            DocumentJoinDecision::Unauthenticated
        );
    }

    #[test]
    fn test_missing_room_is_not_found() {
        let identity = Identity::new("user_1").with_org("org_A");
        assert_eq!(
            authorize_document_join(Some(&identity), None),
            DocumentJoinDecision::NotFound
        );
    }

    #[test]
    fn test_ungated_room_joinable_by_any_authenticated_identity() {
        let identity = Identity::new("user_1"); // no org at all
        let room = room("r1", None);
        match authorize_document_join(Some(&identity), Some(&room)) {
            DocumentJoinDecision::Allowed(grant) => {
                assert_eq!(grant.room_id, "r1");
                assert_eq!(grant.user_id, "user_1");
                assert_eq!(grant.display_name, "Teammate");
            }
            other => panic!("expected Allowed, got {other:?}"),
        }
    }

    #[test]
    fn test_matching_org_is_allowed() {
        let identity = Identity::new("user_1").with_name("Ada").with_org("org_A");
        let room = room("r1", Some("org_A"));
        match authorize_document_join(Some(&identity), Some(&room)) {
            DocumentJoinDecision::Allowed(grant) => {
                assert_eq!(grant.display_name, "Ada");
            }
            other => panic!("expected Allowed, got {other:?}"),
        }
    }

    #[test]
    fn test_video_join_requires_identity_only() {
        assert_eq!(
            authorize_video_join(None, "room-1"),
            VideoJoinDecision::Unauthenticated
        );

        // Org membership is irrelevant here.
        let identity = Identity::new("user_2kT9xWQp").with_org("org_Z");
        match authorize_video_join(Some(&identity), "room-1") {
            VideoJoinDecision::Allowed(grant) => {
                assert_eq!(grant.room, "room-1");
                assert_eq!(grant.participant_identity, "user_2kT9xWQp");
                assert_eq!(grant.participant_name, "Guest (xWQp)");
                assert!(grant.can_publish);
                assert!(grant.can_subscribe);
            }
            other => panic!("expected Allowed, got {other:?}"),
        }
    }

    #[test]
    fn test_decisions_do_not_mutate_inputs() {
        let identity = Identity::new("user_1").with_org("org_A");
        let record = room("r1", Some("org_A"));
        let before = record.clone();
        let _ = authorize_document_join(Some(&identity), Some(&record));
        let _ = authorize_document_join(Some(&identity), Some(&record));
        assert_eq!(record, before);
    }
}
