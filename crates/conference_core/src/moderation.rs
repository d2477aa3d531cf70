use conference_integration::ConferenceSession;
use shared::{
    domain::{ParticipantId, ParticipantInfo},
    error::CoreError,
};

/// Resolves the issuer of a broadcast command and checks it may change
/// conference-wide settings: it must be named, must not be the local
/// participant (our own broadcast echoing back), and must be a moderator.
pub fn authorize_command_sender(
    conference: &dyn ConferenceSession,
    sender_id: Option<&ParticipantId>,
) -> Result<ParticipantInfo, CoreError> {
    let Some(sender_id) = sender_id else {
        return Err(CoreError::unauthorized("command carries no issuing participant"));
    };

    let local = conference.local_participant();
    if local.id == *sender_id {
        return Err(CoreError::unauthorized(format!(
            "ignoring self-originated command from {sender_id}"
        )));
    }

    let Some(sender) = conference.participant(sender_id) else {
        return Err(CoreError::unauthorized(format!(
            "command issuer {sender_id} is not a known participant"
        )));
    };
    if !sender.is_moderator() {
        return Err(CoreError::unauthorized(format!(
            "command issuer {sender_id} is not a moderator"
        )));
    }

    Ok(sender)
}

#[cfg(test)]
#[path = "tests/moderation_tests.rs"]
mod tests;
