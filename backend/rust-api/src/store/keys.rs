//! Key layout of the shared store.

pub fn timer(session_code: &str, question_id: &str) -> String {
    format!("timer:{}:{}", session_code, question_id)
}

pub fn timer_prefix(session_code: &str) -> String {
    format!("timer:{}:", session_code)
}

pub fn participant(session_id: &str, user_id: &str) -> String {
    format!("participant:{}:{}", session_id, user_id)
}

pub fn participant_prefix(session_id: &str) -> String {
    format!("participant:{}:", session_id)
}

pub fn participant_index(session_id: &str, participant_id: &str) -> String {
    format!("participant-id:{}:{}", session_id, participant_id)
}

pub fn participant_index_prefix(session_id: &str) -> String {
    format!("participant-id:{}:", session_id)
}

pub fn guest(user_id: &str) -> String {
    format!("guest:{}", user_id)
}

pub fn access_code(code: &str) -> String {
    format!("access-code:{}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_prefix_does_not_cover_index_keys() {
        let index = participant_index("s1", "p1");
        assert!(!index.starts_with(&participant_prefix("s1")));
        assert!(participant("s1", "u1").starts_with(&participant_prefix("s1")));
    }

    #[test]
    fn timer_keys_follow_code_then_question() {
        assert_eq!(timer("ABC123", "q1"), "timer:ABC123:q1");
        assert!(timer("ABC123", "q1").starts_with(&timer_prefix("ABC123")));
    }
}
