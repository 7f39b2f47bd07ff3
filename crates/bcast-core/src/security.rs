use crate::domain::ChatId;

// ============== Authorization ==============

/// Admin check for broadcast commands: the chat must be on the allow list.
pub fn is_admin(chat_id: Option<ChatId>, admin_ids: &[i64]) -> bool {
    let Some(chat_id) = chat_id else {
        return false;
    };
    if admin_ids.is_empty() {
        return false;
    }
    admin_ids.contains(&chat_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_requires_listed_chat() {
        assert!(is_admin(Some(ChatId(42)), &[7, 42]));
        assert!(!is_admin(Some(ChatId(43)), &[7, 42]));
        assert!(!is_admin(None, &[42]));
        assert!(!is_admin(Some(ChatId(42)), &[]));
    }
}
