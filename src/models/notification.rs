use time::OffsetDateTime;

/// The entity a notification points at. Each variant carries the id of a row
/// in its own table, so a target can never reference the wrong kind of row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTarget {
    Comment(i64),
    Like(i64),
    Follow(i64),
}

impl NotificationTarget {
    pub fn verb(&self) -> &'static str {
        match self {
            NotificationTarget::Comment(_) => "comment",
            NotificationTarget::Like(_) => "like",
            NotificationTarget::Follow(_) => "follow",
        }
    }

    /// Same tag as the verb: every verb has exactly one target kind.
    pub fn type_name(&self) -> &'static str {
        self.verb()
    }

    pub fn id(&self) -> i64 {
        match *self {
            NotificationTarget::Comment(id)
            | NotificationTarget::Like(id)
            | NotificationTarget::Follow(id) => id,
        }
    }

    /// Rebuilds a target from its stored columns, one nullable id per kind.
    pub fn from_columns(
        verb: &str,
        comment_id: Option<i64>,
        like_id: Option<i64>,
        follow_id: Option<i64>,
    ) -> Option<Self> {
        match (verb, comment_id, like_id, follow_id) {
            ("comment", Some(id), None, None) => Some(NotificationTarget::Comment(id)),
            ("like", None, Some(id), None) => Some(NotificationTarget::Like(id)),
            ("follow", None, None, Some(id)) => Some(NotificationTarget::Follow(id)),
            _ => None,
        }
    }

    pub fn comment_id(&self) -> Option<i64> {
        match *self {
            NotificationTarget::Comment(id) => Some(id),
            _ => None,
        }
    }

    pub fn like_id(&self) -> Option<i64> {
        match *self {
            NotificationTarget::Like(id) => Some(id),
            _ => None,
        }
    }

    pub fn follow_id(&self) -> Option<i64> {
        match *self {
            NotificationTarget::Follow(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub actor_id: i64,
    pub target: NotificationTarget,
    pub created_at: OffsetDateTime,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_columns_must_agree_with_verb() {
        assert_eq!(
            NotificationTarget::from_columns("like", None, Some(4), None),
            Some(NotificationTarget::Like(4))
        );
        assert_eq!(
            NotificationTarget::from_columns("like", Some(4), None, None),
            None
        );
        assert_eq!(
            NotificationTarget::from_columns("follow", None, Some(1), Some(2)),
            None
        );
    }

    #[test]
    fn verb_and_type_name_agree() {
        let target = NotificationTarget::Comment(9);
        assert_eq!(target.verb(), "comment");
        assert_eq!(target.type_name(), "comment");
        assert_eq!(target.id(), 9);
        assert_eq!(target.comment_id(), Some(9));
        assert_eq!(target.like_id(), None);
    }
}
