use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A guild member exactly as the directory source reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMember {
    pub id: i64,
    pub raw_nickname: String,
    pub role_ids: Vec<i64>,
    pub is_bot: bool,
}

/// An eligible guild member: holds a job role and carries a parseable level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub raw_nickname: String,
    pub role_ids: BTreeSet<i64>,
    pub is_bot: bool,
    pub level: u32,
    pub display_name: String,
    /// First job role (in allow-list order) this member holds.
    pub job_role: String,
}

impl Member {
    pub fn has_role(&self, role_id: i64) -> bool {
        self.role_ids.contains(&role_id)
    }

    /// Identity shown in named poll results and operator replies.
    pub fn identity(&self) -> String {
        format!("{}/{} (Lv{})", self.display_name, self.job_role, self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_includes_name_job_and_level() {
        let member = Member {
            id: 7,
            raw_nickname: "Lv120 바람".into(),
            role_ids: [3].into_iter().collect(),
            is_bot: false,
            level: 120,
            display_name: "바람".into(),
            job_role: "비숍".into(),
        };
        assert_eq!(member.identity(), "바람/비숍 (Lv120)");
        assert!(member.has_role(3));
        assert!(!member.has_role(4));
    }
}
