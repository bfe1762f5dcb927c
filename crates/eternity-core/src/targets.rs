use crate::directory::{MemberSnapshot, RoleSnapshot};
use crate::error::CoreError;
use eternity_models::{Member, Selector};
use std::collections::BTreeMap;

/// Resolve a poll's selectors to the union of matching members, ordered by id.
///
/// `ALL` and role selectors skip bots; an explicit `user:` selector does not.
/// An unknown role name or nickname fails the whole resolution.
pub fn resolve_targets(
    targets: &[Selector],
    roles: &RoleSnapshot,
    members: &MemberSnapshot,
) -> Result<Vec<Member>, CoreError> {
    let mut resolved: BTreeMap<i64, &Member> = BTreeMap::new();

    for selector in targets {
        match selector {
            Selector::All => {
                for member in members.iter().filter(|m| !m.is_bot) {
                    resolved.insert(member.id, member);
                }
            }
            Selector::Role(name) => {
                let role_id = roles
                    .id_of(name)
                    .ok_or_else(|| CoreError::UnknownTarget(name.clone()))?;
                for member in members
                    .iter()
                    .filter(|m| !m.is_bot && m.has_role(role_id))
                {
                    resolved.insert(member.id, member);
                }
            }
            Selector::User(nickname) => {
                let member = members
                    .by_nickname(nickname)
                    .ok_or_else(|| CoreError::UnknownTarget(selector.to_string()))?;
                resolved.insert(member.id, member);
            }
        }
    }

    Ok(resolved.into_values().cloned().collect())
}

/// Target list as shown to recipients: roles and `ALL` by name, individual users only as a count.
pub fn redacted_summary(targets: &[Selector]) -> String {
    let named = targets
        .iter()
        .filter(|s| !s.is_user())
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("/");
    let users = targets.iter().filter(|s| s.is_user()).count();
    match (users, named.is_empty()) {
        (0, _) => named,
        (n, true) => format!("{n} specific member(s)"),
        (n, false) => format!("{named} + {n} specific member(s)"),
    }
}

/// Full, unredacted target list for operators.
pub fn operator_summary(targets: &[Selector]) -> String {
    targets
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("/")
}
