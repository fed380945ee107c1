//! Decrypter grant and revoke on an IAM policy

use keyferry_cloud::{Binding, IamPolicy};

/// How the decrypter binding is added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GrantMode {
    /// Always push a new binding, even if the member is already granted
    #[default]
    Append,
    /// Leave the policy alone when the member already holds the role
    EnsurePresent,
}

impl GrantMode {
    pub fn from_dedupe(dedupe: bool) -> Self {
        if dedupe {
            GrantMode::EnsurePresent
        } else {
            GrantMode::Append
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantResult {
    Appended,
    AlreadyPresent,
}

impl GrantResult {
    /// Whether the policy must be written back
    pub fn changed(self) -> bool {
        self == GrantResult::Appended
    }
}

pub fn apply_grant(policy: &mut IamPolicy, role: &str, member: &str, mode: GrantMode) -> GrantResult {
    if mode == GrantMode::EnsurePresent && policy.has_member(role, member) {
        return GrantResult::AlreadyPresent;
    }

    policy
        .bindings
        .push(Binding::new(role, vec![member.to_string()]));
    GrantResult::Appended
}

/// Remove `member` from the last binding of `role` that lists it
///
/// The binding is dropped when no members remain. Returns whether anything
/// changed.
pub fn revoke(policy: &mut IamPolicy, role: &str, member: &str) -> bool {
    let Some(index) = policy
        .bindings
        .iter()
        .rposition(|b| b.role == role && b.members.iter().any(|m| m == member))
    else {
        return false;
    };

    let binding = &mut policy.bindings[index];
    if let Some(position) = binding.members.iter().rposition(|m| m == member) {
        binding.members.remove(position);
    }
    if binding.members.is_empty() {
        policy.bindings.remove(index);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyferry_core::types::DECRYPTER_ROLE;

    const MEMBER: &str = "serviceAccount:svc@p.iam.gserviceaccount.com";

    #[test]
    fn test_append_duplicates() {
        let mut policy = IamPolicy::default();
        assert_eq!(
            apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::Append),
            GrantResult::Appended
        );
        assert_eq!(
            apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::Append),
            GrantResult::Appended
        );
        assert_eq!(policy.binding_count(DECRYPTER_ROLE, MEMBER), 2);
    }

    #[test]
    fn test_ensure_present_is_idempotent() {
        let mut policy = IamPolicy::default();
        apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::EnsurePresent);
        let second = apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::EnsurePresent);
        assert_eq!(second, GrantResult::AlreadyPresent);
        assert!(!second.changed());
        assert_eq!(policy.bindings.len(), 1);
    }

    #[test]
    fn test_existing_bindings_preserved() {
        let mut policy = IamPolicy {
            etag: Some("BwX".into()),
            bindings: vec![Binding::new("roles/cloudkms.admin", vec!["user:ops@example.com".into()])],
            ..Default::default()
        };
        apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::Append);
        assert_eq!(policy.bindings.len(), 2);
        assert_eq!(policy.bindings[0].role, "roles/cloudkms.admin");
        assert_eq!(policy.etag.as_deref(), Some("BwX"));
    }

    #[test]
    fn test_revoke_last_binding_only() {
        let mut policy = IamPolicy::default();
        apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::Append);
        apply_grant(&mut policy, DECRYPTER_ROLE, MEMBER, GrantMode::Append);

        assert!(revoke(&mut policy, DECRYPTER_ROLE, MEMBER));
        assert_eq!(policy.binding_count(DECRYPTER_ROLE, MEMBER), 1);
        assert!(revoke(&mut policy, DECRYPTER_ROLE, MEMBER));
        assert!(policy.bindings.is_empty());
        assert!(!revoke(&mut policy, DECRYPTER_ROLE, MEMBER));
    }

    #[test]
    fn test_revoke_keeps_other_members() {
        let mut policy = IamPolicy {
            bindings: vec![Binding::new(
                DECRYPTER_ROLE,
                vec!["user:a@example.com".into(), MEMBER.into()],
            )],
            ..Default::default()
        };
        assert!(revoke(&mut policy, DECRYPTER_ROLE, MEMBER));
        assert_eq!(policy.bindings[0].members, vec!["user:a@example.com".to_string()]);
    }

    #[test]
    fn test_from_dedupe() {
        assert_eq!(GrantMode::from_dedupe(false), GrantMode::Append);
        assert_eq!(GrantMode::from_dedupe(true), GrantMode::EnsurePresent);
    }
}
