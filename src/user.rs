use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Authenticated user attached to the request extensions by the Cognito
/// middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CognitoUser {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    groups: Vec<String>,
    #[serde(skip)]
    lookup: HashSet<String>,
}

impl CognitoUser {
    pub fn new(username: impl Into<String>, groups: Vec<String>) -> Self {
        let mut user = Self {
            username: username.into(),
            ..Self::default()
        };
        user.set_groups(groups);
        user
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn set_groups(&mut self, groups: Vec<String>) {
        self.lookup = groups.iter().cloned().collect();
        self.groups = groups;
    }

    /// True when the user belongs to at least one of `groups`.
    pub fn is_in_group<S: AsRef<str>>(&self, groups: &[S]) -> bool {
        groups.iter().any(|group| self.lookup.contains(group.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_membership() {
        let user = CognitoUser::new("alex", vec!["admin".into(), "ops".into()]);

        assert!(user.is_in_group(&["admin"]));
        assert!(user.is_in_group(&["users", "ops"]));
        assert!(!user.is_in_group(&["users"]));
        assert!(!user.is_in_group::<&str>(&[]));
    }

    #[test]
    fn lookup_is_not_serialized() {
        let user = CognitoUser::new("alex", vec!["admin".into()]);
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, r#"{"username":"alex","groups":["admin"]}"#);
    }
}
