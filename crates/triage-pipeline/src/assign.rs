//! Assignment policy: pick who a classified ticket lands on.

use triage_state::User;

/// Select an assignee for the given skill tags.
///
/// Moderators are scanned in the order given (stores return them in
/// creation order); the first whose own skill list matches any wanted tag
/// wins. Matching is a case-insensitive substring test: a moderator tagged
/// "Networking" covers a derived "network" tag. With no matching moderator
/// the first admin is the fallback, and with no admins either the ticket
/// stays unassigned.
pub fn select_assignee(skills: &[String], moderators: &[User], admins: &[User]) -> Option<User> {
    let wanted: Vec<String> = skills.iter().map(|s| s.to_lowercase()).collect();

    let matched = moderators.iter().find(|m| {
        m.skills
            .iter()
            .any(|have| wanted.iter().any(|w| have.to_lowercase().contains(w)))
    });

    matched.or_else(|| admins.first()).cloned()
}
