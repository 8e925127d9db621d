// src/normalize/git.rs
use serde_json::Value;

use super::{str_at, BodyLines, Disposition, Rendered};
use crate::verify::Provider;

/// Only pushes carrying at least one commit notify. `event` is the provider's event header.
pub fn classify_git(provider: Provider, event: Option<&str>, payload: &Value) -> Disposition {
    let event = event.unwrap_or_default().trim();
    let is_push = match provider {
        Provider::GitLab => event.eq_ignore_ascii_case("Push Hook"),
        _ => event.eq_ignore_ascii_case("push"),
    };
    if !is_push {
        return Disposition::Ignore(format!("{provider} event '{event}' is not a push"));
    }
    let has_commits = payload
        .get("commits")
        .and_then(Value::as_array)
        .is_some_and(|c| !c.is_empty());
    if !has_commits {
        return Disposition::Ignore(format!("{provider} push without commits"));
    }
    Disposition::Notify
}

fn repository(payload: &Value) -> Option<&str> {
    str_at(payload, "/repository/full_name")
        .or_else(|| str_at(payload, "/repository/name"))
        .or_else(|| str_at(payload, "/project/path_with_namespace"))
        .or_else(|| str_at(payload, "/project/name"))
}

fn head_commit(payload: &Value) -> Option<&Value> {
    payload
        .get("head_commit")
        .filter(|c| c.is_object())
        .or_else(|| {
            payload
                .get("commits")
                .and_then(Value::as_array)
                .and_then(|c| c.last())
        })
}

/// `None` when the payload lacks a repository; the caller renders it generically.
pub(crate) fn render_push(provider: Provider, payload: &Value) -> Option<Rendered> {
    let repo = repository(payload)?;
    let git_ref = str_at(payload, "/ref").unwrap_or_default();
    let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
    let commit_count = payload
        .get("commits")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    let head = head_commit(payload);
    let field = |p: &str| head.and_then(|c| str_at(c, p)).unwrap_or_default();
    let message = field("/message").lines().next().unwrap_or_default();
    let author = head
        .and_then(|c| str_at(c, "/author/name").or_else(|| str_at(c, "/author/username")))
        .or_else(|| str_at(payload, "/pusher/name"))
        .or_else(|| str_at(payload, "/user_name"))
        .unwrap_or_default();

    let noun = if commit_count == 1 { "commit" } else { "commits" };
    let title = if branch.is_empty() {
        format!("[{repo}] {commit_count} new {noun}")
    } else {
        format!("[{repo}] {commit_count} new {noun} to {branch}")
    };

    let mut body = BodyLines::default();
    body.push("Platform", provider.label());
    body.push("Repository", repo);
    body.push("Branch", branch);
    body.push("Commits", &commit_count.to_string());
    body.push("Message", message);
    body.push("Author", author);
    body.push("Commit", field("/url"));
    body.push("Time", field("/timestamp"));

    let mut out = Rendered {
        title,
        body: body.finish(),
        ..Default::default()
    };
    out.meta("provider", provider.label());
    out.meta("repository", repo);
    out.meta("branch", branch);
    out.meta("commit", field("/id"));
    out.meta("commit_url", field("/url"));
    out.meta("commit_count", commit_count.to_string());
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_rejects_non_push_and_empty_push() {
        let p = json!({"commits": [{"id": "a"}]});
        assert_eq!(
            classify_git(Provider::GitHub, Some("push"), &p),
            Disposition::Notify
        );
        assert!(matches!(
            classify_git(Provider::GitHub, Some("ping"), &p),
            Disposition::Ignore(_)
        ));
        assert_eq!(
            classify_git(Provider::GitLab, Some("Push Hook"), &p),
            Disposition::Notify
        );
        assert!(matches!(
            classify_git(Provider::Gitea, Some("push"), &json!({"commits": []})),
            Disposition::Ignore(_)
        ));
    }

    #[test]
    fn github_push_uses_head_commit() {
        let payload = json!({
            "ref": "refs/heads/main",
            "repository": {"full_name": "acme/site"},
            "commits": [{"id": "a"}, {"id": "b"}],
            "head_commit": {
                "id": "b",
                "message": "Fix typo\n\nlonger text",
                "author": {"name": "Ada"},
                "url": "https://github.com/acme/site/commit/b",
                "timestamp": "2025-06-10T12:00:00Z"
            }
        });
        let r = render_push(Provider::GitHub, &payload).unwrap();
        assert_eq!(r.title, "[acme/site] 2 new commits to main");
        assert!(r.body.contains("Message: Fix typo\n"));
        assert!(r.body.contains("Author: Ada"));
        assert_eq!(r.metadata.get("commit").map(String::as_str), Some("b"));
    }

    #[test]
    fn gitlab_push_uses_last_commit_and_project() {
        let payload = json!({
            "ref": "refs/heads/dev",
            "project": {"path_with_namespace": "group/app"},
            "user_name": "pusher",
            "commits": [
                {"id": "1", "message": "one"},
                {"id": "2", "message": "two", "url": "https://gitlab/c/2"}
            ]
        });
        let r = render_push(Provider::GitLab, &payload).unwrap();
        assert_eq!(r.title, "[group/app] 2 new commits to dev");
        assert!(r.body.contains("Message: two"));
        assert!(r.body.contains("Author: pusher"));
    }
}
