use axum::response::Html;
use std::fmt::Write;

use crate::db::models::{Card, User};

/// Renders the app's HTML pages and the confirmation email.
///
/// Built once at startup and handed to handlers through `AppState`.
#[derive(Debug, Clone)]
pub struct Views {
    app_name: String,
}

impl Views {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    pub fn login(&self, alert: Option<&str>) -> Html<String> {
        self.page(
            "Log in",
            alert,
            r#"<form method="post" action="/app/login">
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" required></label>
  <label><input type="checkbox" name="remember_me"> Remember me</label>
  <button type="submit">Log in</button>
</form>
<p><a href="/app/createaccount">Create an account</a></p>"#,
        )
    }

    pub fn create_account(&self, alert: Option<&str>) -> Html<String> {
        self.page(
            "Create account",
            alert,
            r#"<form method="post" action="/app/createaccount">
  <label>First name <input type="text" name="first_name" required></label>
  <label>Last name <input type="text" name="last_name" required></label>
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" required></label>
  <button type="submit">Create account</button>
</form>
<p><a href="/app/login">Already have an account?</a></p>"#,
        )
    }

    pub fn check_email(&self) -> Html<String> {
        self.page(
            "Check your email",
            None,
            "<p>We sent you a confirmation link. It expires in 15 minutes.</p>",
        )
    }

    pub fn dashboard(&self, user: &User, cards: &[Card]) -> Html<String> {
        let mut body = format!(
            "<p>Signed in as {} {} ({}) &middot; <a href=\"/app/logout\">Log out</a></p>\n",
            escape(&user.first_name),
            escape(&user.last_name),
            escape(&user.email),
        );

        if cards.is_empty() {
            body.push_str("<p>No cards have been provisioned yet.</p>");
            return self.page("Dashboard", None, &body);
        }

        body.push_str("<table>\n<tr><th>Name</th><th>Card</th><th>Remaining opens</th><th></th></tr>\n");
        for card in cards {
            let id = card.card_id;
            let opens = if card.is_unlimited() {
                "unlimited".to_string()
            } else {
                card.remaining_opens.to_string()
            };
            let _ = write!(
                body,
                r#"<tr>
  <td><form method="post" action="/app/dashboard/updatefriendlyname/{id}"><input type="text" name="name" value="{name}"><button>Rename</button></form></td>
  <td><code>{id}</code></td>
  <td>{opens}</td>
  <td>
    <form method="post" action="/app/dashboard/incrementopens/{id}"><button>+1</button></form>
    <form method="post" action="/app/dashboard/decrementopens/{id}"><button>-1</button></form>
    <form method="post" action="/app/dashboard/setopens/{id}"><input type="number" name="num" min="-1" value="{raw}"><button>Set</button></form>
  </td>
</tr>
"#,
                name = escape(&card.friendly_name),
                raw = card.remaining_opens,
            );
        }
        body.push_str("</table>\n<p>Set opens to -1 for unlimited, 0 to disable.</p>");

        self.page("Dashboard", None, &body)
    }

    pub fn confirmation_email(&self, confirmation_url: &str) -> String {
        format!(
            "<html><body>\n<p>Welcome to {app}!</p>\n<p><a href=\"{url}\">Confirm your email address</a> to finish creating your account. The link expires in 15 minutes.</p>\n</body></html>",
            app = escape(&self.app_name),
            url = escape(confirmation_url),
        )
    }

    fn page(&self, title: &str, alert: Option<&str>, body: &str) -> Html<String> {
        let alert = alert
            .map(|msg| format!("<div class=\"alert\">{}</div>\n", escape(msg)))
            .unwrap_or_default();

        Html(format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title} - {app}</title></head>\n<body>\n<h1>{title}</h1>\n{alert}{body}\n</body>\n</html>\n",
            title = escape(title),
            app = escape(&self.app_name),
        ))
    }
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
