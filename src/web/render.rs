//! Server-side HTML for the dashboard pages.
//!
//! Pages are plain strings built with `format!`. Every value that came from
//! a data file or a form goes through [`escape`] first.

use crate::auth::User;
use crate::metrics::summary::stations_by_volume;
use crate::snapshot::{ReloadFailure, Snapshot};
use std::fmt::Write;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;margin-bottom:2rem}\
th,td{border:1px solid #ccc;padding:.3rem .6rem;text-align:left}\
th{background:#f3f3f3}.high{color:#b00020}.medium{color:#b26a00}.low{color:#2e7d32}\
.notice{background:#fff4e5;border:1px solid #ffb74d;padding:.5rem 1rem}\
.error{background:#fdecea;border:1px solid #e57373;padding:.5rem 1rem}\
nav a{margin-right:1rem}";

/// Escapes text for use in HTML element content and quoted attributes.
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

fn page(title: &str, user: Option<&User>, body: &str) -> String {
    let nav = match user {
        Some(u) => {
            let admin = if u.is_admin() {
                r#"<a href="/admin/users">Users</a>"#
            } else {
                ""
            };
            format!(
                r#"<nav><a href="/">Dashboard</a>{admin}<span>{} ({})</span> <a href="/logout">Log out</a></nav>"#,
                escape(&u.name),
                u.role
            )
        }
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body>{nav}<h1>{title}</h1>{body}</body></html>",
        title = escape(title),
    )
}

pub fn login_page(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default();

    page(
        "Myki Inspector Portal",
        None,
        &format!(
            r#"{error}<form method="post" action="/login">
<p><label>Username <input name="username" autocomplete="username"></label></p>
<p><label>Password <input name="password" type="password" autocomplete="current-password"></label></p>
<p><button type="submit">Log in</button></p></form>"#
        ),
    )
}

pub fn dashboard_page(
    user: &User,
    snapshot: &Snapshot,
    failure: Option<&ReloadFailure>,
    top: usize,
) -> String {
    let mut body = String::new();
    let s = &snapshot.summary;

    if let Some(f) = failure {
        let _ = write!(
            body,
            r#"<p class="notice">Data unavailable, showing last known snapshot. Last refresh attempt at {} failed.</p>"#,
            f.at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    let _ = write!(
        body,
        "<p>Snapshot #{} generated {}</p>\
         <table><tr><th>Stations</th><th>Annual passengers</th><th>Avg daily</th>\
         <th>Compliance</th><th>Total evasion</th><th>Revenue impact</th><th>High risk</th><th>Active alerts</th></tr>\
         <tr><td>{}</td><td>{:.0}</td><td>{:.0}</td><td>{:.1}%</td><td>{:.0}</td><td>${:.2}</td><td>{}</td><td>{}</td></tr></table>",
        snapshot.generation,
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        s.total_stations,
        s.total_annual_passengers,
        s.avg_daily_passengers,
        s.compliance_rate,
        s.total_evasion,
        s.revenue_impact,
        s.high_risk_stations,
        snapshot.alerts.len(),
    );

    if user.is_admin() {
        body.push_str(r#"<form method="post" action="/admin/reload"><button type="submit">Reload data now</button></form>"#);
    }

    body.push_str("<h2>Alerts</h2>");
    if snapshot.alert_details.is_empty() {
        body.push_str("<p>No stations above the alert threshold.</p>");
    } else {
        body.push_str("<table><tr><th>Station</th><th>Priority</th><th>Evasion rate</th><th>Severity</th><th>Expected fines</th></tr>");
        for a in &snapshot.alert_details {
            let _ = write!(
                body,
                r#"<tr><td>{}</td><td>{:.3}</td><td>{:.1}%</td><td class="{sev}">{sev}</td><td>${:.0}</td></tr>"#,
                escape(&a.station),
                a.priority_score,
                a.evasion_rate * 100.0,
                a.expected_fines,
                sev = a.severity,
            );
        }
        body.push_str("</table>");
    }

    body.push_str("<h2>Priority ranking</h2><table><tr><th>#</th><th>Station</th><th>Score</th><th>Evasion rate</th><th>Severity</th></tr>");
    for r in snapshot.ranking.iter().take(top) {
        let _ = write!(
            body,
            r#"<tr><td>{}</td><td>{}</td><td>{:.3}</td><td>{:.1}%</td><td class="{sev}">{sev}</td></tr>"#,
            r.rank,
            escape(&r.station),
            r.score,
            r.evasion_rate * 100.0,
            sev = r.severity,
        );
    }
    body.push_str("</table>");

    body.push_str("<h2>Busiest stations</h2><table><tr><th>Station</th><th>Annual</th><th>Daily avg</th><th>Peak ratio</th><th>Weekend ratio</th><th>Location</th></tr>");
    for st in stations_by_volume(&snapshot.stations).into_iter().take(top) {
        let location = st
            .coordinates()
            .map(|(lat, lng)| format!("{lat:.4}, {lng:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{:.0}</td><td>{:.0}</td><td>{:.2}</td><td>{:.2}</td><td>{location}</td></tr>",
            escape(&st.name),
            st.pax_annual,
            st.daily_average(),
            st.peak_ratio(),
            st.weekend_ratio(),
        );
    }
    body.push_str("</table>");

    page("Inspector Priority Dashboard", Some(user), &body)
}

pub fn users_page(user: &User, users: &[User], error: Option<&str>) -> String {
    let mut body = String::new();

    if let Some(e) = error {
        let _ = write!(body, r#"<p class="error">{}</p>"#, escape(e));
    }

    body.push_str("<table><tr><th>Username</th><th>Name</th><th>Role</th><th></th></tr>");
    for u in users {
        let action = if u.username == user.username {
            String::new()
        } else {
            format!(
                r#"<form method="post" action="/admin/users/{}/delete"><button type="submit">Delete</button></form>"#,
                escape(&u.username)
            )
        };
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{action}</td></tr>",
            escape(&u.username),
            escape(&u.name),
            u.role,
        );
    }
    body.push_str("</table>");

    body.push_str(
        r#"<h2>Add user</h2><form method="post" action="/admin/users">
<p><label>Username <input name="username"></label></p>
<p><label>Name <input name="name"></label></p>
<p><label>Password <input name="password" type="password"></label></p>
<p><label>Role <select name="role"><option value="inspector">inspector</option><option value="admin">admin</option></select></label></p>
<p><button type="submit">Add</button></p></form>"#,
    );

    page("User management", Some(user), &body)
}
