//! Minimal server-rendered pages for the interactive flow.
//!
//! Templating engines are out of scope; these are bare forms styled just
//! enough to be usable in a browser during development.

use crate::picker::PatientSummary;
use crate::smart::scopes;

/// HTML-escape a value interpolated into markup or attributes.
pub fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title>\
         <style>body{{font-family:sans-serif;max-width:40rem;margin:3rem auto;padding:0 1rem}}\
         .error{{color:#b00020}}label{{display:block;margin:.5rem 0}}\
         button{{margin:.5rem .5rem 0 0;padding:.4rem 1rem}}</style></head>\
         <body>{}</body></html>",
        escape(title),
        body
    )
}

pub fn login_page(error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape(e)))
        .unwrap_or_default();
    page(
        "Sign in",
        &format!(
            "<h1>Sign in</h1>{error_html}\
             <form method=\"post\" action=\"/oauth2/login\">\
             <label>Username <input name=\"username\" autofocus></label>\
             <label>Password <input name=\"password\" type=\"password\"></label>\
             <button type=\"submit\">Sign in</button></form>"
        ),
    )
}

/// The consent page. The form posts back to the authorization endpoint and
/// deliberately carries NO `response_type` or `code_challenge*` fields —
/// their presence would make the endpoint treat the POST as a new
/// authorization request. Scopes are submitted as repeated `scope` fields,
/// never one space-separated value.
pub fn consent_page(
    client_name: &str,
    principal: &str,
    scopes_requested: &[String],
    consent_state: &str,
    client_id: &str,
    state: &str,
    patient_id: Option<&str>,
) -> String {
    let scope_rows: String = scopes_requested
        .iter()
        .map(|scope| {
            format!(
                "<li><code>{}</code> — {}\
                 <input type=\"hidden\" name=\"scope\" value=\"{}\"></li>",
                escape(scope),
                escape(&scopes::describe(scope)),
                escape(scope)
            )
        })
        .collect();
    let patient_html = patient_id
        .map(|id| format!("<p>Patient context: <code>{}</code></p>", escape(id)))
        .unwrap_or_default();
    page(
        "Authorize application",
        &format!(
            "<h1>Authorize {}</h1>\
             <p>Signed in as <strong>{}</strong></p>{patient_html}\
             <p>The application requests:</p>\
             <form method=\"post\" action=\"/oauth2/authorize\"><ul>{scope_rows}</ul>\
             <input type=\"hidden\" name=\"consent_state\" value=\"{}\">\
             <input type=\"hidden\" name=\"client_id\" value=\"{}\">\
             <input type=\"hidden\" name=\"state\" value=\"{}\">\
             <button type=\"submit\" name=\"consent_action\" value=\"approve\">Allow</button>\
             <button type=\"submit\" name=\"consent_action\" value=\"deny\">Deny</button>\
             </form>",
            escape(client_name),
            escape(principal),
            escape(consent_state),
            escape(client_id),
            escape(state),
        ),
    )
}

/// The patient picker page for the provider standalone launch.
#[allow(clippy::too_many_arguments)]
pub fn picker_page(
    principal: &str,
    patients: &[PatientSummary],
    search_term: &str,
    oauth_fields: &[(&str, &str)],
    error: Option<&str>,
) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape(e)))
        .unwrap_or_default();
    let hidden: String = oauth_fields
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| {
            format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                escape(name),
                escape(value)
            )
        })
        .collect();
    let rows: String = patients
        .iter()
        .map(|p| {
            let details = [
                p.birth_date.as_deref().unwrap_or("unknown birth date"),
                p.gender.as_deref().unwrap_or(""),
                if p.deceased { "deceased" } else { "" },
            ]
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
            format!(
                "<label><input type=\"radio\" name=\"patient_id\" value=\"{}\"> {} ({})</label>",
                escape(&p.id),
                escape(&p.full_name()),
                escape(&details)
            )
        })
        .collect();
    page(
        "Select a patient",
        &format!(
            "<h1>Select a patient</h1><p>Signed in as <strong>{}</strong></p>{error_html}\
             <form method=\"get\" action=\"/patient-picker\">{hidden}\
             <label>Search by id <input name=\"searchTerm\" value=\"{}\"></label>\
             <button type=\"submit\">Search</button></form>\
             <form method=\"post\" action=\"/patient-picker\">{hidden}{rows}\
             <button type=\"submit\" name=\"action\" value=\"select\">Continue</button>\
             <button type=\"submit\" name=\"action\" value=\"cancel\">Cancel</button>\
             </form>",
            escape(principal),
            escape(search_term),
        ),
    )
}

pub fn error_page(message: &str) -> String {
    page(
        "Error",
        &format!("<h1>Error</h1><p class=\"error\">{}</p>", escape(message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn test_consent_page_has_no_forbidden_fields() {
        let html = consent_page(
            "Growth Chart",
            "dr-jones",
            &["openid".to_string(), "launch/patient".to_string()],
            "cs-token",
            "my-app",
            "state-1",
            Some("example"),
        );
        assert!(!html.contains("name=\"response_type\""));
        assert!(!html.contains("name=\"code_challenge\""));
        assert!(!html.contains("name=\"code_challenge_method\""));
        // Scopes are repeated fields, not one joined value
        assert_eq!(html.matches("name=\"scope\"").count(), 2);
        assert!(html.contains("name=\"consent_state\" value=\"cs-token\""));
        assert!(html.contains("action=\"/oauth2/authorize\""));
    }

    #[test]
    fn test_login_page_error() {
        let html = login_page(Some("Bad credentials"));
        assert!(html.contains("Bad credentials"));
        assert!(html.contains("action=\"/oauth2/login\""));
    }

    #[test]
    fn test_picker_page_lists_patients() {
        let patients = vec![PatientSummary {
            id: "example".into(),
            given_name: Some("Amy".into()),
            family_name: Some("Shaw".into()),
            birth_date: Some("1987-02-20".into()),
            gender: Some("female".into()),
            deceased: false,
        }];
        let html = picker_page(
            "dr-jones",
            &patients,
            "",
            &[("client_id", "my-app"), ("state", "s1")],
            None,
        );
        assert!(html.contains("Amy Shaw"));
        assert!(html.contains("value=\"example\""));
        assert!(html.contains("name=\"action\" value=\"cancel\""));
    }
}
