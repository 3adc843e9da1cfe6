//! Message bodies. Every dynamic value is HTML-escaped in the HTML part.

use super::OutboundEmail;

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(heading: &str, body_html: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <div style=\"max-width: 600px; margin: 0 auto; padding: 20px;\">\
         <h1 style=\"color: #ea580c;\">{heading}</h1>{body_html}\
         <p style=\"color: #6b7280; font-size: 12px;\">This is an automated email from CampusStay. \
         Please do not reply.</p></div></body></html>"
    )
}

pub fn verification(to: &str, name: &str, link: &str) -> OutboundEmail {
    let html = layout(
        "Welcome to CampusStay",
        &format!(
            "<p>Dear {name},</p><p>Please verify your email address to start applying \
             for accommodation.</p><p><a href=\"{link}\">Verify my email</a></p>\
             <p>This link expires in 24 hours.</p>",
            name = escape(name),
            link = escape(link),
        ),
    );
    OutboundEmail {
        to: to.to_string(),
        subject: "Verify Your CampusStay Account".into(),
        html_body: html,
        text_body: Some(format!(
            "Dear {name},\n\nPlease verify your email address:\n{link}\n\nThis link expires in 24 hours.\n"
        )),
    }
}

pub fn password_reset(to: &str, name: &str, link: &str) -> OutboundEmail {
    let html = layout(
        "Reset your password",
        &format!(
            "<p>Dear {name},</p><p>We received a request to reset your password.</p>\
             <p><a href=\"{link}\">Choose a new password</a></p>\
             <p>This link expires in 1 hour. If you did not ask for this, ignore this email.</p>",
            name = escape(name),
            link = escape(link),
        ),
    );
    OutboundEmail {
        to: to.to_string(),
        subject: "Reset Your CampusStay Password".into(),
        html_body: html,
        text_body: Some(format!(
            "Dear {name},\n\nReset your password here:\n{link}\n\nThis link expires in 1 hour.\n"
        )),
    }
}

pub fn application_submitted(to: &str, name: &str, title: &str, address: &str) -> OutboundEmail {
    let html = layout(
        "Application received",
        &format!(
            "<p>Dear {name},</p><p>Your application for <strong>{title}</strong> \
             ({address}) has been submitted.</p><p>Next step: upload your ID copy and \
             proof of registration from your dashboard so we can review it.</p>",
            name = escape(name),
            title = escape(title),
            address = escape(address),
        ),
    );
    OutboundEmail {
        to: to.to_string(),
        subject: format!("Application Submitted - {title}"),
        html_body: html,
        text_body: Some(format!(
            "Dear {name},\n\nYour application for {title} ({address}) has been submitted.\n\
             Please upload your ID copy and proof of registration.\n"
        )),
    }
}

pub fn application_approved(to: &str, name: &str, title: &str, address: &str) -> OutboundEmail {
    let html = layout(
        "Application approved",
        &format!(
            "<p>Dear {name},</p><p>Your application for <strong>{title}</strong> \
             ({address}) has been approved. We will contact you with move-in details.</p>",
            name = escape(name),
            title = escape(title),
            address = escape(address),
        ),
    );
    OutboundEmail {
        to: to.to_string(),
        subject: format!("Application Approved - {title}"),
        html_body: html,
        text_body: Some(format!(
            "Dear {name},\n\nYour application for {title} ({address}) has been approved.\n"
        )),
    }
}

pub fn application_rejected(to: &str, name: &str, title: &str) -> OutboundEmail {
    let html = layout(
        "Application update",
        &format!(
            "<p>Dear {name},</p><p>Unfortunately your application for <strong>{title}</strong> \
             was not successful. You are welcome to apply for other listings.</p>",
            name = escape(name),
            title = escape(title),
        ),
    );
    OutboundEmail {
        to: to.to_string(),
        subject: format!("Application Update - {title}"),
        html_body: html,
        text_body: Some(format!(
            "Dear {name},\n\nUnfortunately your application for {title} was not successful.\n"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_escaped_in_html() {
        let email = verification("a@b.com", "<script>", "http://f/verify-email?token=x&y");
        assert!(email.html_body.contains("&lt;script&gt;"));
        assert!(email.html_body.contains("token=x&amp;y"));
        assert!(email.text_body.unwrap().contains("token=x&y"));
    }
}
