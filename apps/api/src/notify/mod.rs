//! Best-effort transactional email.
//!
//! SMTP settings come from the settings store on every call, so operator
//! changes apply immediately. Incomplete settings are logged and swallowed:
//! email is never allowed to fail a request.

use anyhow::Context;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::settings::{keys, SettingsStore};

const SENDER_NAME: &str = "CVIntelligence";

struct SmtpSettings {
    host: String,
    port: u16,
    user: String,
    password: String,
    from: String,
}

async fn smtp_settings(settings: &SettingsStore) -> Result<Option<SmtpSettings>, sqlx::Error> {
    let host = settings.get(keys::EMAIL_SMTP_HOST).await?;
    let port = settings.get(keys::EMAIL_SMTP_PORT).await?;
    let user = settings.get(keys::EMAIL_SMTP_USER).await?;
    let password = settings.get(keys::EMAIL_SMTP_PASSWORD).await?;
    let from = settings.get(keys::EMAIL_FROM_ADDRESS).await?;

    let (host, port, user, password, from) = match (host, port, user, password, from) {
        (Some(h), Some(p), Some(u), Some(pw), Some(f))
            if !h.is_empty() && !u.is_empty() && !pw.is_empty() && !f.is_empty() =>
        {
            (h, p, u, pw, f)
        }
        _ => return Ok(None),
    };

    let Ok(port) = port.parse::<u16>() else {
        return Ok(None);
    };

    Ok(Some(SmtpSettings {
        host,
        port,
        user,
        password,
        from,
    }))
}

fn build_message(from: &str, to: &str, subject: &str, html_body: &str) -> anyhow::Result<Message> {
    Message::builder()
        .from(
            format!("\"{SENDER_NAME}\" <{from}>")
                .parse()
                .context("invalid sender address")?,
        )
        .to(to.parse().context("invalid recipient address")?)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html_body.to_string())
        .context("failed to build email")
}

/// Sends one HTML email through the configured relay.
///
/// Returns `Ok(())` without sending when SMTP settings are incomplete; that
/// is an operator state, not a caller error. Transport failures do error so
/// callers can log them.
pub async fn send_email(
    settings: &SettingsStore,
    to: &str,
    subject: &str,
    html_body: &str,
) -> anyhow::Result<()> {
    let Some(smtp) = smtp_settings(settings).await? else {
        tracing::warn!("SMTP settings incomplete, email to {to} not sent");
        return Ok(());
    };

    let message = build_message(&smtp.from, to, subject, html_body)?;

    // Port 465 is wrapped TLS; anything else negotiates STARTTLS.
    let builder = if smtp.port == 465 {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
    };

    let mailer = builder
        .port(smtp.port)
        .credentials(Credentials::new(smtp.user, smtp.password))
        .build();

    let response = mailer.send(message).await.context("SMTP send failed")?;
    tracing::info!("Email sent to {to} (SMTP {})", response.code());

    Ok(())
}

/// Welcome email fired on registration.
pub async fn send_welcome_email(
    settings: &SettingsStore,
    to: &str,
    first_name: &str,
) -> anyhow::Result<()> {
    send_email(
        settings,
        to,
        "Bem-vindo ao CVIntelligence!",
        &welcome_body(first_name),
    )
    .await
}

/// Admin connectivity probe.
pub async fn send_test_email(settings: &SettingsStore, to: &str) -> anyhow::Result<()> {
    send_email(
        settings,
        to,
        "Teste de e-mail - CVIntelligence",
        "<p>Este é um e-mail de teste enviado pelo painel administrativo. \
         Se você o recebeu, as configurações de SMTP estão corretas.</p>",
    )
    .await
}

fn welcome_body(first_name: &str) -> String {
    format!(
        "<h1>Olá, {first_name}!</h1>\
         <p>Sua conta no CVIntelligence foi criada com sucesso.</p>\
         <p>Você recebeu <strong>2 créditos</strong> para começar: envie seu currículo \
         e receba uma análise detalhada com sugestões de melhoria.</p>\
         <p>Bons envios!</p>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_message_with_sender_name() {
        let message = build_message(
            "noreply@cvintelligence.com.br",
            "user@example.com",
            "Assunto",
            "<p>corpo</p>",
        );
        assert!(message.is_ok());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let message = build_message("noreply@cvintelligence.com.br", "not-an-address", "A", "b");
        assert!(message.is_err());
    }

    #[test]
    fn welcome_body_greets_by_first_name() {
        let body = welcome_body("Marina");
        assert!(body.contains("Olá, Marina!"));
        assert!(body.contains("2 créditos"));
    }
}
