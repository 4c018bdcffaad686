use anyhow::{Context, Result};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpSettings;
use crate::services::scoring::ScoreSummary;

/// Best-effort staff notification fired when a submission completes.
/// Failures are logged and swallowed: the respondent's completion must
/// never depend on the mailer.
pub struct CompletionNotifier {
    smtp: Option<SmtpSettings>,
}

impl CompletionNotifier {
    pub fn new(smtp: Option<SmtpSettings>) -> Self {
        Self { smtp }
    }

    pub fn sending_disabled() -> bool {
        std::env::var("EMAIL_SEND_DISABLED")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub async fn notify_completion(
        &self,
        questionnaire_title: &str,
        respondent: Option<&str>,
        score: Option<&ScoreSummary>,
        duration_seconds: Option<i64>,
    ) {
        if Self::sending_disabled() {
            tracing::debug!("Completion email skipped: sending disabled");
            return;
        }

        let Some(settings) = &self.smtp else {
            tracing::debug!("Completion email skipped: SMTP not configured");
            return;
        };

        if let Err(err) = self
            .send(settings, questionnaire_title, respondent, score, duration_seconds)
            .await
        {
            tracing::warn!("Failed to send completion email: {:#}", err);
        }
    }

    async fn send(
        &self,
        settings: &SmtpSettings,
        questionnaire_title: &str,
        respondent: Option<&str>,
        score: Option<&ScoreSummary>,
        duration_seconds: Option<i64>,
    ) -> Result<()> {
        let from_address: Mailbox = format!("{} <{}>", settings.from_name, settings.from_email)
            .parse()
            .context("Invalid from email address")?;
        let to_address: Mailbox = settings
            .notify_email
            .parse()
            .context("Invalid notification email address")?;

        let subject = format!("Submission completed: {}", questionnaire_title);

        let mut body = format!(
            "A submission for \"{}\" was just completed.\n\nRespondent: {}\n",
            questionnaire_title,
            respondent.unwrap_or("(not recorded)")
        );
        if let Some(score) = score {
            body.push_str(&format!(
                "Score: {}/{} ({:.1}%)\n",
                score.earned, score.possible, score.percentage
            ));
        }
        if let Some(seconds) = duration_seconds {
            body.push_str(&format!("Duration: {}s\n", seconds));
        }

        let email = Message::builder()
            .from(from_address)
            .to(to_address)
            .subject(subject)
            .body(body)
            .context("Failed to build completion email")?;

        let mailer = build_mailer(settings)?;
        mailer
            .send(email)
            .await
            .context("Failed to send completion email")?;

        Ok(())
    }
}

fn build_mailer(settings: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let creds = Credentials::new(settings.login.clone(), settings.password.clone());

    let builder = if settings.use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)
            .context("Invalid SMTP server for TLS")?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
    }
    .port(settings.port)
    .credentials(creds);

    Ok(builder.build())
}
