//! Built-in templates for the known event types

use super::types::{HtmlFormat, NotificationTemplate};
use crate::channel::ChannelType;
use crate::notification::EventType;

fn builtin(
    id: &str,
    event_type: EventType,
    channel: ChannelType,
    subject: Option<&str>,
    text: &str,
    markup: Option<&str>,
) -> NotificationTemplate {
    NotificationTemplate {
        id: id.to_string(),
        event_type,
        channel,
        subject: subject.map(str::to_string),
        text: text.to_string(),
        html_format: if markup.is_some() {
            HtmlFormat::Markup
        } else {
            HtmlFormat::Html
        },
        html: markup.map(str::to_string),
        variables: vec!["visitor.name".to_string()],
        is_default: false,
    }
}

/// Templates covering every channel of the default fallback chains.
///
/// None of them is flagged default, so a configured template for the same
/// key wins when it is registered first or flagged default.
pub fn builtin_templates() -> Vec<NotificationTemplate> {
    use ChannelType::{Chat, Email, Sms};
    use EventType::{CheckoutAlert, HostAlert, VisitReminder, VisitorConfirmation};

    vec![
        builtin(
            "builtin.host_alert.sms",
            HostAlert,
            Sms,
            None,
            "{{visitor.name}} has arrived and is waiting for you at {{location.name}}.",
            None,
        ),
        builtin(
            "builtin.host_alert.email",
            HostAlert,
            Email,
            Some("Your visitor {{visitor.name}} has arrived"),
            "Hello {{host.name}},\n\n{{visitor.name}} has checked in at {{location.name}} and is waiting for you.",
            Some(
                "[heading]Your visitor has arrived[/heading]\
                 [text]Hello {{host.name}},[/text]\
                 [text][bold]{{visitor.name}}[/bold] has checked in at {{location.name}} and is waiting for you.[/text]",
            ),
        ),
        builtin(
            "builtin.host_alert.chat",
            HostAlert,
            Chat,
            None,
            ":wave: {{visitor.name}} is waiting for {{host.name}} at {{location.name}}",
            None,
        ),
        builtin(
            "builtin.visitor_confirmation.email",
            VisitorConfirmation,
            Email,
            Some("Your visit to {{organization.name}} is confirmed"),
            "Hello {{visitor.name}},\n\nYour visit on {{visit.date}} with {{host.name}} is confirmed.",
            Some(
                "[heading]Visit confirmed[/heading]\
                 [text]Hello {{visitor.name}},[/text]\
                 [text]Your visit on [bold]{{visit.date}}[/bold] with {{host.name}} is confirmed.[/text]\
                 [divider]\
                 [text]Please bring a photo ID to reception.[/text]",
            ),
        ),
        builtin(
            "builtin.visitor_confirmation.sms",
            VisitorConfirmation,
            Sms,
            None,
            "Hi {{visitor.name}}, your visit on {{visit.date}} with {{host.name}} is confirmed.",
            None,
        ),
        builtin(
            "builtin.checkout_alert.chat",
            CheckoutAlert,
            Chat,
            None,
            "{{visitor.name}} has checked out of {{location.name}}",
            None,
        ),
        builtin(
            "builtin.checkout_alert.email",
            CheckoutAlert,
            Email,
            Some("{{visitor.name}} has checked out"),
            "{{visitor.name}} checked out of {{location.name}} at {{visit.checked_out_at}}.",
            Some(
                "[text][bold]{{visitor.name}}[/bold] checked out of {{location.name}} at {{visit.checked_out_at}}.[/text]",
            ),
        ),
        builtin(
            "builtin.visit_reminder.email",
            VisitReminder,
            Email,
            Some("Reminder: your visit on {{visit.date}}"),
            "Hello {{visitor.name}},\n\nThis is a reminder of your visit on {{visit.date}} with {{host.name}}.",
            Some(
                "[heading]Upcoming visit[/heading]\
                 [text]Hello {{visitor.name}},[/text]\
                 [text]This is a reminder of your visit on [bold]{{visit.date}}[/bold] with {{host.name}}.[/text]",
            ),
        ),
        builtin(
            "builtin.visit_reminder.sms",
            VisitReminder,
            Sms,
            None,
            "Reminder: {{visitor.name}}, your visit with {{host.name}} is on {{visit.date}}.",
            None,
        ),
    ]
}
