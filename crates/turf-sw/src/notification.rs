//! Push notifications.

use serde::Serialize;
use tracing::debug;
use turf_common::now_millis;

use crate::config::NotificationConfig;

/// Action that opens the admin page.
pub const ACTION_VIEW: &str = "view";

/// Action that only closes the notification.
pub const ACTION_DISMISS: &str = "dismiss";

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Data attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    /// When the push arrived (ms since epoch).
    pub date_of_arrival: u64,
    pub primary_key: u32,
}

/// A notification shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub tag: String,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the notification for a push message.
    ///
    /// `payload` is the push data as text; `None` uses the configured default body.
    pub fn from_push(config: &NotificationConfig, payload: Option<String>) -> Self {
        let action = |action: &str, title: &str| NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
            icon: config.icon.clone(),
        };

        Self {
            title: config.title.clone(),
            body: payload.unwrap_or_else(|| config.default_body.clone()),
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            tag: config.tag.clone(),
            data: NotificationData {
                date_of_arrival: now_millis(),
                primary_key: 1,
            },
            actions: vec![action(ACTION_VIEW, "View"), action(ACTION_DISMISS, "Dismiss")],
        }
    }

    /// Check if the notification offers `action`.
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a.action == action)
    }
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct Notifications {
    shown: Vec<Notification>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a notification, replacing any with the same tag.
    pub fn show(&mut self, notification: Notification) {
        self.shown.retain(|n| n.tag != notification.tag);
        debug!(tag = %notification.tag, body = %notification.body, "Showing notification");
        self.shown.push(notification);
    }

    /// Close the notification with `tag`.
    pub fn close(&mut self, tag: &str) -> Option<Notification> {
        let index = self.shown.iter().position(|n| n.tag == tag)?;
        Some(self.shown.remove(index))
    }

    /// Notifications on screen, oldest first.
    pub fn get_notifications(&self) -> &[Notification] {
        &self.shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_body() {
        let n = Notification::from_push(&NotificationConfig::default(), None);
        assert_eq!(n.title, "Turf Admin");
        assert_eq!(n.body, "New admin notification!");
        assert_eq!(n.tag, "admin-notification");
        assert_eq!(n.data.primary_key, 1);
        assert!(n.data.date_of_arrival > 0);
    }

    #[test]
    fn test_payload_body_and_actions() {
        let n = Notification::from_push(
            &NotificationConfig::default(),
            Some("Order #42 ready".to_string()),
        );
        assert_eq!(n.body, "Order #42 ready");
        assert!(n.has_action(ACTION_VIEW));
        assert!(n.has_action(ACTION_DISMISS));
        assert_eq!(n.actions.len(), 2);
        assert_eq!(n.actions[0].icon, "/icons/icon-192x192.png");
    }

    #[test]
    fn test_same_tag_replaces() {
        let config = NotificationConfig::default();
        let mut notifications = Notifications::new();
        notifications.show(Notification::from_push(&config, Some("first".into())));
        notifications.show(Notification::from_push(&config, Some("second".into())));

        assert_eq!(notifications.get_notifications().len(), 1);
        assert_eq!(notifications.get_notifications()[0].body, "second");

        assert!(notifications.close("admin-notification").is_some());
        assert!(notifications.close("admin-notification").is_none());
    }

    #[test]
    fn test_serializes_for_display() {
        let n = Notification::from_push(&NotificationConfig::default(), None);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["actions"][0]["action"], "view");
        assert_eq!(json["vibrate"], serde_json::json!([200, 100, 200]));
    }
}
