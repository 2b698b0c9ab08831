//! Notification inbox: in-app messages about buses and routes.
//!
//! Notifications are never removed. `delete` clears the `active` flag and
//! every listing skips inactive entries. Changes to the unread count are
//! broadcast as `NotificationEvent::UnreadCountChanged` under the write
//! guard, after the `Received` event for a pushed notification.

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::{EventHub, Subscription};
use crate::services::fleet::{BusId, RouteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Warning,
    Alert,
    BusArrival,
    RouteUpdate,
    ServiceDisruption,
    Reminder,
    BusAlert,
    General,
    Arrival,
}

impl NotificationKind {
    /// Label shown as the notification subtitle.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::BusArrival => "Bus Arrival",
            Self::RouteUpdate => "Route Update",
            Self::ServiceDisruption => "Service Alert",
            Self::Warning => "Warning",
            Self::Alert => "Alert",
            Self::Reminder => "Reminder",
            Self::Info | Self::BusAlert | Self::General | Self::Arrival => "Information",
        }
    }

    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::BusArrival => "bus_arrival.png",
            Self::RouteUpdate => "route_update.png",
            Self::ServiceDisruption | Self::Warning => "warning.png",
            Self::Alert => "alert.png",
            Self::Reminder => "reminder.png",
            Self::Info | Self::BusAlert | Self::General | Self::Arrival => "info_circle.png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: OffsetDateTime,
    pub read: bool,
    pub bus_id: Option<BusId>,
    pub route_id: Option<RouteId>,
    pub icon: String,
    pub scheduled_for: Option<OffsetDateTime>,
    pub active: bool,
}

impl Notification {
    fn new(title: &str, message: &str, kind: NotificationKind, created_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_owned(),
            message: message.to_owned(),
            kind,
            created_at,
            read: false,
            bus_id: None,
            route_id: None,
            icon: kind.icon().to_owned(),
            scheduled_for: None,
            active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Received(Notification),
    UnreadCountChanged(usize),
}

pub struct NotificationCenter {
    items: RwLock<Vec<Notification>>,
    events: EventHub<NotificationEvent>,
}

impl NotificationCenter {
    #[must_use]
    pub fn new(items: Vec<Notification>) -> Self {
        Self { items: RwLock::new(items), events: EventHub::new() }
    }

    /// Inbox with the welcome message and a few recent service updates.
    #[must_use]
    pub fn seeded() -> Self {
        Self::new(seed(OffsetDateTime::now_utc()))
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription<NotificationEvent> {
        self.events.subscribe()
    }

    /// Active notifications, newest first.
    pub async fn all(&self) -> Vec<Notification> {
        newest_first(self.items.read().await.iter().filter(|n| n.active))
    }

    pub async fn unread(&self) -> Vec<Notification> {
        newest_first(self.items.read().await.iter().filter(|n| n.active && !n.read))
    }

    pub async fn unread_count(&self) -> usize {
        unread_count(&self.items.read().await)
    }

    /// Returns `false` if the notification is unknown or already read.
    pub async fn mark_read(&self, id: Uuid) -> bool {
        let mut items = self.items.write().await;
        let Some(item) = items.iter_mut().find(|n| n.id == id && n.active && !n.read) else {
            return false;
        };
        item.read = true;
        self.events.emit(&NotificationEvent::UnreadCountChanged(unread_count(&items)));
        true
    }

    /// Returns `false` if nothing was unread.
    pub async fn mark_all_read(&self) -> bool {
        let mut items = self.items.write().await;
        let mut marked = 0_usize;
        for item in items.iter_mut().filter(|n| n.active && !n.read) {
            item.read = true;
            marked += 1;
        }
        if marked == 0 {
            return false;
        }
        debug!(marked, "notifications marked read");
        self.events.emit(&NotificationEvent::UnreadCountChanged(0));
        true
    }

    /// Hide a notification from every listing.
    pub async fn delete(&self, id: Uuid) -> bool {
        let mut items = self.items.write().await;
        let Some(item) = items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        item.active = false;
        self.events.emit(&NotificationEvent::UnreadCountChanged(unread_count(&items)));
        true
    }

    /// Record a notification delivered now.
    pub async fn push(&self, title: &str, message: &str, kind: NotificationKind) -> Notification {
        let notification = Notification::new(title, message, kind, OffsetDateTime::now_utc());
        let mut items = self.items.write().await;
        items.push(notification.clone());
        info!(id = %notification.id, kind = kind.display_name(), "notification received");
        self.events.emit(&NotificationEvent::Received(notification.clone()));
        self.events.emit(&NotificationEvent::UnreadCountChanged(unread_count(&items)));
        notification
    }

    /// Record a notification for later delivery. No events are emitted.
    pub async fn schedule(
        &self,
        title: &str,
        message: &str,
        at: OffsetDateTime,
        kind: NotificationKind,
    ) -> Notification {
        let notification = Notification {
            scheduled_for: Some(at),
            ..Notification::new(title, message, kind, OffsetDateTime::now_utc())
        };
        self.items.write().await.push(notification.clone());
        debug!(id = %notification.id, "notification scheduled");
        notification
    }
}

fn unread_count(items: &[Notification]) -> usize {
    items.iter().filter(|n| n.active && !n.read).count()
}

fn newest_first<'a>(items: impl Iterator<Item = &'a Notification>) -> Vec<Notification> {
    let mut items: Vec<Notification> = items.cloned().collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items
}

fn seed(now: OffsetDateTime) -> Vec<Notification> {
    use NotificationKind::{BusArrival, Info, RouteUpdate, ServiceDisruption};
    use time::Duration;

    vec![
        Notification {
            icon: "welcome.png".into(),
            ..Notification::new(
                "Welcome to UTS Bus Tracker!",
                "Track your campus buses in real-time and never miss your ride.",
                Info,
                now - Duration::hours(2),
            )
        },
        Notification {
            read: true,
            bus_id: Some(1),
            ..Notification::new(
                "Bus UTS001 Arriving Soon",
                "Your bus will arrive at Library stop in 3 minutes.",
                BusArrival,
                now - Duration::minutes(15),
            )
        },
        Notification {
            route_id: Some(1),
            ..Notification::new(
                "Route Update",
                "Campus Loop route has been updated with new timing.",
                RouteUpdate,
                now - Duration::hours(1),
            )
        },
        Notification {
            route_id: Some(2),
            ..Notification::new(
                "Service Disruption",
                "City Express route delayed due to traffic conditions.",
                ServiceDisruption,
                now - Duration::minutes(30),
            )
        },
    ]
}

#[cfg(test)]
#[path = "notification_test.rs"]
mod tests;
