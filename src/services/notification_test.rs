use super::*;

#[tokio::test]
async fn seeded_inbox_sorted_newest_first() {
    let center = NotificationCenter::seeded();
    let titles: Vec<String> = center.all().await.into_iter().map(|n| n.title).collect();
    assert_eq!(
        titles,
        vec!["Bus UTS001 Arriving Soon", "Service Disruption", "Route Update", "Welcome to UTS Bus Tracker!"]
    );
    assert_eq!(center.unread_count().await, 3);
    assert_eq!(center.unread().await.len(), 3);
}

#[tokio::test]
async fn mark_read_emits_new_count_once() {
    let center = NotificationCenter::seeded();
    let mut events = center.subscribe();
    let id = center.unread().await[0].id;

    assert!(center.mark_read(id).await);
    assert_eq!(events.try_recv(), Some(NotificationEvent::UnreadCountChanged(2)));
    assert!(!center.mark_read(id).await);
    assert!(events.try_recv().is_none());
    assert!(!center.mark_read(Uuid::new_v4()).await);
}

#[tokio::test]
async fn mark_all_read_only_when_something_unread() {
    let center = NotificationCenter::seeded();
    let mut events = center.subscribe();

    assert!(center.mark_all_read().await);
    assert_eq!(events.try_recv(), Some(NotificationEvent::UnreadCountChanged(0)));
    assert_eq!(center.unread_count().await, 0);

    assert!(!center.mark_all_read().await);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn delete_is_soft_and_hides_from_listings() {
    let center = NotificationCenter::seeded();
    let mut events = center.subscribe();
    let target = center.unread().await[0].clone();

    assert!(center.delete(target.id).await);
    assert_eq!(events.try_recv(), Some(NotificationEvent::UnreadCountChanged(2)));
    assert!(center.all().await.iter().all(|n| n.id != target.id));
    assert!(!center.mark_read(Uuid::new_v4()).await);
    assert!(!center.delete(Uuid::new_v4()).await);
}

#[tokio::test]
async fn push_emits_received_then_count() {
    let center = NotificationCenter::new(Vec::new());
    let mut events = center.subscribe();

    let pushed = center.push("Bus UTS003 Delayed", "Traffic on George St.", NotificationKind::Warning).await;
    assert_eq!(pushed.icon, "warning.png");
    assert!(!pushed.read);

    assert_eq!(events.try_recv(), Some(NotificationEvent::Received(pushed.clone())));
    assert_eq!(events.try_recv(), Some(NotificationEvent::UnreadCountChanged(1)));
    assert_eq!(center.all().await, vec![pushed]);
}

#[tokio::test]
async fn schedule_records_without_events() {
    let center = NotificationCenter::new(Vec::new());
    let mut events = center.subscribe();
    let at = OffsetDateTime::now_utc() + time::Duration::hours(1);

    let scheduled = center.schedule("Last bus", "Campus Loop ends at 22:00.", at, NotificationKind::Reminder).await;
    assert_eq!(scheduled.scheduled_for, Some(at));
    assert_eq!(scheduled.icon, "reminder.png");
    assert!(events.try_recv().is_none());
    assert_eq!(center.unread_count().await, 1);
}

#[test]
fn kind_labels_and_icons() {
    assert_eq!(NotificationKind::ServiceDisruption.display_name(), "Service Alert");
    assert_eq!(NotificationKind::General.display_name(), "Information");
    assert_eq!(NotificationKind::ServiceDisruption.icon(), "warning.png");
    assert_eq!(NotificationKind::BusAlert.icon(), "info_circle.png");
}
