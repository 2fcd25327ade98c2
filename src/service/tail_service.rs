//! Build tail service: follows build status and log topics on the bus.
//!
//! Listens on the aggregate update topic. While a build is running its log
//! topic is subscribed and every line is handed to a [`TailSink`]; once the
//! build reaches a terminal status the log subscription is dropped again,
//! from inside the update handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::event_bus::typed;
use crate::domain::{BuildId, BuildUpdate, EventBus, LogLine, Subscription, Topic};

/// Receives what the tail service observes.
pub trait TailSink: Send + Sync {
    /// Called for every build update on the aggregate topic.
    fn on_status(&self, update: &BuildUpdate);

    /// Called for every log line of a tailed build.
    fn on_log(&self, build: &BuildId, line: &LogLine);
}

/// [`TailSink`] that writes to the operational log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TailSink for TracingSink {
    fn on_status(&self, update: &BuildUpdate) {
        tracing::info!(
            build = update.id,
            job = %update.name,
            status = update.status.as_str(),
            tasks = update.tasks.len(),
            "build status"
        );
    }

    fn on_log(&self, build: &BuildId, line: &LogLine) {
        tracing::info!(
            build = %build,
            task = line.task_id,
            line = line.id,
            "{}",
            line.data.trim_end()
        );
    }
}

type Tailed = Arc<Mutex<HashMap<BuildId, Subscription>>>;

fn lock(tailed: &Tailed) -> MutexGuard<'_, HashMap<BuildId, Subscription>> {
    tailed.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscribes to build status and tails the logs of running builds.
///
/// Dropping the service calls [`BuildTailService::stop`].
#[derive(Debug)]
pub struct BuildTailService {
    feed: Subscription,
    tailed: Tailed,
}

impl BuildTailService {
    /// Starts following `bus`. Builds in `watch` are tailed immediately,
    /// before any status for them is seen.
    #[must_use]
    pub fn start(bus: &EventBus, sink: Arc<dyn TailSink>, watch: &[BuildId]) -> Self {
        let tailed: Tailed = Arc::default();
        for id in watch {
            tail(bus, &sink, &tailed, id.clone());
        }

        let feed = {
            let handler_bus = bus.clone();
            let tailed = Arc::clone(&tailed);
            bus.subscribe(
                Topic::UpdateFeed,
                typed(move |update: BuildUpdate| {
                    sink.on_status(&update);
                    let id = BuildId::from(update.id);
                    if update.status.is_terminal() {
                        untail(&tailed, &id);
                    } else {
                        tail(&handler_bus, &sink, &tailed, id);
                    }
                    Ok(())
                }),
            )
        };

        tracing::info!(watched = watch.len(), "build tail service started");
        Self { feed, tailed }
    }

    /// Builds whose logs are currently tailed, sorted.
    #[must_use]
    pub fn tailed(&self) -> Vec<BuildId> {
        let mut ids: Vec<BuildId> = lock(&self.tailed).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns `true` if the log of `build` is tailed.
    #[must_use]
    pub fn is_tailing(&self, build: &BuildId) -> bool {
        lock(&self.tailed).contains_key(build)
    }

    /// Removes every subscription the service holds. Idempotent.
    pub fn stop(&self) {
        let feed_removed = self.feed.unsubscribe();
        let logs = std::mem::take(&mut *lock(&self.tailed));
        for sub in logs.values() {
            sub.unsubscribe();
        }
        if feed_removed {
            tracing::info!(logs = logs.len(), "build tail service stopped");
        }
    }
}

impl Drop for BuildTailService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tail(bus: &EventBus, sink: &Arc<dyn TailSink>, tailed: &Tailed, id: BuildId) {
    let mut tailed = lock(tailed);
    if tailed.contains_key(&id) {
        return;
    }
    let sink = Arc::clone(sink);
    let build = id.clone();
    let subscription = bus.subscribe(
        Topic::log(id.clone()),
        typed(move |line: LogLine| {
            sink.on_log(&build, &line);
            Ok(())
        }),
    );
    tracing::debug!(build = %id, "tailing build log");
    tailed.insert(id, subscription);
}

fn untail(tailed: &Tailed, id: &BuildId) {
    let removed = lock(tailed).remove(id);
    if let Some(subscription) = removed {
        subscription.unsubscribe();
        tracing::debug!(build = %id, "stopped tailing build log");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Recording {
        statuses: Mutex<Vec<(u64, &'static str)>>,
        lines: Mutex<Vec<(String, String)>>,
    }

    impl TailSink for Recording {
        fn on_status(&self, update: &BuildUpdate) {
            self.statuses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((update.id, update.status.as_str()));
        }

        fn on_log(&self, build: &BuildId, line: &LogLine) {
            self.lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((build.to_string(), line.data.clone()));
        }
    }

    impl Recording {
        fn lines(&self) -> Vec<(String, String)> {
            self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    fn update(id: u64, status: &str) -> serde_json::Value {
        json!({"id": id, "name": "deploy", "status": status, "tasks": null})
    }

    fn line(text: &str) -> serde_json::Value {
        json!({"task_id": 0, "id": 1, "data": text})
    }

    #[test]
    fn running_build_is_tailed_until_terminal() {
        let bus = EventBus::new();
        let sink = Arc::new(Recording::default());
        let service = BuildTailService::start(&bus, Arc::clone(&sink) as Arc<dyn TailSink>, &[]);
        let id = BuildId::from(3);

        bus.publish(&Topic::log(id.clone()), &line("before"));
        bus.publish(&Topic::UpdateFeed, &update(3, "running"));
        assert!(service.is_tailing(&id));

        bus.publish(&Topic::log(id.clone()), &line("during"));
        bus.publish(&Topic::UpdateFeed, &update(3, "finished"));
        assert!(!service.is_tailing(&id));

        bus.publish(&Topic::log(id.clone()), &line("after"));
        assert_eq!(sink.lines(), vec![("3".to_string(), "during".to_string())]);
        assert!(!bus.has_subscribers(&Topic::log(id)));
    }

    #[test]
    fn repeated_running_updates_subscribe_once() {
        let bus = EventBus::new();
        let sink = Arc::new(Recording::default());
        let service = BuildTailService::start(&bus, Arc::clone(&sink) as Arc<dyn TailSink>, &[]);

        bus.publish(&Topic::UpdateFeed, &update(8, "pending"));
        bus.publish(&Topic::UpdateFeed, &update(8, "running"));
        assert_eq!(bus.subscription_count(), 2);
        assert_eq!(service.tailed(), vec![BuildId::from(8)]);

        let statuses = sink.statuses.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert_eq!(statuses, vec![(8, "pending"), (8, "running")]);
    }

    #[test]
    fn watched_builds_are_tailed_from_start() {
        let bus = EventBus::new();
        let sink = Arc::new(Recording::default());
        let _service = BuildTailService::start(
            &bus,
            Arc::clone(&sink) as Arc<dyn TailSink>,
            &[BuildId::from(1), BuildId::from(2)],
        );

        bus.publish(&Topic::log(BuildId::from(2)), &line("hello"));
        assert_eq!(sink.lines(), vec![("2".to_string(), "hello".to_string())]);
    }

    #[test]
    fn malformed_update_is_a_handler_failure() {
        let bus = EventBus::new();
        let _service = BuildTailService::start(&bus, Arc::new(TracingSink), &[]);
        let delivery = bus.publish(&Topic::UpdateFeed, &json!({"status": 12}));
        assert_eq!(delivery.failed, 1);
    }

    #[test]
    fn stop_removes_everything() {
        let bus = EventBus::new();
        let service = BuildTailService::start(&bus, Arc::new(TracingSink), &[BuildId::from(4)]);
        assert_eq!(bus.topic_count(), 2);

        service.stop();
        service.stop();
        assert_eq!(bus.topic_count(), 0);
        assert!(service.tailed().is_empty());
    }

    #[test]
    fn drop_stops_the_service() {
        let bus = EventBus::new();
        let service = BuildTailService::start(&bus, Arc::new(TracingSink), &[BuildId::from(4)]);
        drop(service);
        assert!(!bus.has_subscribers(&Topic::UpdateFeed));
    }
}
