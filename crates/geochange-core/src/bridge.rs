use std::{io, sync::Arc};

use geochange_targets::{TeleportReport, TeleportRequest};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::controller::Controller;
use crate::events::{AppEvent, EventSender};
use crate::locations::{to_json, LocationBookmark, LocationStore};

#[derive(Clone)]
pub struct Bridge {
    store: Arc<LocationStore>,
    controller: Controller,
}

impl Bridge {
    pub fn new(store: Arc<LocationStore>, controller: Controller) -> Self {
        Self { store, controller }
    }

    pub fn store(&self) -> &LocationStore {
        &self.store
    }

    pub fn request_items(&self) -> JoinHandle<Vec<LocationBookmark>> {
        self.on_store(|store, events| {
            let items = store.load();
            publish(events, &items);
            items
        })
    }

    pub fn save_item(
        &self,
        name: &str,
        latitude: f64,
        longitude: f64,
    ) -> JoinHandle<io::Result<()>> {
        let name = name.to_string();
        self.on_store(move |store, events| match store.save(&name, latitude, longitude) {
            Ok(Some(items)) => {
                publish(events, &items);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(report(store, events, err)),
        })
    }

    pub fn delete_item(&self, name: &str) -> JoinHandle<io::Result<()>> {
        let name = name.to_string();
        self.on_store(move |store, events| match store.delete(&name) {
            Ok(items) => {
                publish(events, &items);
                Ok(())
            }
            Err(err) => Err(report(store, events, err)),
        })
    }

    pub fn teleport(
        &self,
        latitude: f64,
        longitude: f64,
        target: Option<&str>,
    ) -> JoinHandle<TeleportReport> {
        self.controller.teleport(request(latitude, longitude, target))
    }

    pub fn goto(&self, name: &str, target: Option<&str>) -> JoinHandle<Option<TeleportReport>> {
        let name = name.trim().to_string();
        let lookup = {
            let name = name.clone();
            self.on_store(move |store, _| store.find(&name))
        };
        let controller = self.controller.clone();
        let target = target.map(str::to_string);
        self.controller.spawner().spawn(async move {
            let Some(item) = lookup.await.ok().flatten() else {
                controller
                    .events()
                    .log("teleport", format!("No saved location named {name:?}"));
                return None;
            };
            controller
                .events()
                .log("teleport", format!("Going to {}", item.name));
            let request = request(item.latitude, item.longitude, target.as_deref());
            Some(controller.teleport_job(request).await)
        })
    }

    fn on_store<F, R>(&self, op: F) -> JoinHandle<R>
    where
        F: FnOnce(&LocationStore, &EventSender) -> R + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let events = self.controller.events().clone();
        self.controller
            .spawner()
            .spawn_blocking(move || op(&store, &events))
    }
}

fn request(latitude: f64, longitude: f64, target: Option<&str>) -> TeleportRequest {
    let request = TeleportRequest::new(latitude, longitude);
    match target.map(str::trim).filter(|t| !t.is_empty()) {
        Some(target) => request.with_target(target),
        None => request,
    }
}

fn publish(events: &EventSender, items: &[LocationBookmark]) {
    events.send(AppEvent::BookmarksChanged {
        json: to_json(items),
    });
}

fn report(store: &LocationStore, events: &EventSender, err: io::Error) -> io::Error {
    warn!("Failed to write {}: {err}", store.path().display());
    events.log("locations", format!("[ERROR] saving locations: {err}"));
    err
}
