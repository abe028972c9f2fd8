use log::{debug, info, warn};

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::config::*;
use crate::driver::Tickable;

/// The collaborator that actually moves the bytes of an upload.
///
/// Contract: for a given item, the reported percentages never decrease and
/// exactly one terminal outcome is produced (reaching 100, or a failure).
pub trait UploadTransport {
    /// Called once per tick for the item being processed.
    fn report(&mut self, item: &UploadItem) -> TransportReport;

    /// The item was removed while in flight. Nothing more will be asked about it.
    fn cancel(&mut self, _id: UploadId) {}
}

/// A stand-in transport advancing a fixed number of points on every tick.
///
/// Files can be scheduled to fail once they would reach a given percentage.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    step_percent: u8,
    progress: HashMap<UploadId, u8>,
    failures: HashMap<String, u8>,
}

impl SimulatedTransport {
    pub fn new(step_percent: u8) -> SimulatedTransport {
        SimulatedTransport {
            step_percent: step_percent.clamp(1, 100),
            progress: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Every file with this name fails when its progress would reach `at_percent`.
    pub fn fail_file(mut self, name: &str, at_percent: u8) -> SimulatedTransport {
        self.failures.insert(name.to_string(), at_percent.min(100));
        self
    }

    /// Whether the transport still holds progress for this item.
    pub fn is_tracking(&self, id: UploadId) -> bool {
        self.progress.contains_key(&id)
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        SimulatedTransport::new(UploadRules::DEFAULT_RULES.step_percent)
    }
}

impl UploadTransport for SimulatedTransport {
    fn report(&mut self, item: &UploadItem) -> TransportReport {
        let current = *self.progress.get(&item.id).unwrap_or(&0);
        let next = current.saturating_add(self.step_percent).min(100);
        if let Some(fail_at) = self.failures.get(&item.name) {
            if next >= *fail_at {
                self.progress.remove(&item.id);
                return TransportReport::Failed(format!("transport failed at {}%", fail_at));
            }
        }
        if next >= 100 {
            self.progress.remove(&item.id);
        } else {
            self.progress.insert(item.id, next);
        }
        TransportReport::Progress(next)
    }

    fn cancel(&mut self, id: UploadId) {
        self.progress.remove(&id);
    }
}

/// Admits files and uploads them one at a time, in admission order.
///
/// Only one item is ever `InProgress`. Finishing an item, successfully or
/// not, immediately starts the next pending one.
pub struct UploadPipeline<T: UploadTransport = SimulatedTransport> {
    rules: UploadRules,
    transport: T,
    items: Vec<UploadItem>,
    active: Option<UploadId>,
    next_id: u64,
    finished: Vec<UploadId>,
    listeners: Vec<Sender<UploadEvent>>,
}

impl UploadPipeline<SimulatedTransport> {
    pub fn simulated(rules: &UploadRules) -> UploadPipeline<SimulatedTransport> {
        UploadPipeline::new(rules, SimulatedTransport::new(rules.step_percent))
    }
}

impl<T: UploadTransport> UploadPipeline<T> {
    pub fn new(rules: &UploadRules, transport: T) -> UploadPipeline<T> {
        UploadPipeline {
            rules: rules.clone(),
            transport,
            items: Vec::new(),
            active: None,
            next_id: 1,
            finished: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Returns a channel receiving every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<UploadEvent> {
        let (tx, rx) = channel();
        self.listeners.push(tx);
        rx
    }

    /// Appends one pending item per file and starts processing if idle.
    ///
    /// Files above the size limit are admitted too, but directly as failed.
    pub fn admit(&mut self, files: &[FileHandle]) -> Vec<UploadId> {
        let mut ids: Vec<UploadId> = Vec::new();
        for f in files {
            let id = UploadId(self.next_id);
            self.next_id += 1;
            let mut item = UploadItem {
                id,
                file: f.clone(),
                name: f.name.clone(),
                size_bytes: f.size,
                mime_class: MimeClass::from_file(f),
                status: UploadStatus::Pending,
                percent_complete: 0,
                failure: None,
            };
            let too_large = matches!(self.rules.max_file_bytes, Some(max) if f.size > max);
            if too_large {
                warn!("admit: {} ({} bytes) exceeds the size limit", f.name, f.size);
                item.status = UploadStatus::Failed;
                item.failure = Some("file too large".to_string());
            }
            debug!("admit: {} {:?}", id, item);
            self.items.push(item);
            self.publish(UploadEvent::Admitted(id));
            if too_large {
                self.publish(UploadEvent::Failed(id, "file too large".to_string()));
            }
            ids.push(id);
        }
        info!("admit: {} file(s) admitted", ids.len());
        if self.active.is_none() {
            self.start_next();
        }
        ids
    }

    /// Removes an item whatever its status.
    ///
    /// Removing the item in flight abandons it: the transport is told to
    /// cancel, no status change is applied and the next pending item starts.
    pub fn remove(&mut self, id: UploadId) -> Result<UploadItem, SessionErrors> {
        let idx = self.position(id).ok_or(SessionErrors::UnknownUpload(id))?;
        let item = self.items.remove(idx);
        self.finished.retain(|f| *f != id);
        self.publish(UploadEvent::Removed(id));
        if self.active == Some(id) {
            info!("remove: abandoning in-flight upload {}", id);
            self.active = None;
            self.transport.cancel(id);
            self.start_next();
        } else {
            debug!("remove: {} ({:?})", id, item.status);
        }
        Ok(item)
    }

    /// Removes every item, cancelling the one in flight.
    pub fn clear(&mut self) -> Vec<UploadItem> {
        if let Some(id) = self.active.take() {
            self.transport.cancel(id);
        }
        self.finished.clear();
        let removed: Vec<UploadItem> = self.items.drain(..).collect();
        for item in removed.iter() {
            self.publish(UploadEvent::Removed(item.id));
        }
        info!("clear: removed {} item(s)", removed.len());
        removed
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn get(&self, id: UploadId) -> Option<&UploadItem> {
        self.items.iter().find(|it| it.id == id)
    }

    /// The item currently in flight, if any.
    pub fn active(&self) -> Option<&UploadItem> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// True when there is something to analyse and every item made it.
    pub fn all_completed(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|it| it.status == UploadStatus::Completed)
    }

    /// Items that went through processing, in the order they finished.
    /// Removed items are kept out of it.
    pub fn finished_order(&self) -> Vec<UploadId> {
        self.finished
            .iter()
            .filter(|id| self.position(**id).is_some())
            .cloned()
            .collect()
    }

    pub fn count_with_status(&self, status: UploadStatus) -> usize {
        self.items.iter().filter(|it| it.status == status).count()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn position(&self, id: UploadId) -> Option<usize> {
        self.items.iter().position(|it| it.id == id)
    }

    fn publish(&mut self, event: UploadEvent) {
        // Listeners that went away are dropped.
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn start_next(&mut self) {
        let next = self
            .items
            .iter_mut()
            .find(|it| it.status == UploadStatus::Pending);
        if let Some(item) = next {
            item.status = UploadStatus::InProgress;
            item.percent_complete = 0;
            let id = item.id;
            self.active = Some(id);
            info!("start_next: uploading {} ({})", id, self.items_name(id));
            self.publish(UploadEvent::Started(id));
        } else {
            debug!("start_next: queue drained");
        }
    }

    fn items_name(&self, id: UploadId) -> String {
        self.get(id).map(|it| it.name.clone()).unwrap_or_default()
    }

    fn finish(&mut self, idx: usize, outcome: TransportReport) {
        let id = self.items[idx].id;
        match outcome {
            TransportReport::Failed(reason) => {
                warn!("upload {} failed: {}", id, reason);
                self.items[idx].status = UploadStatus::Failed;
                self.items[idx].failure = Some(reason.clone());
                self.publish(UploadEvent::Failed(id, reason));
            }
            TransportReport::Progress(_) => {
                info!("upload {} completed", id);
                self.items[idx].status = UploadStatus::Completed;
                self.items[idx].percent_complete = 100;
                self.publish(UploadEvent::Completed(id));
            }
        }
        self.finished.push(id);
        self.active = None;
        self.start_next();
    }
}

impl<T: UploadTransport> Tickable for UploadPipeline<T> {
    /// Stops early once the queue is drained, so large batches cost nothing.
    fn tick_by(&mut self, n: u32) {
        for _ in 0..n {
            if self.is_settled() {
                break;
            }
            self.tick();
        }
    }

    /// Advances the item in flight by asking the transport where it stands.
    fn tick(&mut self) {
        let id = match self.active {
            Some(id) => id,
            None => {
                self.start_next();
                return;
            }
        };
        let idx = match self.position(id) {
            Some(idx) => idx,
            None => {
                // Removal always clears the active slot.
                warn!("tick: active upload {} is gone", id);
                self.active = None;
                return;
            }
        };
        match self.transport.report(&self.items[idx]) {
            TransportReport::Progress(p) => {
                let p = p.min(100);
                if p > self.items[idx].percent_complete {
                    self.items[idx].percent_complete = p;
                    self.publish(UploadEvent::Progress(id, p));
                }
                if self.items[idx].percent_complete >= 100 {
                    self.finish(idx, TransportReport::Progress(100));
                }
            }
            failure => self.finish(idx, failure),
        }
    }

    fn is_settled(&self) -> bool {
        self.active.is_none()
            && !self
                .items
                .iter()
                .any(|it| it.status == UploadStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{drive, ManualTicks};

    fn clip() -> FileHandle {
        FileHandle::new("clip.mp3", 1024, "audio/mpeg")
    }

    fn files(names: &[&str]) -> Vec<FileHandle> {
        names
            .iter()
            .map(|n| FileHandle::new(n, 2048, "video/mp4"))
            .collect()
    }

    #[test]
    fn single_clip_completes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let ids = p.admit(&[clip()]);
        let id = ids[0];
        assert_eq!(p.get(id).unwrap().status, UploadStatus::InProgress);
        assert_eq!(p.get(id).unwrap().mime_class, MimeClass::Audio);
        for _ in 0..9 {
            p.tick();
        }
        assert_eq!(p.active().unwrap().percent_complete, 90);
        p.tick();
        let item = p.get(id).unwrap();
        assert_eq!(item.status, UploadStatus::Completed);
        assert_eq!(item.percent_complete, 100);
        assert!(p.is_settled());
        assert!(p.all_completed());
    }

    #[test]
    fn processing_follows_admission_order() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let mut ids = p.admit(&files(&["a.mp4", "b.mp4"]));
        ids.extend(p.admit(&files(&["c.mp4", "d.mp4", "e.mp4"])));
        let mut source = ManualTicks::steps(1000);
        drive(&mut source, &mut p, 1000);
        assert_eq!(p.finished_order(), ids);
    }

    #[test]
    fn at_most_one_item_in_progress() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        p.admit(&files(&["a.mp4", "b.mp4", "c.mp4"]));
        let mut ticks = 0;
        while !p.is_settled() {
            assert!(p.count_with_status(UploadStatus::InProgress) <= 1);
            if ticks == 12 {
                p.admit(&files(&["late.mp4"]));
            }
            p.tick();
            ticks += 1;
        }
        assert_eq!(p.count_with_status(UploadStatus::Completed), 4);
        // 10 ticks per item.
        assert_eq!(ticks, 40);
    }

    #[test]
    fn removing_in_flight_item_discards_its_progress() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let rx = p.subscribe();
        let ids = p.admit(&files(&["a.mp4", "b.mp4"]));
        for _ in 0..3 {
            p.tick();
        }
        let removed = p.remove(ids[0]).unwrap();
        assert_eq!(removed.status, UploadStatus::InProgress);
        assert!(p.get(ids[0]).is_none());
        assert!(!p.transport().is_tracking(ids[0]));
        assert_eq!(p.active().unwrap().id, ids[1]);
        assert_eq!(p.active().unwrap().percent_complete, 0);
        while !p.is_settled() {
            p.tick();
        }
        let events: Vec<UploadEvent> = rx.try_iter().collect();
        let removed_at = events
            .iter()
            .position(|e| *e == UploadEvent::Removed(ids[0]))
            .unwrap();
        let stale = events[removed_at..].iter().any(|e| match e {
            UploadEvent::Progress(id, _) | UploadEvent::Completed(id) => *id == ids[0],
            _ => false,
        });
        assert!(!stale);
        assert_eq!(p.finished_order(), vec![ids[1]]);
    }

    #[test]
    fn removing_unknown_item_is_an_error() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        assert_eq!(
            p.remove(UploadId(42)),
            Err(SessionErrors::UnknownUpload(UploadId(42)))
        );
    }

    #[test]
    fn failed_item_does_not_block_the_queue() {
        let transport = SimulatedTransport::new(10).fail_file("b.mp4", 30);
        let mut p = UploadPipeline::new(&UploadRules::DEFAULT_RULES, transport);
        let ids = p.admit(&files(&["a.mp4", "b.mp4", "c.mp4"]));
        while !p.is_settled() {
            p.tick();
        }
        let b = p.get(ids[1]).unwrap();
        assert_eq!(b.status, UploadStatus::Failed);
        assert_eq!(b.percent_complete, 20);
        assert_eq!(b.failure.as_deref(), Some("transport failed at 30%"));
        assert_eq!(p.get(ids[2]).unwrap().status, UploadStatus::Completed);
        assert_eq!(p.finished_order(), ids);
        assert!(!p.all_completed());
    }

    #[test]
    fn oversize_files_fail_at_admission() {
        let rules = UploadRules {
            max_file_bytes: Some(1000),
            ..UploadRules::DEFAULT_RULES
        };
        let mut p = UploadPipeline::simulated(&rules);
        let ids = p.admit(&[
            FileHandle::new("huge.mp4", 5000, "video/mp4"),
            FileHandle::new("notes.txt", 10, "text/plain"),
        ]);
        let huge = p.get(ids[0]).unwrap();
        assert_eq!(huge.status, UploadStatus::Failed);
        assert_eq!(huge.failure.as_deref(), Some("file too large"));
        assert_eq!(p.active().unwrap().id, ids[1]);
        assert_eq!(p.active().unwrap().mime_class, MimeClass::Text);
    }

    #[test]
    fn clear_cancels_everything() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let ids = p.admit(&files(&["a.mp4", "b.mp4"]));
        p.tick();
        let removed = p.clear();
        assert_eq!(removed.len(), 2);
        assert!(p.items().is_empty());
        assert!(p.is_idle());
        assert!(p.is_settled());
        assert!(!p.transport().is_tracking(ids[0]));
        assert!(!p.all_completed());
    }

    #[test]
    fn events_describe_the_lifecycle() {
        let mut p = UploadPipeline::simulated(&UploadRules {
            step_percent: 50,
            ..UploadRules::DEFAULT_RULES
        });
        let rx = p.subscribe();
        let id = p.admit(&[clip()])[0];
        p.tick();
        p.tick();
        let events: Vec<UploadEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                UploadEvent::Admitted(id),
                UploadEvent::Started(id),
                UploadEvent::Progress(id, 50),
                UploadEvent::Progress(id, 100),
                UploadEvent::Completed(id),
            ]
        );
    }

    #[test]
    fn mime_classes() {
        assert_eq!(MimeClass::from_mime("audio/wav"), MimeClass::Audio);
        assert_eq!(MimeClass::from_mime("VIDEO/MP4"), MimeClass::Video);
        assert_eq!(MimeClass::from_mime("application/msword"), MimeClass::Text);
        assert_eq!(MimeClass::from_mime("application/zip"), MimeClass::Other);
        assert_eq!(MimeClass::from_mime(""), MimeClass::Other);
    }

    #[test]
    fn documents_without_a_type_are_text() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let ids = p.admit(&[
            FileHandle::new("notes.DOCX", 100, ""),
            FileHandle::new("brief.txt", 100, "application/octet-stream"),
            FileHandle::new("talk.mp3", 100, ""),
            FileHandle::new("speech.doc", 100, "audio/mpeg"),
        ]);
        let classes: Vec<MimeClass> = ids
            .iter()
            .map(|id| p.get(*id).unwrap().mime_class)
            .collect();
        assert_eq!(
            classes,
            vec![
                MimeClass::Text,
                MimeClass::Text,
                MimeClass::Other,
                MimeClass::Audio
            ]
        );
    }

    #[test]
    fn removed_and_cleared_items_leave_the_finish_order() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let ids = p.admit(&[clip(), FileHandle::new("b.wav", 10, "audio/wav")]);
        p.tick_by(20);
        assert_eq!(p.finished_order(), ids);
        p.remove(ids[0]).unwrap();
        assert_eq!(p.finished, vec![ids[1]]);
        p.clear();
        assert!(p.finished.is_empty());
        let again = p.admit(&[clip()]);
        p.tick_by(10);
        assert_eq!(p.finished_order(), again);
    }

    #[test]
    fn huge_tick_batches_stop_once_drained() {
        let mut p = UploadPipeline::simulated(&UploadRules::DEFAULT_RULES);
        let id = p.admit(&[clip()])[0];
        p.tick_by(u32::MAX);
        assert_eq!(p.get(id).unwrap().status, UploadStatus::Completed);
        assert!(p.is_settled());
    }
}
