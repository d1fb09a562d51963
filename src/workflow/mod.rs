// Identification workflow: select a photo, classify it, save it to the garden.
//
// `IdentificationSession` holds the state machine. `IdentificationWorkflow`
// drives it: it runs inference and record commits off the UI thread and
// publishes every state change on a watch channel. Background tasks only keep
// a weak handle, so results that arrive after the workflow is gone are
// dropped.

pub mod session;

pub use session::{ClassificationTicket, IdentificationSession, SaveTicket, SessionState};

use crate::config::StorageConfig;
use crate::error::{PersistError, WorkflowError};
use crate::image_processing::encode_photo;
use crate::models::SavedPlant;
use crate::picker::PickerEvent;
use crate::store::PlantStore;
use chrono::{DateTime, Utc};
use plant_classifier::{
    ClassificationRequest, ClassificationResult, ClassifierErrorKind, ClassifierService,
};
use std::sync::{Arc, Mutex, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How the selected photo is stored with a saved plant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoSettings {
    pub quality: u8,
    pub max_dimension: u32,
}

impl Default for PhotoSettings {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for PhotoSettings {
    fn from(config: &StorageConfig) -> Self {
        Self {
            quality: config.photo_quality,
            max_dimension: config.photo_max_dimension,
        }
    }
}

struct Shared {
    session: Mutex<IdentificationSession>,
    state_tx: watch::Sender<SessionState>,
}

impl Shared {
    /// Runs `f` on the session and publishes the resulting state.
    /// The lock is never held across an await.
    fn update<R>(&self, f: impl FnOnce(&mut IdentificationSession) -> R) -> R {
        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let before = session.state().name();
        let result = f(&mut session);
        let after = session.state().clone();
        if before != after.name() {
            log::debug!("Identification: {} -> {}", before, after.name());
        }
        self.state_tx.send_replace(after);

        result
    }

    fn read<R>(&self, f: impl FnOnce(&IdentificationSession) -> R) -> R {
        let session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&session)
    }
}

/// One "identify a plant" sheet
pub struct IdentificationWorkflow {
    shared: Arc<Shared>,
    classifier: ClassifierService,
    store: Arc<dyn PlantStore>,
    photo: PhotoSettings,
}

impl IdentificationWorkflow {
    pub fn new(
        classifier: ClassifierService,
        store: Arc<dyn PlantStore>,
        photo: PhotoSettings,
    ) -> Self {
        let session = IdentificationSession::new();
        let (state_tx, _) = watch::channel(session.state().clone());

        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                state_tx,
            }),
            classifier,
            store,
            photo,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.read(|s| s.state().clone())
    }

    /// Receives every state change, starting with the current state
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// The photo currently shown in the sheet
    pub fn selected_image(&self) -> Option<ClassificationRequest> {
        self.shared.read(|s| s.image().cloned())
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.shared.read(|s| s.started_at())
    }

    /// Replaces the current photo; any running classification is abandoned
    pub fn select_image(&self, bytes: Vec<u8>) {
        log::info!("Selected image ({} bytes)", bytes.len());
        let request = ClassificationRequest::from(bytes);
        self.shared.update(|s| s.select_image(request));
    }

    /// Applies a picker outcome. A cancellation leaves the session untouched.
    /// Returns whether an image was selected.
    pub fn apply_picker_event(&self, event: PickerEvent) -> bool {
        match event {
            PickerEvent::Selected(bytes) => {
                self.select_image(bytes);
                true
            }
            PickerEvent::Cancelled => {
                log::debug!("Picker cancelled, keeping {}", self.state().name());
                false
            }
        }
    }

    /// Starts classifying the selected image in the background.
    ///
    /// The result is applied exactly once, unless a newer image was selected
    /// or the workflow was dropped in the meantime. Must be called from
    /// within a tokio runtime, otherwise the session is left untouched and
    /// `WorkflowError::NoRuntime` is returned.
    pub fn start_classification(&self) -> Result<JoinHandle<()>, WorkflowError> {
        self.spawn_classification().map(|(_, handle)| handle)
    }

    fn spawn_classification(&self) -> Result<(u64, JoinHandle<()>), WorkflowError> {
        let runtime = Handle::try_current().map_err(|e| WorkflowError::NoRuntime(e.to_string()))?;
        let ticket = self.shared.update(|s| s.start_classification())?;
        let generation = ticket.generation;
        let weak = Arc::downgrade(&self.shared);
        let classifier = self.classifier.clone();

        let handle = runtime.spawn(async move {
            let result = classifier.classify(ticket.request).await;
            deliver(&weak, "classification", |s| {
                s.complete_classification(generation, result)
            });
        });
        Ok((generation, handle))
    }

    /// Starts a classification and waits for it, returning the new state
    pub async fn identify(&self) -> Result<SessionState, WorkflowError> {
        let (generation, handle) = self.spawn_classification()?;
        if let Err(e) = handle.await {
            log::error!("Classification task failed: {}", e);
            self.classification_aborted(generation);
        }
        Ok(self.state())
    }

    /// Ends a classification whose task died without delivering a result
    fn classification_aborted(&self, generation: u64) {
        self.shared.update(|s| {
            s.complete_classification(
                generation,
                ClassificationResult::Failure(ClassifierErrorKind::InferenceEngine),
            )
        });
    }

    /// Saves the classified plant with its photo.
    ///
    /// Only valid while `Classified`. If the store rejects the record the
    /// session goes back to `Classified` and the error is returned, so the
    /// user can try again.
    pub async fn save(&self) -> Result<SavedPlant, WorkflowError> {
        let ticket = self.shared.update(|s| s.begin_save())?;
        let generation = ticket.generation;
        let weak = Arc::downgrade(&self.shared);
        let store = Arc::clone(&self.store);
        let photo = self.photo;

        // The commit finishes and updates the session even if this future is dropped
        let handle = tokio::task::spawn_blocking(move || {
            let outcome = commit_record(store.as_ref(), &ticket, photo);
            deliver(&weak, "save", |s| match &outcome {
                Ok(plant) => s.save_succeeded(generation, plant.id),
                Err(_) => s.save_failed(generation),
            });
            outcome
        });

        match handle.await {
            Ok(Ok(plant)) => Ok(plant),
            Ok(Err(e)) => {
                log::warn!("Failed to save plant: {}", e);
                Err(WorkflowError::Persist(e))
            }
            Err(e) => {
                log::error!("Save task failed: {}", e);
                self.shared.update(|s| s.save_failed(generation));
                Err(WorkflowError::Persist(PersistError::Other(format!(
                    "Save task failed: {}",
                    e
                ))))
            }
        }
    }

    /// Returns to `Idle`, dropping the photo and any pending result
    pub fn reset(&self) {
        self.shared.update(|s| s.reset());
    }
}

/// Applies a background result if the workflow still exists
fn deliver(
    weak: &Weak<Shared>,
    what: &str,
    apply: impl FnOnce(&mut IdentificationSession) -> bool,
) {
    match weak.upgrade() {
        Some(shared) => {
            if !shared.update(apply) {
                log::debug!("Discarded stale {} result", what);
            }
        }
        None => log::debug!("Workflow closed before {} finished", what),
    }
}

/// Builds and commits the record. Runs on the blocking pool.
fn commit_record(
    store: &dyn PlantStore,
    ticket: &SaveTicket,
    photo: PhotoSettings,
) -> Result<SavedPlant, PersistError> {
    let photo_bytes = match encode_photo(ticket.request.bytes(), photo.quality, photo.max_dimension)
    {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("Saving plant without photo: {}", e);
            None
        }
    };

    let plant = SavedPlant::new(Some(ticket.label.clone()), photo_bytes);
    store.create(&plant)?;
    log::info!("Saved plant {} ({})", plant.title(), plant.id);

    Ok(plant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use crate::store::SqlitePlantStore;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use plant_classifier::{
        Classification, ClassifierConfig, ClassifierErrorKind, EngineError, InferenceEngine,
        ModelInput,
    };
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use uuid::Uuid;

    fn photo() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([30, 140, 60])));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn fixed(label: &'static str) -> ClassifierService {
        let engine = move |_: &ModelInput| -> Result<Vec<Classification>, EngineError> {
            Ok(vec![Classification::new(label, 0.9)])
        };
        ClassifierService::from_engine(Arc::new(engine), ClassifierConfig::default())
    }

    /// Blocks every inference until the test releases it
    struct GatedEngine {
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl InferenceEngine for GatedEngine {
        fn infer(&self, _input: &ModelInput) -> Result<Vec<Classification>, EngineError> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(vec![Classification::new("rose", 0.8)])
        }
    }

    fn gated() -> (ClassifierService, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let engine = GatedEngine {
            gate: Mutex::new(rx),
        };
        let service = ClassifierService::from_engine(Arc::new(engine), ClassifierConfig::default());
        (service, tx)
    }

    fn sqlite_store() -> Arc<SqlitePlantStore> {
        Arc::new(SqlitePlantStore::new(database::init_in_memory().unwrap()))
    }

    /// Store that can be switched into a failing mode
    struct FlakyStore {
        failing: AtomicBool,
        attempts: AtomicUsize,
        inner: SqlitePlantStore,
    }

    impl FlakyStore {
        fn new(failing: bool) -> Self {
            Self {
                failing: AtomicBool::new(failing),
                attempts: AtomicUsize::new(0),
                inner: SqlitePlantStore::new(database::init_in_memory().unwrap()),
            }
        }
    }

    impl PlantStore for FlakyStore {
        fn create(&self, plant: &SavedPlant) -> Result<(), PersistError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(PersistError::Other("disk full".to_string()));
            }
            self.inner.create(plant)
        }

        fn list(&self) -> Result<Vec<SavedPlant>, PersistError> {
            self.inner.list()
        }

        fn delete(&self, id: &Uuid) -> Result<(), PersistError> {
            self.inner.delete(id)
        }
    }

    fn workflow(
        classifier: ClassifierService,
        store: Arc<dyn PlantStore>,
    ) -> IdentificationWorkflow {
        IdentificationWorkflow::new(classifier, store, PhotoSettings::default())
    }

    #[tokio::test]
    async fn test_identify_and_save() {
        let store = sqlite_store();
        let wf = workflow(fixed("rose"), store.clone());

        wf.select_image(photo());
        assert_eq!(wf.state(), SessionState::ImageSelected);

        let state = wf.identify().await.unwrap();
        assert_eq!(
            state,
            SessionState::Classified {
                label: "rose".to_string()
            }
        );

        let plant = wf.save().await.unwrap();
        assert_eq!(plant.name.as_deref(), Some("rose"));
        assert!(plant.created_at >= wf.started_at());
        assert_eq!(
            wf.state(),
            SessionState::Saved {
                record_id: plant.id
            }
        );

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, plant.id);
        assert_eq!(all[0].name.as_deref(), Some("rose"));

        let stored_photo = all[0].photo.as_ref().unwrap();
        let decoded = image::load_from_memory(stored_photo).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_saved_name_is_normalized_label() {
        let store = sqlite_store();
        let wf = workflow(fixed("african violet, saintpaulia"), store.clone());
        wf.select_image(photo());

        assert_eq!(wf.identify().await.unwrap().label(), Some("african violet"));
        let plant = wf.save().await.unwrap();
        assert_eq!(plant.name.as_deref(), Some("african violet"));
        assert_eq!(
            store.list().unwrap()[0].name.as_deref(),
            Some("african violet")
        );
    }

    #[test]
    fn test_start_without_runtime_keeps_state() {
        let wf = workflow(fixed("rose"), sqlite_store());
        wf.select_image(photo());

        assert!(matches!(
            wf.start_classification(),
            Err(WorkflowError::NoRuntime(_))
        ));
        assert_eq!(wf.state(), SessionState::ImageSelected);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let state = runtime.block_on(wf.identify()).unwrap();
        assert_eq!(state.label(), Some("rose"));
    }

    #[tokio::test]
    async fn test_aborted_classification_fails_session() {
        let (classifier, release) = gated();
        let wf = workflow(classifier, sqlite_store());
        wf.select_image(photo());
        let handle = wf.start_classification().unwrap();
        let generation = wf.shared.read(|s| s.generation());

        wf.classification_aborted(generation);
        assert_eq!(
            wf.state(),
            SessionState::ClassificationFailed {
                reason: ClassifierErrorKind::InferenceEngine
            }
        );

        // The late result of the dead run is not applied
        release.send(()).unwrap();
        handle.await.unwrap();
        assert!(matches!(
            wf.state(),
            SessionState::ClassificationFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_classification() {
        let wf = workflow(fixed("rose"), sqlite_store());
        wf.select_image(b"not an image".to_vec());

        let state = wf.identify().await.unwrap();
        assert_eq!(
            state,
            SessionState::ClassificationFailed {
                reason: ClassifierErrorKind::ImageDecode
            }
        );
    }

    #[tokio::test]
    async fn test_start_requires_image() {
        let wf = workflow(fixed("rose"), sqlite_store());
        assert!(matches!(
            wf.start_classification(),
            Err(WorkflowError::InvalidTransition { state: "idle", .. })
        ));
    }

    #[tokio::test]
    async fn test_reselect_discards_running_classification() {
        let (classifier, release) = gated();
        let wf = workflow(classifier, sqlite_store());

        wf.select_image(photo());
        let handle = wf.start_classification().unwrap();
        assert_eq!(wf.state(), SessionState::Classifying);

        let second = vec![1, 2, 3];
        wf.select_image(second.clone());
        release.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(wf.state(), SessionState::ImageSelected);
        assert_eq!(wf.selected_image().unwrap().bytes(), &second[..]);
    }

    #[tokio::test]
    async fn test_result_after_drop_is_ignored() {
        let (classifier, release) = gated();
        let wf = workflow(classifier, sqlite_store());

        wf.select_image(photo());
        let mut rx = wf.subscribe();
        let handle = wf.start_classification().unwrap();
        drop(wf);

        release.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionState::Classifying);
    }

    #[tokio::test]
    async fn test_save_rejected_before_classified() {
        let store = sqlite_store();
        let (classifier, release) = gated();
        let wf = workflow(classifier, store.clone());

        assert!(wf.save().await.is_err());

        wf.select_image(photo());
        assert!(wf.save().await.is_err());

        let handle = wf.start_classification().unwrap();
        assert!(matches!(
            wf.save().await,
            Err(WorkflowError::InvalidTransition {
                state: "classifying",
                ..
            })
        ));
        release.send(()).unwrap();
        handle.await.unwrap();

        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_rejected_after_failure() {
        let store = sqlite_store();
        let wf = workflow(fixed("rose"), store.clone());
        wf.select_image(b"garbage".to_vec());
        wf.identify().await.unwrap();

        assert!(wf.save().await.is_err());
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_can_be_retried() {
        let store = Arc::new(FlakyStore::new(true));
        let wf = workflow(fixed("tulip"), store.clone());
        wf.select_image(photo());
        wf.identify().await.unwrap();

        let err = wf.save().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Persist(_)));
        assert_eq!(wf.state().label(), Some("tulip"));
        assert!(store.list().unwrap().is_empty());

        store.failing.store(false, Ordering::SeqCst);
        let plant = wf.save().await.unwrap();
        assert_eq!(plant.name.as_deref(), Some("tulip"));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_two_sessions_get_distinct_ids() {
        let store = sqlite_store();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let wf = workflow(fixed("rose"), store.clone());
            wf.select_image(photo());
            wf.identify().await.unwrap();
            ids.push(wf.save().await.unwrap().id);
        }

        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_picker_events() {
        let wf = workflow(fixed("rose"), sqlite_store());

        assert!(!wf.apply_picker_event(PickerEvent::Cancelled));
        assert_eq!(wf.state(), SessionState::Idle);

        assert!(wf.apply_picker_event(PickerEvent::Selected(photo())));
        assert_eq!(wf.state(), SessionState::ImageSelected);

        wf.identify().await.unwrap();
        assert!(!wf.apply_picker_event(PickerEvent::Cancelled));
        assert_eq!(wf.state().label(), Some("rose"));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let wf = workflow(fixed("fern"), sqlite_store());
        let mut rx = wf.subscribe();
        assert_eq!(*rx.borrow_and_update(), SessionState::Idle);

        wf.select_image(photo());
        wf.identify().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().label(), Some("fern"));

        wf.reset();
        assert_eq!(*rx.borrow(), SessionState::Idle);
        assert!(wf.selected_image().is_none());
    }
}
