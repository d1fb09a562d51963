// One-shot handoff between the platform image picker and the workflow.
//
// Every picker invocation produces exactly one event: an image or a
// cancellation. The platform side gets a `PickerCompletion`, the app side
// awaits the matching `PickerRequest`.

use crate::error::AppError;
use std::path::Path;
use tokio::sync::oneshot;

/// Where the user wants the photo to come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Camera,
    Library,
}

impl ImageSource {
    pub fn as_str(&self) -> &str {
        match self {
            ImageSource::Camera => "camera",
            ImageSource::Library => "library",
        }
    }
}

/// Outcome of one picker invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent {
    Selected(Vec<u8>),
    Cancelled,
}

/// Awaitable side of a picker invocation
#[derive(Debug)]
pub struct PickerRequest {
    source: ImageSource,
    receiver: oneshot::Receiver<PickerEvent>,
}

impl PickerRequest {
    pub fn source(&self) -> ImageSource {
        self.source
    }

    /// Waits for the picker; a picker that went away without answering counts
    /// as cancelled
    pub async fn outcome(self) -> PickerEvent {
        match self.receiver.await {
            Ok(event) => event,
            Err(_) => {
                log::debug!("{} picker dropped without result", self.source.as_str());
                PickerEvent::Cancelled
            }
        }
    }
}

/// Platform side of a picker invocation, consumed by the first answer
#[derive(Debug)]
pub struct PickerCompletion {
    source: ImageSource,
    sender: oneshot::Sender<PickerEvent>,
}

impl PickerCompletion {
    pub fn select(self, bytes: Vec<u8>) {
        log::debug!(
            "{} picker selected {} bytes",
            self.source.as_str(),
            bytes.len()
        );
        self.finish(PickerEvent::Selected(bytes));
    }

    pub fn cancel(self) {
        log::debug!("{} picker cancelled", self.source.as_str());
        self.finish(PickerEvent::Cancelled);
    }

    fn finish(self, event: PickerEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("Picker result arrived after the request was dropped");
        }
    }
}

/// Starts a picker invocation
pub fn request_image(source: ImageSource) -> (PickerRequest, PickerCompletion) {
    let (sender, receiver) = oneshot::channel();
    (
        PickerRequest { source, receiver },
        PickerCompletion { source, sender },
    )
}

/// Reads a photo the platform picker or camera stored on disk
pub fn read_image_file(path: &Path) -> Result<Vec<u8>, AppError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(AppError::ImageProcessing(format!(
            "Picked file {} is empty",
            path.display()
        )));
    }
    Ok(bytes)
}
