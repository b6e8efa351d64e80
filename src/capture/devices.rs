//! Device registry
//!
//! Tracks the cameras and microphones the platform can currently see,
//! refreshed on demand, on device-change notifications, and after any
//! permission-granting acquisition (labels only populate post-permission).

use crate::capture::platform::{CapturePlatform, DeviceDescriptor, DeviceKind};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Registry of enumerable input devices with a sticky selection
pub struct DeviceRegistry {
    platform: Arc<dyn CapturePlatform>,
    devices: RwLock<Vec<DeviceDescriptor>>,
    last_error: RwLock<Option<String>>,
    selected_camera: RwLock<Option<String>>,
    selected_microphone: RwLock<Option<String>>,
}

impl DeviceRegistry {
    pub fn new(platform: Arc<dyn CapturePlatform>) -> Self {
        Self {
            platform,
            devices: RwLock::new(Vec::new()),
            last_error: RwLock::new(None),
            selected_camera: RwLock::new(None),
            selected_microphone: RwLock::new(None),
        }
    }

    /// Re-query the platform. Enumeration failure never propagates: the
    /// registry reports an empty list and records the error for callers
    /// that want it.
    pub async fn refresh(&self) -> Vec<DeviceDescriptor> {
        match self.platform.enumerate_devices().await {
            Ok(devices) => {
                *self.last_error.write() = None;
                *self.devices.write() = devices.clone();
                devices
            }
            Err(e) => {
                tracing::warn!("Device enumeration failed: {}", e);
                *self.last_error.write() = Some(e.to_string());
                self.devices.write().clear();
                Vec::new()
            }
        }
    }

    /// Current device list, refreshed on demand
    pub async fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.refresh().await
    }

    /// Last cached list without touching the platform
    pub fn cached_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.read().clone()
    }

    /// Error recorded by the most recent failed enumeration
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn select_camera(&self, device_id: Option<String>) {
        *self.selected_camera.write() = device_id;
    }

    pub fn select_microphone(&self, device_id: Option<String>) {
        *self.selected_microphone.write() = device_id;
    }

    /// Chosen camera, or the first enumerated one when none is chosen yet
    pub fn camera_selection(&self) -> Option<String> {
        self.selected_camera
            .read()
            .clone()
            .or_else(|| self.first_of_kind(DeviceKind::Camera))
    }

    /// Chosen microphone, or the first enumerated one when none is chosen yet
    pub fn microphone_selection(&self) -> Option<String> {
        self.selected_microphone
            .read()
            .clone()
            .or_else(|| self.first_of_kind(DeviceKind::Microphone))
    }

    fn first_of_kind(&self, kind: DeviceKind) -> Option<String> {
        self.devices
            .read()
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| d.id.clone())
    }

    /// Refresh whenever the platform reports a device change. The task
    /// ends when the notification channel closes.
    pub fn spawn_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut changes = registry.platform.device_changes();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(()) => {
                        tracing::debug!("Device change notification, refreshing registry");
                        registry.refresh().await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        registry.refresh().await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::platform::ScreenCaptureOptions;
    use crate::capture::stream::MediaStream;
    use crate::error::{RecordingError, RecordingResult};
    use async_trait::async_trait;

    struct FixedPlatform {
        fail: bool,
    }

    #[async_trait]
    impl CapturePlatform for FixedPlatform {
        async fn enumerate_devices(&self) -> RecordingResult<Vec<DeviceDescriptor>> {
            if self.fail {
                return Err(RecordingError::DeviceUnavailable("no backend".into()));
            }
            Ok(vec![
                DeviceDescriptor {
                    id: "cam-1".into(),
                    label: "Front Camera".into(),
                    kind: DeviceKind::Camera,
                },
                DeviceDescriptor {
                    id: "mic-1".into(),
                    label: "Built-in Mic".into(),
                    kind: DeviceKind::Microphone,
                },
                DeviceDescriptor {
                    id: "mic-2".into(),
                    label: "USB Mic".into(),
                    kind: DeviceKind::Microphone,
                },
            ])
        }

        async fn acquire_screen(
            &self,
            _options: ScreenCaptureOptions,
        ) -> RecordingResult<MediaStream> {
            unimplemented!()
        }

        async fn acquire_camera(&self, _device_id: Option<&str>) -> RecordingResult<MediaStream> {
            unimplemented!()
        }

        async fn acquire_microphone(
            &self,
            _device_id: Option<&str>,
        ) -> RecordingResult<MediaStream> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn defaults_to_first_of_each_kind() {
        let registry = DeviceRegistry::new(Arc::new(FixedPlatform { fail: false }));
        registry.refresh().await;
        assert_eq!(registry.camera_selection().as_deref(), Some("cam-1"));
        assert_eq!(registry.microphone_selection().as_deref(), Some("mic-1"));

        registry.select_microphone(Some("mic-2".into()));
        assert_eq!(registry.microphone_selection().as_deref(), Some("mic-2"));
    }

    #[tokio::test]
    async fn enumeration_failure_reports_empty_list() {
        let registry = DeviceRegistry::new(Arc::new(FixedPlatform { fail: true }));
        let devices = registry.list_devices().await;
        assert!(devices.is_empty());
        assert!(registry.last_error().is_some());
        assert_eq!(registry.camera_selection(), None);
    }
}
