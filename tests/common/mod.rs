//! Instrumented fake cameras shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use jasoos::camera::{
    Backend, CameraBackend, CameraDevice, CameraError, CameraSettings, DeviceIdentity, Frame,
    Resolution,
};

/// Three backends over five indices: at most 15 probe attempts.
pub fn test_settings() -> CameraSettings {
    CameraSettings {
        backends: vec![Backend::MediaFoundation, Backend::Video4Linux, Backend::Auto],
        max_index: 5,
        ..CameraSettings::default()
    }
}

/// What the fake hardware looks like and what was done to it.
#[derive(Default)]
pub struct FakeHardware {
    working: Mutex<HashSet<DeviceIdentity>>,
    open_log: Mutex<Vec<DeviceIdentity>>,
    open_handles: AtomicUsize,
    active_reads: AtomicUsize,
    max_concurrent_reads: AtomicUsize,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    read_delay: Mutex<Duration>,
}

impl FakeHardware {
    pub fn plug(&self, identity: DeviceIdentity) {
        self.working.lock().unwrap().insert(identity);
    }

    pub fn unplug(&self, identity: DeviceIdentity) {
        self.working.lock().unwrap().remove(&identity);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    /// Every `open` call, successful or not, in order.
    pub fn open_log(&self) -> Vec<DeviceIdentity> {
        self.open_log.lock().unwrap().clone()
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_reads(&self) -> usize {
        self.max_concurrent_reads.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    pub hardware: Arc<FakeHardware>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(identity: DeviceIdentity) -> Self {
        let backend = Self::new();
        backend.hardware.plug(identity);
        backend
    }
}

impl CameraBackend for FakeBackend {
    type Device = FakeDevice;

    fn open(
        &self,
        identity: DeviceIdentity,
        settings: &CameraSettings,
    ) -> Result<FakeDevice, CameraError> {
        self.hardware.open_log.lock().unwrap().push(identity);
        if !self.hardware.working.lock().unwrap().contains(&identity) {
            return Err(CameraError::OpenFailed(format!("{} is not there", identity)));
        }

        self.hardware.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(FakeDevice {
            hardware: Arc::clone(&self.hardware),
            resolution: settings.resolution,
            shade: identity.index as u8 + 1,
        })
    }
}

pub struct FakeDevice {
    hardware: Arc<FakeHardware>,
    resolution: Resolution,
    shade: u8,
}

impl CameraDevice for FakeDevice {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let hw = &self.hardware;
        let active = hw.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        hw.max_concurrent_reads.fetch_max(active, Ordering::SeqCst);
        hw.reads.fetch_add(1, Ordering::SeqCst);

        let delay = *hw.read_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        hw.active_reads.fetch_sub(1, Ordering::SeqCst);

        if hw.fail_reads.load(Ordering::SeqCst) {
            return Err(CameraError::ReadFailure("fake read failure".to_string()));
        }

        let len = self.resolution.width as usize * self.resolution.height as usize * 3;
        Ok(Frame {
            data: vec![self.shade; len],
            width: self.resolution.width,
            height: self.resolution.height,
            timestamp: Instant::now(),
        })
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.hardware.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
